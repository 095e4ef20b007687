//! Response listener registry.
//!
//! Every in-flight request owns one listener keyed by the `request_id` it
//! sent. Inbound frames are parsed once and handed only to listeners
//! waiting on the frame's ID; everyone else keeps waiting.
//!
//! # Listener Lifecycle
//!
//! 1. [`Correlator::attach`] before the request is written to the socket
//! 2. Exactly one of: matching frame ([`Correlator::dispatch`]), caller
//!    detach ([`Correlator::detach`]) or transport close
//!    ([`Correlator::fail_all`]) removes it
//! 3. Removal is idempotent; a second detach is a no-op

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::{ListenerId, RequestId};
use crate::protocol::{Inbound, Response};

// ============================================================================
// Types
// ============================================================================

/// What a listener eventually receives.
pub type Delivery = Result<Response>;

/// One attached listener.
struct Listener {
    id: ListenerId,
    tx: oneshot::Sender<Delivery>,
}

/// Map of request IDs to every listener waiting on them.
type ListenerMap = FxHashMap<RequestId, Vec<Listener>>;

// ============================================================================
// Dispatch
// ============================================================================

/// Result of routing one inbound frame.
#[derive(Debug)]
pub enum Dispatch {
    /// Delivered to this many listeners, all now detached.
    Delivered(usize),
    /// No listener claimed the frame.
    Unclaimed(Inbound),
}

// ============================================================================
// Correlator
// ============================================================================

/// Registry of listeners attached to one transport.
///
/// Thread-safe; share it behind an `Arc`.
#[derive(Default)]
pub struct Correlator {
    listeners: Mutex<ListenerMap>,
}

impl Correlator {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a listener for `request_id`.
    pub fn attach(&self, request_id: RequestId) -> (ListenerId, oneshot::Receiver<Delivery>) {
        let (tx, rx) = oneshot::channel();
        let id = ListenerId::next();

        self.listeners
            .lock()
            .entry(request_id)
            .or_default()
            .push(Listener { id, tx });

        trace!(%request_id, listener = %id, "Listener attached");
        (id, rx)
    }

    /// Attaches a listener unless `max` listeners are already attached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyPending`] when the registry is full.
    pub fn try_attach(
        &self,
        request_id: RequestId,
        max: usize,
    ) -> Result<(ListenerId, oneshot::Receiver<Delivery>)> {
        let mut listeners = self.listeners.lock();
        let pending = Self::count(&listeners);
        if pending >= max {
            return Err(Error::TooManyPending { pending, max });
        }

        let (tx, rx) = oneshot::channel();
        let id = ListenerId::next();
        listeners
            .entry(request_id)
            .or_default()
            .push(Listener { id, tx });

        trace!(%request_id, listener = %id, "Listener attached");
        Ok((id, rx))
    }

    /// Detaches one listener.
    ///
    /// Returns `false` if it was already gone.
    pub fn detach(&self, request_id: RequestId, listener: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(waiting) = listeners.get_mut(&request_id) else {
            return false;
        };

        let before = waiting.len();
        waiting.retain(|l| l.id != listener);
        let removed = waiting.len() != before;

        if waiting.is_empty() {
            listeners.remove(&request_id);
        }
        if removed {
            trace!(%request_id, %listener, "Listener detached");
        }
        removed
    }

    /// Detaches one listener and resolves it with `error`.
    ///
    /// Returns `false` if it was already gone.
    pub fn fail(&self, request_id: RequestId, listener: ListenerId, error: Error) -> bool {
        let taken = {
            let mut listeners = self.listeners.lock();
            let Some(waiting) = listeners.get_mut(&request_id) else {
                return false;
            };
            let taken = waiting
                .iter()
                .position(|l| l.id == listener)
                .map(|index| waiting.swap_remove(index));
            if waiting.is_empty() {
                listeners.remove(&request_id);
            }
            taken
        };

        match taken {
            Some(l) => {
                let _ = l.tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Routes one inbound frame to the listeners waiting on its ID.
    ///
    /// Frames without a usable ID are never delivered.
    pub fn dispatch(&self, inbound: Inbound) -> Dispatch {
        let Some(request_id) = inbound.request_id() else {
            return Dispatch::Unclaimed(inbound);
        };

        let Some(waiting) = self.listeners.lock().remove(&request_id) else {
            return Dispatch::Unclaimed(inbound);
        };

        let count = waiting.len();
        match inbound {
            Inbound::Response(response) => {
                for listener in waiting {
                    // Receiver gone means the caller already stopped caring.
                    let _ = listener.tx.send(Ok(response.clone()));
                }
            }
            Inbound::Invalid { message, .. } => {
                for listener in waiting {
                    let _ = listener.tx.send(Err(Error::protocol(message.clone())));
                }
            }
            Inbound::Unsolicited(_) | Inbound::Malformed(_) => {}
        }

        trace!(%request_id, count, "Response delivered");
        Dispatch::Delivered(count)
    }

    /// Resolves every listener with [`Error::ConnectionClosed`].
    ///
    /// Returns how many were failed.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<_> = self.listeners.lock().drain().collect();
        let mut count = 0;

        for (_, waiting) in drained {
            for listener in waiting {
                let _ = listener.tx.send(Err(Error::ConnectionClosed));
                count += 1;
            }
        }

        if count > 0 {
            debug!(count, "Failed pending listeners on close");
        }
        count
    }

    /// Returns the number of attached listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        Self::count(&self.listeners.lock())
    }

    /// Returns `true` if no listener is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Returns how many listeners wait on `request_id`.
    #[must_use]
    pub fn waiting_on(&self, request_id: RequestId) -> usize {
        self.listeners.lock().get(&request_id).map_or(0, Vec::len)
    }

    fn count(listeners: &ListenerMap) -> usize {
        listeners.values().map(Vec::len).sum()
    }
}

// ============================================================================
// Tests
// ============================================================================
