//! Named request kinds.
//!
//! Every request the client can issue has one entry here, with its wire
//! `request_id` fixed in one place. Both ends agree on this table; adding a
//! kind means adding a variant, never reusing a number.
//!
//! # ID Ranges
//!
//! | Range | Area |
//! |-------|------|
//! | 10-39 | Accounts and login |
//! | 40-49 | Shift requests |
//! | 50-59 | Workers and certifications |
//! | 60-79 | Google sign-in and sign-up |
//! | 90-99 | Admin and reporting |
//! | 200-239 | Jobs, shifts, timesheets, client schedule |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::identifiers::RequestId;

// ============================================================================
// RequestKind
// ============================================================================

/// Closed set of request kinds understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    // Accounts
    /// Username/password login.
    Login,
    /// Register a manager account.
    ManagerSignUp,
    /// Register a worker account.
    EmployeeSignUp,

    // Shift requests
    /// List shift requests visible to the caller.
    GetShiftRequests,
    /// Submit availability for a shift.
    SubmitShiftRequest,
    /// Manager approves a shift request.
    ApproveShiftRequest,
    /// Manager rejects a shift request.
    RejectShiftRequest,

    // Workers
    /// List workers under the current manager.
    GetWorkers,
    /// List a worker's role certifications.
    GetCertifications,
    /// Replace a worker's role certifications.
    UpdateCertifications,

    // Google
    /// Sign in with a Google ID token.
    GoogleAuth,
    /// Finish account creation after Google sign-in.
    GoogleSignUp,

    // Admin and reporting
    /// Timesheet totals per worker.
    TimesheetReport,
    /// Export timesheets for payroll.
    ExportTimesheets,

    // Jobs and shifts
    /// List jobs.
    ListJobs,
    /// Create a job.
    CreateJob,
    /// Update a job.
    UpdateJob,
    /// Delete a job.
    DeleteJob,
    /// List shifts of a job.
    ListShifts,
    /// Create a shift.
    CreateShift,
    /// Assign a worker to a shift.
    AssignWorker,
    /// Remove a worker from a shift.
    UnassignWorker,
    /// List timesheet entries.
    GetTimesheets,
    /// Submit clock-in/clock-out times.
    SubmitTimesheet,
    /// Manager approves a timesheet entry.
    ApproveTimesheet,
    /// Scheduled work for a client account.
    ClientSchedule,
}

impl RequestKind {
    /// Every kind, in wire-ID order.
    pub const ALL: &'static [RequestKind] = &[
        Self::Login,
        Self::ManagerSignUp,
        Self::EmployeeSignUp,
        Self::GetShiftRequests,
        Self::SubmitShiftRequest,
        Self::ApproveShiftRequest,
        Self::RejectShiftRequest,
        Self::GetWorkers,
        Self::GetCertifications,
        Self::UpdateCertifications,
        Self::GoogleAuth,
        Self::GoogleSignUp,
        Self::TimesheetReport,
        Self::ExportTimesheets,
        Self::ListJobs,
        Self::CreateJob,
        Self::UpdateJob,
        Self::DeleteJob,
        Self::ListShifts,
        Self::CreateShift,
        Self::AssignWorker,
        Self::UnassignWorker,
        Self::GetTimesheets,
        Self::SubmitTimesheet,
        Self::ApproveTimesheet,
        Self::ClientSchedule,
    ];

    /// Returns the wire `request_id` for this kind.
    #[must_use]
    pub const fn id(self) -> RequestId {
        let raw = match self {
            Self::Login => 10,
            Self::ManagerSignUp => 20,
            Self::EmployeeSignUp => 30,
            Self::GetShiftRequests => 40,
            Self::SubmitShiftRequest => 41,
            Self::ApproveShiftRequest => 42,
            Self::RejectShiftRequest => 43,
            Self::GetWorkers => 50,
            Self::GetCertifications => 51,
            Self::UpdateCertifications => 52,
            Self::GoogleAuth => 60,
            Self::GoogleSignUp => 70,
            Self::TimesheetReport => 90,
            Self::ExportTimesheets => 91,
            Self::ListJobs => 200,
            Self::CreateJob => 201,
            Self::UpdateJob => 202,
            Self::DeleteJob => 203,
            Self::ListShifts => 210,
            Self::CreateShift => 211,
            Self::AssignWorker => 212,
            Self::UnassignWorker => 213,
            Self::GetTimesheets => 220,
            Self::SubmitTimesheet => 221,
            Self::ApproveTimesheet => 222,
            Self::ClientSchedule => 230,
        };
        RequestId::new(raw)
    }

    /// Looks up the kind for a wire ID.
    #[must_use]
    pub fn from_id(id: RequestId) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.id() == id)
    }

    /// Returns a stable, human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::ManagerSignUp => "managerSignUp",
            Self::EmployeeSignUp => "employeeSignUp",
            Self::GetShiftRequests => "getShiftRequests",
            Self::SubmitShiftRequest => "submitShiftRequest",
            Self::ApproveShiftRequest => "approveShiftRequest",
            Self::RejectShiftRequest => "rejectShiftRequest",
            Self::GetWorkers => "getWorkers",
            Self::GetCertifications => "getCertifications",
            Self::UpdateCertifications => "updateCertifications",
            Self::GoogleAuth => "googleAuth",
            Self::GoogleSignUp => "googleSignUp",
            Self::TimesheetReport => "timesheetReport",
            Self::ExportTimesheets => "exportTimesheets",
            Self::ListJobs => "listJobs",
            Self::CreateJob => "createJob",
            Self::UpdateJob => "updateJob",
            Self::DeleteJob => "deleteJob",
            Self::ListShifts => "listShifts",
            Self::CreateShift => "createShift",
            Self::AssignWorker => "assignWorker",
            Self::UnassignWorker => "unassignWorker",
            Self::GetTimesheets => "getTimesheets",
            Self::SubmitTimesheet => "submitTimesheet",
            Self::ApproveTimesheet => "approveTimesheet",
            Self::ClientSchedule => "clientSchedule",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.id())
    }
}

// Kinds travel as their integer ID.

impl Serialize for RequestKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.id().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RequestKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = RequestId::deserialize(deserializer)?;
        Self::from_id(id)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown request kind {id}")))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use rustc_hash::FxHashSet;

    #[test]
    fn test_ids_are_unique() {
        let ids: FxHashSet<RequestId> = RequestKind::ALL.iter().map(|k| k.id()).collect();
        assert_eq!(ids.len(), RequestKind::ALL.len());
    }

    #[test]
    fn test_names_are_unique() {
        let names: FxHashSet<&str> = RequestKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names.len(), RequestKind::ALL.len());
    }

    #[test]
    fn test_all_is_sorted_by_id() {
        let ids: Vec<u32> = RequestKind::ALL.iter().map(|k| k.id().as_u32()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_lookup_round_trips_every_kind() {
        for kind in RequestKind::ALL {
            assert_eq!(RequestKind::from_id(kind.id()), Some(*kind));
        }
    }

    #[test]
    fn test_login_is_ten() {
        assert_eq!(RequestKind::Login.id().as_u32(), 10);
    }

    #[test]
    fn test_serde_as_integer() {
        let json = serde_json::to_string(&RequestKind::GetTimesheets).expect("serialize");
        assert_eq!(json, "220");

        let kind: RequestKind = serde_json::from_str("221").expect("parse");
        assert_eq!(kind, RequestKind::SubmitTimesheet);

        assert!(serde_json::from_str::<RequestKind>("9999").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(RequestKind::Login.to_string(), "login(10)");
    }
}
