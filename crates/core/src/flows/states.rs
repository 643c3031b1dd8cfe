use serde::{Deserialize, Serialize};

use crate::domain::phase::{RequestStatus, ReviewStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Request,
    Inspection,
    Acceptance,
}

impl PhaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Inspection => "inspection",
            Self::Acceptance => "acceptance",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
}

impl ReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

/// Approval sub-steps of the request phase, in token order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStep {
    Technician,
    TeamLead,
    Director,
}

/// What the orchestrator must record after a request transition commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestEffect {
    RecordSignoff(RequestStep),
    RecordRejection,
    /// Terminal approval: stamp `completed_at` and unlock inspection.
    MarkCompleted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub action: ReviewAction,
    pub effects: Vec<RequestEffect>,
}

/// What the orchestrator must record after an inspection/acceptance
/// transition commits. `FinalizeApproval` is the terminal-approval hook:
/// duration computation plus the phase-specific side effects (withdrawal
/// forwarding for inspection, process completion for acceptance).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewEffect {
    RecordManagerSignoff,
    RecordAdminSignoff,
    RecordRejection,
    FinalizeApproval,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub phase: PhaseKind,
    pub from: ReviewStatus,
    pub to: ReviewStatus,
    pub action: ReviewAction,
    pub effects: Vec<ReviewEffect>,
}
