use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::material::CatalogItemId;
use crate::domain::repair::RepairId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WithdrawalTaskId(pub String);

impl fmt::Display for WithdrawalTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic idempotency key for one forwarded replacement line:
/// equal keys mean the same line of the same repair phase, so at most one
/// task ever exists per key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineKey(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalTaskState {
    Queued,
    Running,
    RetryableFailed,
    FailedTerminal,
    Completed,
}

impl WithdrawalTaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::RetryableFailed => "retryable_failed",
            Self::FailedTerminal => "failed_terminal",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "retryable_failed" => Some(Self::RetryableFailed),
            "failed_terminal" => Some(Self::FailedTerminal),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::FailedTerminal)
    }

    /// States still owed a forward to the inventory collaborator.
    pub fn needs_dispatch(&self) -> bool {
        matches!(self, Self::Queued | Self::RetryableFailed)
    }
}

/// Durable record of one stock withdrawal owed to the inventory system.
/// Created when a replacement line crosses into its phase's terminal
/// approved status; dispatched best-effort and retried independently of
/// the phase transition that spawned it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalTask {
    pub id: WithdrawalTaskId,
    pub repair_id: RepairId,
    pub catalog_item_id: CatalogItemId,
    pub quantity: u32,
    pub purpose: String,
    pub note: Option<String>,
    pub line_key: LineKey,
    pub state: WithdrawalTaskState,
    pub retry_count: u32,
    pub max_retries: u32,
    pub available_at: DateTime<Utc>,
    pub last_error: Option<String>,
    /// Id returned by the inventory collaborator once the withdrawal
    /// request has been accepted; traceability back to stock movements.
    pub withdrawal_request_id: Option<String>,
    pub state_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::WithdrawalTaskState;

    #[test]
    fn state_round_trips_from_storage_encoding() {
        let cases = [
            WithdrawalTaskState::Queued,
            WithdrawalTaskState::Running,
            WithdrawalTaskState::RetryableFailed,
            WithdrawalTaskState::FailedTerminal,
            WithdrawalTaskState::Completed,
        ];

        for state in cases {
            assert_eq!(WithdrawalTaskState::parse(state.as_str()), Some(state));
        }
    }

    #[test]
    fn only_queued_and_retryable_need_dispatch() {
        assert!(WithdrawalTaskState::Queued.needs_dispatch());
        assert!(WithdrawalTaskState::RetryableFailed.needs_dispatch());
        assert!(!WithdrawalTaskState::Running.needs_dispatch());
        assert!(!WithdrawalTaskState::Completed.needs_dispatch());
        assert!(!WithdrawalTaskState::FailedTerminal.needs_dispatch());
    }
}
