//! Durable stock-withdrawal queue.
//!
//! Phase approval commits first; the withdrawals it owes the inventory
//! system are recorded as queue tasks and dispatched afterwards. Tasks are
//! idempotent per line key, retried with exponential backoff while the
//! collaborator is unavailable, and parked terminally when it refuses the
//! withdrawal outright.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::material::CatalogItemId;
use crate::domain::repair::RepairId;
use crate::domain::withdrawal::{LineKey, WithdrawalTask, WithdrawalTaskId, WithdrawalTaskState};
use crate::flows::PhaseKind;

#[derive(Clone, Debug)]
pub struct WithdrawalEngineConfig {
    /// How long before a running dispatch is considered abandoned.
    pub dispatch_timeout_seconds: i64,
    pub default_max_retries: u32,
    pub retry_backoff_multiplier: u32,
    pub retry_base_delay_seconds: i64,
}

impl Default for WithdrawalEngineConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_seconds: 300,
            default_max_retries: 3,
            retry_backoff_multiplier: 2,
            retry_base_delay_seconds: 5,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WithdrawalQueueError {
    #[error("invalid task transition from {from:?} to {to:?}: {reason}")]
    InvalidTransition {
        from: WithdrawalTaskState,
        to: WithdrawalTaskState,
        reason: String,
    },
    #[error("withdrawal task not yet available: {0}")]
    NotYetAvailable(WithdrawalTaskId),
}

/// Deterministic state machine for withdrawal tasks. Owns no storage; the
/// caller persists the task it gets back.
#[derive(Clone, Debug, Default)]
pub struct WithdrawalQueueEngine {
    config: WithdrawalEngineConfig,
}

impl WithdrawalQueueEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: WithdrawalEngineConfig) -> Self {
        Self { config }
    }

    /// Deterministic idempotency key for one forwarded line. Quantity is
    /// deliberately excluded: the same catalog item of the same phase is
    /// one line, however often it is re-saved before approval.
    pub fn line_key(
        repair_id: &RepairId,
        phase: PhaseKind,
        catalog_item_id: &CatalogItemId,
    ) -> LineKey {
        let mut hasher = Sha256::new();
        hasher.update(repair_id.0.as_bytes());
        hasher.update(b"/");
        hasher.update(phase.as_str().as_bytes());
        hasher.update(b"/");
        hasher.update(catalog_item_id.0.as_bytes());
        LineKey(format!("{:x}", hasher.finalize()))
    }

    pub fn create_task(
        &self,
        repair_id: RepairId,
        phase: PhaseKind,
        catalog_item_id: CatalogItemId,
        quantity: u32,
        purpose: impl Into<String>,
        note: Option<String>,
    ) -> WithdrawalTask {
        let now = Utc::now();
        let line_key = Self::line_key(&repair_id, phase, &catalog_item_id);

        WithdrawalTask {
            id: WithdrawalTaskId(Uuid::new_v4().to_string()),
            repair_id,
            catalog_item_id,
            quantity,
            purpose: purpose.into(),
            note,
            line_key,
            state: WithdrawalTaskState::Queued,
            retry_count: 0,
            max_retries: self.config.default_max_retries,
            available_at: now,
            last_error: None,
            withdrawal_request_id: None,
            state_version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move a task into `Running` ahead of a dispatch attempt.
    pub fn begin_dispatch(
        &self,
        mut task: WithdrawalTask,
    ) -> Result<WithdrawalTask, WithdrawalQueueError> {
        let now = Utc::now();

        match task.state {
            WithdrawalTaskState::Queued | WithdrawalTaskState::RetryableFailed => {}
            WithdrawalTaskState::Running => {
                let stale_threshold = task.updated_at
                    + Duration::seconds(self.config.dispatch_timeout_seconds);
                if now < stale_threshold {
                    return Err(WithdrawalQueueError::InvalidTransition {
                        from: task.state,
                        to: WithdrawalTaskState::Running,
                        reason: "dispatch already in flight".to_owned(),
                    });
                }
                // Stale claim; take it over.
            }
            WithdrawalTaskState::Completed | WithdrawalTaskState::FailedTerminal => {
                return Err(WithdrawalQueueError::InvalidTransition {
                    from: task.state,
                    to: WithdrawalTaskState::Running,
                    reason: "task already in terminal state".to_owned(),
                });
            }
        }

        if now < task.available_at {
            return Err(WithdrawalQueueError::NotYetAvailable(task.id.clone()));
        }

        task.state = WithdrawalTaskState::Running;
        task.state_version += 1;
        task.updated_at = now;
        Ok(task)
    }

    /// Record the collaborator's receipt: `Running -> Completed`.
    pub fn complete(
        &self,
        mut task: WithdrawalTask,
        withdrawal_request_id: impl Into<String>,
    ) -> Result<WithdrawalTask, WithdrawalQueueError> {
        self.ensure_running(&task, WithdrawalTaskState::Completed)?;

        task.state = WithdrawalTaskState::Completed;
        task.withdrawal_request_id = Some(withdrawal_request_id.into());
        task.last_error = None;
        task.state_version += 1;
        task.updated_at = Utc::now();
        Ok(task)
    }

    /// Record a dispatch failure. Retryable failures back off
    /// exponentially until `max_retries`; everything else parks terminal.
    pub fn fail(
        &self,
        mut task: WithdrawalTask,
        error: impl Into<String>,
        retryable: bool,
    ) -> Result<WithdrawalTask, WithdrawalQueueError> {
        self.ensure_running(&task, WithdrawalTaskState::RetryableFailed)?;

        let now = Utc::now();
        let should_retry = retryable && task.retry_count < task.max_retries;

        if should_retry {
            let backoff_seconds = self.config.retry_base_delay_seconds
                * i64::from(self.config.retry_backoff_multiplier.pow(task.retry_count));
            task.state = WithdrawalTaskState::RetryableFailed;
            task.retry_count += 1;
            task.available_at = now + Duration::seconds(backoff_seconds);
        } else {
            task.state = WithdrawalTaskState::FailedTerminal;
        }
        task.last_error = Some(error.into());
        task.state_version += 1;
        task.updated_at = now;
        Ok(task)
    }

    /// Running tasks whose dispatch never reported back, eligible for
    /// takeover by the next retry sweep.
    pub fn recover_stale(
        &self,
        tasks: Vec<WithdrawalTask>,
        reference_time: DateTime<Utc>,
    ) -> Vec<WithdrawalTask> {
        let stale_threshold =
            reference_time - Duration::seconds(self.config.dispatch_timeout_seconds);

        tasks
            .into_iter()
            .filter(|task| {
                task.state == WithdrawalTaskState::Running && task.updated_at < stale_threshold
            })
            .collect()
    }

    fn ensure_running(
        &self,
        task: &WithdrawalTask,
        to: WithdrawalTaskState,
    ) -> Result<(), WithdrawalQueueError> {
        if task.state != WithdrawalTaskState::Running {
            return Err(WithdrawalQueueError::InvalidTransition {
                from: task.state,
                to,
                reason: "only a running dispatch can report an outcome".to_owned(),
            });
        }
        Ok(())
    }
}
