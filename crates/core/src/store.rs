//! Storage ports. The SQL implementations live in the `repairflow-db`
//! crate; the in-memory implementations here back tests and small
//! single-process deployments.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::repair::{Repair, RepairId};
use crate::domain::withdrawal::{LineKey, WithdrawalTask, WithdrawalTaskId};
use crate::errors::StoreError;

/// Result of a guarded save: the revision now stored.
pub type SavedRevision = u32;

/// The repair aggregate loads and saves as one unit, keyed by repair id.
/// `save` is guarded by the aggregate's loaded `revision`: the write only
/// lands when the stored revision still matches, and the stored value is
/// bumped to `revision + 1`. A mismatch reports `RevisionMismatch` so the
/// caller can surface a retryable conflict.
#[async_trait]
pub trait RepairStore: Send + Sync {
    async fn load(&self, id: &RepairId) -> Result<Option<Repair>, StoreError>;
    async fn save(&self, repair: &Repair) -> Result<SavedRevision, StoreError>;
}

#[async_trait]
pub trait WithdrawalQueueStore: Send + Sync {
    async fn find_by_id(&self, id: &WithdrawalTaskId)
        -> Result<Option<WithdrawalTask>, StoreError>;
    async fn find_by_line_key(&self, key: &LineKey)
        -> Result<Option<WithdrawalTask>, StoreError>;
    async fn list_for_repair(&self, repair_id: &RepairId)
        -> Result<Vec<WithdrawalTask>, StoreError>;
    async fn save(&self, task: &WithdrawalTask) -> Result<(), StoreError>;
}

pub fn revision_mismatch(repair: &Repair, found: u32) -> StoreError {
    StoreError::RevisionMismatch {
        repair_id: repair.id.0.clone(),
        expected: repair.revision,
        found,
    }
}

#[derive(Default)]
pub struct InMemoryRepairStore {
    repairs: Mutex<HashMap<String, Repair>>,
}

impl InMemoryRepairStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Repair>> {
        match self.repairs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl RepairStore for InMemoryRepairStore {
    async fn load(&self, id: &RepairId) -> Result<Option<Repair>, StoreError> {
        Ok(self.lock().get(&id.0).cloned())
    }

    async fn save(&self, repair: &Repair) -> Result<SavedRevision, StoreError> {
        let mut repairs = self.lock();
        let found = repairs.get(&repair.id.0).map(|stored| stored.revision).unwrap_or(0);
        if found != repair.revision {
            return Err(revision_mismatch(repair, found));
        }

        let mut stored = repair.clone();
        stored.revision = repair.revision + 1;
        let revision = stored.revision;
        repairs.insert(repair.id.0.clone(), stored);
        Ok(revision)
    }
}

#[derive(Default)]
pub struct InMemoryWithdrawalQueueStore {
    tasks: Mutex<HashMap<String, WithdrawalTask>>,
}

impl InMemoryWithdrawalQueueStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, WithdrawalTask>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl WithdrawalQueueStore for InMemoryWithdrawalQueueStore {
    async fn find_by_id(
        &self,
        id: &WithdrawalTaskId,
    ) -> Result<Option<WithdrawalTask>, StoreError> {
        Ok(self.lock().get(&id.0).cloned())
    }

    async fn find_by_line_key(
        &self,
        key: &LineKey,
    ) -> Result<Option<WithdrawalTask>, StoreError> {
        Ok(self.lock().values().find(|task| task.line_key == *key).cloned())
    }

    async fn list_for_repair(
        &self,
        repair_id: &RepairId,
    ) -> Result<Vec<WithdrawalTask>, StoreError> {
        let mut tasks: Vec<WithdrawalTask> = self
            .lock()
            .values()
            .filter(|task| task.repair_id == *repair_id)
            .cloned()
            .collect();
        tasks.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(tasks)
    }

    async fn save(&self, task: &WithdrawalTask) -> Result<(), StoreError> {
        self.lock().insert(task.id.0.clone(), task.clone());
        Ok(())
    }
}
