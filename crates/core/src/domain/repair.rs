use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::phase::{AcceptancePhase, InspectionPhase, RequestPhase, RequestStatus, ReviewStatus};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepairId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepartmentId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Aggregate root for one physical-device repair case. Owns the three
/// phase records; all mutation goes through the workflow engine, one
/// command at a time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repair {
    pub id: RepairId,
    pub device_id: DeviceId,
    pub department_id: DepartmentId,
    pub issue: String,
    pub recommendation: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub canceled: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub process_completed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped by the store on every save.
    pub revision: u32,
    pub request: RequestPhase,
    pub inspection: Option<InspectionPhase>,
    pub acceptance: Option<AcceptancePhase>,
}

impl Repair {
    pub fn open(
        id: RepairId,
        device_id: DeviceId,
        department_id: DepartmentId,
        issue: String,
        recommendation: String,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            device_id,
            department_id,
            issue,
            recommendation,
            created_by,
            created_at,
            canceled: false,
            canceled_at: None,
            process_completed_at: None,
            revision: 0,
            request: RequestPhase::open(),
            inspection: None,
            acceptance: None,
        }
    }

    /// A canceled repair accepts no further mutation.
    pub fn ensure_active(&self) -> Result<(), DomainError> {
        if self.canceled {
            return Err(DomainError::State(format!(
                "repair `{}` is canceled; all phases are frozen",
                self.id.0
            )));
        }
        Ok(())
    }

    /// Cancellation window: open only while no phase has reached a
    /// terminal approved status, i.e. before the request completes.
    pub fn can_cancel(&self) -> bool {
        !self.canceled && self.request.status != RequestStatus::Completed
    }

    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        if self.canceled {
            return Err(DomainError::State(format!("repair `{}` is already canceled", self.id.0)));
        }
        if !self.can_cancel() {
            return Err(DomainError::State(format!(
                "repair `{}` has an approved phase and can no longer be canceled",
                self.id.0
            )));
        }
        self.canceled = true;
        self.canceled_at = Some(at);
        Ok(())
    }

    pub fn inspection_unlocked(&self) -> bool {
        self.request.status == RequestStatus::Completed
    }

    pub fn acceptance_unlocked(&self) -> bool {
        self.inspection
            .as_ref()
            .is_some_and(|inspection| inspection.status == ReviewStatus::AdminApproved)
    }

    /// Informational terminal marker; does not archive or freeze anything.
    pub fn mark_process_complete(&mut self, at: DateTime<Utc>) {
        if self.process_completed_at.is_none() {
            self.process_completed_at = Some(at);
        }
    }
}
