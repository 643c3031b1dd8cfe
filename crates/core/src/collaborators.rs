//! Boundary contracts to the external CRUD services this engine leans on.
//! Consumed as traits; the engine never sees a wire format.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::material::CatalogItemId;
use crate::domain::repair::{DepartmentId, DeviceId, UserId};
use crate::roles::RoleTier;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: String },
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentRecord {
    pub id: DepartmentId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub display_name: String,
    pub tier: RoleTier,
}

/// Read-only resolve-by-id against the device/department/user registries.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn resolve_device(&self, id: &DeviceId) -> Result<DeviceRecord, LookupError>;
    async fn resolve_department(&self, id: &DepartmentId)
        -> Result<DepartmentRecord, LookupError>;
    async fn resolve_user(&self, id: &UserId) -> Result<UserRecord, LookupError>;
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    devices: HashMap<String, DeviceRecord>,
    departments: HashMap<String, DepartmentRecord>,
    users: HashMap<String, UserRecord>,
}

impl InMemoryDirectory {
    pub fn with_device(mut self, id: &str, name: &str) -> Self {
        self.devices.insert(
            id.to_owned(),
            DeviceRecord { id: DeviceId(id.to_owned()), name: name.to_owned() },
        );
        self
    }

    pub fn with_department(mut self, id: &str, name: &str) -> Self {
        self.departments.insert(
            id.to_owned(),
            DepartmentRecord { id: DepartmentId(id.to_owned()), name: name.to_owned() },
        );
        self
    }

    pub fn with_user(mut self, id: &str, display_name: &str, tier: RoleTier) -> Self {
        self.users.insert(
            id.to_owned(),
            UserRecord { id: UserId(id.to_owned()), display_name: display_name.to_owned(), tier },
        );
        self
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn resolve_device(&self, id: &DeviceId) -> Result<DeviceRecord, LookupError> {
        self.devices
            .get(&id.0)
            .cloned()
            .ok_or_else(|| LookupError::NotFound { kind: "device", id: id.0.clone() })
    }

    async fn resolve_department(
        &self,
        id: &DepartmentId,
    ) -> Result<DepartmentRecord, LookupError> {
        self.departments
            .get(&id.0)
            .cloned()
            .ok_or_else(|| LookupError::NotFound { kind: "department", id: id.0.clone() })
    }

    async fn resolve_user(&self, id: &UserId) -> Result<UserRecord, LookupError> {
        self.users
            .get(&id.0)
            .cloned()
            .ok_or_else(|| LookupError::NotFound { kind: "user", id: id.0.clone() })
    }
}

/// One stock withdrawal to be executed by the inventory system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalOrder {
    pub catalog_item_id: CatalogItemId,
    pub quantity: u32,
    pub purpose: String,
    pub note: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReceipt {
    pub request_id: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    /// Domain-level refusal, e.g. insufficient stock. Retrying without a
    /// human fixing the underlying condition will not help.
    #[error("withdrawal rejected by inventory: {0}")]
    Rejected(String),
    /// Transport-level failure; safe to retry later.
    #[error("inventory collaborator unavailable: {0}")]
    Unavailable(String),
}

impl CollaboratorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[async_trait]
pub trait StockWithdrawalClient: Send + Sync {
    async fn request_withdrawal(
        &self,
        order: WithdrawalOrder,
    ) -> Result<WithdrawalReceipt, CollaboratorError>;
}

/// Test double recording every accepted order. Failures can be scripted:
/// the next `fail_times` calls return `Unavailable`, and `rejecting`
/// turns every call into a domain rejection.
#[derive(Debug, Default)]
pub struct InMemoryStockWithdrawalClient {
    state: Mutex<ClientState>,
}

#[derive(Debug, Default)]
struct ClientState {
    orders: Vec<WithdrawalOrder>,
    fail_times: u32,
    reject_with: Option<String>,
    issued: u32,
}

impl InMemoryStockWithdrawalClient {
    pub fn with_failures(self, fail_times: u32) -> Self {
        self.lock().fail_times = fail_times;
        self
    }

    pub fn rejecting(self, message: &str) -> Self {
        self.lock().reject_with = Some(message.to_owned());
        self
    }

    pub fn orders(&self) -> Vec<WithdrawalOrder> {
        self.lock().orders.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClientState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl StockWithdrawalClient for InMemoryStockWithdrawalClient {
    async fn request_withdrawal(
        &self,
        order: WithdrawalOrder,
    ) -> Result<WithdrawalReceipt, CollaboratorError> {
        let mut state = self.lock();
        if let Some(message) = &state.reject_with {
            return Err(CollaboratorError::Rejected(message.clone()));
        }
        if state.fail_times > 0 {
            state.fail_times -= 1;
            return Err(CollaboratorError::Unavailable("scripted outage".to_owned()));
        }
        state.issued += 1;
        let request_id = format!("WD-{:04}", state.issued);
        state.orders.push(order);
        Ok(WithdrawalReceipt { request_id })
    }
}
