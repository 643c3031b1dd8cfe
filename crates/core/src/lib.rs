pub mod audit;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod ledger;
pub mod roles;
pub mod service;
pub mod store;
pub mod withdrawal_engine;
pub mod workflow;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use collaborators::{
    CollaboratorError, Directory, InMemoryDirectory, InMemoryStockWithdrawalClient, LookupError,
    StockWithdrawalClient, WithdrawalOrder, WithdrawalReceipt,
};
pub use domain::committee::{Committee, CommitteeMember};
pub use domain::material::{CatalogItemId, MaterialKey, ReplacementLine, ReplacementSource, SalvageLine};
pub use domain::phase::{
    AcceptancePhase, InspectionFinding, InspectionPhase, Rejection, RequestPhase, RequestStatus,
    ReviewStatus, Signoff,
};
pub use domain::repair::{DepartmentId, DeviceId, Repair, RepairId, UserId};
pub use domain::withdrawal::{LineKey, WithdrawalTask, WithdrawalTaskId, WithdrawalTaskState};
pub use errors::{CommandError, DomainError, StoreError};
pub use flows::{PhaseKind, ReviewAction};
pub use ledger::{merge_materials, MergedMaterialRow, ReplacementSlice, SalvageSlice};
pub use roles::{Actor, RoleTier};
pub use service::{
    AcceptanceInput, CommandOutcome, CommandWarning, InspectionInput, RepairService,
};
pub use store::{
    InMemoryRepairStore, InMemoryWithdrawalQueueStore, RepairStore, WithdrawalQueueStore,
};
pub use withdrawal_engine::{WithdrawalEngineConfig, WithdrawalQueueEngine, WithdrawalQueueError};

// Re-exported so downstream crates share one clock/id stack.
pub use chrono;
pub use uuid;
