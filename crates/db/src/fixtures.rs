//! Demo seed: one repair per lifecycle stage, for local smoke runs and
//! integration tests that want realistic data without replaying every
//! command by hand.

use repairflow_core::domain::committee::{Committee, CommitteeMember};
use repairflow_core::domain::material::{
    CatalogItemId, ReplacementLine, ReplacementSource,
};
use repairflow_core::domain::phase::InspectionFinding;
use repairflow_core::domain::repair::{DepartmentId, DeviceId, RepairId, UserId};
use repairflow_core::errors::{DomainError, StoreError};
use repairflow_core::flows::ReviewAction;
use repairflow_core::roles::{Actor, RoleTier};
use repairflow_core::store::RepairStore;
use repairflow_core::workflow::{
    create_repair, review_request, save_inspection, CreateRepair, InspectionDraft,
};
use thiserror::Error;

use crate::repositories::SqlRepairRepository;
use crate::DbPool;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug)]
pub struct DemoSeed {
    /// Request still waiting for its first approval.
    pub waiting_repair_id: RepairId,
    /// Request completed, inspection filed and pending review.
    pub inspection_pending_repair_id: RepairId,
}

pub async fn seed_demo_repair(pool: &DbPool) -> Result<DemoSeed, SeedError> {
    let repo = SqlRepairRepository::new(pool.clone());
    let creator = UserId("seed-technician".to_string());

    let waiting = create_repair(
        RepairId("seed-repair-waiting".to_string()),
        CreateRepair {
            device_id: DeviceId("seed-device-press".to_string()),
            department_id: DepartmentId("seed-dept-mechanical".to_string()),
            issue: "hydraulic press loses pressure under load".to_string(),
            recommendation: "check main seal".to_string(),
        },
        creator.clone(),
    )?;
    repo.save(&waiting).await?;

    let mut inspecting = create_repair(
        RepairId("seed-repair-inspecting".to_string()),
        CreateRepair {
            device_id: DeviceId("seed-device-lathe".to_string()),
            department_id: DepartmentId("seed-dept-mechanical".to_string()),
            issue: "spindle vibration above tolerance".to_string(),
            recommendation: "inspect bearings".to_string(),
        },
        creator.clone(),
    )?;
    for actor in [
        Actor::new("seed-technician", RoleTier::Technician),
        Actor::new("seed-team-lead", RoleTier::TeamLead),
        Actor::new("seed-director", RoleTier::Director),
    ] {
        review_request(&mut inspecting, &actor, ReviewAction::Approve, None)?;
    }
    save_inspection(
        &mut inspecting,
        &Actor { user_id: creator, tier: RoleTier::Technician },
        InspectionDraft {
            findings: vec![InspectionFinding {
                description: "front spindle bearing worn".to_string(),
                cause: "insufficient lubrication".to_string(),
                solution: "replace bearing pair".to_string(),
                notes: None,
            }],
            committee: Committee::from_members(vec![
                CommitteeMember::new("seed-team-lead", "Head of committee"),
                CommitteeMember::new("seed-technician", "Member"),
            ])?,
            replacements: vec![ReplacementLine {
                source: ReplacementSource::Catalog {
                    catalog_item_id: CatalogItemId("seed-item-bearing".to_string()),
                },
                name: "Spindle bearing".to_string(),
                quantity: 2,
                unit: "pcs".to_string(),
                specification: None,
                code: None,
                notes: None,
            }],
        },
    )?;
    repo.save(&inspecting).await?;

    Ok(DemoSeed {
        waiting_repair_id: waiting.id,
        inspection_pending_repair_id: inspecting.id,
    })
}
