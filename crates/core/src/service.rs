//! Application service over the repair workflow.
//!
//! One command handler per external action. Every mutating command runs
//! under the aggregate lock for its repair id, loads the aggregate,
//! applies the pure workflow, and saves the aggregate as one unit. The
//! stock-withdrawal side effect is enqueued and dispatched only after the
//! triggering transition has been committed; a collaborator failure is
//! reported as a warning, never as a rollback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::collaborators::{Directory, StockWithdrawalClient, WithdrawalOrder};
use crate::domain::committee::{Committee, CommitteeMember};
use crate::domain::material::{ReplacementLine, SalvageLine};
use crate::domain::phase::{AcceptancePhase, InspectionFinding, InspectionPhase, RequestPhase};
use crate::domain::repair::{DepartmentId, DeviceId, Repair, RepairId};
use crate::domain::withdrawal::WithdrawalTask;
use crate::errors::{CommandError, StoreError};
use crate::flows::{PhaseKind, ReviewAction};
use crate::ledger::MergedMaterialRow;
use crate::roles::Actor;
use crate::store::{RepairStore, WithdrawalQueueStore};
use crate::withdrawal_engine::{WithdrawalQueueEngine, WithdrawalQueueError};
use crate::workflow::{self, AcceptanceDraft, CreateRepair, InspectionDraft};

/// Non-fatal observations attached to a successful command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandWarning {
    /// The inventory collaborator could not take a withdrawal yet; the
    /// task stays queued for retry.
    WithdrawalDeferred { catalog_item_id: String, error: String },
    /// The collaborator refused the withdrawal outright; manual follow-up
    /// is needed.
    WithdrawalRefused { catalog_item_id: String, error: String },
}

#[derive(Clone, Debug)]
pub struct CommandOutcome<T> {
    pub value: T,
    pub warnings: Vec<CommandWarning>,
}

/// Inputs for `save_inspection`; committee arrives as raw members and is
/// vetted against the directory before it reaches the aggregate.
pub struct InspectionInput {
    pub findings: Vec<InspectionFinding>,
    pub committee: Vec<CommitteeMember>,
    pub replacements: Vec<ReplacementLine>,
}

pub struct AcceptanceInput {
    pub failure_description: String,
    pub failure_cause: String,
    pub committee: Vec<CommitteeMember>,
    pub recovered: Vec<SalvageLine>,
    pub scrap: Vec<SalvageLine>,
    pub conclusion: String,
    pub other_opinions: Option<String>,
}

/// Per-aggregate mutual exclusion. Commands on the same repair id
/// serialize; commands on different repairs proceed concurrently.
#[derive(Default)]
struct AggregateLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AggregateLocks {
    fn handle(&self, id: &RepairId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(id.0.clone()).or_default().clone()
    }
}

pub struct RepairService {
    repairs: Arc<dyn RepairStore>,
    withdrawals: Arc<dyn WithdrawalQueueStore>,
    directory: Arc<dyn Directory>,
    stock: Arc<dyn StockWithdrawalClient>,
    audit: Arc<dyn AuditSink>,
    queue_engine: WithdrawalQueueEngine,
    locks: AggregateLocks,
    withdrawal_purpose: String,
}

impl RepairService {
    pub fn new(
        repairs: Arc<dyn RepairStore>,
        withdrawals: Arc<dyn WithdrawalQueueStore>,
        directory: Arc<dyn Directory>,
        stock: Arc<dyn StockWithdrawalClient>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            repairs,
            withdrawals,
            directory,
            stock,
            audit,
            queue_engine: WithdrawalQueueEngine::new(),
            locks: AggregateLocks::default(),
            withdrawal_purpose: "repair".to_owned(),
        }
    }

    pub fn with_queue_engine(mut self, engine: WithdrawalQueueEngine) -> Self {
        self.queue_engine = engine;
        self
    }

    pub fn with_withdrawal_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.withdrawal_purpose = purpose.into();
        self
    }

    pub async fn create_repair(
        &self,
        device_id: DeviceId,
        department_id: DepartmentId,
        issue: String,
        recommendation: String,
        actor: &Actor,
    ) -> Result<Repair, CommandError> {
        self.directory
            .resolve_device(&device_id)
            .await
            .map_err(|error| CommandError::validation(error.to_string()))?;
        self.directory
            .resolve_department(&department_id)
            .await
            .map_err(|error| CommandError::validation(error.to_string()))?;

        let repair = workflow::create_repair(
            RepairId(Uuid::new_v4().to_string()),
            CreateRepair { device_id, department_id, issue, recommendation },
            actor.user_id.clone(),
        )?;

        self.save_repair(&repair).await?;
        tracing::info!(
            event_name = "repair.created",
            repair_id = %repair.id.0,
            device_id = %repair.device_id.0,
            actor = %actor.user_id.0,
        );
        self.emit(
            &repair.id,
            "repair.created",
            AuditCategory::Request,
            actor,
            AuditOutcome::Success,
            &[("device_id", repair.device_id.0.clone())],
        );
        Ok(repair)
    }

    pub async fn review_request(
        &self,
        repair_id: &RepairId,
        actor: &Actor,
        action: ReviewAction,
        reason: Option<String>,
    ) -> Result<RequestPhase, CommandError> {
        let lock = self.locks.handle(repair_id);
        let _guard = lock.lock().await;

        let mut repair = self.load(repair_id).await?;
        let outcome = match workflow::review_request(&mut repair, actor, action, reason) {
            Ok(outcome) => outcome,
            Err(error) => {
                self.emit_rejected(repair_id, "request.review", AuditCategory::Request, actor, &error);
                return Err(error.into());
            }
        };
        self.save_repair(&repair).await?;

        self.emit(
            repair_id,
            "request.review_applied",
            AuditCategory::Request,
            actor,
            AuditOutcome::Success,
            &[
                ("from", outcome.from.as_str().to_owned()),
                ("to", outcome.to.as_str().to_owned()),
                ("action", outcome.action.as_str().to_owned()),
            ],
        );
        Ok(repair.request)
    }

    pub async fn resubmit_request(
        &self,
        repair_id: &RepairId,
        actor: &Actor,
        issue: String,
        recommendation: String,
    ) -> Result<RequestPhase, CommandError> {
        let lock = self.locks.handle(repair_id);
        let _guard = lock.lock().await;

        let mut repair = self.load(repair_id).await?;
        workflow::resubmit_request(&mut repair, actor, issue, recommendation)?;
        self.save_repair(&repair).await?;

        self.emit(
            repair_id,
            "request.resubmitted",
            AuditCategory::Request,
            actor,
            AuditOutcome::Success,
            &[],
        );
        Ok(repair.request)
    }

    pub async fn save_inspection(
        &self,
        repair_id: &RepairId,
        actor: &Actor,
        input: InspectionInput,
    ) -> Result<InspectionPhase, CommandError> {
        let committee = self.vet_committee(input.committee).await?;

        let lock = self.locks.handle(repair_id);
        let _guard = lock.lock().await;

        let mut repair = self.load(repair_id).await?;
        workflow::save_inspection(
            &mut repair,
            actor,
            InspectionDraft {
                findings: input.findings,
                committee,
                replacements: input.replacements,
            },
        )?;
        self.save_repair(&repair).await?;

        self.emit(
            repair_id,
            "inspection.saved",
            AuditCategory::Inspection,
            actor,
            AuditOutcome::Success,
            &[],
        );
        repair
            .inspection
            .ok_or_else(|| CommandError::state("inspection record missing after save"))
    }

    pub async fn review_inspection(
        &self,
        repair_id: &RepairId,
        actor: &Actor,
        action: ReviewAction,
        reason: Option<String>,
    ) -> Result<CommandOutcome<InspectionPhase>, CommandError> {
        let lock = self.locks.handle(repair_id);
        let _guard = lock.lock().await;

        let mut repair = self.load(repair_id).await?;
        let (outcome, forwardable) =
            match workflow::review_inspection(&mut repair, actor, action, reason) {
                Ok(result) => result,
                Err(error) => {
                    self.emit_rejected(
                        repair_id,
                        "inspection.review",
                        AuditCategory::Inspection,
                        actor,
                        &error,
                    );
                    return Err(error.into());
                }
            };

        // The transition commits before any collaborator is contacted.
        self.save_repair(&repair).await?;
        self.emit(
            repair_id,
            "inspection.review_applied",
            AuditCategory::Inspection,
            actor,
            AuditOutcome::Success,
            &[
                ("from", outcome.from.encode("inspection")),
                ("to", outcome.to.encode("inspection")),
                ("action", outcome.action.as_str().to_owned()),
            ],
        );

        let warnings = self.forward_lines(repair_id, &forwardable, actor).await?;
        let phase = repair
            .inspection
            .ok_or_else(|| CommandError::state("inspection record missing after review"))?;
        Ok(CommandOutcome { value: phase, warnings })
    }

    pub async fn save_acceptance(
        &self,
        repair_id: &RepairId,
        actor: &Actor,
        input: AcceptanceInput,
    ) -> Result<AcceptancePhase, CommandError> {
        let committee = self.vet_committee(input.committee).await?;

        let lock = self.locks.handle(repair_id);
        let _guard = lock.lock().await;

        let mut repair = self.load(repair_id).await?;
        workflow::save_acceptance(
            &mut repair,
            actor,
            AcceptanceDraft {
                failure_description: input.failure_description,
                failure_cause: input.failure_cause,
                committee,
                recovered: input.recovered,
                scrap: input.scrap,
                conclusion: input.conclusion,
                other_opinions: input.other_opinions,
            },
        )?;
        self.save_repair(&repair).await?;

        self.emit(
            repair_id,
            "acceptance.saved",
            AuditCategory::Acceptance,
            actor,
            AuditOutcome::Success,
            &[],
        );
        repair
            .acceptance
            .ok_or_else(|| CommandError::state("acceptance record missing after save"))
    }

    pub async fn review_acceptance(
        &self,
        repair_id: &RepairId,
        actor: &Actor,
        action: ReviewAction,
        reason: Option<String>,
    ) -> Result<AcceptancePhase, CommandError> {
        let lock = self.locks.handle(repair_id);
        let _guard = lock.lock().await;

        let mut repair = self.load(repair_id).await?;
        let outcome = match workflow::review_acceptance(&mut repair, actor, action, reason) {
            Ok(outcome) => outcome,
            Err(error) => {
                self.emit_rejected(
                    repair_id,
                    "acceptance.review",
                    AuditCategory::Acceptance,
                    actor,
                    &error,
                );
                return Err(error.into());
            }
        };
        self.save_repair(&repair).await?;

        self.emit(
            repair_id,
            "acceptance.review_applied",
            AuditCategory::Acceptance,
            actor,
            AuditOutcome::Success,
            &[
                ("from", outcome.from.encode("acceptance")),
                ("to", outcome.to.encode("acceptance")),
                ("action", outcome.action.as_str().to_owned()),
            ],
        );
        repair
            .acceptance
            .ok_or_else(|| CommandError::state("acceptance record missing after review"))
    }

    pub async fn cancel_repair(
        &self,
        repair_id: &RepairId,
        actor: &Actor,
    ) -> Result<Repair, CommandError> {
        let lock = self.locks.handle(repair_id);
        let _guard = lock.lock().await;

        let mut repair = self.load(repair_id).await?;
        workflow::cancel_repair(&mut repair, actor)?;
        self.save_repair(&repair).await?;

        tracing::info!(event_name = "repair.canceled", repair_id = %repair_id.0, actor = %actor.user_id.0);
        self.emit(
            repair_id,
            "repair.canceled",
            AuditCategory::System,
            actor,
            AuditOutcome::Success,
            &[],
        );
        Ok(repair)
    }

    /// Display read: last committed state, no aggregate lock.
    pub async fn merged_materials(
        &self,
        repair_id: &RepairId,
    ) -> Result<Vec<MergedMaterialRow>, CommandError> {
        let repair = self.load(repair_id).await?;
        Ok(workflow::merged_materials(&repair))
    }

    pub async fn get_repair(&self, repair_id: &RepairId) -> Result<Repair, CommandError> {
        self.load(repair_id).await
    }

    /// Re-dispatch every withdrawal task of this repair still owed to the
    /// inventory system. Recovery path for deferred withdrawals; safe to
    /// call repeatedly.
    pub async fn retry_pending_withdrawals(
        &self,
        repair_id: &RepairId,
    ) -> Result<CommandOutcome<Vec<WithdrawalTask>>, CommandError> {
        let tasks = self.withdrawals.list_for_repair(repair_id).await?;
        let mut warnings = Vec::new();
        let mut results = Vec::new();

        for task in tasks {
            if !task.state.needs_dispatch() {
                results.push(task);
                continue;
            }
            let (task, warning) = self.dispatch(task).await?;
            if let Some(warning) = warning {
                warnings.push(warning);
            }
            results.push(task);
        }

        Ok(CommandOutcome { value: results, warnings })
    }

    /// Queue tasks for approved catalog lines (idempotent per line key)
    /// and try one dispatch each.
    async fn forward_lines(
        &self,
        repair_id: &RepairId,
        lines: &[ReplacementLine],
        actor: &Actor,
    ) -> Result<Vec<CommandWarning>, CommandError> {
        let mut warnings = Vec::new();

        for line in lines {
            let Some(catalog_item_id) = line.catalog_item_id() else {
                continue;
            };
            let line_key = WithdrawalQueueEngine::line_key(
                repair_id,
                PhaseKind::Inspection,
                catalog_item_id,
            );
            if self.withdrawals.find_by_line_key(&line_key).await?.is_some() {
                // Already forwarded by an earlier approval round.
                continue;
            }

            let task = self.queue_engine.create_task(
                repair_id.clone(),
                PhaseKind::Inspection,
                catalog_item_id.clone(),
                line.quantity,
                self.withdrawal_purpose.clone(),
                line.notes.clone(),
            );
            self.withdrawals.save(&task).await?;
            self.emit(
                repair_id,
                "withdrawal.enqueued",
                AuditCategory::Withdrawal,
                actor,
                AuditOutcome::Success,
                &[
                    ("catalog_item_id", catalog_item_id.0.clone()),
                    ("quantity", task.quantity.to_string()),
                ],
            );

            let (_, warning) = self.dispatch(task).await?;
            if let Some(warning) = warning {
                warnings.push(warning);
            }
        }

        Ok(warnings)
    }

    /// One best-effort dispatch attempt. The task state is persisted at
    /// every step so a crash never loses track of an owed withdrawal.
    async fn dispatch(
        &self,
        task: WithdrawalTask,
    ) -> Result<(WithdrawalTask, Option<CommandWarning>), CommandError> {
        let running = match self.queue_engine.begin_dispatch(task.clone()) {
            Ok(running) => running,
            Err(WithdrawalQueueError::NotYetAvailable(_)) => return Ok((task, None)),
            Err(error) => {
                return Ok((
                    task.clone(),
                    Some(CommandWarning::WithdrawalDeferred {
                        catalog_item_id: task.catalog_item_id.0.clone(),
                        error: error.to_string(),
                    }),
                ));
            }
        };
        self.withdrawals.save(&running).await?;

        let order = WithdrawalOrder {
            catalog_item_id: running.catalog_item_id.clone(),
            quantity: running.quantity,
            purpose: running.purpose.clone(),
            note: running.note.clone(),
        };

        match self.stock.request_withdrawal(order).await {
            Ok(receipt) => {
                let done = self
                    .queue_engine
                    .complete(running, receipt.request_id)
                    .map_err(|error| StoreError::Backend(error.to_string()))?;
                self.withdrawals.save(&done).await?;
                tracing::info!(
                    event_name = "withdrawal.dispatched",
                    repair_id = %done.repair_id.0,
                    catalog_item_id = %done.catalog_item_id.0,
                    withdrawal_request_id = done.withdrawal_request_id.as_deref().unwrap_or(""),
                );
                Ok((done, None))
            }
            Err(error) => {
                let retryable = error.is_retryable();
                let failed = self
                    .queue_engine
                    .fail(running, error.to_string(), retryable)
                    .map_err(|engine_error| StoreError::Backend(engine_error.to_string()))?;
                self.withdrawals.save(&failed).await?;
                tracing::warn!(
                    event_name = "withdrawal.dispatch_failed",
                    repair_id = %failed.repair_id.0,
                    catalog_item_id = %failed.catalog_item_id.0,
                    state = failed.state.as_str(),
                    error = %error,
                );
                let catalog_item_id = failed.catalog_item_id.0.clone();
                let warning = if retryable {
                    CommandWarning::WithdrawalDeferred { catalog_item_id, error: error.to_string() }
                } else {
                    CommandWarning::WithdrawalRefused { catalog_item_id, error: error.to_string() }
                };
                Ok((failed, Some(warning)))
            }
        }
    }

    /// Committee members must resolve in the directory and hold a
    /// reviewer-eligible tier.
    async fn vet_committee(
        &self,
        members: Vec<CommitteeMember>,
    ) -> Result<Committee, CommandError> {
        let committee = Committee::from_members(members)?;
        for member in committee.members() {
            let user = self
                .directory
                .resolve_user(&member.user_id)
                .await
                .map_err(|error| CommandError::validation(error.to_string()))?;
            if !user.tier.may_review() {
                return Err(CommandError::validation(format!(
                    "user `{}` holds tier `{}` and cannot sit on a review committee",
                    member.user_id.0,
                    user.tier.as_str()
                )));
            }
        }
        Ok(committee)
    }

    async fn load(&self, repair_id: &RepairId) -> Result<Repair, CommandError> {
        self.repairs
            .load(repair_id)
            .await?
            .ok_or_else(|| CommandError::NotFound { repair_id: repair_id.0.clone() })
    }

    async fn save_repair(&self, repair: &Repair) -> Result<(), CommandError> {
        match self.repairs.save(repair).await {
            Ok(_) => Ok(()),
            Err(StoreError::RevisionMismatch { repair_id, expected, found }) => {
                Err(CommandError::Conflict { repair_id, expected, found })
            }
            Err(error) => Err(error.into()),
        }
    }

    fn emit(
        &self,
        repair_id: &RepairId,
        event_type: &str,
        category: AuditCategory,
        actor: &Actor,
        outcome: AuditOutcome,
        metadata: &[(&str, String)],
    ) {
        let mut event = AuditEvent::new(
            Some(repair_id.clone()),
            Uuid::new_v4().to_string(),
            event_type,
            category,
            actor.user_id.0.clone(),
            outcome,
        );
        for (key, value) in metadata {
            event = event.with_metadata(*key, value.clone());
        }
        self.audit.emit(event);
    }

    fn emit_rejected(
        &self,
        repair_id: &RepairId,
        event_type: &str,
        category: AuditCategory,
        actor: &Actor,
        error: &crate::errors::DomainError,
    ) {
        self.emit(
            repair_id,
            event_type,
            category,
            actor,
            AuditOutcome::Rejected,
            &[("error", error.to_string())],
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::audit::InMemoryAuditSink;
    use crate::collaborators::{InMemoryDirectory, InMemoryStockWithdrawalClient};
    use crate::domain::committee::CommitteeMember;
    use crate::domain::material::{CatalogItemId, ReplacementLine, ReplacementSource, SalvageLine};
    use crate::domain::phase::{InspectionFinding, RequestStatus, ReviewStatus};
    use crate::domain::repair::{DepartmentId, DeviceId, RepairId};
    use crate::domain::withdrawal::WithdrawalTaskState;
    use crate::flows::ReviewAction;
    use crate::roles::{Actor, RoleTier};
    use crate::store::{InMemoryRepairStore, InMemoryWithdrawalQueueStore};
    use crate::withdrawal_engine::{WithdrawalEngineConfig, WithdrawalQueueEngine};

    use super::{AcceptanceInput, CommandWarning, InspectionInput, RepairService};

    struct Harness {
        service: RepairService,
        stock: Arc<InMemoryStockWithdrawalClient>,
        audit: InMemoryAuditSink,
    }

    fn harness_with_stock(stock: InMemoryStockWithdrawalClient) -> Harness {
        let directory = InMemoryDirectory::default()
            .with_device("DEV-1", "Air compressor")
            .with_department("DEP-1", "Mechanical maintenance")
            .with_user("u-creator", "Creator", RoleTier::Technician)
            .with_user("u-tech", "Technician", RoleTier::Technician)
            .with_user("u-lead", "Team lead", RoleTier::TeamLead)
            .with_user("u-director", "Director", RoleTier::Director)
            .with_user("u-operator", "Operator", RoleTier::Operator);
        let stock = Arc::new(stock);
        let audit = InMemoryAuditSink::default();
        let engine = WithdrawalQueueEngine::with_config(WithdrawalEngineConfig {
            retry_base_delay_seconds: 0,
            ..Default::default()
        });
        let service = RepairService::new(
            Arc::new(InMemoryRepairStore::default()),
            Arc::new(InMemoryWithdrawalQueueStore::default()),
            Arc::new(directory),
            stock.clone(),
            Arc::new(audit.clone()),
        )
        .with_queue_engine(engine);
        Harness { service, stock, audit }
    }

    fn harness() -> Harness {
        harness_with_stock(InMemoryStockWithdrawalClient::default())
    }

    fn creator() -> Actor {
        Actor::new("u-creator", RoleTier::Technician)
    }

    fn technician() -> Actor {
        Actor::new("u-tech", RoleTier::Technician)
    }

    fn team_lead() -> Actor {
        Actor::new("u-lead", RoleTier::TeamLead)
    }

    fn director() -> Actor {
        Actor::new("u-director", RoleTier::Director)
    }

    fn inspection_input() -> InspectionInput {
        InspectionInput {
            findings: vec![InspectionFinding {
                description: "bearing seized".to_string(),
                cause: "lubrication failure".to_string(),
                solution: "replace bearing".to_string(),
                notes: None,
            }],
            committee: vec![
                CommitteeMember::new("u-lead", "Head of committee"),
                CommitteeMember::new("u-tech", "Member"),
            ],
            replacements: vec![ReplacementLine {
                source: ReplacementSource::Catalog {
                    catalog_item_id: CatalogItemId("42".to_string()),
                },
                name: "Bearing 6204".to_string(),
                quantity: 3,
                unit: "pcs".to_string(),
                specification: None,
                code: None,
                notes: None,
            }],
        }
    }

    fn acceptance_input() -> AcceptanceInput {
        AcceptanceInput {
            failure_description: "worn bearing".to_string(),
            failure_cause: "age".to_string(),
            committee: vec![CommitteeMember::new("u-lead", "Head of committee")],
            recovered: vec![SalvageLine {
                name: "Bearing 6204".to_string(),
                quantity: 2,
                unit: "pcs".to_string(),
                damage_pct: 40,
            }],
            scrap: vec![SalvageLine {
                name: "Bearing 6204".to_string(),
                quantity: 1,
                unit: "pcs".to_string(),
                damage_pct: 95,
            }],
            conclusion: "restored".to_string(),
            other_opinions: None,
        }
    }

    async fn create_and_complete_request(harness: &Harness) -> RepairId {
        let repair = harness
            .service
            .create_repair(
                DeviceId("DEV-1".to_string()),
                DepartmentId("DEP-1".to_string()),
                "compressor will not start".to_string(),
                "check windings".to_string(),
                &creator(),
            )
            .await
            .expect("create");
        let id = repair.id.clone();

        for actor in [technician(), team_lead(), director()] {
            harness
                .service
                .review_request(&id, &actor, ReviewAction::Approve, None)
                .await
                .expect("approve");
        }
        id
    }

    #[tokio::test]
    async fn create_rejects_unknown_device() {
        let harness = harness();
        let error = harness
            .service
            .create_repair(
                DeviceId("DEV-404".to_string()),
                DepartmentId("DEP-1".to_string()),
                "broken".to_string(),
                String::new(),
                &creator(),
            )
            .await
            .expect_err("unknown device");
        assert!(error.is_validation());
    }

    #[tokio::test]
    async fn request_review_by_wrong_tier_is_an_authorization_error() {
        let harness = harness();
        let repair = harness
            .service
            .create_repair(
                DeviceId("DEV-1".to_string()),
                DepartmentId("DEP-1".to_string()),
                "broken".to_string(),
                String::new(),
                &creator(),
            )
            .await
            .expect("create");

        harness
            .service
            .review_request(&repair.id, &technician(), ReviewAction::Approve, None)
            .await
            .expect("tech approves");

        let error = harness
            .service
            .review_request(&repair.id, &technician(), ReviewAction::Approve, None)
            .await
            .expect_err("technician at team lead gate");
        assert!(error.is_authorization());

        let current = harness.service.get_repair(&repair.id).await.expect("load");
        assert_eq!(current.request.status, RequestStatus::WaitingTeamLead);
    }

    #[tokio::test]
    async fn operator_cannot_sit_on_a_committee() {
        let harness = harness();
        let id = create_and_complete_request(&harness).await;

        let mut input = inspection_input();
        input.committee.push(CommitteeMember::new("u-operator", "Member"));
        let error = harness
            .service
            .save_inspection(&id, &creator(), input)
            .await
            .expect_err("operator is not reviewer-eligible");
        assert!(error.is_validation());
    }

    #[tokio::test]
    async fn catalog_line_is_forwarded_exactly_once() {
        let harness = harness();
        let id = create_and_complete_request(&harness).await;

        harness
            .service
            .save_inspection(&id, &creator(), inspection_input())
            .await
            .expect("save");
        harness
            .service
            .review_inspection(&id, &team_lead(), ReviewAction::Approve, None)
            .await
            .expect("manager approval");

        // Nothing is forwarded below the terminal approval.
        assert!(harness.stock.orders().is_empty());

        let outcome = harness
            .service
            .review_inspection(&id, &director(), ReviewAction::Approve, None)
            .await
            .expect("admin approval");
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.value.status, ReviewStatus::AdminApproved);
        assert!(outcome.value.duration_minutes.is_some());

        let orders = harness.stock.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].catalog_item_id.0, "42");
        assert_eq!(orders[0].quantity, 3);
        assert_eq!(orders[0].purpose, "repair");

        // A later retry sweep finds nothing left to dispatch.
        let retry = harness.service.retry_pending_withdrawals(&id).await.expect("sweep");
        assert!(retry.warnings.is_empty());
        assert_eq!(harness.stock.orders().len(), 1);
        assert!(retry
            .value
            .iter()
            .all(|task| task.state == WithdrawalTaskState::Completed));
    }

    #[tokio::test]
    async fn repeated_saves_do_not_duplicate_withdrawals() {
        let harness = harness();
        let id = create_and_complete_request(&harness).await;

        harness
            .service
            .save_inspection(&id, &creator(), inspection_input())
            .await
            .expect("first save");
        harness
            .service
            .save_inspection(&id, &creator(), inspection_input())
            .await
            .expect("second save before review");
        harness
            .service
            .review_inspection(&id, &team_lead(), ReviewAction::Approve, None)
            .await
            .expect("manager");
        harness
            .service
            .review_inspection(&id, &director(), ReviewAction::Approve, None)
            .await
            .expect("admin");

        assert_eq!(harness.stock.orders().len(), 1);
    }

    #[tokio::test]
    async fn collaborator_outage_defers_withdrawal_without_rolling_back_approval() {
        let harness =
            harness_with_stock(InMemoryStockWithdrawalClient::default().with_failures(1));
        let id = create_and_complete_request(&harness).await;

        harness
            .service
            .save_inspection(&id, &creator(), inspection_input())
            .await
            .expect("save");
        harness
            .service
            .review_inspection(&id, &team_lead(), ReviewAction::Approve, None)
            .await
            .expect("manager");

        let outcome = harness
            .service
            .review_inspection(&id, &director(), ReviewAction::Approve, None)
            .await
            .expect("approval succeeds despite outage");

        // The approval stands; the withdrawal is deferred, not lost.
        assert_eq!(outcome.value.status, ReviewStatus::AdminApproved);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(matches!(outcome.warnings[0], CommandWarning::WithdrawalDeferred { .. }));
        assert!(harness.stock.orders().is_empty());

        let retry = harness.service.retry_pending_withdrawals(&id).await.expect("sweep");
        assert!(retry.warnings.is_empty());
        assert_eq!(harness.stock.orders().len(), 1);
    }

    #[tokio::test]
    async fn insufficient_stock_surfaces_as_refusal_warning() {
        let harness = harness_with_stock(
            InMemoryStockWithdrawalClient::default().rejecting("insufficient stock"),
        );
        let id = create_and_complete_request(&harness).await;

        harness
            .service
            .save_inspection(&id, &creator(), inspection_input())
            .await
            .expect("save");
        harness
            .service
            .review_inspection(&id, &team_lead(), ReviewAction::Approve, None)
            .await
            .expect("manager");
        let outcome = harness
            .service
            .review_inspection(&id, &director(), ReviewAction::Approve, None)
            .await
            .expect("approval still succeeds");

        assert_eq!(outcome.warnings.len(), 1);
        assert!(matches!(outcome.warnings[0], CommandWarning::WithdrawalRefused { .. }));
    }

    #[tokio::test]
    async fn full_lifecycle_reaches_process_complete_with_merged_ledger() {
        let harness = harness();
        let id = create_and_complete_request(&harness).await;

        harness
            .service
            .save_inspection(&id, &creator(), inspection_input())
            .await
            .expect("save inspection");
        harness
            .service
            .review_inspection(&id, &team_lead(), ReviewAction::Approve, None)
            .await
            .expect("manager");
        harness
            .service
            .review_inspection(&id, &director(), ReviewAction::Approve, None)
            .await
            .expect("admin");

        harness
            .service
            .save_acceptance(&id, &creator(), acceptance_input())
            .await
            .expect("save acceptance");
        harness
            .service
            .review_acceptance(&id, &team_lead(), ReviewAction::Approve, None)
            .await
            .expect("manager");
        let phase = harness
            .service
            .review_acceptance(&id, &director(), ReviewAction::Approve, None)
            .await
            .expect("admin");
        assert_eq!(phase.status, ReviewStatus::AdminApproved);

        let repair = harness.service.get_repair(&id).await.expect("load");
        assert!(repair.process_completed_at.is_some());

        let rows = harness.service.merged_materials(&id).await.expect("ledger");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].replacement.as_ref().map(|slice| slice.quantity), Some(3));
        assert_eq!(rows[0].recovered.as_ref().map(|slice| slice.quantity), Some(2));
        assert_eq!(rows[0].scrap.as_ref().map(|slice| slice.quantity), Some(1));
    }

    #[tokio::test]
    async fn commands_emit_audit_events() {
        let harness = harness();
        let id = create_and_complete_request(&harness).await;

        let events = harness.audit.events();
        assert!(events.iter().any(|event| event.event_type == "repair.created"));
        assert_eq!(
            events.iter().filter(|event| event.event_type == "request.review_applied").count(),
            3
        );
        assert!(events
            .iter()
            .all(|event| event.repair_id.as_ref().map(|r| r.0.as_str()) == Some(id.0.as_str())));
    }

    #[tokio::test]
    async fn unknown_repair_id_is_not_found() {
        let harness = harness();
        let error = harness
            .service
            .review_request(
                &RepairId("missing".to_string()),
                &technician(),
                ReviewAction::Approve,
                None,
            )
            .await
            .expect_err("missing repair");
        assert!(matches!(error, crate::errors::CommandError::NotFound { .. }));
    }
}
