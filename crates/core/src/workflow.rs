//! Command application against one repair aggregate.
//!
//! Pure, synchronous layer: every function validates the command against
//! the aggregate's current state, runs the relevant transition table, and
//! applies the resulting effects in place. Persistence, locking, audit and
//! collaborator side effects live in `service`; the stock withdrawal owed
//! externally is returned as data, never executed here.

use chrono::Utc;

use crate::domain::committee::Committee;
use crate::domain::material::{ReplacementLine, SalvageLine};
use crate::domain::phase::{
    elapsed_minutes, AcceptancePhase, InspectionFinding, InspectionPhase, Rejection,
    RequestStatus, ReviewStatus, Signoff,
};
use crate::domain::repair::{DepartmentId, DeviceId, Repair, RepairId, UserId};
use crate::errors::DomainError;
use crate::flows::{
    review_phase, review_request as request_transition, PhaseKind, RequestEffect, RequestOutcome,
    RequestStep, ReviewAction, ReviewEffect, ReviewOutcome,
};
use crate::ledger::{merge_materials, MergedMaterialRow};
use crate::roles::{Actor, RoleTier};

pub struct CreateRepair {
    pub device_id: DeviceId,
    pub department_id: DepartmentId,
    pub issue: String,
    pub recommendation: String,
}

/// Content of one inspection save. Replaces the phase's editable content
/// wholesale; repairs are edited as a form, not patched field by field.
pub struct InspectionDraft {
    pub findings: Vec<InspectionFinding>,
    pub committee: Committee,
    pub replacements: Vec<ReplacementLine>,
}

pub struct AcceptanceDraft {
    pub failure_description: String,
    pub failure_cause: String,
    pub committee: Committee,
    pub recovered: Vec<SalvageLine>,
    pub scrap: Vec<SalvageLine>,
    pub conclusion: String,
    pub other_opinions: Option<String>,
}

pub fn create_repair(
    id: RepairId,
    params: CreateRepair,
    created_by: UserId,
) -> Result<Repair, DomainError> {
    if params.issue.trim().is_empty() {
        return Err(DomainError::Validation("issue description is required".to_owned()));
    }

    Ok(Repair::open(
        id,
        params.device_id,
        params.department_id,
        params.issue,
        params.recommendation,
        created_by,
        Utc::now(),
    ))
}

pub fn review_request(
    repair: &mut Repair,
    actor: &Actor,
    action: ReviewAction,
    reason: Option<String>,
) -> Result<RequestOutcome, DomainError> {
    repair.ensure_active()?;
    let reason = require_reason_on_reject(action, reason)?;

    let outcome = request_transition(repair.request.status, action, actor.tier)?;

    let now = Utc::now();
    repair.request.status = outcome.to;
    for effect in &outcome.effects {
        match effect {
            RequestEffect::RecordSignoff(step) => {
                let signoff = Signoff { user_id: actor.user_id.clone(), at: now };
                match step {
                    RequestStep::Technician => repair.request.tech_signoff = Some(signoff),
                    RequestStep::TeamLead => repair.request.team_lead_signoff = Some(signoff),
                    RequestStep::Director => repair.request.director_signoff = Some(signoff),
                }
            }
            RequestEffect::RecordRejection => {
                repair.request.rejection = Some(Rejection {
                    reason: reason.clone().unwrap_or_default(),
                    rejected_by: actor.user_id.clone(),
                    rejected_at_tier: actor.tier,
                    rejected_at: now,
                });
            }
            RequestEffect::MarkCompleted => {
                repair.request.completed_at = Some(now);
            }
        }
    }

    Ok(outcome)
}

/// Re-open a rejected request. Creator-only; the issue text is replaced
/// and all three gates approve again from the start.
pub fn resubmit_request(
    repair: &mut Repair,
    actor: &Actor,
    issue: String,
    recommendation: String,
) -> Result<(), DomainError> {
    repair.ensure_active()?;
    if repair.request.status != RequestStatus::Rejected {
        return Err(DomainError::State(format!(
            "request is `{}`, only a rejected request can be resubmitted",
            repair.request.status.as_str()
        )));
    }
    ensure_creator(&repair.created_by, actor)?;
    if issue.trim().is_empty() {
        return Err(DomainError::Validation("issue description is required".to_owned()));
    }

    repair.issue = issue;
    repair.recommendation = recommendation;
    repair.request.status = RequestStatus::WaitingTech;
    repair.request.rejection = None;
    repair.request.tech_signoff = None;
    repair.request.team_lead_signoff = None;
    repair.request.director_signoff = None;
    Ok(())
}

/// Create or update the inspection record. While the phase is pending the
/// creator keeps editing through this same command; calling it on a
/// rejected phase is the resubmission path.
pub fn save_inspection(
    repair: &mut Repair,
    actor: &Actor,
    draft: InspectionDraft,
) -> Result<(), DomainError> {
    repair.ensure_active()?;
    if !repair.inspection_unlocked() {
        return Err(DomainError::State(format!(
            "inspection opens once the request completes; request is `{}`",
            repair.request.status.as_str()
        )));
    }
    for line in &draft.replacements {
        line.validate()?;
    }

    let now = Utc::now();
    let Some(phase) = repair.inspection.as_mut() else {
        if !actor.tier.holds_gate(RoleTier::Technician) {
            return Err(DomainError::Authorization {
                required: RoleTier::Technician,
                actor: actor.tier,
                status: "inspection_missing".to_owned(),
            });
        }
        let mut phase = InspectionPhase::open(actor.user_id.clone(), now);
        phase.findings = draft.findings;
        phase.committee = draft.committee;
        phase.replacements = draft.replacements;
        repair.inspection = Some(phase);
        return Ok(());
    };

    match phase.status {
        ReviewStatus::Pending => {
            ensure_creator(&phase.created_by, actor)?;
        }
        ReviewStatus::Rejected => {
            ensure_creator(&phase.created_by, actor)?;
            phase.status = ReviewStatus::Pending;
            phase.rejection = None;
            phase.manager_signoff = None;
        }
        ReviewStatus::ManagerApproved | ReviewStatus::AdminApproved => {
            return Err(DomainError::State(format!(
                "inspection is `{}` and no longer editable",
                phase.status.encode("inspection")
            )));
        }
    }
    phase.findings = draft.findings;
    phase.committee = draft.committee;
    phase.replacements = draft.replacements;
    Ok(())
}

/// Replacement lines owed to the inventory system after a terminal
/// inspection approval. Empty for every other outcome.
pub fn review_inspection(
    repair: &mut Repair,
    actor: &Actor,
    action: ReviewAction,
    reason: Option<String>,
) -> Result<(ReviewOutcome, Vec<ReplacementLine>), DomainError> {
    repair.ensure_active()?;
    let reason = require_reason_on_reject(action, reason)?;

    let Some(phase) = repair.inspection.as_mut() else {
        return Err(DomainError::State("no inspection has been filed yet".to_owned()));
    };

    let outcome = review_phase(PhaseKind::Inspection, phase.status, action, actor.tier)?;

    let now = Utc::now();
    phase.status = outcome.to;
    let mut forwardable = Vec::new();
    for effect in &outcome.effects {
        match effect {
            ReviewEffect::RecordManagerSignoff => {
                phase.manager_signoff = Some(Signoff { user_id: actor.user_id.clone(), at: now });
            }
            ReviewEffect::RecordAdminSignoff => {
                phase.admin_signoff = Some(Signoff { user_id: actor.user_id.clone(), at: now });
            }
            ReviewEffect::RecordRejection => {
                phase.rejection = Some(Rejection {
                    reason: reason.clone().unwrap_or_default(),
                    rejected_by: actor.user_id.clone(),
                    rejected_at_tier: actor.tier,
                    rejected_at: now,
                });
            }
            ReviewEffect::FinalizeApproval => {
                phase.approved_at = Some(now);
                phase.duration_minutes = Some(elapsed_minutes(phase.created_at, now));
                forwardable = phase
                    .replacements
                    .iter()
                    .filter(|line| line.catalog_item_id().is_some())
                    .cloned()
                    .collect();
            }
        }
    }

    Ok((outcome, forwardable))
}

pub fn save_acceptance(
    repair: &mut Repair,
    actor: &Actor,
    draft: AcceptanceDraft,
) -> Result<(), DomainError> {
    repair.ensure_active()?;
    if !repair.acceptance_unlocked() {
        return Err(DomainError::State(
            "acceptance opens once the inspection is fully approved".to_owned(),
        ));
    }
    if draft.failure_description.trim().is_empty() {
        return Err(DomainError::Validation("failure description is required".to_owned()));
    }
    for line in draft.recovered.iter().chain(draft.scrap.iter()) {
        line.validate()?;
    }

    let now = Utc::now();
    let Some(phase) = repair.acceptance.as_mut() else {
        if !actor.tier.holds_gate(RoleTier::Technician) {
            return Err(DomainError::Authorization {
                required: RoleTier::Technician,
                actor: actor.tier,
                status: "acceptance_missing".to_owned(),
            });
        }
        let mut phase = AcceptancePhase::open(actor.user_id.clone(), now);
        apply_acceptance_draft(&mut phase, draft);
        repair.acceptance = Some(phase);
        return Ok(());
    };

    match phase.status {
        ReviewStatus::Pending => {
            ensure_creator(&phase.created_by, actor)?;
        }
        ReviewStatus::Rejected => {
            ensure_creator(&phase.created_by, actor)?;
            phase.status = ReviewStatus::Pending;
            phase.rejection = None;
            phase.manager_signoff = None;
        }
        ReviewStatus::ManagerApproved | ReviewStatus::AdminApproved => {
            return Err(DomainError::State(format!(
                "acceptance is `{}` and no longer editable",
                phase.status.encode("acceptance")
            )));
        }
    }
    apply_acceptance_draft(phase, draft);
    Ok(())
}

pub fn review_acceptance(
    repair: &mut Repair,
    actor: &Actor,
    action: ReviewAction,
    reason: Option<String>,
) -> Result<ReviewOutcome, DomainError> {
    repair.ensure_active()?;
    let reason = require_reason_on_reject(action, reason)?;

    let Some(phase) = repair.acceptance.as_mut() else {
        return Err(DomainError::State("no acceptance has been filed yet".to_owned()));
    };

    let outcome = review_phase(PhaseKind::Acceptance, phase.status, action, actor.tier)?;

    let now = Utc::now();
    phase.status = outcome.to;
    let mut process_complete = false;
    for effect in &outcome.effects {
        match effect {
            ReviewEffect::RecordManagerSignoff => {
                phase.manager_signoff = Some(Signoff { user_id: actor.user_id.clone(), at: now });
            }
            ReviewEffect::RecordAdminSignoff => {
                phase.admin_signoff = Some(Signoff { user_id: actor.user_id.clone(), at: now });
            }
            ReviewEffect::RecordRejection => {
                phase.rejection = Some(Rejection {
                    reason: reason.clone().unwrap_or_default(),
                    rejected_by: actor.user_id.clone(),
                    rejected_at_tier: actor.tier,
                    rejected_at: now,
                });
            }
            ReviewEffect::FinalizeApproval => {
                phase.approved_at = Some(now);
                phase.duration_minutes = Some(elapsed_minutes(phase.created_at, now));
                process_complete = true;
            }
        }
    }
    if process_complete {
        repair.mark_process_complete(now);
    }

    Ok(outcome)
}

/// Cancel the whole repair. Creator or admin, and only while no phase has
/// reached a terminal approved status.
pub fn cancel_repair(repair: &mut Repair, actor: &Actor) -> Result<(), DomainError> {
    if actor.tier != RoleTier::Admin {
        ensure_creator(&repair.created_by, actor)?;
    }
    repair.cancel(Utc::now())
}

/// Merged ledger view across inspection and acceptance. Read-only.
pub fn merged_materials(repair: &Repair) -> Vec<MergedMaterialRow> {
    let replacements =
        repair.inspection.as_ref().map(|phase| phase.replacements.as_slice()).unwrap_or(&[]);
    let (recovered, scrap) = repair
        .acceptance
        .as_ref()
        .map(|phase| (phase.recovered.as_slice(), phase.scrap.as_slice()))
        .unwrap_or((&[], &[]));

    merge_materials(replacements, recovered, scrap)
}

fn apply_acceptance_draft(phase: &mut AcceptancePhase, draft: AcceptanceDraft) {
    phase.failure_description = draft.failure_description;
    phase.failure_cause = draft.failure_cause;
    phase.committee = draft.committee;
    phase.recovered = draft.recovered;
    phase.scrap = draft.scrap;
    phase.conclusion = draft.conclusion;
    phase.other_opinions = draft.other_opinions;
}

fn ensure_creator(creator: &UserId, actor: &Actor) -> Result<(), DomainError> {
    if actor.tier == RoleTier::Admin || actor.user_id == *creator {
        return Ok(());
    }
    Err(DomainError::CreatorOnly { creator: creator.0.clone() })
}

fn require_reason_on_reject(
    action: ReviewAction,
    reason: Option<String>,
) -> Result<Option<String>, DomainError> {
    match action {
        ReviewAction::Reject => match reason {
            Some(reason) if !reason.trim().is_empty() => Ok(Some(reason)),
            _ => Err(DomainError::Validation("a rejection requires a reason".to_owned())),
        },
        ReviewAction::Approve => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::committee::{Committee, CommitteeMember};
    use crate::domain::material::{
        CatalogItemId, ReplacementLine, ReplacementSource, SalvageLine,
    };
    use crate::domain::phase::{InspectionFinding, RequestStatus, ReviewStatus};
    use crate::domain::repair::{DepartmentId, DeviceId, Repair, RepairId};
    use crate::errors::DomainError;
    use crate::flows::ReviewAction;
    use crate::roles::{Actor, RoleTier};

    use super::{
        cancel_repair, create_repair, merged_materials, resubmit_request, review_acceptance,
        review_inspection, review_request, save_acceptance, save_inspection, AcceptanceDraft,
        CreateRepair, InspectionDraft,
    };

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

    fn new_repair() -> Repair {
        create_repair(
            RepairId("R-1".to_string()),
            CreateRepair {
                device_id: DeviceId("DEV-1".to_string()),
                department_id: DepartmentId("DEP-1".to_string()),
                issue: "compressor will not start".to_string(),
                recommendation: "check windings".to_string(),
            },
            creator().user_id,
        )
        .expect("valid create")
    }

    fn approve_request_fully(repair: &mut Repair) {
        review_request(repair, &technician(), ReviewAction::Approve, None).expect("tech");
        review_request(repair, &team_lead(), ReviewAction::Approve, None).expect("lead");
        review_request(repair, &director(), ReviewAction::Approve, None).expect("director");
    }

    fn inspection_draft(findings: usize) -> InspectionDraft {
        InspectionDraft {
            findings: (0..findings)
                .map(|index| InspectionFinding {
                    description: format!("finding {index}"),
                    cause: "wear".to_string(),
                    solution: "replace part".to_string(),
                    notes: None,
                })
                .collect(),
            committee: Committee::from_members(vec![
                CommitteeMember::new("u-lead", "Head of committee"),
                CommitteeMember::new("u-tech", "Member"),
            ])
            .expect("committee"),
            replacements: vec![ReplacementLine {
                source: ReplacementSource::Catalog {
                    catalog_item_id: CatalogItemId("CAT-42".to_string()),
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

    fn acceptance_draft() -> AcceptanceDraft {
        AcceptanceDraft {
            failure_description: "worn bearing".to_string(),
            failure_cause: "age".to_string(),
            committee: Committee::from_members(vec![CommitteeMember::new(
                "u-lead",
                "Head of committee",
            )])
            .expect("committee"),
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
            conclusion: "device restored".to_string(),
            other_opinions: None,
        }
    }

    fn approve_inspection_fully(repair: &mut Repair) {
        save_inspection(repair, &creator(), inspection_draft(1)).expect("save");
        review_inspection(repair, &team_lead(), ReviewAction::Approve, None).expect("manager");
        review_inspection(repair, &director(), ReviewAction::Approve, None).expect("admin");
    }

    #[test]
    fn create_requires_issue_text() {
        let error = create_repair(
            RepairId("R-2".to_string()),
            CreateRepair {
                device_id: DeviceId("DEV-1".to_string()),
                department_id: DepartmentId("DEP-1".to_string()),
                issue: "   ".to_string(),
                recommendation: String::new(),
            },
            creator().user_id,
        )
        .expect_err("blank issue");
        assert!(matches!(error, DomainError::Validation(_)));
    }

    #[test]
    fn three_approvals_complete_the_request_and_unlock_inspection() {
        let mut repair = new_repair();
        approve_request_fully(&mut repair);

        assert_eq!(repair.request.status, RequestStatus::Completed);
        assert!(repair.request.completed_at.is_some());
        assert_eq!(repair.request.tech_signoff.as_ref().map(|s| s.user_id.0.as_str()), Some("u-tech"));
        assert!(repair.inspection_unlocked());
        assert!(save_inspection(&mut repair, &creator(), inspection_draft(1)).is_ok());
    }

    #[test]
    fn wrong_tier_leaves_request_status_untouched() {
        let mut repair = new_repair();
        review_request(&mut repair, &technician(), ReviewAction::Approve, None).expect("tech");

        let before = repair.request.clone();
        let error = review_request(&mut repair, &technician(), ReviewAction::Approve, None)
            .expect_err("technician at team lead gate");

        assert!(matches!(error, DomainError::Authorization { .. }));
        assert_eq!(repair.request, before);
    }

    #[test]
    fn reject_without_reason_is_a_validation_error() {
        let mut repair = new_repair();
        let error = review_request(&mut repair, &technician(), ReviewAction::Reject, None)
            .expect_err("missing reason");
        assert!(matches!(error, DomainError::Validation(_)));
        assert_eq!(repair.request.status, RequestStatus::WaitingTech);
    }

    #[test]
    fn rejected_request_resubmits_only_by_creator() {
        let mut repair = new_repair();
        review_request(
            &mut repair,
            &technician(),
            ReviewAction::Reject,
            Some("duplicate case".to_string()),
        )
        .expect("reject");
        assert_eq!(repair.request.status, RequestStatus::Rejected);

        let stranger = Actor::new("u-other", RoleTier::Technician);
        let error = resubmit_request(
            &mut repair,
            &stranger,
            "still broken".to_string(),
            String::new(),
        )
        .expect_err("stranger cannot resubmit");
        assert!(matches!(error, DomainError::CreatorOnly { .. }));

        resubmit_request(&mut repair, &creator(), "still broken".to_string(), String::new())
            .expect("creator resubmits");
        assert_eq!(repair.request.status, RequestStatus::WaitingTech);
        assert!(repair.request.rejection.is_none());
        assert!(repair.request.tech_signoff.is_none());
        assert_eq!(repair.issue, "still broken");
    }

    #[test]
    fn inspection_is_locked_until_request_completes() {
        let mut repair = new_repair();
        let error = save_inspection(&mut repair, &creator(), inspection_draft(1))
            .expect_err("request still open");
        assert!(matches!(error, DomainError::State(_)));
    }

    #[test]
    fn inspection_rejection_and_resubmission_preserves_added_finding() {
        let mut repair = new_repair();
        approve_request_fully(&mut repair);
        save_inspection(&mut repair, &creator(), inspection_draft(2)).expect("initial save");

        review_inspection(
            &mut repair,
            &team_lead(),
            ReviewAction::Reject,
            Some("incomplete data".to_string()),
        )
        .expect("reject");
        {
            let phase = repair.inspection.as_ref().expect("phase");
            assert_eq!(phase.status, ReviewStatus::Rejected);
            assert_eq!(
                phase.rejection.as_ref().map(|r| r.reason.as_str()),
                Some("incomplete data")
            );
        }

        save_inspection(&mut repair, &creator(), inspection_draft(3)).expect("resubmit");
        let phase = repair.inspection.as_ref().expect("phase");
        assert_eq!(phase.status, ReviewStatus::Pending);
        assert!(phase.rejection.is_none());
        assert_eq!(phase.findings.len(), 3);
    }

    #[test]
    fn inspection_terminal_approval_computes_duration_once_and_forwards_catalog_lines() {
        let mut repair = new_repair();
        approve_request_fully(&mut repair);
        save_inspection(&mut repair, &creator(), inspection_draft(1)).expect("save");

        let (outcome, forwarded) =
            review_inspection(&mut repair, &team_lead(), ReviewAction::Approve, None)
                .expect("manager");
        assert_eq!(outcome.to, ReviewStatus::ManagerApproved);
        assert!(forwarded.is_empty());

        let (outcome, forwarded) =
            review_inspection(&mut repair, &director(), ReviewAction::Approve, None)
                .expect("admin");
        assert_eq!(outcome.to, ReviewStatus::AdminApproved);
        assert_eq!(forwarded.len(), 1);
        assert_eq!(
            forwarded[0].catalog_item_id().map(|id| id.0.as_str()),
            Some("CAT-42")
        );

        let phase = repair.inspection.as_ref().expect("phase");
        let duration = phase.duration_minutes.expect("duration set");
        assert!(duration >= 0);
        assert!(phase.approved_at.is_some());
    }

    #[test]
    fn approved_inspection_is_immutable() {
        let mut repair = new_repair();
        approve_request_fully(&mut repair);
        approve_inspection_fully(&mut repair);

        let error = save_inspection(&mut repair, &creator(), inspection_draft(1))
            .expect_err("terminal phase is closed");
        assert!(matches!(error, DomainError::State(_)));
    }

    #[test]
    fn acceptance_is_locked_until_inspection_fully_approved() {
        let mut repair = new_repair();
        approve_request_fully(&mut repair);
        save_inspection(&mut repair, &creator(), inspection_draft(1)).expect("save");
        review_inspection(&mut repair, &team_lead(), ReviewAction::Approve, None)
            .expect("manager only");

        let error = save_acceptance(&mut repair, &creator(), acceptance_draft())
            .expect_err("inspection not admin approved");
        assert!(matches!(error, DomainError::State(_)));
    }

    #[test]
    fn acceptance_terminal_approval_marks_process_complete() {
        let mut repair = new_repair();
        approve_request_fully(&mut repair);
        approve_inspection_fully(&mut repair);
        save_acceptance(&mut repair, &creator(), acceptance_draft()).expect("save");

        review_acceptance(&mut repair, &team_lead(), ReviewAction::Approve, None)
            .expect("manager");
        assert!(repair.process_completed_at.is_none());

        review_acceptance(&mut repair, &director(), ReviewAction::Approve, None).expect("admin");
        assert!(repair.process_completed_at.is_some());
        let phase = repair.acceptance.as_ref().expect("phase");
        assert_eq!(phase.status, ReviewStatus::AdminApproved);
        assert!(phase.duration_minutes.is_some());
    }

    #[test]
    fn merged_view_shows_three_independent_quantities() {
        let mut repair = new_repair();
        approve_request_fully(&mut repair);

        let mut draft = inspection_draft(1);
        draft.replacements = vec![ReplacementLine {
            source: ReplacementSource::NewPurchase,
            name: "Gasket".to_string(),
            quantity: 5,
            unit: "pcs".to_string(),
            specification: None,
            code: None,
            notes: None,
        }];
        save_inspection(&mut repair, &creator(), draft).expect("save");
        review_inspection(&mut repair, &team_lead(), ReviewAction::Approve, None).expect("mgr");
        review_inspection(&mut repair, &director(), ReviewAction::Approve, None).expect("admin");

        let mut draft = acceptance_draft();
        draft.recovered =
            vec![SalvageLine { name: "gasket".to_string(), quantity: 2, unit: "pcs".to_string(), damage_pct: 40 }];
        draft.scrap =
            vec![SalvageLine { name: "GASKET".to_string(), quantity: 1, unit: "pcs".to_string(), damage_pct: 95 }];
        save_acceptance(&mut repair, &creator(), draft).expect("save acceptance");

        let rows = merged_materials(&repair);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].replacement.as_ref().map(|s| s.quantity), Some(5));
        assert_eq!(rows[0].recovered.as_ref().map(|s| s.quantity), Some(2));
        assert_eq!(rows[0].scrap.as_ref().map(|s| s.quantity), Some(1));
    }

    #[test]
    fn cancel_freezes_every_phase() {
        let mut repair = new_repair();
        cancel_repair(&mut repair, &creator()).expect("creator cancels");
        assert!(repair.canceled);
        assert!(repair.canceled_at.is_some());

        let error = review_request(&mut repair, &technician(), ReviewAction::Approve, None)
            .expect_err("frozen");
        assert!(matches!(error, DomainError::State(_)));
    }

    #[test]
    fn cancel_is_refused_once_request_completed() {
        let mut repair = new_repair();
        approve_request_fully(&mut repair);

        let error = cancel_repair(&mut repair, &creator()).expect_err("approved phase");
        assert!(matches!(error, DomainError::State(_)));
    }

    #[test]
    fn cancel_by_non_creator_requires_admin() {
        let mut repair = new_repair();
        let stranger = Actor::new("u-other", RoleTier::TeamLead);
        let error = cancel_repair(&mut repair, &stranger).expect_err("not the creator");
        assert!(matches!(error, DomainError::CreatorOnly { .. }));

        let admin = Actor::new("u-admin", RoleTier::Admin);
        cancel_repair(&mut repair, &admin).expect("admin may cancel");
    }
}
