use thiserror::Error;

use crate::domain::phase::{RequestStatus, ReviewStatus};
use crate::errors::DomainError;
use crate::flows::states::{
    PhaseKind, RequestEffect, RequestOutcome, RequestStep, ReviewAction, ReviewEffect,
    ReviewOutcome,
};
use crate::roles::RoleTier;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("no `{}` transition from `{status}`", action.as_str())]
    InvalidTransition { status: String, action: ReviewAction },
    #[error("tier `{}` does not hold the `{}` gate at `{status}`", actor.as_str(), required.as_str())]
    NotAuthorized { required: RoleTier, actor: RoleTier, status: String },
}

impl From<TransitionError> for DomainError {
    fn from(value: TransitionError) -> Self {
        match value {
            TransitionError::InvalidTransition { status, action } => DomainError::State(format!(
                "no `{}` transition from `{status}`",
                action.as_str()
            )),
            TransitionError::NotAuthorized { required, actor, status } => {
                DomainError::Authorization { required, actor, status }
            }
        }
    }
}

/// Tier holding the token at each request waiting state.
pub fn request_gate(status: RequestStatus) -> Option<RoleTier> {
    match status {
        RequestStatus::WaitingTech => Some(RoleTier::Technician),
        RequestStatus::WaitingTeamLead => Some(RoleTier::TeamLead),
        RequestStatus::WaitingDirector => Some(RoleTier::Director),
        RequestStatus::Completed | RequestStatus::Rejected => None,
    }
}

/// Request phase transition table: current status x action x actor tier.
/// Approve and reject both require exactly the tier holding the token;
/// admin passes every gate.
pub fn review_request(
    current: RequestStatus,
    action: ReviewAction,
    actor: RoleTier,
) -> Result<RequestOutcome, TransitionError> {
    let Some(gate) = request_gate(current) else {
        return Err(TransitionError::InvalidTransition {
            status: current.as_str().to_owned(),
            action,
        });
    };

    if !actor.holds_gate(gate) {
        return Err(TransitionError::NotAuthorized {
            required: gate,
            actor,
            status: current.as_str().to_owned(),
        });
    }

    let (to, effects) = match (current, action) {
        (RequestStatus::WaitingTech, ReviewAction::Approve) => (
            RequestStatus::WaitingTeamLead,
            vec![RequestEffect::RecordSignoff(RequestStep::Technician)],
        ),
        (RequestStatus::WaitingTeamLead, ReviewAction::Approve) => (
            RequestStatus::WaitingDirector,
            vec![RequestEffect::RecordSignoff(RequestStep::TeamLead)],
        ),
        (RequestStatus::WaitingDirector, ReviewAction::Approve) => (
            RequestStatus::Completed,
            vec![
                RequestEffect::RecordSignoff(RequestStep::Director),
                RequestEffect::MarkCompleted,
            ],
        ),
        (_, ReviewAction::Reject) => {
            (RequestStatus::Rejected, vec![RequestEffect::RecordRejection])
        }
        // Unreachable: terminal states already failed the gate lookup.
        (_, ReviewAction::Approve) => {
            return Err(TransitionError::InvalidTransition {
                status: current.as_str().to_owned(),
                action,
            });
        }
    };

    Ok(RequestOutcome { from: current, to, action, effects })
}

/// Tier holding the approval token at each review state. Shared by
/// inspection and acceptance, whose machines have the same shape.
pub fn review_gate(status: ReviewStatus) -> Option<RoleTier> {
    match status {
        ReviewStatus::Pending => Some(RoleTier::TeamLead),
        ReviewStatus::ManagerApproved => Some(RoleTier::Director),
        ReviewStatus::AdminApproved | ReviewStatus::Rejected => None,
    }
}

/// Inspection/acceptance transition table. Approve requires exactly the
/// gate tier (admin overrides); reject is open to any tier at or above the
/// gate, from any non-terminal state.
pub fn review_phase(
    phase: PhaseKind,
    current: ReviewStatus,
    action: ReviewAction,
    actor: RoleTier,
) -> Result<ReviewOutcome, TransitionError> {
    let status_label = || current.encode(phase.as_str());

    let Some(gate) = review_gate(current) else {
        return Err(TransitionError::InvalidTransition { status: status_label(), action });
    };

    let authorized = match action {
        ReviewAction::Approve => actor.holds_gate(gate),
        ReviewAction::Reject => actor.at_or_above(gate),
    };
    if !authorized {
        return Err(TransitionError::NotAuthorized {
            required: gate,
            actor,
            status: status_label(),
        });
    }

    let (to, effects) = match (current, action) {
        (ReviewStatus::Pending, ReviewAction::Approve) => {
            (ReviewStatus::ManagerApproved, vec![ReviewEffect::RecordManagerSignoff])
        }
        (ReviewStatus::ManagerApproved, ReviewAction::Approve) => (
            ReviewStatus::AdminApproved,
            vec![ReviewEffect::RecordAdminSignoff, ReviewEffect::FinalizeApproval],
        ),
        (_, ReviewAction::Reject) => {
            (ReviewStatus::Rejected, vec![ReviewEffect::RecordRejection])
        }
        (_, ReviewAction::Approve) => {
            return Err(TransitionError::InvalidTransition { status: status_label(), action });
        }
    };

    Ok(ReviewOutcome { phase, from: current, to, action, effects })
}

#[cfg(test)]
mod tests {
    use crate::domain::phase::{RequestStatus, ReviewStatus};
    use crate::flows::engine::{review_phase, review_request, TransitionError};
    use crate::flows::states::{
        PhaseKind, RequestEffect, RequestStep, ReviewAction, ReviewEffect,
    };
    use crate::roles::RoleTier;

    #[test]
    fn request_happy_path_walks_all_three_gates() {
        let first = review_request(
            RequestStatus::WaitingTech,
            ReviewAction::Approve,
            RoleTier::Technician,
        )
        .expect("tech gate");
        assert_eq!(first.to, RequestStatus::WaitingTeamLead);
        assert_eq!(first.effects, vec![RequestEffect::RecordSignoff(RequestStep::Technician)]);

        let second =
            review_request(first.to, ReviewAction::Approve, RoleTier::TeamLead).expect("lead gate");
        assert_eq!(second.to, RequestStatus::WaitingDirector);

        let third = review_request(second.to, ReviewAction::Approve, RoleTier::Director)
            .expect("director gate");
        assert_eq!(third.to, RequestStatus::Completed);
        assert!(third.effects.contains(&RequestEffect::MarkCompleted));
    }

    #[test]
    fn request_gate_rejects_wrong_tier_without_mutation_effects() {
        let error = review_request(
            RequestStatus::WaitingTeamLead,
            ReviewAction::Approve,
            RoleTier::Technician,
        )
        .expect_err("technician cannot act at the team lead gate");

        assert_eq!(
            error,
            TransitionError::NotAuthorized {
                required: RoleTier::TeamLead,
                actor: RoleTier::Technician,
                status: "waiting_team_lead".to_owned(),
            }
        );
    }

    #[test]
    fn request_director_gate_rejects_team_lead() {
        let error = review_request(
            RequestStatus::WaitingDirector,
            ReviewAction::Approve,
            RoleTier::TeamLead,
        )
        .expect_err("team lead cannot act at the director gate");
        assert!(matches!(error, TransitionError::NotAuthorized { .. }));
    }

    #[test]
    fn admin_passes_every_request_gate() {
        for status in [
            RequestStatus::WaitingTech,
            RequestStatus::WaitingTeamLead,
            RequestStatus::WaitingDirector,
        ] {
            let outcome = review_request(status, ReviewAction::Approve, RoleTier::Admin)
                .expect("admin override");
            assert_ne!(outcome.to, status);
        }
    }

    #[test]
    fn request_reject_is_available_from_every_waiting_state() {
        let cases = [
            (RequestStatus::WaitingTech, RoleTier::Technician),
            (RequestStatus::WaitingTeamLead, RoleTier::TeamLead),
            (RequestStatus::WaitingDirector, RoleTier::Director),
        ];

        for (status, tier) in cases {
            let outcome =
                review_request(status, ReviewAction::Reject, tier).expect("token holder rejects");
            assert_eq!(outcome.to, RequestStatus::Rejected);
            assert_eq!(outcome.effects, vec![RequestEffect::RecordRejection]);
        }
    }

    #[test]
    fn terminal_request_states_accept_no_review() {
        for status in [RequestStatus::Completed, RequestStatus::Rejected] {
            for action in [ReviewAction::Approve, ReviewAction::Reject] {
                let error = review_request(status, action, RoleTier::Admin)
                    .expect_err("terminal state is closed");
                assert!(matches!(error, TransitionError::InvalidTransition { .. }));
            }
        }
    }

    #[test]
    fn review_phase_double_approval_reaches_admin_approved() {
        let first = review_phase(
            PhaseKind::Inspection,
            ReviewStatus::Pending,
            ReviewAction::Approve,
            RoleTier::TeamLead,
        )
        .expect("manager approval");
        assert_eq!(first.to, ReviewStatus::ManagerApproved);
        assert_eq!(first.effects, vec![ReviewEffect::RecordManagerSignoff]);

        let second = review_phase(
            PhaseKind::Inspection,
            first.to,
            ReviewAction::Approve,
            RoleTier::Director,
        )
        .expect("admin approval");
        assert_eq!(second.to, ReviewStatus::AdminApproved);
        assert!(second.effects.contains(&ReviewEffect::FinalizeApproval));
    }

    #[test]
    fn review_phase_approve_requires_exact_gate_tier() {
        let error = review_phase(
            PhaseKind::Acceptance,
            ReviewStatus::Pending,
            ReviewAction::Approve,
            RoleTier::Director,
        )
        .expect_err("director does not approve in place of the team lead");

        assert_eq!(
            error,
            TransitionError::NotAuthorized {
                required: RoleTier::TeamLead,
                actor: RoleTier::Director,
                status: "acceptance_pending".to_owned(),
            }
        );
    }

    #[test]
    fn review_phase_reject_is_open_to_higher_tiers() {
        // A unit head outranks the team lead gate and may reject early.
        let outcome = review_phase(
            PhaseKind::Inspection,
            ReviewStatus::Pending,
            ReviewAction::Reject,
            RoleTier::UnitHead,
        )
        .expect("at-or-above reject");
        assert_eq!(outcome.to, ReviewStatus::Rejected);

        let error = review_phase(
            PhaseKind::Inspection,
            ReviewStatus::ManagerApproved,
            ReviewAction::Reject,
            RoleTier::TeamLead,
        )
        .expect_err("team lead is below the director gate");
        assert!(matches!(error, TransitionError::NotAuthorized { .. }));
    }

    #[test]
    fn terminal_review_states_accept_no_review() {
        for status in [ReviewStatus::AdminApproved, ReviewStatus::Rejected] {
            let error = review_phase(
                PhaseKind::Acceptance,
                status,
                ReviewAction::Approve,
                RoleTier::Admin,
            )
            .expect_err("terminal state is closed");
            assert!(matches!(error, TransitionError::InvalidTransition { .. }));
        }
    }

    #[test]
    fn transition_error_carries_phase_prefixed_status() {
        let error = review_phase(
            PhaseKind::Inspection,
            ReviewStatus::AdminApproved,
            ReviewAction::Approve,
            RoleTier::Director,
        )
        .expect_err("terminal");

        assert_eq!(
            error,
            TransitionError::InvalidTransition {
                status: "inspection_admin_approved".to_owned(),
                action: ReviewAction::Approve,
            }
        );
    }
}
