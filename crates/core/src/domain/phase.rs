use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::committee::Committee;
use crate::domain::material::{ReplacementLine, SalvageLine};
use crate::domain::repair::UserId;
use crate::roles::RoleTier;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    WaitingTech,
    WaitingTeamLead,
    WaitingDirector,
    Completed,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingTech => "waiting_tech",
            Self::WaitingTeamLead => "waiting_team_lead",
            Self::WaitingDirector => "waiting_director",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "waiting_tech" => Some(Self::WaitingTech),
            "waiting_team_lead" => Some(Self::WaitingTeamLead),
            "waiting_director" => Some(Self::WaitingDirector),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    ManagerApproved,
    AdminApproved,
    Rejected,
}

impl ReviewStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AdminApproved | Self::Rejected)
    }

    /// Storage encoding, prefixed per phase (`inspection_pending`,
    /// `acceptance_admin_approved`, ...).
    pub fn encode(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.suffix())
    }

    pub fn decode(prefix: &str, value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        let suffix = value.strip_prefix(prefix)?.strip_prefix('_')?;
        match suffix {
            "pending" => Some(Self::Pending),
            "manager_approved" => Some(Self::ManagerApproved),
            "admin_approved" => Some(Self::AdminApproved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ManagerApproved => "manager_approved",
            Self::AdminApproved => "admin_approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Recorded when a phase is rejected: who, at which tier, why, when.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: String,
    pub rejected_by: UserId,
    pub rejected_at_tier: RoleTier,
    pub rejected_at: DateTime<Utc>,
}

/// One approval sub-step: who signed off and when.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signoff {
    pub user_id: UserId,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPhase {
    pub status: RequestStatus,
    pub tech_signoff: Option<Signoff>,
    pub team_lead_signoff: Option<Signoff>,
    pub director_signoff: Option<Signoff>,
    pub completed_at: Option<DateTime<Utc>>,
    pub rejection: Option<Rejection>,
}

impl RequestPhase {
    pub fn open() -> Self {
        Self {
            status: RequestStatus::WaitingTech,
            tech_signoff: None,
            team_lead_signoff: None,
            director_signoff: None,
            completed_at: None,
            rejection: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionFinding {
    pub description: String,
    pub cause: String,
    pub solution: String,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionPhase {
    pub status: ReviewStatus,
    pub committee: Committee,
    pub findings: Vec<InspectionFinding>,
    pub replacements: Vec<ReplacementLine>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub manager_signoff: Option<Signoff>,
    pub admin_signoff: Option<Signoff>,
    pub approved_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub rejection: Option<Rejection>,
}

impl InspectionPhase {
    pub fn open(created_by: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            status: ReviewStatus::Pending,
            committee: Committee::default(),
            findings: Vec::new(),
            replacements: Vec::new(),
            created_by,
            created_at,
            manager_signoff: None,
            admin_signoff: None,
            approved_at: None,
            duration_minutes: None,
            rejection: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptancePhase {
    pub status: ReviewStatus,
    pub committee: Committee,
    pub failure_description: String,
    pub failure_cause: String,
    pub recovered: Vec<SalvageLine>,
    pub scrap: Vec<SalvageLine>,
    pub conclusion: String,
    pub other_opinions: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub manager_signoff: Option<Signoff>,
    pub admin_signoff: Option<Signoff>,
    pub approved_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub rejection: Option<Rejection>,
}

impl AcceptancePhase {
    pub fn open(created_by: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            status: ReviewStatus::Pending,
            committee: Committee::default(),
            failure_description: String::new(),
            failure_cause: String::new(),
            recovered: Vec::new(),
            scrap: Vec::new(),
            conclusion: String::new(),
            other_opinions: None,
            created_by,
            created_at,
            manager_signoff: None,
            admin_signoff: None,
            approved_at: None,
            duration_minutes: None,
            rejection: None,
        }
    }
}

/// Elapsed whole minutes between phase creation and terminal approval.
/// Clamped at zero; clock skew must never yield a negative duration.
pub fn elapsed_minutes(created_at: DateTime<Utc>, approved_at: DateTime<Utc>) -> i64 {
    (approved_at - created_at).num_minutes().max(0)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{elapsed_minutes, RequestStatus, ReviewStatus};

    #[test]
    fn request_status_round_trips_from_storage_encoding() {
        let cases = [
            RequestStatus::WaitingTech,
            RequestStatus::WaitingTeamLead,
            RequestStatus::WaitingDirector,
            RequestStatus::Completed,
            RequestStatus::Rejected,
        ];

        for status in cases {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn review_status_encodes_with_phase_prefix() {
        assert_eq!(ReviewStatus::Pending.encode("inspection"), "inspection_pending");
        assert_eq!(
            ReviewStatus::AdminApproved.encode("acceptance"),
            "acceptance_admin_approved"
        );
        assert_eq!(
            ReviewStatus::decode("inspection", "inspection_manager_approved"),
            Some(ReviewStatus::ManagerApproved)
        );
        assert_eq!(ReviewStatus::decode("acceptance", "inspection_pending"), None);
    }

    #[test]
    fn elapsed_minutes_truncates_to_whole_minutes() {
        let start = Utc::now();
        assert_eq!(elapsed_minutes(start, start + Duration::seconds(119)), 1);
        assert_eq!(elapsed_minutes(start, start + Duration::minutes(45)), 45);
    }

    #[test]
    fn elapsed_minutes_never_goes_negative() {
        let start = Utc::now();
        assert_eq!(elapsed_minutes(start, start - Duration::minutes(3)), 0);
    }
}
