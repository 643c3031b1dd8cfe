use serde::{Deserialize, Serialize};

use crate::domain::repair::UserId;

/// Organizational role tier. Ordering follows `rank`: a higher rank may act
/// wherever "at or above" semantics apply. `Admin` passes every gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleTier {
    Operator,
    Technician,
    TeamLead,
    UnitHead,
    Director,
    Admin,
}

impl RoleTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::Technician => "technician",
            Self::TeamLead => "team_lead",
            Self::UnitHead => "unit_head",
            Self::Director => "director",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "operator" => Some(Self::Operator),
            "technician" => Some(Self::Technician),
            "team_lead" => Some(Self::TeamLead),
            "unit_head" => Some(Self::UnitHead),
            "director" => Some(Self::Director),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Self::Operator => 0,
            Self::Technician => 1,
            Self::TeamLead => 2,
            Self::UnitHead => 3,
            Self::Director => 4,
            Self::Admin => 5,
        }
    }

    /// Exact-tier gate check. Admin overrides every gate.
    pub fn holds_gate(&self, required: RoleTier) -> bool {
        *self == RoleTier::Admin || *self == required
    }

    /// At-or-above check used where a higher tier may act in place of a
    /// lower one (e.g. rejecting a phase it has not reached yet).
    pub fn at_or_above(&self, required: RoleTier) -> bool {
        *self == RoleTier::Admin || self.rank() >= required.rank()
    }

    /// Reviewer eligibility for committee membership. Operator accounts are
    /// data-entry only and never sit on a review committee.
    pub fn may_review(&self) -> bool {
        !matches!(self, Self::Operator)
    }
}

/// The acting user on a command: identity plus resolved role tier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub tier: RoleTier,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, tier: RoleTier) -> Self {
        Self { user_id: UserId(user_id.into()), tier }
    }
}
