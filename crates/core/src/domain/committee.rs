use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::repair::UserId;
use crate::errors::DomainError;

/// One person recorded as participating in a phase review. The role title
/// is display text carried as entered, not a key into a role table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeMember {
    pub user_id: UserId,
    pub role_title: String,
}

impl CommitteeMember {
    pub fn new(user_id: impl Into<String>, role_title: impl Into<String>) -> Self {
        Self { user_id: UserId(user_id.into()), role_title: role_title.into() }
    }
}

/// Ordered committee for one phase. Construction enforces the
/// no-duplicate-member rule; order is preserved as entered.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committee {
    members: Vec<CommitteeMember>,
}

impl Committee {
    pub fn from_members(members: Vec<CommitteeMember>) -> Result<Self, DomainError> {
        let mut seen = HashSet::new();
        for member in &members {
            if !seen.insert(member.user_id.0.clone()) {
                return Err(DomainError::Validation(format!(
                    "user `{}` appears more than once in the committee",
                    member.user_id.0
                )));
            }
        }
        Ok(Self { members })
    }

    pub fn members(&self) -> &[CommitteeMember] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }
}
