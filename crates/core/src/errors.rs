use thiserror::Error;

use crate::roles::RoleTier;

/// Domain-level failures. Every variant is locally correctable by the
/// caller; none is retried automatically.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("command not valid for current state: {0}")]
    State(String),
    #[error("tier `{}` does not hold the `{}` gate at `{status}`", actor.as_str(), required.as_str())]
    Authorization { required: RoleTier, actor: RoleTier, status: String },
    #[error("only the original creator may perform this action (creator is `{creator}`)")]
    CreatorOnly { creator: String },
}

/// Failure at the storage port. Backends map their native errors into
/// these two shapes so core stays free of driver types.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
    #[error("revision mismatch for repair `{repair_id}`: expected {expected}, found {found}")]
    RevisionMismatch { repair_id: String, expected: u32, found: u32 },
}

/// Everything a command handler can return to its caller. Collaborator
/// failures are deliberately absent: they ride along as warnings on a
/// successful outcome, never as an error (see `service::CommandWarning`).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("repair `{repair_id}` not found")]
    NotFound { repair_id: String },
    #[error("concurrent modification of repair `{repair_id}`: expected revision {expected}, found {found}")]
    Conflict { repair_id: String, expected: u32, found: u32 },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl CommandError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Domain(DomainError::Validation(message.into()))
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::Domain(DomainError::State(message.into()))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Domain(DomainError::Validation(_)))
    }

    pub fn is_state(&self) -> bool {
        matches!(self, Self::Domain(DomainError::State(_)))
    }

    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            Self::Domain(DomainError::Authorization { .. })
                | Self::Domain(DomainError::CreatorOnly { .. })
        )
    }
}
