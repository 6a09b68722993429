use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeskError {
    #[error("Invalid order '{external_number}': {reason}")]
    Validation {
        external_number: String,
        reason: String,
    },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict on {subject}: {reason}")]
    Conflict { subject: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DeskError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// Conflicts are benign: another writer got there first.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type DeskResult<T> = Result<T, DeskError>;
