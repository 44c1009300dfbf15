//! Error taxonomy shared by every pipeline
//!
//! Transport and storage failures are carried as `anyhow::Error` sources;
//! everything a caller has to branch on gets its own variant.

use thiserror::Error;

/// Reasons the safety guard refuses a mutation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafetyRefusal {
    /// The label is outside the reserved cleanup namespace
    #[error("for safety, label must start with '{prefix}' (got '{label}')")]
    LabelOutsideSafeNamespace { label: String, prefix: &'static str },

    /// Trash target exceeds the configured threshold and `force` was not given
    #[error(
        "refusing to trash {target} messages without force (max_trash_without_force={max})"
    )]
    ForceRequired { target: usize, max: usize },
}

/// Errors surfaced by the cleanup pipelines and services
#[derive(Debug, Error)]
pub enum CleanupError {
    /// Caller input was rejected before any network call (empty query,
    /// conflicting filters, unknown export format)
    #[error("{0}")]
    Validation(String),

    /// The mutation guard refused the operation
    #[error(transparent)]
    Safety(#[from] SafetyRefusal),

    /// The user declined the interactive confirmation
    #[error("cancelled")]
    Cancelled,

    /// The account does not exist or belongs to another user
    #[error("account not found")]
    NotFoundOrNotOwned,

    /// The stored refresh credential could not be used (missing, undecryptable,
    /// or rejected upstream)
    #[error("account token invalid: {0}")]
    CredentialInvalid(String),

    /// A provider request failed; nothing is retried
    #[error("provider request failed: {0:#}")]
    Provider(#[source] anyhow::Error),

    /// A batch mutation failed after `completed` messages were already changed
    #[error("mutation halted after {completed} messages: {source:#}")]
    MutationHalted {
        completed: usize,
        #[source]
        source: anyhow::Error,
    },

    /// Local persistence failed
    #[error("storage error: {0:#}")]
    Storage(#[source] anyhow::Error),
}

impl CleanupError {
    /// Convenience constructor for `Validation`
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for refusals that happen before any mutation (validation or safety)
    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Safety(_))
    }
}

/// Result alias used across the crate
pub type Result<T, E = CleanupError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refusal_classification() {
        assert!(CleanupError::validation("empty").is_refusal());
        assert!(
            CleanupError::from(SafetyRefusal::ForceRequired { target: 25, max: 10 }).is_refusal()
        );
        assert!(!CleanupError::Cancelled.is_refusal());
        assert!(!CleanupError::NotFoundOrNotOwned.is_refusal());
    }

    #[test]
    fn test_force_required_message_names_threshold() {
        let err = CleanupError::from(SafetyRefusal::ForceRequired { target: 25, max: 10 });
        assert_eq!(
            err.to_string(),
            "refusing to trash 25 messages without force (max_trash_without_force=10)"
        );
    }
}
