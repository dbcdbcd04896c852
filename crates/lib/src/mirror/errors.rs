//! Error types for mirror orchestration.

use thiserror::Error;

use crate::schema::ValidationIssue;

/// Structured error types for the mirror's state machine.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MirrorError {
    /// A state update was requested while another one is in flight
    #[error("a state update is already in progress")]
    Reentrant,

    /// The mirror was disposed; its document subscriptions are gone
    #[error("mirror has been disposed")]
    Disposed,

    /// The updated state failed schema validation and the mirror is
    /// configured to reject invalid updates.
    #[error("state update failed validation with {} issue(s); first: {}", issues.len(), issues.first().map(ToString::to_string).unwrap_or_default())]
    Validation { issues: Vec<ValidationIssue> },

    /// Post-commit check found the document diverging from the applied state
    #[error("document state diverged from applied update at `{path}`")]
    Consistency { path: String },
}

impl MirrorError {
    /// Check if this error is a rejected invalid state update.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, MirrorError::Validation { .. })
    }

    /// Check if this error is a post-commit consistency failure.
    pub fn is_consistency_error(&self) -> bool {
        matches!(self, MirrorError::Consistency { .. })
    }

    /// Check if this error is a rejected re-entrant update.
    pub fn is_reentrancy_error(&self) -> bool {
        matches!(self, MirrorError::Reentrant)
    }
}

// Conversion from MirrorError to the main Error type
impl From<MirrorError> for crate::Error {
    fn from(err: MirrorError) -> Self {
        crate::Error::Mirror(err)
    }
}
