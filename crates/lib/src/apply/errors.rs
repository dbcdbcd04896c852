//! Error types for change application.

use thiserror::Error;

/// Structured error types for applying change scripts to a document.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ApplyError {
    /// A change targets a container id no longer present in the document.
    /// Always fatal, raised before any mutation.
    #[error("stale container reference: {id}")]
    StaleContainer { id: String },

    /// A targeted container's live kind does not match its schema
    #[error("container {id} is a {actual}, schema says {expected}")]
    KindMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    /// An operation is not defined for the targeted container kind
    #[error("operation {op} is not supported on {kind} container {id}")]
    UnsupportedOp {
        id: String,
        kind: &'static str,
        op: &'static str,
    },

    /// A dotted path key could not be resolved inside the target
    #[error("cannot resolve key `{key}` in container {id}")]
    InvalidKey { id: String, key: String },

    /// A tree change referenced a pending parent that was never created.
    /// Indicates a malformed script; creates precede their dependents.
    #[error("pending tree parent slot {slot} unresolved at apply time")]
    UnresolvedSlot { slot: usize },

    /// The CRDT engine rejected a mutation
    #[error("engine error while applying changes: {0}")]
    Engine(#[from] loro::LoroError),
}

impl ApplyError {
    /// Check if this error is a stale container reference.
    pub fn is_stale_reference(&self) -> bool {
        matches!(self, ApplyError::StaleContainer { .. })
    }

    /// Check if this error is a structural failure (bad script or schema
    /// mismatch rather than engine trouble).
    pub fn is_structural_error(&self) -> bool {
        matches!(
            self,
            ApplyError::KindMismatch { .. }
                | ApplyError::UnsupportedOp { .. }
                | ApplyError::InvalidKey { .. }
                | ApplyError::UnresolvedSlot { .. }
        )
    }
}

// Conversion from ApplyError to the main Error type
impl From<ApplyError> for crate::Error {
    fn from(err: ApplyError) -> Self {
        crate::Error::Apply(err)
    }
}
