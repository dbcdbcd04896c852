//! Error types for the diff engine.

use thiserror::Error;

/// Structured error types for diff computation.
///
/// Structural errors abort the surrounding `set_state` before any document
/// mutation; there are no partial commits.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DiffError {
    /// A state value does not match the container shape its schema declares
    #[error("type mismatch at `{path}`: expected {expected}, found {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Two items in one list resolved to the same identity
    #[error("duplicate id `{id}` in list at `{path}`")]
    DuplicateId { path: String, id: String },

    /// An existing item's identity could not be resolved where a
    /// delete/move match requires it
    #[error("item {index} at `{path}` has no resolvable id")]
    UnresolvedIdentity { path: String, index: usize },

    /// A tree node id in state does not parse as a live node id
    #[error("invalid tree node id `{id}` at `{path}`")]
    InvalidNodeId { path: String, id: String },

    /// The CRDT engine failed while resolving live containers
    #[error("engine error while diffing: {0}")]
    Engine(#[from] loro::LoroError),
}

impl DiffError {
    /// Check if this error is a structural failure (mismatched shapes,
    /// duplicated or malformed identity).
    pub fn is_structural_error(&self) -> bool {
        matches!(
            self,
            DiffError::TypeMismatch { .. }
                | DiffError::DuplicateId { .. }
                | DiffError::InvalidNodeId { .. }
                | DiffError::UnresolvedIdentity { .. }
        )
    }

    /// Check if this error is an unresolved item identity.
    pub fn is_unresolved_identity(&self) -> bool {
        matches!(self, DiffError::UnresolvedIdentity { .. })
    }
}

// Conversion from DiffError to the main Error type
impl From<DiffError> for crate::Error {
    fn from(err: DiffError) -> Self {
        crate::Error::Diff(err)
    }
}
