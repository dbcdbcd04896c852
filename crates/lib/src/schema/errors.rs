//! Error types for schema operations.

use std::fmt;

use thiserror::Error;

/// One schema violation found while validating a state value.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ValidationIssue {
    /// Dotted path from the root to the offending value (empty for the root).
    pub path: String,
    /// What was wrong at that path.
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Structured error types for schema operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A state value failed validation against its schema
    #[error("schema validation failed with {} issue(s); first: {}", issues.len(), issues.first().map(ToString::to_string).unwrap_or_default())]
    Validation { issues: Vec<ValidationIssue> },

    /// The root schema cannot be mirrored onto a document
    #[error("invalid root schema: {reason}")]
    InvalidRoot { reason: String },
}

impl SchemaError {
    /// Check if this error is a validation failure.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, SchemaError::Validation { .. })
    }

    /// The collected issues, if this is a validation failure.
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            SchemaError::Validation { issues } => issues,
            _ => &[],
        }
    }
}

// Conversion from SchemaError to the main Error type
impl From<SchemaError> for crate::Error {
    fn from(err: SchemaError) -> Self {
        crate::Error::Schema(err)
    }
}
