//!
//! Specular: schema-driven bidirectional state mirroring for Loro CRDT documents.
//!
//! Applications read and write a plain, schema-described state tree while that
//! tree stays synchronized with a [`loro::LoroDoc`] shared across peers. The
//! CRDT engine owns merging, causality, and container identity; Specular owns
//! the reconciliation layer on top of it.
//!
//! ## Core Concepts
//!
//! * **Schema (`schema::Schema`)**: Describes the shape of the state tree: primitive
//!   fields, ignored fields, and the container kinds (Map, List, MovableList, Text, Tree).
//! * **Diff Engine (`diff`)**: Compares an old and a new state subtree against the live
//!   container and produces a minimal, identity-preserving list of `Change` records.
//! * **Change Applier (`apply`)**: Groups changes by target container and mutates the
//!   document, committing once per `set_state` under a sentinel origin tag.
//! * **Reconciler (`reconcile`)**: Rebuilds application state from the live document
//!   when remote change batches arrive, ignoring echoes of local writes.
//! * **Mirror (`mirror::Mirror`)**: Orchestrates the above; owns the authoritative
//!   in-memory state, the subscription registry, and the re-entrancy guard.
//!
//! ```
//! use specular::{Mirror, schema::{Schema, IdSelector}};
//! use serde_json::json;
//!
//! let schema = Schema::map([(
//!     "todos",
//!     Schema::movable_list(
//!         Schema::map([("text", Schema::string()), ("status", Schema::string())]),
//!         IdSelector::cid(),
//!     ),
//! )]);
//! let mirror = Mirror::new(loro::LoroDoc::new(), schema).unwrap();
//! mirror
//!     .set_state(|state| {
//!         state["todos"]
//!             .as_array_mut()
//!             .unwrap()
//!             .push(json!({"text": "Buy milk", "status": "todo"}));
//!     })
//!     .unwrap();
//! assert_eq!(mirror.state()["todos"][0]["text"], "Buy milk");
//! ```

pub mod apply;
pub mod change;
pub mod constants;
pub mod diff;
pub mod mirror;
pub mod reconcile;
pub mod schema;
pub mod value;
pub mod vlist;

/// Re-export the `Mirror` struct for easier access.
pub use mirror::{
    Mirror, MirrorOptions, SetStateOptions, StateSubscription, SyncDirection, SyncMeta, SyncStatus,
};

/// Result type used throughout the Specular library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Specular library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structured schema errors from the schema module
    #[error(transparent)]
    Schema(schema::SchemaError),

    /// Structured diff errors from the diff module
    #[error(transparent)]
    Diff(diff::DiffError),

    /// Structured change-application errors from the apply module
    #[error(transparent)]
    Apply(apply::ApplyError),

    /// Structured orchestration errors from the mirror module
    #[error(transparent)]
    Mirror(mirror::MirrorError),

    /// Errors surfaced by the underlying CRDT engine
    #[error("CRDT engine error: {0}")]
    Engine(#[from] loro::LoroError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Schema(_) => "schema",
            Error::Diff(_) => "diff",
            Error::Apply(_) => "apply",
            Error::Mirror(_) => "mirror",
            Error::Engine(_) => "engine",
        }
    }

    /// Check if this error is a schema validation failure.
    pub fn is_validation_error(&self) -> bool {
        match self {
            Error::Schema(err) => err.is_validation_error(),
            Error::Mirror(err) => err.is_validation_error(),
            _ => false,
        }
    }

    /// Check if this error is a structural diff failure (type mismatch,
    /// duplicate id, missing identity).
    pub fn is_structural_error(&self) -> bool {
        match self {
            Error::Diff(err) => err.is_structural_error(),
            Error::Apply(err) => err.is_structural_error(),
            _ => false,
        }
    }

    /// Check if this error is a stale container reference.
    pub fn is_stale_reference(&self) -> bool {
        match self {
            Error::Apply(err) => err.is_stale_reference(),
            _ => false,
        }
    }

    /// Check if this error is a post-commit consistency failure.
    pub fn is_consistency_error(&self) -> bool {
        match self {
            Error::Mirror(err) => err.is_consistency_error(),
            _ => false,
        }
    }

    /// Check if this error is a rejected re-entrant `set_state`.
    pub fn is_reentrancy_error(&self) -> bool {
        match self {
            Error::Mirror(err) => err.is_reentrancy_error(),
            _ => false,
        }
    }
}
