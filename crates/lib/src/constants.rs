//! Constants used throughout the Specular library.
//!
//! This module provides central definitions for internal strings and other
//! constants, especially reserved keys injected into outward-facing state.

/// Sentinel origin attached to every commit made by the Change Applier.
///
/// Event batches carrying this origin are echoes of local writes and are
/// dropped by the reconciler instead of being applied a second time.
pub const SYNC_ORIGIN: &str = "specular-sync";

/// Reserved key for the synthetic container-identity field.
///
/// Present on every map-shaped state value. Read-only: it is injected into
/// outward-facing state, never diffed, never written back.
pub const CID_KEY: &str = "$cid";

/// Reserved key carrying a tree node's live id in state tree nodes.
pub const TREE_ID_KEY: &str = "id";

/// Reserved key carrying a tree node's data map in state tree nodes.
pub const TREE_DATA_KEY: &str = "data";

/// Reserved key carrying a tree node's ordered children in state tree nodes.
pub const TREE_CHILDREN_KEY: &str = "children";
