//! Change records: the edit script emitted by the diff engine and consumed
//! by the change applier.
//!
//! Tree creation is a two-phase protocol. A node that does not exist yet has
//! no live id, so a queued [`ChangeOp::TreeCreate`] carries a [`SlotId`] into
//! the [`IdSlots`] arena instead of an id, and a child queued in the same
//! batch references its parent through [`TreeRef::Pending`]. The applier
//! resolves each slot the moment it creates the node; after the batch, the
//! recorded bindings backfill resolved ids into the new state tree.

use loro::{ContainerID, ContainerType, TreeID};
use serde_json::Value;

use crate::constants::TREE_ID_KEY;

/// The container a change applies to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChangeTarget {
    /// The document root; the key of the op names a root container field.
    Root,
    /// A live container addressed by id.
    Container(ContainerID),
}

/// A map key or list index inside the target container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key {
    Field(String),
    Index(usize),
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Field(name) => f.write_str(name),
            Key::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Reference to a tree parent that may not exist yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeRef {
    /// Top level of the forest.
    Root,
    /// An existing live node.
    Node(TreeID),
    /// A node queued for creation earlier in the same batch.
    Pending(SlotId),
}

/// One primitive edit instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum ChangeOp {
    /// Write a plain value at a map key or list index.
    Set { key: Key, value: Value },
    /// Remove a map key or a single list element.
    Delete { key: Key },
    /// Insert a plain value into a list.
    Insert { index: usize, value: Value },
    /// Create a nested container at a key/index and fill it from a plain value.
    InsertContainer {
        key: Key,
        kind: ContainerType,
        value: Value,
    },
    /// Reposition a movable-list element.
    Move { from: usize, to: usize },
    /// Replace the whole text content.
    TextReplace { value: String },
    /// Create a tree node under `parent` at sibling position `index`.
    TreeCreate {
        parent: TreeRef,
        index: usize,
        data: Value,
        slot: SlotId,
    },
    /// Re-parent or re-order an existing tree node.
    TreeMove {
        target: TreeID,
        parent: TreeRef,
        index: usize,
    },
    /// Delete an existing tree node (and, per engine semantics, its subtree).
    TreeDelete { target: TreeID },
}

/// One edit instruction bound to its target container.
#[derive(Clone, Debug, PartialEq)]
pub struct Change {
    pub target: ChangeTarget,
    pub op: ChangeOp,
}

impl Change {
    pub fn new(target: ChangeTarget, op: ChangeOp) -> Self {
        Self { target, op }
    }
}

/// Index of a pending tree-node id in the [`IdSlots`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

impl SlotId {
    /// Position in the arena, for diagnostics.
    pub fn index(self) -> usize {
        self.0
    }
}

/// One step of a path into the state tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSeg {
    Key(String),
    Index(usize),
}

/// Path from the state root to a node object awaiting an id.
pub type StatePath = Vec<PathSeg>;

/// Arena of pending tree-node ids.
///
/// The diff allocates one slot per node it queues for creation and records
/// where in the new state tree that node lives; the applier resolves slots as
/// nodes are created.
#[derive(Debug, Default)]
pub struct IdSlots {
    slots: Vec<Option<TreeID>>,
    bindings: Vec<(SlotId, StatePath)>,
}

impl IdSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh unresolved slot.
    pub fn alloc(&mut self) -> SlotId {
        self.slots.push(None);
        SlotId(self.slots.len() - 1)
    }

    /// Record that the state node at `path` receives this slot's id.
    pub fn bind(&mut self, slot: SlotId, path: StatePath) {
        self.bindings.push((slot, path));
    }

    /// Resolve a slot with the id the engine assigned at creation.
    pub fn resolve(&mut self, slot: SlotId, id: TreeID) {
        self.slots[slot.0] = Some(id);
    }

    /// The resolved id, if the applier has reached this slot yet.
    pub fn get(&self, slot: SlotId) -> Option<TreeID> {
        self.slots[slot.0]
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Write every resolved id back into the state tree at its bound path.
    pub fn backfill(&self, state: &mut Value) {
        for (slot, path) in &self.bindings {
            let Some(id) = self.slots[slot.0] else {
                continue;
            };
            if let Some(node) = locate(state, path)
                && let Some(obj) = node.as_object_mut()
            {
                obj.insert(TREE_ID_KEY.to_string(), Value::String(id.to_string()));
            }
        }
    }
}

fn locate<'a>(state: &'a mut Value, path: &StatePath) -> Option<&'a mut Value> {
    let mut cursor = state;
    for seg in path {
        cursor = match seg {
            PathSeg::Key(key) => cursor.as_object_mut()?.get_mut(key)?,
            PathSeg::Index(i) => cursor.as_array_mut()?.get_mut(*i)?,
        };
    }
    Some(cursor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slots_resolve_and_backfill() {
        let mut slots = IdSlots::new();
        let a = slots.alloc();
        let b = slots.alloc();
        slots.bind(a, vec![PathSeg::Key("outline".into()), PathSeg::Index(0)]);
        slots.bind(
            b,
            vec![
                PathSeg::Key("outline".into()),
                PathSeg::Index(0),
                PathSeg::Key("children".into()),
                PathSeg::Index(0),
            ],
        );

        let id_a = TreeID { peer: 7, counter: 0 };
        let id_b = TreeID { peer: 7, counter: 1 };
        slots.resolve(a, id_a);
        slots.resolve(b, id_b);
        assert_eq!(slots.get(a), Some(id_a));

        let mut state = json!({"outline": [
            {"id": null, "data": {}, "children": [{"id": null, "data": {}, "children": []}]}
        ]});
        slots.backfill(&mut state);
        assert_eq!(state["outline"][0]["id"], id_a.to_string());
        assert_eq!(state["outline"][0]["children"][0]["id"], id_b.to_string());
    }

    #[test]
    fn unresolved_slots_are_skipped() {
        let mut slots = IdSlots::new();
        let a = slots.alloc();
        slots.bind(a, vec![PathSeg::Index(0)]);
        let mut state = json!([{"id": null}]);
        slots.backfill(&mut state);
        assert_eq!(state[0]["id"], Value::Null);
    }
}
