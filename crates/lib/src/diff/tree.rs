//! Hierarchical tree diff with deferred identity for created nodes.

use std::collections::{HashMap, HashSet};

use loro::{ContainerID, ContainerTrait, TreeID};
use serde_json::Value;

use crate::change::{Change, ChangeOp, ChangeTarget, IdSlots, StatePath, TreeRef};
use crate::constants::{TREE_CHILDREN_KEY, TREE_DATA_KEY, TREE_ID_KEY};
use crate::schema::Schema;

use super::{DiffEngine, DiffError, path_string, push_index, push_key, type_mismatch};

struct OldNode<'v> {
    parent: Option<TreeID>,
    index: usize,
    depth: usize,
    data: &'v Value,
}

impl DiffEngine<'_> {
    /// Diff two forests of `{id, data, children}` nodes.
    ///
    /// Emission order: deletions deepest-first, creations in preorder of the
    /// new forest (parents before children, with pending-slot parents for
    /// nodes created in the same batch), then moves, then per-node data
    /// updates.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn diff_tree(
        &self,
        target: &ContainerID,
        schema: &Schema,
        old: &Value,
        new: &Value,
        path: &StatePath,
        slots: &mut IdSlots,
        out: &mut Vec<Change>,
    ) -> Result<(), DiffError> {
        let empty = Vec::new();
        let old_nodes = old.as_array().unwrap_or(&empty);
        let Some(new_nodes) = new.as_array() else {
            return Err(type_mismatch(path, "array of tree nodes", new));
        };
        let data_schema = Schema::Map {
            fields: schema.node_fields().cloned().unwrap_or_default(),
        };

        let mut old_index = HashMap::new();
        index_old_forest(old_nodes, None, 0, path, &mut old_index)?;

        let mut walk = TreeWalk {
            target,
            old_index: &old_index,
            seen: HashSet::new(),
            creates: Vec::new(),
            moves: Vec::new(),
            updates: Vec::new(),
        };
        self.walk_new_forest(new_nodes, TreeRef::Root, path, slots, &mut walk)?;

        // Deletions deepest-first so children go before ancestors.
        let mut deleted: Vec<(&TreeID, usize)> = old_index
            .iter()
            .filter(|(id, _)| !walk.seen.contains(id))
            .map(|(id, info)| (id, info.depth))
            .collect();
        deleted.sort_by(|a, b| b.1.cmp(&a.1));
        for (id, _) in deleted {
            out.push(Change::new(
                ChangeTarget::Container(target.clone()),
                ChangeOp::TreeDelete { target: *id },
            ));
        }

        out.append(&mut walk.creates);
        out.append(&mut walk.moves);

        let tree = self.doc.get_tree(target.clone());
        for (id, new_data, node_path) in walk.updates {
            let old_data = old_index[&id].data;
            if old_data == &new_data {
                continue;
            }
            let meta = tree.get_meta(id)?;
            let data_path = push_key(&node_path, TREE_DATA_KEY);
            self.diff_container(
                &meta.id(),
                &data_schema,
                old_data,
                &new_data,
                &data_path,
                slots,
                out,
            )?;
        }
        Ok(())
    }

    /// Preorder pass over the new forest collecting creates, moves, and data
    /// updates.
    fn walk_new_forest(
        &self,
        nodes: &[Value],
        parent: TreeRef,
        path: &StatePath,
        slots: &mut IdSlots,
        walk: &mut TreeWalk<'_, '_>,
    ) -> Result<(), DiffError> {
        for (index, node) in nodes.iter().enumerate() {
            let node_path = push_index(path, index);
            let Some(obj) = node.as_object() else {
                return Err(type_mismatch(&node_path, "tree node object", node));
            };
            let id = parse_node_id(obj.get(TREE_ID_KEY), &node_path)?;
            let data = obj.get(TREE_DATA_KEY).cloned().unwrap_or_else(empty_object);
            let children = obj
                .get(TREE_CHILDREN_KEY)
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let children_path = push_key(&node_path, TREE_CHILDREN_KEY);

            let self_ref = match id {
                Some(id) if walk.old_index.contains_key(&id) => {
                    if !walk.seen.insert(id) {
                        return Err(DiffError::DuplicateId {
                            path: path_string(&node_path),
                            id: id.to_string(),
                        });
                    }
                    let old = &walk.old_index[&id];
                    if !same_parent(old.parent, parent) || old.index != index {
                        walk.moves.push(Change::new(
                            ChangeTarget::Container(walk.target.clone()),
                            ChangeOp::TreeMove {
                                target: id,
                                parent,
                                index,
                            },
                        ));
                    }
                    walk.updates.push((id, data, node_path.clone()));
                    TreeRef::Node(id)
                }
                _ => {
                    // No id, or an id the old tree never had: create it. The
                    // live id lands in the slot when the applier runs.
                    let slot = slots.alloc();
                    slots.bind(slot, node_path.clone());
                    walk.creates.push(Change::new(
                        ChangeTarget::Container(walk.target.clone()),
                        ChangeOp::TreeCreate {
                            parent,
                            index,
                            data,
                            slot,
                        },
                    ));
                    TreeRef::Pending(slot)
                }
            };
            self.walk_new_forest(children, self_ref, &children_path, slots, walk)?;
        }
        Ok(())
    }
}

struct TreeWalk<'a, 'v> {
    target: &'a ContainerID,
    old_index: &'a HashMap<TreeID, OldNode<'v>>,
    seen: HashSet<TreeID>,
    creates: Vec<Change>,
    moves: Vec<Change>,
    updates: Vec<(TreeID, Value, StatePath)>,
}

fn index_old_forest<'v>(
    nodes: &'v [Value],
    parent: Option<TreeID>,
    depth: usize,
    path: &StatePath,
    out: &mut HashMap<TreeID, OldNode<'v>>,
) -> Result<(), DiffError> {
    static EMPTY_DATA: Value = Value::Null;
    for (index, node) in nodes.iter().enumerate() {
        let node_path = push_index(path, index);
        let Some(obj) = node.as_object() else {
            return Err(type_mismatch(&node_path, "tree node object", node));
        };
        // Old-state nodes mirror live nodes and always carry a resolved id.
        let Some(id) = parse_node_id(obj.get(TREE_ID_KEY), &node_path)? else {
            return Err(DiffError::UnresolvedIdentity {
                path: path_string(&node_path),
                index,
            });
        };
        out.insert(
            id,
            OldNode {
                parent,
                index,
                depth,
                data: obj.get(TREE_DATA_KEY).unwrap_or(&EMPTY_DATA),
            },
        );
        if let Some(children) = obj.get(TREE_CHILDREN_KEY).and_then(Value::as_array) {
            let children_path = push_key(&node_path, TREE_CHILDREN_KEY);
            index_old_forest(children, Some(id), depth + 1, &children_path, out)?;
        }
    }
    Ok(())
}

fn parse_node_id(raw: Option<&Value>, path: &StatePath) -> Result<Option<TreeID>, DiffError> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            TreeID::try_from(s.as_str())
                .map(Some)
                .map_err(|_| DiffError::InvalidNodeId {
                    path: path_string(path),
                    id: s.clone(),
                })
        }
        Some(other) => Err(type_mismatch(path, "tree node id string", other)),
    }
}

fn same_parent(old: Option<TreeID>, new: TreeRef) -> bool {
    match (old, new) {
        (None, TreeRef::Root) => true,
        (Some(old), TreeRef::Node(new)) => old == new,
        // A pending parent is by definition a different (new) node.
        _ => false,
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}
