//! Movable-list diff: identity tracking with LIS-minimal moves.

use std::collections::{HashMap, HashSet};

use loro::ContainerID;
use serde_json::Value;

use crate::change::{Change, ChangeOp, ChangeTarget, IdSlots, Key, StatePath};
use crate::schema::{IdSelector, Schema};
use crate::vlist::VirtualMovableList;

use super::{DiffEngine, DiffError, list::check_duplicate_ids, path_string, type_mismatch};

impl DiffEngine<'_> {
    /// Diff a movable list by identity.
    ///
    /// Emits descending-index deletes, then the minimal set of moves (items
    /// on the longest increasing subsequence of surviving old positions stay
    /// put), then inserts, then per-item updates. Move indices are kept
    /// consistent by replaying every op on a [`VirtualMovableList`].
    #[allow(clippy::too_many_arguments)]
    pub(super) fn diff_movable_list(
        &self,
        target: &ContainerID,
        schema: &Schema,
        selector: IdSelector,
        old: &Value,
        new: &Value,
        path: &StatePath,
        slots: &mut IdSlots,
        out: &mut Vec<Change>,
    ) -> Result<(), DiffError> {
        let empty = Vec::new();
        let old_items = old.as_array().unwrap_or(&empty);
        let Some(new_items) = new.as_array() else {
            return Err(type_mismatch(path, "array", new));
        };
        let item_schema = schema.item_or_any();

        // Existing items mirror live state; an id we cannot resolve there
        // breaks delete/move matching and is fatal.
        let mut old_ids = Vec::with_capacity(old_items.len());
        for (index, item) in old_items.iter().enumerate() {
            match selector.select(item) {
                Some(id) => old_ids.push(id),
                None => {
                    return Err(DiffError::UnresolvedIdentity {
                        path: path_string(path),
                        index,
                    });
                }
            }
        }
        let new_ids: Vec<Option<String>> = new_items.iter().map(|v| selector.select(v)).collect();
        check_duplicate_ids(
            &old_ids.iter().cloned().map(Some).collect::<Vec<_>>(),
            path,
        )?;
        check_duplicate_ids(&new_ids, path)?;

        let old_pos: HashMap<&str, usize> = old_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let new_pos: HashMap<&str, usize> = new_ids
            .iter()
            .enumerate()
            .filter_map(|(j, id)| id.as_deref().map(|id| (id, j)))
            .collect();

        let mut vlist =
            VirtualMovableList::from_items(old_ids.iter().cloned().collect::<Vec<_>>());

        // 1) Deletes, highest index first.
        for i in (0..old_ids.len()).rev() {
            if !new_pos.contains_key(old_ids[i].as_str()) {
                out.push(Change::new(
                    ChangeTarget::Container(target.clone()),
                    ChangeOp::Delete { key: Key::Index(i) },
                ));
                vlist.delete(i);
            }
        }

        // 2) Moves. Common ids in new order; those on the LIS of their old
        // positions never move, everything else gets exactly one move.
        let common: Vec<&str> = new_ids
            .iter()
            .flatten()
            .map(String::as_str)
            .filter(|id| old_pos.contains_key(id))
            .collect();
        let old_positions: Vec<usize> = common.iter().map(|id| old_pos[id]).collect();
        let keep = lis_positions(&old_positions);
        for (k, id) in common.iter().enumerate() {
            if keep.contains(&k) {
                continue;
            }
            let Some(from) = vlist.position(|item| item == id) else {
                continue;
            };
            if from == k {
                continue;
            }
            out.push(Change::new(
                ChangeTarget::Container(target.clone()),
                ChangeOp::Move { from, to: k },
            ));
            vlist.mov(from, k);
        }

        // 3) Inserts for new ids (or id-less items) absent from old.
        for (j, item) in new_items.iter().enumerate() {
            let is_new = new_ids[j]
                .as_deref()
                .is_none_or(|id| !old_pos.contains_key(id));
            if is_new {
                self.insert_list_item(target, item_schema, j, item, out);
                let marker = new_ids[j].clone().unwrap_or_else(|| format!("\0new:{j}"));
                vlist.insert(j, marker);
            }
        }

        // 4) Updates for surviving items whose values changed.
        for (j, item) in new_items.iter().enumerate() {
            let Some(id) = new_ids[j].as_deref() else {
                continue;
            };
            let Some(&i) = old_pos.get(id) else {
                continue;
            };
            self.update_list_item(
                target,
                item_schema,
                j,
                i,
                &old_items[i],
                item,
                path,
                slots,
                out,
            )?;
        }
        Ok(())
    }
}

/// Positions (within `seq`) of one longest strictly increasing subsequence.
///
/// O(n log n) patience algorithm with parent links.
pub(super) fn lis_positions(seq: &[usize]) -> HashSet<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut parent: Vec<Option<usize>> = vec![None; seq.len()];
    for (i, &v) in seq.iter().enumerate() {
        let pos = tails.partition_point(|&t| seq[t] < v);
        if pos > 0 {
            parent[i] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }
    let mut keep = HashSet::new();
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        keep.insert(i);
        cursor = parent[i];
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use loro::{ContainerTrait, LoroDoc};
    use serde_json::json;

    #[test]
    fn lis_of_sorted_is_everything() {
        assert_eq!(lis_positions(&[0, 1, 2, 3]).len(), 4);
    }

    #[test]
    fn lis_of_reversed_is_one() {
        assert_eq!(lis_positions(&[3, 2, 1, 0]).len(), 1);
    }

    #[test]
    fn lis_mixed() {
        // 2,0,1 -> LIS is [0,1]
        let keep = lis_positions(&[2, 0, 1]);
        assert_eq!(keep, HashSet::from([1, 2]));
    }

    #[test]
    fn lis_empty() {
        assert!(lis_positions(&[]).is_empty());
    }

    fn diff(old: Value, new: Value) -> Vec<Change> {
        let doc = LoroDoc::new();
        let engine = DiffEngine::new(&doc);
        let target = doc.get_movable_list("items").id();
        let schema = Schema::movable_list(
            Schema::map([("id", Schema::string())]),
            IdSelector::field("id"),
        );
        let mut slots = IdSlots::new();
        let mut out = Vec::new();
        let Schema::MovableList { id_selector, .. } = &schema else {
            unreachable!()
        };
        engine
            .diff_movable_list(
                &target,
                &schema,
                id_selector.clone(),
                &old,
                &new,
                &vec![],
                &mut slots,
                &mut out,
            )
            .unwrap();
        out
    }

    fn moves(changes: &[Change]) -> Vec<(usize, usize)> {
        changes
            .iter()
            .filter_map(|c| match c.op {
                ChangeOp::Move { from, to } => Some((from, to)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn rotation_is_a_single_move() {
        let old = json!([{"id": "a"}, {"id": "b"}, {"id": "c"}]);
        let new = json!([{"id": "c"}, {"id": "a"}, {"id": "b"}]);
        let changes = diff(old, new);
        assert_eq!(changes.len(), 1);
        assert_eq!(moves(&changes), vec![(2, 0)]);
    }

    #[test]
    fn identical_permutation_is_empty() {
        let items = json!([{"id": "a"}, {"id": "b"}]);
        assert!(diff(items.clone(), items).is_empty());
    }

    #[test]
    fn move_count_is_n_minus_lis() {
        let old = json!([{"id": "a"}, {"id": "b"}, {"id": "c"}, {"id": "d"}]);
        let new = json!([{"id": "b"}, {"id": "a"}, {"id": "d"}, {"id": "c"}]);
        assert_eq!(moves(&diff(old, new)).len(), 2);
    }

    #[test]
    fn unresolvable_old_identity_is_fatal() {
        let doc = LoroDoc::new();
        let engine = DiffEngine::new(&doc);
        let target = doc.get_movable_list("items").id();
        let schema = Schema::movable_list(
            Schema::map([("id", Schema::string())]),
            IdSelector::field("id"),
        );
        let mut slots = IdSlots::new();
        let mut out = Vec::new();
        let err = engine
            .diff_movable_list(
                &target,
                &schema,
                IdSelector::field("id"),
                &json!([{"name": "no id"}]),
                &json!([]),
                &vec![],
                &mut slots,
                &mut out,
            )
            .unwrap_err();
        assert!(err.is_unresolved_identity());
    }
}
