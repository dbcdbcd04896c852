//! List diffs: positional (plain) and identity-aligned (keyed).

use std::collections::HashSet;

use loro::ContainerID;
use serde_json::Value;

use crate::change::{Change, ChangeOp, ChangeTarget, IdSlots, Key, StatePath};
use crate::schema::{IdSelector, Schema};

use super::{DiffEngine, DiffError, path_string, push_index, shape_matches, type_mismatch};

impl DiffEngine<'_> {
    /// Positional diff for lists without an id selector.
    ///
    /// Trims the common prefix and suffix, updates the overlapping middle in
    /// place, and turns any length difference into one contiguous run of
    /// deletes or inserts at the boundary. O(n) by design: without identity
    /// there is nothing to preserve by being cleverer.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn diff_plain_list(
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
        let old_items = old.as_array().unwrap_or(&empty);
        let Some(new_items) = new.as_array() else {
            return Err(type_mismatch(path, "array", new));
        };
        let item_schema = schema.item_or_any();

        let mut prefix = 0;
        while prefix < old_items.len()
            && prefix < new_items.len()
            && old_items[prefix] == new_items[prefix]
        {
            prefix += 1;
        }
        let mut suffix = 0;
        while suffix < old_items.len() - prefix
            && suffix < new_items.len() - prefix
            && old_items[old_items.len() - 1 - suffix] == new_items[new_items.len() - 1 - suffix]
        {
            suffix += 1;
        }

        let old_mid = old_items.len() - prefix - suffix;
        let new_mid = new_items.len() - prefix - suffix;
        let overlap = old_mid.min(new_mid);

        for t in 0..overlap {
            let index = prefix + t;
            self.update_list_item(
                target,
                item_schema,
                index,
                index,
                &old_items[index],
                &new_items[index],
                path,
                slots,
                out,
            )?;
        }
        // Boundary delete run, highest index first so earlier deletes do not
        // shift later ones.
        for index in (prefix + overlap..prefix + old_mid).rev() {
            out.push(Change::new(
                ChangeTarget::Container(target.clone()),
                ChangeOp::Delete {
                    key: Key::Index(index),
                },
            ));
        }
        for t in overlap..new_mid {
            let index = prefix + t;
            self.insert_list_item(target, item_schema, index, &new_items[index], out);
        }
        Ok(())
    }

    /// Identity-aligned merge diff for lists with an id selector.
    ///
    /// Single left-to-right pass over both sides; a running offset keeps
    /// emitted indices consistent with the shrinking/growing live list.
    /// New items without a resolvable id are pure inserts, never errors.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn diff_keyed_list(
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

        let old_ids: Vec<Option<String>> = old_items.iter().map(|v| selector.select(v)).collect();
        let new_ids: Vec<Option<String>> = new_items.iter().map(|v| selector.select(v)).collect();
        check_duplicate_ids(&old_ids, path)?;
        check_duplicate_ids(&new_ids, path)?;
        let old_id_set: HashSet<&str> =
            old_ids.iter().flatten().map(String::as_str).collect();

        let mut i = 0;
        let mut j = 0;
        let mut offset: isize = 0;
        while i < old_items.len() && j < new_items.len() {
            let live = (i as isize + offset) as usize;
            match (&old_ids[i], &new_ids[j]) {
                (Some(old_id), Some(new_id)) if old_id == new_id => {
                    self.update_list_item(
                        target,
                        item_schema,
                        live,
                        i,
                        &old_items[i],
                        &new_items[j],
                        path,
                        slots,
                        out,
                    )?;
                    i += 1;
                    j += 1;
                }
                (_, new_id)
                    if new_id
                        .as_deref()
                        .is_none_or(|id| !old_id_set.contains(id)) =>
                {
                    self.insert_list_item(target, item_schema, live, &new_items[j], out);
                    offset += 1;
                    j += 1;
                }
                _ => {
                    out.push(Change::new(
                        ChangeTarget::Container(target.clone()),
                        ChangeOp::Delete {
                            key: Key::Index(live),
                        },
                    ));
                    offset -= 1;
                    i += 1;
                }
            }
        }
        while i < old_items.len() {
            let live = (i as isize + offset) as usize;
            out.push(Change::new(
                ChangeTarget::Container(target.clone()),
                ChangeOp::Delete {
                    key: Key::Index(live),
                },
            ));
            offset -= 1;
            i += 1;
        }
        while j < new_items.len() {
            let live = (i as isize + offset) as usize;
            self.insert_list_item(target, item_schema, live, &new_items[j], out);
            offset += 1;
            j += 1;
        }
        Ok(())
    }

    /// Update one surviving list slot in place: recurse into same-kind
    /// containers, otherwise replace the value.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn update_list_item(
        &self,
        target: &ContainerID,
        item_schema: &Schema,
        emit_index: usize,
        live_index: usize,
        old_value: &Value,
        new_value: &Value,
        path: &StatePath,
        slots: &mut IdSlots,
        out: &mut Vec<Change>,
    ) -> Result<(), DiffError> {
        if old_value == new_value {
            return Ok(());
        }
        if let Some(kind) = item_schema.container_type()
            && shape_matches(item_schema, new_value)
        {
            if shape_matches(item_schema, old_value)
                && let Some(child) = self.child_in_list(target, live_index, kind)
            {
                let child_path = push_index(path, emit_index);
                return self.diff_container(
                    &child,
                    item_schema,
                    old_value,
                    new_value,
                    &child_path,
                    slots,
                    out,
                );
            }
            // Replace: drop the stale slot, then materialize a fresh
            // container at the same position.
            out.push(Change::new(
                ChangeTarget::Container(target.clone()),
                ChangeOp::Delete {
                    key: Key::Index(emit_index),
                },
            ));
            out.push(Change::new(
                ChangeTarget::Container(target.clone()),
                ChangeOp::InsertContainer {
                    key: Key::Index(emit_index),
                    kind,
                    value: new_value.clone(),
                },
            ));
            return Ok(());
        }
        out.push(Change::new(
            ChangeTarget::Container(target.clone()),
            ChangeOp::Set {
                key: Key::Index(emit_index),
                value: new_value.clone(),
            },
        ));
        Ok(())
    }

    /// Emit the insert for one new list item.
    pub(super) fn insert_list_item(
        &self,
        target: &ContainerID,
        item_schema: &Schema,
        index: usize,
        value: &Value,
        out: &mut Vec<Change>,
    ) {
        if let Some(kind) = item_schema.container_type()
            && shape_matches(item_schema, value)
        {
            out.push(Change::new(
                ChangeTarget::Container(target.clone()),
                ChangeOp::InsertContainer {
                    key: Key::Index(index),
                    kind,
                    value: value.clone(),
                },
            ));
        } else {
            out.push(Change::new(
                ChangeTarget::Container(target.clone()),
                ChangeOp::Insert {
                    index,
                    value: value.clone(),
                },
            ));
        }
    }
}

/// Two items resolving to one id within a single list is a structural error.
pub(super) fn check_duplicate_ids(
    ids: &[Option<String>],
    path: &StatePath,
) -> Result<(), DiffError> {
    let mut seen = HashSet::new();
    for id in ids.iter().flatten() {
        if !seen.insert(id.as_str()) {
            return Err(DiffError::DuplicateId {
                path: path_string(path),
                id: id.clone(),
            });
        }
    }
    Ok(())
}
