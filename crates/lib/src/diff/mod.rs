//! The diff engine: compares an old and a new state subtree against the
//! corresponding live container and produces an ordered list of [`Change`]
//! records.
//!
//! One algorithm per container kind (map, plain list, keyed list, movable
//! list, tree, text). All functions are read-only with respect to the
//! document: the emitted script is applied later, atomically, by the
//! change applier. Emitted list indices are valid under strictly sequential
//! application of the script.

pub mod errors;
mod list;
mod movable;
mod tree;

pub use errors::DiffError;

use loro::{Container, ContainerID, ContainerTrait, ContainerType, LoroDoc, ValueOrContainer};
use serde_json::Value;

use crate::change::{Change, ChangeOp, ChangeTarget, IdSlots, Key, PathSeg, StatePath};
use crate::constants::CID_KEY;
use crate::schema::{Schema, default_value};
use crate::value::value_kind;

/// Computes edit scripts between state snapshots over one live document.
pub struct DiffEngine<'a> {
    doc: &'a LoroDoc,
}

impl<'a> DiffEngine<'a> {
    pub fn new(doc: &'a LoroDoc) -> Self {
        Self { doc }
    }

    /// Diff the whole state tree against the root schema.
    ///
    /// Root fields missing from `new` are left untouched; root fields missing
    /// from `old` are compared against the schema default.
    pub fn diff_root(
        &self,
        schema: &Schema,
        old: &Value,
        new: &Value,
        slots: &mut IdSlots,
    ) -> Result<Vec<Change>, DiffError> {
        let mut changes = Vec::new();
        let Some(fields) = schema.fields() else {
            return Ok(changes);
        };
        for (name, field) in fields {
            if matches!(field, Schema::Ignore) {
                continue;
            }
            let Some(new_value) = new.get(name) else {
                continue;
            };
            let default;
            let old_value = match old.get(name) {
                Some(v) => v,
                None => {
                    default = default_value(field);
                    &default
                }
            };
            if old_value == new_value {
                continue;
            }
            let target = self.root_container(name, field);
            let path = vec![PathSeg::Key(name.clone())];
            self.diff_container(&target, field, old_value, new_value, &path, slots, &mut changes)?;
        }
        Ok(changes)
    }

    /// Diff one container subtree, dispatching on the schema kind.
    pub fn diff_container(
        &self,
        target: &ContainerID,
        schema: &Schema,
        old: &Value,
        new: &Value,
        path: &StatePath,
        slots: &mut IdSlots,
        out: &mut Vec<Change>,
    ) -> Result<(), DiffError> {
        match schema {
            Schema::Map { .. } => self.diff_map(target, schema, old, new, path, slots, out),
            Schema::List { id_selector, .. } => match id_selector {
                Some(sel) => {
                    self.diff_keyed_list(target, schema, sel.clone(), old, new, path, slots, out)
                }
                None => self.diff_plain_list(target, schema, old, new, path, slots, out),
            },
            Schema::MovableList { id_selector, .. } => {
                self.diff_movable_list(target, schema, id_selector.clone(), old, new, path, slots, out)
            }
            Schema::Text => self.diff_text(target, old, new, path, out),
            Schema::Tree { .. } => self.diff_tree(target, schema, old, new, path, slots, out),
            // Primitive schemas never own a container; nothing to diff here.
            _ => Ok(()),
        }
    }

    /// Key-wise map diff; the root map follows the same semantics.
    #[allow(clippy::too_many_arguments)]
    fn diff_map(
        &self,
        target: &ContainerID,
        schema: &Schema,
        old: &Value,
        new: &Value,
        path: &StatePath,
        slots: &mut IdSlots,
        out: &mut Vec<Change>,
    ) -> Result<(), DiffError> {
        let empty = serde_json::Map::new();
        let old_map = old.as_object().unwrap_or(&empty);
        let Some(new_map) = new.as_object() else {
            return Err(type_mismatch(path, "object", new));
        };

        for key in old_map.keys() {
            if key == CID_KEY || matches!(schema.field(key), Schema::Ignore) {
                continue;
            }
            if !new_map.contains_key(key) {
                out.push(Change::new(
                    ChangeTarget::Container(target.clone()),
                    ChangeOp::Delete {
                        key: Key::Field(key.clone()),
                    },
                ));
            }
        }

        for (key, new_value) in new_map {
            if key == CID_KEY {
                continue;
            }
            let field = schema.field(key);
            if matches!(field, Schema::Ignore) {
                continue;
            }
            let old_value = old_map.get(key);
            // Value equality, never truthiness: "", 0, and null are values.
            if old_value == Some(new_value) {
                continue;
            }
            self.diff_map_entry(target, field, key, old_value, new_value, path, slots, out)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn diff_map_entry(
        &self,
        target: &ContainerID,
        field: &Schema,
        key: &str,
        old_value: Option<&Value>,
        new_value: &Value,
        path: &StatePath,
        slots: &mut IdSlots,
        out: &mut Vec<Change>,
    ) -> Result<(), DiffError> {
        let container_kind = field.container_type();
        let new_fits = container_kind.is_some() && shape_matches(field, new_value);

        if let Some(kind) = container_kind
            && new_fits
        {
            let old_fits = old_value.is_some_and(|v| shape_matches(field, v));
            if old_fits {
                // Same container type on both sides: preserve identity and
                // recurse through the live child, if one exists.
                if let Some(child) = self.child_in_map(target, key, kind) {
                    let child_path = push_key(path, key);
                    return self.diff_container(
                        &child,
                        field,
                        old_value.unwrap_or(&Value::Null),
                        new_value,
                        &child_path,
                        slots,
                        out,
                    );
                }
            }
            out.push(Change::new(
                ChangeTarget::Container(target.clone()),
                ChangeOp::InsertContainer {
                    key: Key::Field(key.to_string()),
                    kind,
                    value: new_value.clone(),
                },
            ));
            return Ok(());
        }

        out.push(Change::new(
            ChangeTarget::Container(target.clone()),
            ChangeOp::Set {
                key: Key::Field(key.to_string()),
                value: new_value.clone(),
            },
        ));
        Ok(())
    }

    /// Whole-value text diff: unequal strings replace, no substring diffing.
    fn diff_text(
        &self,
        target: &ContainerID,
        old: &Value,
        new: &Value,
        path: &StatePath,
        out: &mut Vec<Change>,
    ) -> Result<(), DiffError> {
        let Some(new_text) = new.as_str() else {
            return Err(type_mismatch(path, "string", new));
        };
        let old_text = old.as_str().unwrap_or("");
        if old_text != new_text {
            out.push(Change::new(
                ChangeTarget::Container(target.clone()),
                ChangeOp::TextReplace {
                    value: new_text.to_string(),
                },
            ));
        }
        Ok(())
    }

    /// The live root container for a schema field, created implicitly by the
    /// engine on first write.
    pub(crate) fn root_container(&self, name: &str, schema: &Schema) -> ContainerID {
        match schema.container_type() {
            Some(ContainerType::List) => self.doc.get_list(name).id(),
            Some(ContainerType::MovableList) => self.doc.get_movable_list(name).id(),
            Some(ContainerType::Text) => self.doc.get_text(name).id(),
            Some(ContainerType::Tree) => self.doc.get_tree(name).id(),
            _ => self.doc.get_map(name).id(),
        }
    }

    /// The live child container under a map key, if present with the
    /// expected kind.
    pub(crate) fn child_in_map(
        &self,
        parent: &ContainerID,
        key: &str,
        expected: ContainerType,
    ) -> Option<ContainerID> {
        let map = self.doc.get_map(parent.clone());
        match map.get(key) {
            Some(ValueOrContainer::Container(c)) => {
                let id = container_id(&c);
                (id.container_type() == expected).then_some(id)
            }
            _ => None,
        }
    }

    /// The live child container at a list index, if present with the
    /// expected kind.
    pub(crate) fn child_in_list(
        &self,
        parent: &ContainerID,
        index: usize,
        expected: ContainerType,
    ) -> Option<ContainerID> {
        let entry = if parent.container_type() == ContainerType::MovableList {
            self.doc.get_movable_list(parent.clone()).get(index)
        } else {
            self.doc.get_list(parent.clone()).get(index)
        };
        match entry {
            Some(ValueOrContainer::Container(c)) => {
                let id = container_id(&c);
                (id.container_type() == expected).then_some(id)
            }
            _ => None,
        }
    }
}

/// The container id of a resolved child handle.
pub(crate) fn container_id(container: &Container) -> ContainerID {
    container.id()
}

/// Whether a plain value has the shape a container schema stores.
pub(crate) fn shape_matches(schema: &Schema, value: &Value) -> bool {
    schema.value_fits(value)
}

pub(crate) fn push_key(path: &StatePath, key: &str) -> StatePath {
    let mut next = path.clone();
    next.push(PathSeg::Key(key.to_string()));
    next
}

pub(crate) fn push_index(path: &StatePath, index: usize) -> StatePath {
    let mut next = path.clone();
    next.push(PathSeg::Index(index));
    next
}

pub(crate) fn path_string(path: &StatePath) -> String {
    let mut s = String::new();
    for seg in path {
        if !s.is_empty() {
            s.push('.');
        }
        match seg {
            PathSeg::Key(key) => s.push_str(key),
            PathSeg::Index(i) => s.push_str(&i.to_string()),
        }
    }
    s
}

pub(crate) fn type_mismatch(path: &StatePath, expected: &str, actual: &Value) -> DiffError {
    DiffError::TypeMismatch {
        path: path_string(path),
        expected: expected.to_string(),
        actual: value_kind(actual).to_string(),
    }
}
