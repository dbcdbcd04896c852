//! The change applier: executes an edit script against the live document.
//!
//! Changes are grouped by target container, every target is resolved and
//! kind-checked before the first mutation, and ops are then applied strictly
//! in emission order. List indices in a script are only meaningful under that
//! sequential order, so the applier never reorders within a target.
//!
//! Tree creation resolves the two-phase protocol from [`crate::change`]:
//! each `TreeCreate` fills its [`SlotId`] with the engine-assigned id the
//! moment the node exists, so later ops in the same batch can reference it
//! through [`TreeRef::Pending`].

pub mod errors;

pub use errors::ApplyError;

use std::collections::HashMap;

use loro::{
    Container, ContainerID, ContainerTrait, ContainerType, LoroDoc, LoroList, LoroMap,
    LoroMovableList, LoroText, LoroTree, TreeID, ValueOrContainer,
};
use serde_json::Value;

use crate::change::{Change, ChangeOp, ChangeTarget, IdSlots, Key, TreeRef};
use crate::constants::{CID_KEY, TREE_CHILDREN_KEY, TREE_DATA_KEY};
use crate::schema::Schema;
use crate::value::json_to_loro;

#[cfg(doc)]
use crate::change::SlotId;

/// Applies edit scripts to one live document.
pub struct Applier<'a> {
    doc: &'a LoroDoc,
    root: &'a Schema,
}

/// A resolved container the applier can mutate.
enum Handle {
    Map(LoroMap),
    List(LoroList),
    Movable(LoroMovableList),
    Text(LoroText),
    Tree(LoroTree),
}

impl Handle {
    fn id(&self) -> ContainerID {
        match self {
            Handle::Map(h) => h.id(),
            Handle::List(h) => h.id(),
            Handle::Movable(h) => h.id(),
            Handle::Text(h) => h.id(),
            Handle::Tree(h) => h.id(),
        }
    }
}

/// Plain and movable lists share most op handling; this folds the two
/// handle types into one seam.
enum ListHandle {
    Plain(LoroList),
    Movable(LoroMovableList),
}

impl ListHandle {
    fn id(&self) -> ContainerID {
        match self {
            ListHandle::Plain(h) => h.id(),
            ListHandle::Movable(h) => h.id(),
        }
    }

    fn insert(&self, index: usize, value: &Value) -> Result<(), ApplyError> {
        match self {
            ListHandle::Plain(h) => h.insert(index, json_to_loro(value))?,
            ListHandle::Movable(h) => h.insert(index, json_to_loro(value))?,
        }
        Ok(())
    }

    fn delete(&self, index: usize, len: usize) -> Result<(), ApplyError> {
        match self {
            ListHandle::Plain(h) => h.delete(index, len)?,
            ListHandle::Movable(h) => h.delete(index, len)?,
        }
        Ok(())
    }

    /// In-place overwrite. Plain lists have no set op, so they splice.
    fn set(&self, index: usize, value: &Value) -> Result<(), ApplyError> {
        match self {
            ListHandle::Plain(h) => {
                h.delete(index, 1)?;
                h.insert(index, json_to_loro(value))?;
            }
            ListHandle::Movable(h) => h.set(index, json_to_loro(value))?,
        }
        Ok(())
    }
}

impl<'a> Applier<'a> {
    pub fn new(doc: &'a LoroDoc, root: &'a Schema) -> Self {
        Self { doc, root }
    }

    /// Apply a change script.
    ///
    /// `lookup` resolves a container id to its schema; a `None` result means
    /// the container is no longer tracked and the whole script is rejected
    /// before any mutation. The caller owns committing the transaction.
    pub fn apply<F>(
        &self,
        changes: &[Change],
        slots: &mut IdSlots,
        lookup: F,
    ) -> Result<(), ApplyError>
    where
        F: Fn(&ContainerID) -> Option<Schema>,
    {
        let mut groups: Vec<(&ChangeTarget, Vec<&ChangeOp>)> = Vec::new();
        let mut by_target: HashMap<&ChangeTarget, usize> = HashMap::new();
        for change in changes {
            let at = *by_target.entry(&change.target).or_insert_with(|| {
                groups.push((&change.target, Vec::new()));
                groups.len() - 1
            });
            groups[at].1.push(&change.op);
        }

        // Resolve and kind-check every target up front so a stale or
        // mismatched reference fails the script atomically.
        let mut resolved: Vec<Option<Schema>> = Vec::with_capacity(groups.len());
        for (target, _) in &groups {
            match target {
                ChangeTarget::Root => resolved.push(None),
                ChangeTarget::Container(cid) => {
                    let schema = lookup(cid).ok_or_else(|| ApplyError::StaleContainer {
                        id: cid.to_string(),
                    })?;
                    let Some(kind) = schema.container_type() else {
                        return Err(ApplyError::KindMismatch {
                            id: cid.to_string(),
                            expected: schema.kind_name().to_string(),
                            actual: kind_str(cid.container_type()).to_string(),
                        });
                    };
                    if kind != cid.container_type() {
                        return Err(ApplyError::KindMismatch {
                            id: cid.to_string(),
                            expected: kind_str(kind).to_string(),
                            actual: kind_str(cid.container_type()).to_string(),
                        });
                    }
                    resolved.push(Some(schema));
                }
            }
        }

        for ((target, ops), schema) in groups.iter().zip(&resolved) {
            match target {
                ChangeTarget::Root => self.apply_root(ops)?,
                ChangeTarget::Container(cid) => {
                    // Pre-flight guarantees a schema for every container.
                    if let Some(schema) = schema {
                        self.apply_to_container(cid, schema, ops, slots)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_to_container(
        &self,
        cid: &ContainerID,
        schema: &Schema,
        ops: &[&ChangeOp],
        slots: &mut IdSlots,
    ) -> Result<(), ApplyError> {
        match schema {
            Schema::Map { .. } => self.apply_map(&self.doc.get_map(cid.clone()), schema, ops),
            Schema::List { .. } => {
                self.apply_list(&ListHandle::Plain(self.doc.get_list(cid.clone())), schema, ops)
            }
            Schema::MovableList { .. } => self.apply_list(
                &ListHandle::Movable(self.doc.get_movable_list(cid.clone())),
                schema,
                ops,
            ),
            Schema::Text => self.apply_text(&self.doc.get_text(cid.clone()), ops),
            Schema::Tree { .. } => {
                self.apply_tree(&self.doc.get_tree(cid.clone()), schema, ops, slots)
            }
            other => Err(ApplyError::KindMismatch {
                id: cid.to_string(),
                expected: other.kind_name().to_string(),
                actual: kind_str(cid.container_type()).to_string(),
            }),
        }
    }

    /// Ops addressed to the document root. The key names a root container
    /// field, optionally dotted to reach inside it.
    fn apply_root(&self, ops: &[&ChangeOp]) -> Result<(), ApplyError> {
        for op in ops {
            match op {
                ChangeOp::Set {
                    key: Key::Field(key),
                    value,
                }
                | ChangeOp::InsertContainer {
                    key: Key::Field(key),
                    value,
                    ..
                } => self.root_set(key, value)?,
                ChangeOp::Delete {
                    key: Key::Field(key),
                } => self.root_delete(key)?,
                other => {
                    return Err(ApplyError::UnsupportedOp {
                        id: "root".to_string(),
                        kind: "root",
                        op: op_name(other),
                    });
                }
            }
        }
        Ok(())
    }

    fn root_set(&self, key: &str, value: &Value) -> Result<(), ApplyError> {
        let (head, rest) = split_head(key);
        let field = self.root.field(head);
        let handle = self.root_handle(head, field, key)?;
        match rest {
            None => self.replace_contents(&handle, field, value),
            Some(rest) => self.descend_set(handle, field, rest, value),
        }
    }

    fn root_delete(&self, key: &str) -> Result<(), ApplyError> {
        let (head, rest) = split_head(key);
        let field = self.root.field(head);
        let handle = self.root_handle(head, field, key)?;
        match rest {
            None => self.clear_contents(&handle),
            Some(rest) => self.descend_delete(handle, field, rest),
        }
    }

    /// The live root container for a field; root primitives do not exist.
    fn root_handle(&self, name: &str, field: &Schema, key: &str) -> Result<Handle, ApplyError> {
        match field.container_type() {
            Some(ContainerType::Map) => Ok(Handle::Map(self.doc.get_map(name))),
            Some(ContainerType::List) => Ok(Handle::List(self.doc.get_list(name))),
            Some(ContainerType::MovableList) => Ok(Handle::Movable(self.doc.get_movable_list(name))),
            Some(ContainerType::Text) => Ok(Handle::Text(self.doc.get_text(name))),
            Some(ContainerType::Tree) => {
                let tree = self.doc.get_tree(name);
                tree.enable_fractional_index(0);
                Ok(Handle::Tree(tree))
            }
            _ => Err(ApplyError::InvalidKey {
                id: "root".to_string(),
                key: key.to_string(),
            }),
        }
    }

    fn apply_map(
        &self,
        map: &LoroMap,
        schema: &Schema,
        ops: &[&ChangeOp],
    ) -> Result<(), ApplyError> {
        for op in ops {
            match op {
                ChangeOp::Set {
                    key: Key::Field(key),
                    value,
                } => {
                    if key.contains('.') {
                        self.descend_set(Handle::Map(map.clone()), schema, key, value)?;
                        continue;
                    }
                    let field = schema.field(key);
                    match field.container_type() {
                        Some(kind) if field.value_fits(value) => {
                            self.create_in_map(map, key, kind, value, field)?;
                        }
                        _ => {
                            map.insert(key, json_to_loro(value))?;
                        }
                    }
                }
                ChangeOp::Delete {
                    key: Key::Field(key),
                } => {
                    if key.contains('.') {
                        self.descend_delete(Handle::Map(map.clone()), schema, key)?;
                    } else {
                        map.delete(key)?;
                    }
                }
                ChangeOp::InsertContainer {
                    key: Key::Field(key),
                    kind,
                    value,
                } => {
                    self.create_in_map(map, key, *kind, value, schema.field(key))?;
                }
                other => {
                    return Err(ApplyError::UnsupportedOp {
                        id: map.id().to_string(),
                        kind: "map",
                        op: op_name(other),
                    });
                }
            }
        }
        Ok(())
    }

    fn apply_list(
        &self,
        list: &ListHandle,
        schema: &Schema,
        ops: &[&ChangeOp],
    ) -> Result<(), ApplyError> {
        let item = schema.item_or_any();
        for op in ops {
            match op {
                ChangeOp::Insert { index, value } => list.insert(*index, value)?,
                ChangeOp::Delete {
                    key: Key::Index(index),
                } => list.delete(*index, 1)?,
                ChangeOp::Set {
                    key: Key::Index(index),
                    value,
                } => match item.container_type() {
                    Some(kind) if item.value_fits(value) => {
                        list.delete(*index, 1)?;
                        self.create_in_list(list, *index, kind, value, item)?;
                    }
                    _ => list.set(*index, value)?,
                },
                ChangeOp::Set {
                    key: Key::Field(key),
                    value,
                } if key.contains('.') => {
                    self.descend_set(self.list_as_handle(list), schema, key, value)?;
                }
                ChangeOp::Delete {
                    key: Key::Field(key),
                } if key.contains('.') => {
                    self.descend_delete(self.list_as_handle(list), schema, key)?;
                }
                ChangeOp::InsertContainer {
                    key: Key::Index(index),
                    kind,
                    value,
                } => self.create_in_list(list, *index, *kind, value, item)?,
                ChangeOp::Move { from, to } => match list {
                    ListHandle::Movable(h) => h.mov(*from, *to)?,
                    ListHandle::Plain(_) => {
                        return Err(ApplyError::UnsupportedOp {
                            id: list.id().to_string(),
                            kind: "list",
                            op: "move",
                        });
                    }
                },
                other => {
                    return Err(ApplyError::UnsupportedOp {
                        id: list.id().to_string(),
                        kind: match list {
                            ListHandle::Plain(_) => "list",
                            ListHandle::Movable(_) => "movable-list",
                        },
                        op: op_name(other),
                    });
                }
            }
        }
        Ok(())
    }

    fn list_as_handle(&self, list: &ListHandle) -> Handle {
        match list {
            ListHandle::Plain(h) => Handle::List(h.clone()),
            ListHandle::Movable(h) => Handle::Movable(h.clone()),
        }
    }

    fn apply_text(&self, text: &LoroText, ops: &[&ChangeOp]) -> Result<(), ApplyError> {
        for op in ops {
            match op {
                ChangeOp::TextReplace { value } => replace_text(text, value)?,
                other => {
                    return Err(ApplyError::UnsupportedOp {
                        id: text.id().to_string(),
                        kind: "text",
                        op: op_name(other),
                    });
                }
            }
        }
        Ok(())
    }

    fn apply_tree(
        &self,
        tree: &LoroTree,
        schema: &Schema,
        ops: &[&ChangeOp],
        slots: &mut IdSlots,
    ) -> Result<(), ApplyError> {
        // Sibling indices only hold if positional ordering is on.
        tree.enable_fractional_index(0);
        let data_schema = Schema::Map {
            fields: schema.node_fields().cloned().unwrap_or_default(),
        };
        for op in ops {
            match op {
                ChangeOp::TreeCreate {
                    parent,
                    index,
                    data,
                    slot,
                } => {
                    let parent_id = resolve_tree_ref(*parent, slots)?;
                    let id = tree.create_at(parent_id, *index)?;
                    slots.resolve(*slot, id);
                    let meta = tree.get_meta(id)?;
                    self.fill_map(&meta, data, &data_schema)?;
                }
                ChangeOp::TreeMove {
                    target,
                    parent,
                    index,
                } => {
                    let parent_id = resolve_tree_ref(*parent, slots)?;
                    tree.mov_to(*target, parent_id, *index)?;
                }
                ChangeOp::TreeDelete { target } => tree.delete(*target)?,
                other => {
                    return Err(ApplyError::UnsupportedOp {
                        id: tree.id().to_string(),
                        kind: "tree",
                        op: op_name(other),
                    });
                }
            }
        }
        Ok(())
    }

    // ---- dotted-path descent ----------------------------------------------

    fn descend_set(
        &self,
        start: Handle,
        schema: &Schema,
        key: &str,
        value: &Value,
    ) -> Result<(), ApplyError> {
        let (handle, leaf_schema, leaf) = self.descend(start, schema, key)?;
        self.set_leaf(&handle, leaf_schema, leaf, value, key)
    }

    fn descend_delete(&self, start: Handle, schema: &Schema, key: &str) -> Result<(), ApplyError> {
        let (handle, _, leaf) = self.descend(start, schema, key)?;
        self.delete_leaf(&handle, leaf, key)
    }

    /// Walk all but the last segment of a dotted key, returning the parent
    /// handle, its schema, and the leaf segment.
    fn descend<'s>(
        &self,
        start: Handle,
        schema: &'s Schema,
        key: &'s str,
    ) -> Result<(Handle, &'s Schema, &'s str), ApplyError> {
        let mut segments = key.split('.');
        let mut leaf = segments.next().unwrap_or_default();
        let mut handle = start;
        let mut current = schema;
        for next in segments {
            let (child, child_schema) = self.step(&handle, current, leaf, key)?;
            handle = child;
            current = child_schema;
            leaf = next;
        }
        Ok((handle, current, leaf))
    }

    /// One step into a child container.
    fn step<'s>(
        &self,
        handle: &Handle,
        schema: &'s Schema,
        seg: &str,
        key: &str,
    ) -> Result<(Handle, &'s Schema), ApplyError> {
        let invalid = || ApplyError::InvalidKey {
            id: handle.id().to_string(),
            key: key.to_string(),
        };
        let entry = match handle {
            Handle::Map(map) => map.get(seg),
            Handle::List(list) => {
                let index: usize = seg.parse().map_err(|_| invalid())?;
                list.get(index)
            }
            Handle::Movable(list) => {
                let index: usize = seg.parse().map_err(|_| invalid())?;
                list.get(index)
            }
            _ => return Err(invalid()),
        };
        let Some(ValueOrContainer::Container(container)) = entry else {
            return Err(invalid());
        };
        let child_schema = match handle {
            Handle::Map(_) => schema.field(seg),
            _ => schema.item_or_any(),
        };
        Ok((self.wrap(&container, key)?, child_schema))
    }

    fn wrap(&self, container: &Container, key: &str) -> Result<Handle, ApplyError> {
        let id = container.id();
        match id.container_type() {
            ContainerType::Map => Ok(Handle::Map(self.doc.get_map(id))),
            ContainerType::List => Ok(Handle::List(self.doc.get_list(id))),
            ContainerType::MovableList => Ok(Handle::Movable(self.doc.get_movable_list(id))),
            ContainerType::Text => Ok(Handle::Text(self.doc.get_text(id))),
            ContainerType::Tree => Ok(Handle::Tree(self.doc.get_tree(id))),
            _ => Err(ApplyError::InvalidKey {
                id: id.to_string(),
                key: key.to_string(),
            }),
        }
    }

    fn set_leaf(
        &self,
        handle: &Handle,
        schema: &Schema,
        leaf: &str,
        value: &Value,
        key: &str,
    ) -> Result<(), ApplyError> {
        let invalid = || ApplyError::InvalidKey {
            id: handle.id().to_string(),
            key: key.to_string(),
        };
        match handle {
            Handle::Map(map) => {
                let field = schema.field(leaf);
                match field.container_type() {
                    Some(kind) if field.value_fits(value) => {
                        self.create_in_map(map, leaf, kind, value, field)
                    }
                    _ => {
                        map.insert(leaf, json_to_loro(value))?;
                        Ok(())
                    }
                }
            }
            Handle::List(list) => {
                let index: usize = leaf.parse().map_err(|_| invalid())?;
                self.set_list_leaf(&ListHandle::Plain(list.clone()), schema, index, value)
            }
            Handle::Movable(list) => {
                let index: usize = leaf.parse().map_err(|_| invalid())?;
                self.set_list_leaf(&ListHandle::Movable(list.clone()), schema, index, value)
            }
            _ => Err(invalid()),
        }
    }

    fn set_list_leaf(
        &self,
        list: &ListHandle,
        schema: &Schema,
        index: usize,
        value: &Value,
    ) -> Result<(), ApplyError> {
        let item = schema.item_or_any();
        match item.container_type() {
            Some(kind) if item.value_fits(value) => {
                list.delete(index, 1)?;
                self.create_in_list(list, index, kind, value, item)
            }
            _ => list.set(index, value),
        }
    }

    fn delete_leaf(&self, handle: &Handle, leaf: &str, key: &str) -> Result<(), ApplyError> {
        let invalid = || ApplyError::InvalidKey {
            id: handle.id().to_string(),
            key: key.to_string(),
        };
        match handle {
            Handle::Map(map) => {
                map.delete(leaf)?;
                Ok(())
            }
            Handle::List(list) => {
                let index: usize = leaf.parse().map_err(|_| invalid())?;
                list.delete(index, 1)?;
                Ok(())
            }
            Handle::Movable(list) => {
                let index: usize = leaf.parse().map_err(|_| invalid())?;
                list.delete(index, 1)?;
                Ok(())
            }
            _ => Err(invalid()),
        }
    }

    // ---- container creation and filling -----------------------------------

    /// Create (or overwrite) a child container at a map key and fill it from
    /// a plain value.
    fn create_in_map(
        &self,
        map: &LoroMap,
        key: &str,
        kind: ContainerType,
        value: &Value,
        schema: &Schema,
    ) -> Result<(), ApplyError> {
        match kind {
            ContainerType::Map => {
                let child = map.insert_container(key, LoroMap::new())?;
                self.fill_map(&child, value, schema)
            }
            ContainerType::List => {
                let child = map.insert_container(key, LoroList::new())?;
                self.fill_list(&ListHandle::Plain(child), value, schema)
            }
            ContainerType::MovableList => {
                let child = map.insert_container(key, LoroMovableList::new())?;
                self.fill_list(&ListHandle::Movable(child), value, schema)
            }
            ContainerType::Text => {
                let child = map.insert_container(key, LoroText::new())?;
                fill_text(&child, value)
            }
            ContainerType::Tree => {
                let child = map.insert_container(key, LoroTree::new())?;
                child.enable_fractional_index(0);
                self.fill_tree(&child, value, schema)
            }
            _ => Err(ApplyError::UnsupportedOp {
                id: map.id().to_string(),
                kind: "map",
                op: "insert-container",
            }),
        }
    }

    /// Insert a child container at a list index and fill it from a plain
    /// value.
    fn create_in_list(
        &self,
        list: &ListHandle,
        index: usize,
        kind: ContainerType,
        value: &Value,
        schema: &Schema,
    ) -> Result<(), ApplyError> {
        match kind {
            ContainerType::Map => {
                let child = match list {
                    ListHandle::Plain(h) => h.insert_container(index, LoroMap::new())?,
                    ListHandle::Movable(h) => h.insert_container(index, LoroMap::new())?,
                };
                self.fill_map(&child, value, schema)
            }
            ContainerType::List => {
                let child = match list {
                    ListHandle::Plain(h) => h.insert_container(index, LoroList::new())?,
                    ListHandle::Movable(h) => h.insert_container(index, LoroList::new())?,
                };
                self.fill_list(&ListHandle::Plain(child), value, schema)
            }
            ContainerType::MovableList => {
                let child = match list {
                    ListHandle::Plain(h) => h.insert_container(index, LoroMovableList::new())?,
                    ListHandle::Movable(h) => h.insert_container(index, LoroMovableList::new())?,
                };
                self.fill_list(&ListHandle::Movable(child), value, schema)
            }
            ContainerType::Text => {
                let child = match list {
                    ListHandle::Plain(h) => h.insert_container(index, LoroText::new())?,
                    ListHandle::Movable(h) => h.insert_container(index, LoroText::new())?,
                };
                fill_text(&child, value)
            }
            ContainerType::Tree => {
                let child = match list {
                    ListHandle::Plain(h) => h.insert_container(index, LoroTree::new())?,
                    ListHandle::Movable(h) => h.insert_container(index, LoroTree::new())?,
                };
                child.enable_fractional_index(0);
                self.fill_tree(&child, value, schema)
            }
            _ => Err(ApplyError::UnsupportedOp {
                id: list.id().to_string(),
                kind: "list",
                op: "insert-container",
            }),
        }
    }

    /// Fill a fresh map container from a plain object, materializing nested
    /// containers per schema. `$cid` and ignored fields never land in the
    /// document.
    fn fill_map(&self, map: &LoroMap, value: &Value, schema: &Schema) -> Result<(), ApplyError> {
        let Some(entries) = value.as_object() else {
            return Ok(());
        };
        for (key, entry) in entries {
            if key == CID_KEY {
                continue;
            }
            let field = schema.field(key);
            if matches!(field, Schema::Ignore) {
                continue;
            }
            match field.container_type() {
                Some(kind) if field.value_fits(entry) => {
                    self.create_in_map(map, key, kind, entry, field)?;
                }
                _ => {
                    map.insert(key, json_to_loro(entry))?;
                }
            }
        }
        Ok(())
    }

    fn fill_list(
        &self,
        list: &ListHandle,
        value: &Value,
        schema: &Schema,
    ) -> Result<(), ApplyError> {
        let Some(items) = value.as_array() else {
            return Ok(());
        };
        let item = schema.item_or_any();
        for (index, entry) in items.iter().enumerate() {
            match item.container_type() {
                Some(kind) if item.value_fits(entry) => {
                    self.create_in_list(list, index, kind, entry, item)?;
                }
                _ => list.insert(index, entry)?,
            }
        }
        Ok(())
    }

    fn fill_tree(&self, tree: &LoroTree, value: &Value, schema: &Schema) -> Result<(), ApplyError> {
        let Some(nodes) = value.as_array() else {
            return Ok(());
        };
        let data_schema = Schema::Map {
            fields: schema.node_fields().cloned().unwrap_or_default(),
        };
        self.fill_tree_nodes(tree, None, nodes, &data_schema)
    }

    fn fill_tree_nodes(
        &self,
        tree: &LoroTree,
        parent: Option<TreeID>,
        nodes: &[Value],
        data_schema: &Schema,
    ) -> Result<(), ApplyError> {
        for (index, node) in nodes.iter().enumerate() {
            let Some(obj) = node.as_object() else {
                continue;
            };
            let id = tree.create_at(parent, index)?;
            if let Some(data) = obj.get(TREE_DATA_KEY) {
                let meta = tree.get_meta(id)?;
                self.fill_map(&meta, data, data_schema)?;
            }
            if let Some(children) = obj.get(TREE_CHILDREN_KEY).and_then(Value::as_array) {
                self.fill_tree_nodes(tree, Some(id), children, data_schema)?;
            }
        }
        Ok(())
    }

    /// Replace the full contents of a root container with a plain value.
    fn replace_contents(
        &self,
        handle: &Handle,
        schema: &Schema,
        value: &Value,
    ) -> Result<(), ApplyError> {
        self.clear_contents(handle)?;
        match handle {
            Handle::Map(map) => self.fill_map(map, value, schema),
            Handle::List(list) => self.fill_list(&ListHandle::Plain(list.clone()), value, schema),
            Handle::Movable(list) => {
                self.fill_list(&ListHandle::Movable(list.clone()), value, schema)
            }
            Handle::Text(text) => fill_text(text, value),
            Handle::Tree(tree) => self.fill_tree(tree, value, schema),
        }
    }

    fn clear_contents(&self, handle: &Handle) -> Result<(), ApplyError> {
        match handle {
            Handle::Map(map) => map.clear()?,
            Handle::List(list) => list.clear()?,
            Handle::Movable(list) => list.clear()?,
            Handle::Text(text) => {
                let len = text.len_unicode();
                if len > 0 {
                    text.delete(0, len)?;
                }
            }
            Handle::Tree(tree) => {
                for root in tree.children(None).unwrap_or_default() {
                    tree.delete(root)?;
                }
            }
        }
        Ok(())
    }
}

fn resolve_tree_ref(r: TreeRef, slots: &IdSlots) -> Result<Option<TreeID>, ApplyError> {
    match r {
        TreeRef::Root => Ok(None),
        TreeRef::Node(id) => Ok(Some(id)),
        TreeRef::Pending(slot) => slots
            .get(slot)
            .map(Some)
            .ok_or(ApplyError::UnresolvedSlot { slot: slot.index() }),
    }
}

fn replace_text(text: &LoroText, value: &str) -> Result<(), ApplyError> {
    let len = text.len_unicode();
    if len > 0 {
        text.delete(0, len)?;
    }
    if !value.is_empty() {
        text.insert(0, value)?;
    }
    Ok(())
}

fn fill_text(text: &LoroText, value: &Value) -> Result<(), ApplyError> {
    let content = value.as_str().unwrap_or("");
    if !content.is_empty() {
        text.insert(0, content)?;
    }
    Ok(())
}

fn kind_str(kind: ContainerType) -> &'static str {
    match kind {
        ContainerType::Map => "map",
        ContainerType::List => "list",
        ContainerType::MovableList => "movable-list",
        ContainerType::Text => "text",
        ContainerType::Tree => "tree",
        _ => "unknown",
    }
}

fn op_name(op: &ChangeOp) -> &'static str {
    match op {
        ChangeOp::Set { .. } => "set",
        ChangeOp::Delete { .. } => "delete",
        ChangeOp::Insert { .. } => "insert",
        ChangeOp::InsertContainer { .. } => "insert-container",
        ChangeOp::Move { .. } => "move",
        ChangeOp::TextReplace { .. } => "text-replace",
        ChangeOp::TreeCreate { .. } => "tree-create",
        ChangeOp::TreeMove { .. } => "tree-move",
        ChangeOp::TreeDelete { .. } => "tree-delete",
    }
}

/// Splits a dotted key into its first segment and the rest.
fn split_head(key: &str) -> (&str, Option<&str>) {
    match key.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (key, None),
    }
}
