//! The event reconciler: rebuilds plain state from the live document.
//!
//! This is the remote-to-local direction of the mirror. Rather than patching
//! the cached state from individual event diffs, the reconciler re-reads the
//! affected containers wholesale; the document is always authoritative, so a
//! rebuild can never drift. Map containers surface their id under `$cid`,
//! which is what keyed and movable list diffing uses for item identity.
//!
//! A read failure degrades the affected subtree (a nested container, a tree
//! node's data, or a whole root field) to its schema default with a warning
//! instead of poisoning the surrounding state.

use loro::{
    ContainerID, ContainerTrait, ContainerType, LoroDoc, LoroMap, LoroTree, LoroValue, TreeID,
};
use serde_json::{Map as JsonMap, Value};
use tracing::warn;

use crate::constants::{CID_KEY, TREE_CHILDREN_KEY, TREE_DATA_KEY, TREE_ID_KEY};
use crate::schema::{Schema, default_value};
use crate::value::loro_to_json;

/// Rebuild the whole state tree from the document, per the root schema.
pub fn state_from_doc(doc: &LoroDoc, schema: &Schema) -> Value {
    let mut out = JsonMap::new();
    let Some(fields) = schema.fields() else {
        return Value::Object(out);
    };
    for (name, field) in fields {
        if matches!(field, Schema::Ignore) {
            continue;
        }
        let Some(kind) = field.container_type() else {
            continue;
        };
        let value = match read_root(doc, name, kind, field) {
            Ok(value) => value,
            Err(err) => {
                warn!(field = %name, error = %err, "state read failed, using schema default");
                default_value(field)
            }
        };
        out.insert(name.clone(), value);
    }
    Value::Object(out)
}

fn read_root(
    doc: &LoroDoc,
    name: &str,
    kind: ContainerType,
    schema: &Schema,
) -> loro::LoroResult<Value> {
    match kind {
        ContainerType::Map => read_map(doc, &doc.get_map(name), schema),
        ContainerType::List => read_items(doc, &doc.get_list(name).get_value(), schema),
        ContainerType::MovableList => {
            read_items(doc, &doc.get_movable_list(name).get_value(), schema)
        }
        ContainerType::Text => Ok(Value::String(doc.get_text(name).to_string())),
        ContainerType::Tree => read_tree(doc, &doc.get_tree(name), schema),
        _ => Ok(Value::Null),
    }
}

/// Read one container subtree, dispatching on the live container kind.
///
/// The schema degrades gracefully: undeclared fields and untyped items read
/// as `Any`, so a remote peer introducing structure we have no schema for
/// still round-trips into state.
pub(crate) fn read_container(
    doc: &LoroDoc,
    id: &ContainerID,
    schema: &Schema,
) -> loro::LoroResult<Value> {
    match id.container_type() {
        ContainerType::Map => read_map(doc, &doc.get_map(id.clone()), schema),
        ContainerType::List => read_items(doc, &doc.get_list(id.clone()).get_value(), schema),
        ContainerType::MovableList => {
            read_items(doc, &doc.get_movable_list(id.clone()).get_value(), schema)
        }
        ContainerType::Text => Ok(Value::String(doc.get_text(id.clone()).to_string())),
        ContainerType::Tree => read_tree(doc, &doc.get_tree(id.clone()), schema),
        _ => Ok(Value::Null),
    }
}

fn read_map(doc: &LoroDoc, map: &LoroMap, schema: &Schema) -> loro::LoroResult<Value> {
    let mut out = JsonMap::new();
    if let LoroValue::Map(entries) = map.get_value() {
        for (key, raw) in entries.iter() {
            let field = schema.field(key);
            if matches!(field, Schema::Ignore) {
                continue;
            }
            let value = match raw {
                LoroValue::Container(id) => read_or_default(doc, id, field),
                plain => loro_to_json(plain),
            };
            out.insert(key.clone(), value);
        }
    }
    out.insert(CID_KEY.to_string(), Value::String(map.id().to_string()));
    Ok(Value::Object(out))
}

fn read_items(doc: &LoroDoc, items: &LoroValue, schema: &Schema) -> loro::LoroResult<Value> {
    let item_schema = schema.item_or_any();
    let LoroValue::List(items) = items else {
        return Ok(Value::Array(Vec::new()));
    };
    let mut out = Vec::with_capacity(items.len());
    for raw in items.iter() {
        let value = match raw {
            LoroValue::Container(id) => read_or_default(doc, id, item_schema),
            plain => loro_to_json(plain),
        };
        out.push(value);
    }
    Ok(Value::Array(out))
}

/// Read a nested container, degrading to its schema default on failure so
/// one unreadable child never blanks its siblings.
fn read_or_default(doc: &LoroDoc, id: &ContainerID, schema: &Schema) -> Value {
    match read_container(doc, id, schema) {
        Ok(value) => value,
        Err(err) => {
            warn!(container = %id, error = %err, "nested read failed, using schema default");
            default_value(schema)
        }
    }
}

fn read_tree(doc: &LoroDoc, tree: &LoroTree, schema: &Schema) -> loro::LoroResult<Value> {
    let data_schema = Schema::Map {
        fields: schema.node_fields().cloned().unwrap_or_default(),
    };
    read_forest(doc, tree, None, &data_schema)
}

fn read_forest(
    doc: &LoroDoc,
    tree: &LoroTree,
    parent: Option<TreeID>,
    data_schema: &Schema,
) -> loro::LoroResult<Value> {
    let mut out = Vec::new();
    for id in tree.children(parent).unwrap_or_default() {
        let data = match tree.get_meta(id).and_then(|meta| read_map(doc, &meta, data_schema)) {
            Ok(data) => data,
            Err(err) => {
                warn!(node = %id, error = %err, "node data read failed, using empty data");
                Value::Object(JsonMap::new())
            }
        };
        let mut node = JsonMap::new();
        node.insert(TREE_ID_KEY.to_string(), Value::String(id.to_string()));
        node.insert(TREE_DATA_KEY.to_string(), data);
        node.insert(
            TREE_CHILDREN_KEY.to_string(),
            read_forest(doc, tree, Some(id), data_schema)?,
        );
        out.push(Value::Object(node));
    }
    Ok(Value::Array(out))
}
