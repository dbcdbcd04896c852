//! Schema descriptions for mirrored state trees.
//!
//! A [`Schema`] is a closed tagged union describing the shape of state:
//! primitive fields, ignored fields, and the container kinds the CRDT engine
//! knows about (Map, List, MovableList, Text, Tree). Schemas are immutable
//! and shared read-only by the diff engine, the applier, and the reconciler.

pub mod errors;
pub mod infer;
pub mod validate;

pub use errors::{SchemaError, ValidationIssue};
pub use infer::{InferOptions, infer_root, infer_schema};
pub use validate::{default_value, validate};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use loro::ContainerType;
use serde_json::Value;

use crate::constants::CID_KEY;

/// Maps a list item to the stable identity used for keyed-list and
/// movable-list diffing.
#[derive(Clone)]
pub struct IdSelector(Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>);

impl IdSelector {
    /// Wrap an arbitrary selector function.
    pub fn new(f: impl Fn(&Value) -> Option<String> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Select identity from a named field of the item.
    ///
    /// String and integer fields are accepted; anything else yields no id.
    pub fn field(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(move |item| match item.get(&name) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Select identity from the synthetic `$cid` field.
    ///
    /// Items that have not been materialized yet carry no `$cid` and resolve
    /// to `None`, which the diff engine treats as "new insert".
    pub fn cid() -> Self {
        Self::new(|item| match item.get(CID_KEY) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
    }

    /// Apply the selector to an item.
    pub fn select(&self, item: &Value) -> Option<String> {
        (self.0)(item)
    }
}

impl fmt::Debug for IdSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdSelector")
    }
}

/// Shared fallback for undeclared keys and untyped list items.
static ANY: Schema = Schema::Any;

/// Shape description for one node of the state tree.
#[derive(Clone, Debug)]
pub enum Schema {
    /// A plain string field.
    String,
    /// A numeric field (integer or float).
    Number,
    /// A boolean field.
    Boolean,
    /// Any plain value; stored as-is, never recursed into.
    Any,
    /// A field the mirror never reads, writes, or validates.
    Ignore,
    /// A map container with declared fields.
    Map {
        fields: BTreeMap<String, Schema>,
    },
    /// An ordered list container. With an `id_selector` the diff aligns
    /// items by identity; without one it falls back to positional diffing.
    List {
        item: Box<Schema>,
        id_selector: Option<IdSelector>,
    },
    /// An identity-tracked movable list container. The selector is required:
    /// move detection is meaningless without item identity.
    MovableList {
        item: Box<Schema>,
        id_selector: IdSelector,
    },
    /// A rich-text container, surfaced in state as a plain string.
    Text,
    /// A hierarchical tree container whose nodes carry a data map with the
    /// declared fields.
    Tree {
        node: BTreeMap<String, Schema>,
    },
}

impl Schema {
    pub fn string() -> Self {
        Schema::String
    }

    pub fn number() -> Self {
        Schema::Number
    }

    pub fn boolean() -> Self {
        Schema::Boolean
    }

    pub fn any() -> Self {
        Schema::Any
    }

    pub fn ignore() -> Self {
        Schema::Ignore
    }

    /// A map container with the given field schemas.
    pub fn map<K: Into<String>>(fields: impl IntoIterator<Item = (K, Schema)>) -> Self {
        Schema::Map {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// A plain (positionally diffed) list container.
    pub fn list(item: Schema) -> Self {
        Schema::List {
            item: Box::new(item),
            id_selector: None,
        }
    }

    /// A list container whose diff aligns items by identity.
    pub fn keyed_list(item: Schema, id_selector: IdSelector) -> Self {
        Schema::List {
            item: Box::new(item),
            id_selector: Some(id_selector),
        }
    }

    /// A movable-list container with the given item schema and identity.
    pub fn movable_list(item: Schema, id_selector: IdSelector) -> Self {
        Schema::MovableList {
            item: Box::new(item),
            id_selector,
        }
    }

    pub fn text() -> Self {
        Schema::Text
    }

    /// A tree container whose node data maps carry the given fields.
    pub fn tree<K: Into<String>>(node: impl IntoIterator<Item = (K, Schema)>) -> Self {
        Schema::Tree {
            node: node.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Human-readable kind name, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Schema::String => "string",
            Schema::Number => "number",
            Schema::Boolean => "boolean",
            Schema::Any => "any",
            Schema::Ignore => "ignore",
            Schema::Map { .. } => "map",
            Schema::List { .. } => "list",
            Schema::MovableList { .. } => "movable-list",
            Schema::Text => "text",
            Schema::Tree { .. } => "tree",
        }
    }

    /// The engine container type this schema maps to, if it is a container.
    pub fn container_type(&self) -> Option<ContainerType> {
        match self {
            Schema::Map { .. } => Some(ContainerType::Map),
            Schema::List { .. } => Some(ContainerType::List),
            Schema::MovableList { .. } => Some(ContainerType::MovableList),
            Schema::Text => Some(ContainerType::Text),
            Schema::Tree { .. } => Some(ContainerType::Tree),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        self.container_type().is_some()
    }

    /// Whether a plain value has the shape this schema stores.
    ///
    /// Containers require their carrier shape (object, array, string);
    /// primitives accept anything since their mismatch is a validation
    /// concern, not a shape one.
    pub fn value_fits(&self, value: &Value) -> bool {
        match self {
            Schema::Map { .. } => value.is_object(),
            Schema::List { .. } | Schema::MovableList { .. } | Schema::Tree { .. } => {
                value.is_array()
            }
            Schema::Text => value.is_string(),
            _ => true,
        }
    }

    /// Declared fields, for map containers.
    pub fn fields(&self) -> Option<&BTreeMap<String, Schema>> {
        match self {
            Schema::Map { fields } => Some(fields),
            _ => None,
        }
    }

    /// Field schema lookup that treats undeclared keys as [`Schema::Any`].
    pub fn field(&self, key: &str) -> &Schema {
        self.fields().and_then(|fields| fields.get(key)).unwrap_or(&ANY)
    }

    /// Item schema, for list-shaped containers.
    pub fn item_schema(&self) -> Option<&Schema> {
        match self {
            Schema::List { item, .. } | Schema::MovableList { item, .. } => Some(item),
            _ => None,
        }
    }

    /// Item schema lookup that treats non-list schemas as [`Schema::Any`].
    pub fn item_or_any(&self) -> &Schema {
        self.item_schema().unwrap_or(&ANY)
    }

    /// Identity selector, for lists that align items by id.
    pub fn id_selector(&self) -> Option<&IdSelector> {
        match self {
            Schema::List { id_selector, .. } => id_selector.as_ref(),
            Schema::MovableList { id_selector, .. } => Some(id_selector),
            _ => None,
        }
    }

    /// Node-data field schemas, for tree containers.
    pub fn node_fields(&self) -> Option<&BTreeMap<String, Schema>> {
        match self {
            Schema::Tree { node } => Some(node),
            _ => None,
        }
    }

    /// Check that this schema can serve as a document root.
    ///
    /// The engine has no root primitives: the root must be a map and every
    /// non-ignored root field must itself be a container kind.
    pub fn check_root(&self) -> Result<(), SchemaError> {
        let Some(fields) = self.fields() else {
            return Err(SchemaError::InvalidRoot {
                reason: format!("root schema must be a map, found {}", self.kind_name()),
            });
        };
        for (name, field) in fields {
            if !matches!(field, Schema::Ignore) && !field.is_container() {
                return Err(SchemaError::InvalidRoot {
                    reason: format!(
                        "root field `{name}` must be a container kind, found {}",
                        field.kind_name()
                    ),
                });
            }
        }
        Ok(())
    }
}
