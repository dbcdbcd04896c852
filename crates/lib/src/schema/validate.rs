//! Schema validation and default values for state trees.

use serde_json::{Map, Value};

use crate::constants::{CID_KEY, TREE_CHILDREN_KEY, TREE_DATA_KEY, TREE_ID_KEY};

use super::{Schema, SchemaError, ValidationIssue};

/// Validate a state value against a schema.
///
/// Collects every violation instead of stopping at the first; `$cid` is
/// always permitted on map-shaped values and `Ignore` fields accept anything.
pub fn validate(schema: &Schema, value: &Value) -> Result<(), SchemaError> {
    let mut issues = Vec::new();
    check(schema, value, "", &mut issues);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::Validation { issues })
    }
}

/// The default state value for a schema: empty containers, zero-ish
/// primitives, `null` for `Any`.
pub fn default_value(schema: &Schema) -> Value {
    match schema {
        Schema::String | Schema::Text => Value::String(String::new()),
        Schema::Number => Value::Number(0.into()),
        Schema::Boolean => Value::Bool(false),
        Schema::Any | Schema::Ignore => Value::Null,
        Schema::Map { fields } => {
            let mut map = Map::new();
            for (name, field) in fields {
                if !matches!(field, Schema::Ignore) {
                    map.insert(name.clone(), default_value(field));
                }
            }
            Value::Object(map)
        }
        Schema::List { .. } | Schema::MovableList { .. } | Schema::Tree { .. } => {
            Value::Array(Vec::new())
        }
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn issue(issues: &mut Vec<ValidationIssue>, path: &str, message: String) {
    issues.push(ValidationIssue {
        path: path.to_string(),
        message,
    });
}

fn check(schema: &Schema, value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    match schema {
        Schema::Any | Schema::Ignore => {}
        Schema::String | Schema::Text => {
            if !value.is_string() {
                issue(issues, path, format!("expected string, found {}", kind(value)));
            }
        }
        Schema::Number => {
            if !value.is_number() {
                issue(issues, path, format!("expected number, found {}", kind(value)));
            }
        }
        Schema::Boolean => {
            if !value.is_boolean() {
                issue(issues, path, format!("expected boolean, found {}", kind(value)));
            }
        }
        Schema::Map { fields } => check_map(fields, value, path, issues),
        Schema::List { item, .. } | Schema::MovableList { item, .. } => {
            let Some(items) = value.as_array() else {
                issue(issues, path, format!("expected array, found {}", kind(value)));
                return;
            };
            for (i, v) in items.iter().enumerate() {
                check(item, v, &join(path, &i.to_string()), issues);
            }
        }
        Schema::Tree { node } => {
            let Some(nodes) = value.as_array() else {
                issue(issues, path, format!("expected array of tree nodes, found {}", kind(value)));
                return;
            };
            for (i, n) in nodes.iter().enumerate() {
                check_tree_node(node, n, &join(path, &i.to_string()), issues);
            }
        }
    }
}

fn check_map(
    fields: &std::collections::BTreeMap<String, Schema>,
    value: &Value,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    let Some(map) = value.as_object() else {
        issue(issues, path, format!("expected object, found {}", kind(value)));
        return;
    };
    for (key, v) in map {
        if key == CID_KEY {
            continue;
        }
        match fields.get(key) {
            Some(field) => check(field, v, &join(path, key), issues),
            None => issue(issues, &join(path, key), "undeclared field".to_string()),
        }
    }
}

fn check_tree_node(
    node_fields: &std::collections::BTreeMap<String, Schema>,
    value: &Value,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    let Some(map) = value.as_object() else {
        issue(issues, path, format!("expected tree node object, found {}", kind(value)));
        return;
    };
    match map.get(TREE_ID_KEY) {
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(other) => issue(
            issues,
            &join(path, TREE_ID_KEY),
            format!("expected node id string or null, found {}", kind(other)),
        ),
    }
    if let Some(data) = map.get(TREE_DATA_KEY) {
        check_map(node_fields, data, &join(path, TREE_DATA_KEY), issues);
    }
    match map.get(TREE_CHILDREN_KEY) {
        None => {}
        Some(Value::Array(children)) => {
            let child_path = join(path, TREE_CHILDREN_KEY);
            for (i, child) in children.iter().enumerate() {
                check_tree_node(node_fields, child, &join(&child_path, &i.to_string()), issues);
            }
        }
        Some(other) => issue(
            issues,
            &join(path, TREE_CHILDREN_KEY),
            format!("expected children array, found {}", kind(other)),
        ),
    }
    for key in map.keys() {
        if !matches!(key.as_str(), TREE_ID_KEY | TREE_DATA_KEY | TREE_CHILDREN_KEY) && key != CID_KEY
        {
            issue(issues, &join(path, key), "unexpected tree node field".to_string());
        }
    }
}

fn kind(value: &Value) -> &'static str {
    crate::value::value_kind(value)
}
