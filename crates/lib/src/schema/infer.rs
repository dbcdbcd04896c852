//! Schema inference from plain state values.
//!
//! Lets a mirror be constructed from an initial state alone: the shape of the
//! value decides the schema. [`InferOptions`] control the ambiguous cases:
//! whether strings become rich text and whether arrays become movable lists.

use serde_json::Value;

use crate::constants::CID_KEY;

use super::{IdSelector, Schema};

/// Controls for the ambiguous cases of schema inference.
#[derive(Clone, Copy, Debug, Default)]
pub struct InferOptions {
    /// Infer `Text` containers for string values (instead of plain strings).
    pub default_text: bool,
    /// Infer `MovableList` containers (keyed by `$cid`) for arrays, instead
    /// of plain positional lists.
    pub default_movable_list: bool,
}

/// Infer a schema from a value.
pub fn infer_schema(value: &Value, opts: &InferOptions) -> Schema {
    match value {
        Value::Null => Schema::Any,
        Value::Bool(_) => Schema::Boolean,
        Value::Number(_) => Schema::Number,
        Value::String(_) => {
            if opts.default_text {
                Schema::Text
            } else {
                Schema::String
            }
        }
        Value::Array(items) => infer_list(items, opts),
        Value::Object(map) => Schema::map(
            map.iter()
                .filter(|(k, _)| k.as_str() != CID_KEY)
                .map(|(k, v)| (k.clone(), infer_schema(v, opts))),
        ),
    }
}

/// Infer a root schema from an initial state object.
///
/// The root has no primitives, so top-level strings always become text
/// containers and other primitives are rejected later by
/// [`Schema::check_root`].
pub fn infer_root(state: &Value, opts: &InferOptions) -> Schema {
    let Some(map) = state.as_object() else {
        return Schema::map(std::iter::empty::<(String, Schema)>());
    };
    Schema::map(map.iter().filter(|(k, _)| k.as_str() != CID_KEY).map(|(k, v)| {
        let field = match v {
            Value::String(_) => Schema::Text,
            other => infer_schema(other, opts),
        };
        (k.clone(), field)
    }))
}

fn infer_list(items: &[Value], opts: &InferOptions) -> Schema {
    let item = items
        .first()
        .map(|v| infer_schema(v, opts))
        .unwrap_or(Schema::Any);
    if opts.default_movable_list {
        Schema::movable_list(item, IdSelector::cid())
    } else {
        Schema::list(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn infers_nested_shapes() {
        let state = json!({"todos": [{"text": "a", "done": false}], "title": "x"});
        let schema = infer_root(&state, &InferOptions::default());
        assert!(schema.check_root().is_ok());
        let todos = schema.field("todos");
        assert_eq!(todos.kind_name(), "list");
        assert_eq!(todos.item_schema().unwrap().kind_name(), "map");
        assert_eq!(schema.field("title").kind_name(), "text");
    }

    #[test]
    fn movable_list_option_applies() {
        let opts = InferOptions {
            default_movable_list: true,
            ..Default::default()
        };
        let schema = infer_schema(&json!([1, 2]), &opts);
        assert_eq!(schema.kind_name(), "movable-list");
    }
}
