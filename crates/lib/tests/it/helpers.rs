//! Shared helpers for the integration suite.

use loro::ExportMode;
use serde_json::Value;
use specular::Mirror;
use specular::constants::CID_KEY;
use specular::schema::{IdSelector, Schema};

/// A todos document: movable list of `{text, done}` maps keyed by `$cid`.
pub fn todos_schema() -> Schema {
    Schema::map([(
        "todos",
        Schema::movable_list(
            Schema::map([("text", Schema::string()), ("done", Schema::boolean())]),
            IdSelector::cid(),
        ),
    )])
}

/// Push every update from one mirror's document into another's.
pub fn sync_one_way(from: &Mirror, to: &Mirror) {
    let bytes = from.doc().export(ExportMode::all_updates()).unwrap();
    to.doc().import(&bytes).unwrap();
}

pub fn sync_both_ways(a: &Mirror, b: &Mirror) {
    sync_one_way(a, b);
    sync_one_way(b, a);
}

/// Deep copy of a state value with every `$cid` key removed.
pub fn strip_cids(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| k.as_str() != CID_KEY)
                .map(|(k, v)| (k.clone(), strip_cids(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_cids).collect()),
        other => other.clone(),
    }
}
