//! Edit-script generation against live documents.

use serde_json::json;
use specular::change::{ChangeOp, IdSlots};
use specular::diff::DiffEngine;
use specular::schema::Schema;
use specular::{Mirror, MirrorOptions};

use crate::helpers::todos_schema;

fn falsy_schema() -> Schema {
    Schema::map([
        (
            "config",
            Schema::map([
                ("name", Schema::string()),
                ("count", Schema::number()),
                ("flag", Schema::boolean()),
                ("note", Schema::any()),
            ]),
        ),
        ("title", Schema::text()),
    ])
}

#[test]
fn equal_states_diff_to_nothing() {
    let mirror = Mirror::new(loro::LoroDoc::new(), falsy_schema()).unwrap();
    mirror
        .set_state(|state| {
            state["config"] = json!({"name": "", "count": 0, "flag": false, "note": null});
            state["title"] = json!("");
        })
        .unwrap();

    let state = mirror.state();
    let doc = mirror.doc();
    let mut slots = IdSlots::new();
    let changes = DiffEngine::new(&doc)
        .diff_root(&falsy_schema(), &state, &state, &mut slots)
        .unwrap();
    assert!(changes.is_empty(), "unexpected changes: {changes:?}");
    assert!(slots.is_empty());
}

#[test]
fn falsy_values_do_not_retrigger_commits() {
    // "", 0, false, and null are values like any other: writing the same
    // state twice must not produce a second commit.
    let mirror = Mirror::new(loro::LoroDoc::new(), falsy_schema()).unwrap();
    let update = |state: &mut serde_json::Value| {
        state["config"] = json!({"name": "", "count": 0, "flag": false, "note": null});
    };
    mirror.set_state(update).unwrap();

    let version = mirror.doc().oplog_vv();
    mirror.set_state(update).unwrap();
    assert_eq!(mirror.doc().oplog_vv(), version);
}

#[test]
fn keyed_update_touches_only_changed_fields() {
    let mirror = Mirror::new(loro::LoroDoc::new(), todos_schema()).unwrap();
    mirror
        .set_state(|state| {
            let todos = state["todos"].as_array_mut().unwrap();
            todos.push(json!({"text": "a", "done": false}));
            todos.push(json!({"text": "b", "done": false}));
        })
        .unwrap();

    let state = mirror.state();
    let mut next = state.clone();
    next["todos"][1]["done"] = json!(true);

    let doc = mirror.doc();
    let mut slots = IdSlots::new();
    let changes = DiffEngine::new(&doc)
        .diff_root(&todos_schema(), &state, &next, &mut slots)
        .unwrap();

    // One set on the second item's map, nothing else.
    assert_eq!(changes.len(), 1);
    assert!(matches!(&changes[0].op, ChangeOp::Set { value, .. } if *value == json!(true)));
}

#[test]
fn type_flip_replaces_the_container() {
    let schema = Schema::map([("data", Schema::map([("inner", Schema::any())]))]);
    let mirror = Mirror::with_options(
        loro::LoroDoc::new(),
        schema.clone(),
        MirrorOptions {
            validate_updates: false,
            ..Default::default()
        },
    )
    .unwrap();
    mirror
        .set_state(|state| {
            state["data"] = json!({"inner": {"a": 1}});
        })
        .unwrap();
    mirror
        .set_state(|state| {
            state["data"]["inner"] = json!([1, 2, 3]);
        })
        .unwrap();
    assert_eq!(crate::helpers::strip_cids(&mirror.state())["data"]["inner"], json!([1, 2, 3]));
}
