//! The orchestrator's subscription and sync protocol.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use specular::schema::{IdSelector, Schema};
use specular::{Mirror, MirrorOptions, SetStateOptions, SyncDirection};

use crate::helpers::{strip_cids, sync_both_ways, sync_one_way, todos_schema};

fn counting_subscriber(
    mirror: &Mirror,
) -> (Arc<AtomicUsize>, Arc<AtomicUsize>, specular::StateSubscription) {
    let to_remote = Arc::new(AtomicUsize::new(0));
    let from_remote = Arc::new(AtomicUsize::new(0));
    let (t, f) = (to_remote.clone(), from_remote.clone());
    let sub = mirror.subscribe(move |_, meta| {
        match meta.direction {
            SyncDirection::ToRemote => &t,
            SyncDirection::FromRemote => &f,
        }
        .fetch_add(1, Ordering::SeqCst);
    });
    (to_remote, from_remote, sub)
}

#[test]
fn no_feedback_loop_between_two_mirrors() {
    let a = Mirror::new(loro::LoroDoc::new(), todos_schema()).unwrap();
    let b = Mirror::new(loro::LoroDoc::new(), todos_schema()).unwrap();
    let (a_to, a_from, _sub_a) = counting_subscriber(&a);
    let (b_to, b_from, _sub_b) = counting_subscriber(&b);

    a.set_state(|state| {
        state["todos"]
            .as_array_mut()
            .unwrap()
            .push(json!({"text": "hello", "done": false}));
    })
    .unwrap();

    sync_one_way(&a, &b);
    // Importing A's own ops back must not re-notify A: nothing is new.
    sync_one_way(&b, &a);

    assert_eq!(a_to.load(Ordering::SeqCst), 1);
    assert_eq!(a_from.load(Ordering::SeqCst), 0);
    assert_eq!(b_to.load(Ordering::SeqCst), 0);
    assert_eq!(b_from.load(Ordering::SeqCst), 1);
    assert_eq!(strip_cids(&a.state()), strip_cids(&b.state()));
}

#[test]
fn concurrent_edits_converge() {
    let a = Mirror::new(loro::LoroDoc::new(), todos_schema()).unwrap();
    let b = Mirror::new(loro::LoroDoc::new(), todos_schema()).unwrap();

    a.set_state(|state| {
        state["todos"]
            .as_array_mut()
            .unwrap()
            .push(json!({"text": "from a", "done": false}));
    })
    .unwrap();
    b.set_state(|state| {
        state["todos"]
            .as_array_mut()
            .unwrap()
            .push(json!({"text": "from b", "done": true}));
    })
    .unwrap();

    sync_both_ways(&a, &b);

    let (sa, sb) = (a.state(), b.state());
    assert_eq!(sa, sb);
    assert_eq!(sa["todos"].as_array().unwrap().len(), 2);
}

#[test]
fn tags_reach_to_remote_subscribers() {
    let mirror = Mirror::new(loro::LoroDoc::new(), todos_schema()).unwrap();
    let seen = Arc::new(std::sync::Mutex::new(None));
    let sink = seen.clone();
    let _sub = mirror.subscribe(move |_, meta| {
        *sink.lock().unwrap() = meta.tags.clone();
    });

    mirror
        .set_state_with(
            |state| {
                state["todos"]
                    .as_array_mut()
                    .unwrap()
                    .push(json!({"text": "tagged", "done": false}));
            },
            SetStateOptions {
                tags: Some(vec!["ui".to_string()]),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), Some(vec!["ui".to_string()]));
}

#[test]
fn dropping_subscription_unsubscribes() {
    let mirror = Mirror::new(loro::LoroDoc::new(), todos_schema()).unwrap();
    let (to_remote, _, sub) = counting_subscriber(&mirror);

    let push = |state: &mut serde_json::Value| {
        state["todos"]
            .as_array_mut()
            .unwrap()
            .push(json!({"text": "x", "done": false}));
    };
    mirror.set_state(push).unwrap();
    drop(sub);
    mirror.set_state(push).unwrap();

    assert_eq!(to_remote.load(Ordering::SeqCst), 1);
}

#[test]
fn consistency_check_accepts_compound_updates() {
    let schema = Schema::map([
        ("todos", todos_schema().field("todos").clone()),
        ("meta", Schema::map([("title", Schema::text()), ("revision", Schema::number())])),
        ("outline", Schema::tree([("label", Schema::string())])),
    ]);
    let mirror = Mirror::with_options(
        loro::LoroDoc::new(),
        schema,
        MirrorOptions {
            check_state_consistency: true,
            ..Default::default()
        },
    )
    .unwrap();

    mirror
        .set_state(|state| {
            state["todos"]
                .as_array_mut()
                .unwrap()
                .push(json!({"text": "a", "done": false}));
            state["meta"]["title"] = json!("inbox");
            state["meta"]["revision"] = json!(3);
            state["outline"] = json!([
                {"id": null, "data": {"label": "root"}, "children": [
                    {"id": null, "data": {"label": "leaf"}, "children": []}
                ]}
            ]);
        })
        .unwrap();

    let state = mirror.state();
    assert_eq!(state["meta"]["title"], "inbox");
    assert_eq!(state["outline"][0]["data"]["label"], "root");
}

#[test]
fn custom_origin_is_still_recognized_as_local() {
    let mirror = Mirror::new(loro::LoroDoc::new(), todos_schema()).unwrap();
    let (to_remote, from_remote, _sub) = counting_subscriber(&mirror);

    mirror
        .set_state_with(
            |state| {
                state["todos"]
                    .as_array_mut()
                    .unwrap()
                    .push(json!({"text": "x", "done": false}));
            },
            SetStateOptions {
                origin: Some("import-job".to_string()),
                message: Some("initial import".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(to_remote.load(Ordering::SeqCst), 1);
    assert_eq!(from_remote.load(Ordering::SeqCst), 0);
}

#[test]
fn inferred_schema_mirror_round_trips() {
    let initial = json!({"title": "notes", "todos": [{"text": "a", "done": false}]});
    let mirror = Mirror::with_inferred_schema(
        loro::LoroDoc::new(),
        &initial,
        MirrorOptions::default(),
    )
    .unwrap();
    let state = strip_cids(&mirror.state());
    assert_eq!(state["title"], "notes");
    assert_eq!(state["todos"][0]["text"], "a");
}

#[test]
fn keyed_list_items_keep_identity_across_field_updates() {
    let schema = Schema::map([(
        "users",
        Schema::keyed_list(
            Schema::map([("id", Schema::string()), ("name", Schema::string())]),
            IdSelector::field("id"),
        ),
    )]);
    let mirror = Mirror::new(loro::LoroDoc::new(), schema).unwrap();
    mirror
        .set_state(|state| {
            state["users"] = json!([
                {"id": "u1", "name": "Ada"},
                {"id": "u2", "name": "Grace"},
            ]);
        })
        .unwrap();
    let cid_before = mirror.state()["users"][1]["$cid"].clone();

    mirror
        .set_state(|state| {
            state["users"][1]["name"] = json!("Grace H.");
        })
        .unwrap();
    let state = mirror.state();
    assert_eq!(state["users"][1]["name"], "Grace H.");
    assert_eq!(state["users"][1]["$cid"], cid_before);
}
