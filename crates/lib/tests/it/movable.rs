//! Identity-tracked list reordering.

use serde_json::{Value, json};
use specular::change::{ChangeOp, IdSlots};
use specular::diff::DiffEngine;
use specular::Mirror;

use crate::helpers::todos_schema;

fn seeded_mirror(texts: &[&str]) -> Mirror {
    let mirror = Mirror::new(loro::LoroDoc::new(), todos_schema()).unwrap();
    mirror
        .set_state(|state| {
            let todos = state["todos"].as_array_mut().unwrap();
            for text in texts {
                todos.push(json!({"text": text, "done": false}));
            }
        })
        .unwrap();
    mirror
}

fn permute(state: &Value, order: &[usize]) -> Value {
    let items = state["todos"].as_array().unwrap();
    let mut next = state.clone();
    next["todos"] = Value::Array(order.iter().map(|&i| items[i].clone()).collect());
    next
}

fn count_moves(mirror: &Mirror, old: &Value, new: &Value) -> usize {
    let doc = mirror.doc();
    let mut slots = IdSlots::new();
    let changes = DiffEngine::new(&doc)
        .diff_root(&todos_schema(), old, new, &mut slots)
        .unwrap();
    changes
        .iter()
        .filter(|c| matches!(c.op, ChangeOp::Move { .. }))
        .count()
}

#[test]
fn rotation_is_a_single_move() {
    let mirror = seeded_mirror(&["a", "b", "c"]);
    let state = mirror.state();
    // [a, b, c] -> [c, a, b]: moving c to the front suffices.
    let rotated = permute(&state, &[2, 0, 1]);
    assert_eq!(count_moves(&mirror, &state, &rotated), 1);
}

#[test]
fn move_count_matches_lis_bound() {
    let mirror = seeded_mirror(&["a", "b", "c", "d", "e", "f"]);
    let state = mirror.state();

    // Old positions in new order: [2, 0, 4, 1, 5, 3]; its LIS (e.g. 0, 1, 3)
    // has length 3, so exactly 6 - 3 = 3 moves are required.
    let shuffled = permute(&state, &[2, 0, 4, 1, 5, 3]);
    assert_eq!(count_moves(&mirror, &state, &shuffled), 3);

    // Identity permutation needs none.
    assert_eq!(count_moves(&mirror, &state, &state.clone()), 0);

    // Full reversal keeps one element fixed in the LIS sense.
    let reversed = permute(&state, &[5, 4, 3, 2, 1, 0]);
    assert_eq!(count_moves(&mirror, &state, &reversed), 5);
}

#[test]
fn reorder_preserves_item_identity() {
    let mirror = seeded_mirror(&["first", "second", "third"]);
    let before = mirror.state();
    let cids: Vec<Value> = before["todos"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["$cid"].clone())
        .collect();

    mirror
        .set_state(|state| {
            let todos = state["todos"].as_array_mut().unwrap();
            let last = todos.remove(2);
            todos.insert(0, last);
        })
        .unwrap();

    let after = mirror.state();
    let texts: Vec<&str> = after["todos"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, ["third", "first", "second"]);
    assert_eq!(after["todos"][0]["$cid"], cids[2]);
    assert_eq!(after["todos"][1]["$cid"], cids[0]);
    assert_eq!(after["todos"][2]["$cid"], cids[1]);
}

#[test]
fn interleaved_insert_delete_and_move() {
    let mirror = seeded_mirror(&["a", "b", "c", "d"]);
    mirror
        .set_state(|state| {
            let todos = state["todos"].as_array_mut().unwrap();
            todos.remove(1); // drop b
            let d = todos.remove(2); // [a, c] with d in hand
            todos.insert(0, d); // [d, a, c]
            todos.insert(2, json!({"text": "x", "done": true}));
        })
        .unwrap();

    let texts: Vec<String> = mirror.state()["todos"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["text"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(texts, ["d", "a", "x", "c"]);
}
