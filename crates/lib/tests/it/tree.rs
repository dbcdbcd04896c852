//! Hierarchical tree mirroring and deferred node identity.

use loro::TreeID;
use serde_json::json;
use specular::Mirror;
use specular::schema::Schema;

fn outline_schema() -> Schema {
    Schema::map([("outline", Schema::tree([("label", Schema::string())]))])
}

fn outline_mirror() -> Mirror {
    Mirror::new(loro::LoroDoc::new(), outline_schema()).unwrap()
}

fn node_id(state: &serde_json::Value, path: &[usize]) -> TreeID {
    let mut node = &state["outline"][path[0]];
    for &i in &path[1..] {
        node = &node["children"][i];
    }
    TreeID::try_from(node["id"].as_str().unwrap()).unwrap()
}

#[test]
fn parent_and_child_created_in_one_update_get_live_ids() {
    let mirror = outline_mirror();
    mirror
        .set_state(|state| {
            state["outline"] = json!([
                {"id": null, "data": {"label": "root"}, "children": [
                    {"id": null, "data": {"label": "kid"}, "children": []}
                ]}
            ]);
        })
        .unwrap();

    let state = mirror.state();
    let root = node_id(&state, &[0]);
    let kid = node_id(&state, &[0, 0]);

    // The document's live tree shape matches the input with ids substituted.
    let tree = mirror.doc().get_tree("outline");
    assert_eq!(tree.children(None).unwrap_or_default(), vec![root]);
    assert_eq!(tree.children(Some(root)).unwrap_or_default(), vec![kid]);
    assert_eq!(state["outline"][0]["data"]["label"], "root");
    assert_eq!(state["outline"][0]["children"][0]["data"]["label"], "kid");
}

#[test]
fn reparenting_moves_the_live_node() {
    let mirror = outline_mirror();
    mirror
        .set_state(|state| {
            state["outline"] = json!([
                {"id": null, "data": {"label": "a"}, "children": []},
                {"id": null, "data": {"label": "b"}, "children": []},
            ]);
        })
        .unwrap();
    let before = mirror.state();
    let (a, b) = (node_id(&before, &[0]), node_id(&before, &[1]));

    mirror
        .set_state(|state| {
            let nodes = state["outline"].as_array_mut().unwrap();
            let second = nodes.remove(1);
            nodes[0]["children"].as_array_mut().unwrap().push(second);
        })
        .unwrap();

    let tree = mirror.doc().get_tree("outline");
    assert_eq!(tree.children(None).unwrap_or_default(), vec![a]);
    assert_eq!(tree.children(Some(a)).unwrap_or_default(), vec![b]);

    let after = mirror.state();
    assert_eq!(node_id(&after, &[0]), a);
    assert_eq!(node_id(&after, &[0, 0]), b);
}

#[test]
fn node_data_updates_in_place() {
    let mirror = outline_mirror();
    mirror
        .set_state(|state| {
            state["outline"] = json!([
                {"id": null, "data": {"label": "draft"}, "children": []}
            ]);
        })
        .unwrap();
    let id = node_id(&mirror.state(), &[0]);

    mirror
        .set_state(|state| {
            state["outline"][0]["data"]["label"] = json!("final");
        })
        .unwrap();

    let after = mirror.state();
    assert_eq!(node_id(&after, &[0]), id, "update must not recreate the node");
    assert_eq!(after["outline"][0]["data"]["label"], "final");
}

#[test]
fn deleting_a_subtree_removes_descendants() {
    let mirror = outline_mirror();
    mirror
        .set_state(|state| {
            state["outline"] = json!([
                {"id": null, "data": {"label": "keep"}, "children": []},
                {"id": null, "data": {"label": "drop"}, "children": [
                    {"id": null, "data": {"label": "orphan"}, "children": []}
                ]},
            ]);
        })
        .unwrap();
    let keep = node_id(&mirror.state(), &[0]);

    mirror
        .set_state(|state| {
            state["outline"].as_array_mut().unwrap().remove(1);
        })
        .unwrap();

    let tree = mirror.doc().get_tree("outline");
    assert_eq!(tree.children(None).unwrap_or_default(), vec![keep]);
    assert_eq!(mirror.state()["outline"].as_array().unwrap().len(), 1);
}

#[test]
fn sibling_reorder_within_one_parent() {
    let mirror = outline_mirror();
    mirror
        .set_state(|state| {
            state["outline"] = json!([
                {"id": null, "data": {"label": "one"}, "children": []},
                {"id": null, "data": {"label": "two"}, "children": []},
                {"id": null, "data": {"label": "three"}, "children": []},
            ]);
        })
        .unwrap();
    let before = mirror.state();
    let ids: Vec<TreeID> = (0..3).map(|i| node_id(&before, &[i])).collect();

    mirror
        .set_state(|state| {
            let nodes = state["outline"].as_array_mut().unwrap();
            let last = nodes.remove(2);
            nodes.insert(0, last);
        })
        .unwrap();

    let tree = mirror.doc().get_tree("outline");
    assert_eq!(
        tree.children(None).unwrap_or_default(),
        vec![ids[2], ids[0], ids[1]]
    );
}
