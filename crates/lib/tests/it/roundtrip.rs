//! Randomized document-to-state reconciliation.
//!
//! Mutates the document directly (bypassing `set_state`) and checks after
//! every commit that the mirror's reconciled state deep-equals the
//! document's own canonical snapshot.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use specular::Mirror;
use specular::schema::{IdSelector, Schema};
use specular::value::loro_to_json;

use crate::helpers::strip_cids;

fn schema() -> Schema {
    Schema::map([
        ("profile", Schema::map(std::iter::empty::<(String, Schema)>())),
        ("tags", Schema::list(Schema::string())),
        ("notes", Schema::text()),
        (
            "queue",
            Schema::movable_list(Schema::string(), IdSelector::cid()),
        ),
    ])
}

#[test]
fn reconciled_state_tracks_direct_document_edits() {
    let mirror = Mirror::new(loro::LoroDoc::new(), schema()).unwrap();
    let doc = mirror.doc();
    let profile = doc.get_map("profile");
    let tags = doc.get_list("tags");
    let notes = doc.get_text("notes");
    let queue = doc.get_movable_list("queue");

    // Touch every root once so the document snapshot covers all of them.
    profile.insert("seed", 0).unwrap();
    tags.insert(0, "seed").unwrap();
    notes.insert(0, "seed").unwrap();
    queue.insert(0, "seed").unwrap();
    doc.commit();

    let mut rng = StdRng::seed_from_u64(0x5eed);
    for step in 0..200 {
        match rng.gen_range(0..7) {
            0 => {
                let key = format!("k{}", rng.gen_range(0..8));
                profile.insert(&key, rng.gen_range(-100..100)).unwrap();
            }
            1 => {
                let key = format!("k{}", rng.gen_range(0..8));
                // Deleting an absent key is a no-op in the engine.
                let _ = profile.delete(&key);
            }
            2 => {
                let pos = rng.gen_range(0..=tags.len());
                tags.insert(pos, format!("t{step}")).unwrap();
            }
            3 => {
                if !tags.is_empty() {
                    tags.delete(rng.gen_range(0..tags.len()), 1).unwrap();
                }
            }
            4 => {
                let pos = rng.gen_range(0..=notes.len_unicode());
                notes.insert(pos, "x").unwrap();
            }
            5 => {
                let pos = rng.gen_range(0..=queue.len());
                queue.insert(pos, format!("q{step}")).unwrap();
            }
            _ => {
                if queue.len() >= 2 {
                    let from = rng.gen_range(0..queue.len());
                    let to = rng.gen_range(0..queue.len());
                    queue.mov(from, to).unwrap();
                }
            }
        }
        doc.commit();

        let snapshot: Value = loro_to_json(&doc.get_deep_value());
        assert_eq!(
            strip_cids(&mirror.state()),
            snapshot,
            "state diverged from document at step {step}"
        );
    }
}
