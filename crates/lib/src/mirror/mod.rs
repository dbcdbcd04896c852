//! The mirror orchestrator: owns the authoritative state, the container
//! registry, and the subscription protocol between local updates and remote
//! change batches.
//!
//! Local direction (`set_state`): the updater mutates a draft of the current
//! state, the diff engine turns draft-vs-state into a change script, the
//! applier executes it, and the whole batch commits once under the sentinel
//! origin. The authoritative state is then rebuilt from the document, so ids
//! assigned during apply (`$cid`, tree node ids) are always present.
//!
//! Remote direction: a root subscription on the document observes every
//! commit. Batches carrying the sentinel origin are echoes of local writes
//! and are dropped; anything else triggers a full state rebuild and a
//! `FromRemote` notification. The engine delivers events synchronously on
//! the committing call stack, which is why the echo check runs before any
//! lock is taken.

pub mod errors;

pub use errors::MirrorError;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use loro::{
    CommitOptions, ContainerID, ContainerTrait, ContainerType, LoroDoc, LoroValue, Subscription,
    TreeID,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::apply::Applier;
use crate::change::IdSlots;
use crate::constants::{CID_KEY, SYNC_ORIGIN, TREE_CHILDREN_KEY, TREE_DATA_KEY, TREE_ID_KEY};
use crate::diff::DiffEngine;
use crate::reconcile::state_from_doc;
use crate::schema::{InferOptions, Schema, infer_root, validate};
use crate::value::shallow_merge;

/// Which side of the mirror produced a state notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    /// A local `set_state` was committed to the document.
    ToRemote,
    /// A remote (or out-of-band local) document change was reconciled.
    FromRemote,
}

/// Whether an outbound update is currently in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Syncing,
}

/// Metadata delivered with every state notification.
#[derive(Clone, Debug, serde::Serialize)]
pub struct SyncMeta {
    pub direction: SyncDirection,
    /// Tags from the originating [`SetStateOptions`]; `None` for remote
    /// reconciliations.
    pub tags: Option<Vec<String>>,
}

/// Tuning knobs for a mirror instance.
#[derive(Clone, Debug)]
pub struct MirrorOptions {
    /// Validate every updated state against the schema.
    pub validate_updates: bool,
    /// Reject invalid updates instead of logging and applying them.
    pub throw_on_validation_error: bool,
    /// After every commit, verify the document state matches the applied
    /// update.
    pub check_state_consistency: bool,
    /// Log each applied change script at debug level.
    pub debug: bool,
    /// Inference options used by [`Mirror::with_inferred_schema`].
    pub infer: InferOptions,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            validate_updates: true,
            throw_on_validation_error: false,
            check_state_consistency: false,
            debug: false,
            infer: InferOptions::default(),
        }
    }
}

/// Per-call options for [`Mirror::set_state_with`].
#[derive(Clone, Debug, Default)]
pub struct SetStateOptions {
    /// Opaque tags forwarded to `ToRemote` subscribers.
    pub tags: Option<Vec<String>>,
    /// Extra origin recorded alongside the sentinel in the commit.
    pub origin: Option<String>,
    /// Commit timestamp override (unix seconds).
    pub timestamp: Option<i64>,
    /// Commit message.
    pub message: Option<String>,
}

type SubscriberFn = Arc<dyn Fn(&Value, &SyncMeta) + Send + Sync>;

struct Inner {
    doc: LoroDoc,
    schema: Schema,
    options: MirrorOptions,
    state: Value,
    /// Every live container reachable from the schema, with the schema that
    /// governs it. Applier lookups resolve through this table; a miss is a
    /// stale reference.
    registry: HashMap<ContainerID, Schema>,
    /// Oplog version at the last reconciliation, used to coalesce event
    /// batches that carry nothing new.
    last_version: loro::VersionVector,
    subscribers: Vec<(u64, SubscriberFn)>,
    next_subscriber_id: u64,
    disposed: bool,
}

/// Bidirectional mirror between a plain state tree and a CRDT document.
pub struct Mirror {
    inner: Arc<Mutex<Inner>>,
    syncing: Arc<AtomicBool>,
    root_sub: Mutex<Option<Subscription>>,
}

/// Handle for one state subscriber; dropping it unsubscribes.
#[must_use = "dropping the subscription immediately unsubscribes"]
pub struct StateSubscription {
    inner: Weak<Mutex<Inner>>,
    id: u64,
}

impl Drop for StateSubscription {
    fn drop(&mut self) {
        if let Some(mutex) = self.inner.upgrade() {
            lock(&mutex).subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Clears the syncing flag on every exit path.
struct SyncingFlag<'a>(&'a AtomicBool);

impl Drop for SyncingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Mirror {
    /// Create a mirror over a document with default options.
    pub fn new(doc: LoroDoc, schema: Schema) -> crate::Result<Self> {
        Self::with_options(doc, schema, MirrorOptions::default())
    }

    pub fn with_options(
        doc: LoroDoc,
        schema: Schema,
        options: MirrorOptions,
    ) -> crate::Result<Self> {
        schema.check_root()?;
        enable_tree_order(&doc, &schema);
        let state = state_from_doc(&doc, &schema);
        let registry = collect_registry(&doc, &schema);
        let last_version = doc.oplog_vv();
        let inner = Arc::new(Mutex::new(Inner {
            doc: doc.clone(),
            schema,
            options,
            state,
            registry,
            last_version,
            subscribers: Vec::new(),
            next_subscriber_id: 0,
            disposed: false,
        }));

        let weak = Arc::downgrade(&inner);
        let sub = doc.subscribe_root(Arc::new(move |event| {
            // Echo of a local commit; the state already reflects it. This
            // check must come before taking the lock: the engine delivers
            // the event synchronously inside our own commit.
            if event.origin.to_string().starts_with(SYNC_ORIGIN) {
                return;
            }
            let Some(mutex) = weak.upgrade() else {
                return;
            };
            reconcile_remote(&mutex);
        }));

        Ok(Self {
            inner,
            syncing: Arc::new(AtomicBool::new(false)),
            root_sub: Mutex::new(Some(sub)),
        })
    }

    /// Create a mirror and immediately merge an initial state into it.
    pub fn with_initial_state(
        doc: LoroDoc,
        schema: Schema,
        initial: Value,
        options: MirrorOptions,
    ) -> crate::Result<Self> {
        let mirror = Self::with_options(doc, schema, options)?;
        mirror.merge_state(initial)?;
        Ok(mirror)
    }

    /// Create a mirror whose schema is inferred from the initial state.
    pub fn with_inferred_schema(
        doc: LoroDoc,
        initial: &Value,
        options: MirrorOptions,
    ) -> crate::Result<Self> {
        let schema = infer_root(initial, &options.infer);
        Self::with_initial_state(doc, schema, initial.clone(), options)
    }

    /// The current authoritative state snapshot.
    pub fn state(&self) -> Value {
        lock(&self.inner).state.clone()
    }

    /// A shared handle to the underlying document.
    pub fn doc(&self) -> LoroDoc {
        lock(&self.inner).doc.clone()
    }

    pub fn sync_status(&self) -> SyncStatus {
        if self.syncing.load(Ordering::Acquire) {
            SyncStatus::Syncing
        } else {
            SyncStatus::Idle
        }
    }

    /// Apply a local state update; see [`Mirror::set_state_with`].
    pub fn set_state(&self, updater: impl FnOnce(&mut Value)) -> crate::Result<()> {
        self.set_state_with(updater, SetStateOptions::default())
    }

    /// Shallow-merge a partial state into the current state.
    pub fn merge_state(&self, partial: Value) -> crate::Result<()> {
        self.merge_state_with(partial, SetStateOptions::default())
    }

    pub fn merge_state_with(&self, partial: Value, options: SetStateOptions) -> crate::Result<()> {
        self.set_state_with(move |state| shallow_merge(state, partial), options)
    }

    /// Apply a local state update.
    ///
    /// The updater mutates a draft of the current state. The difference
    /// between draft and state becomes one atomic document commit; the
    /// authoritative state is then rebuilt from the document and `ToRemote`
    /// subscribers are notified. Re-entrant calls are rejected.
    pub fn set_state_with(
        &self,
        updater: impl FnOnce(&mut Value),
        options: SetStateOptions,
    ) -> crate::Result<()> {
        if self.syncing.swap(true, Ordering::AcqRel) {
            return Err(MirrorError::Reentrant.into());
        }
        let outcome = {
            let _flag = SyncingFlag(&self.syncing);
            self.run_update(updater, &options)
        };
        // Subscribers run outside both the lock and the syncing window, so
        // they are free to call back into the mirror.
        if let Some((state, subscribers, meta)) = outcome? {
            for subscriber in subscribers {
                subscriber(&state, &meta);
            }
        }
        Ok(())
    }

    /// Register a state subscriber.
    pub fn subscribe(
        &self,
        subscriber: impl Fn(&Value, &SyncMeta) + Send + Sync + 'static,
    ) -> StateSubscription {
        let mut inner = lock(&self.inner);
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.push((id, Arc::new(subscriber)));
        StateSubscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Tear the mirror down: drop the document subscription, forget all
    /// subscribers, and reject further updates.
    pub fn dispose(&self) {
        drop(lock(&self.root_sub).take());
        let mut inner = lock(&self.inner);
        inner.subscribers.clear();
        inner.registry.clear();
        inner.disposed = true;
    }

    fn run_update(
        &self,
        updater: impl FnOnce(&mut Value),
        options: &SetStateOptions,
    ) -> crate::Result<Option<(Value, Vec<SubscriberFn>, SyncMeta)>> {
        let mut inner = lock(&self.inner);
        if inner.disposed {
            return Err(MirrorError::Disposed.into());
        }

        let mut draft = inner.state.clone();
        updater(&mut draft);

        if inner.options.validate_updates
            && let Err(err) = validate(&inner.schema, &draft)
        {
            if inner.options.throw_on_validation_error {
                return Err(MirrorError::Validation {
                    issues: err.issues().to_vec(),
                }
                .into());
            }
            warn!(error = %err, "state update failed validation, applying anyway");
        }

        let mut slots = IdSlots::new();
        let changes =
            DiffEngine::new(&inner.doc).diff_root(&inner.schema, &inner.state, &draft, &mut slots)?;

        if changes.is_empty() && slots.is_empty() {
            // Nothing reaches the document. Only ignored fields can change
            // without emitting ops, so fold those into the cached state and
            // keep everything else (notably `$cid`s) authoritative.
            let next = overlay_ignored(&inner.schema, &draft, inner.state.clone());
            if inner.state == next {
                return Ok(None);
            }
            inner.state = next;
            return Ok(Some(self.notification(&inner, options)));
        }

        if inner.options.debug {
            debug!(changes = changes.len(), "applying local state update");
        }
        {
            let applier = Applier::new(&inner.doc, &inner.schema);
            let registry = &inner.registry;
            applier.apply(&changes, &mut slots, |cid| registry.get(cid).cloned())?;
        }

        let origin = match &options.origin {
            Some(extra) => format!("{SYNC_ORIGIN}:{extra}"),
            None => SYNC_ORIGIN.to_string(),
        };
        let mut commit = CommitOptions::new().origin(&origin);
        if let Some(message) = &options.message {
            commit = commit.commit_msg(message);
        }
        if let Some(timestamp) = options.timestamp {
            commit = commit.timestamp(timestamp);
        }
        inner.doc.commit_with(commit);

        slots.backfill(&mut draft);
        let rebuilt = state_from_doc(&inner.doc, &inner.schema);
        let next = overlay_ignored(&inner.schema, &draft, rebuilt);

        if inner.options.check_state_consistency
            && let Some(path) = first_divergence(&inner.schema, &next, &draft, "", true)
        {
            return Err(MirrorError::Consistency { path }.into());
        }

        inner.state = next;
        inner.registry = collect_registry(&inner.doc, &inner.schema);
        inner.last_version = inner.doc.oplog_vv();
        Ok(Some(self.notification(&inner, options)))
    }

    fn notification(
        &self,
        inner: &Inner,
        options: &SetStateOptions,
    ) -> (Value, Vec<SubscriberFn>, SyncMeta) {
        let meta = SyncMeta {
            direction: SyncDirection::ToRemote,
            tags: options.tags.clone(),
        };
        let subscribers = inner.subscribers.iter().map(|(_, f)| f.clone()).collect();
        (inner.state.clone(), subscribers, meta)
    }
}

impl Drop for Mirror {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Rebuild state from the document after a non-echo event batch.
///
/// Batches are coalesced by oplog version: an event carrying nothing newer
/// than the last reconciliation is dropped.
fn reconcile_remote(mutex: &Mutex<Inner>) {
    let notify = {
        let mut inner = lock(mutex);
        if inner.disposed {
            None
        } else {
            let version = inner.doc.oplog_vv();
            if version == inner.last_version {
                None
            } else {
                let rebuilt = state_from_doc(&inner.doc, &inner.schema);
                inner.state = overlay_ignored(&inner.schema, &inner.state.clone(), rebuilt);
                inner.registry = collect_registry(&inner.doc, &inner.schema);
                inner.last_version = version;
                let subscribers: Vec<SubscriberFn> =
                    inner.subscribers.iter().map(|(_, f)| f.clone()).collect();
                Some((inner.state.clone(), subscribers))
            }
        }
    };
    if let Some((state, subscribers)) = notify {
        let meta = SyncMeta {
            direction: SyncDirection::FromRemote,
            tags: None,
        };
        for subscriber in subscribers {
            subscriber(&state, &meta);
        }
    }
}

/// Positional sibling order in root tree containers requires fractional
/// indexing.
fn enable_tree_order(doc: &LoroDoc, schema: &Schema) {
    let Some(fields) = schema.fields() else {
        return;
    };
    for (name, field) in fields {
        if matches!(field, Schema::Tree { .. }) {
            doc.get_tree(name.as_str()).enable_fractional_index(0);
        }
    }
}

/// Walk the document along the schema and record every live container with
/// the schema that governs it.
fn collect_registry(doc: &LoroDoc, schema: &Schema) -> HashMap<ContainerID, Schema> {
    let mut out = HashMap::new();
    let Some(fields) = schema.fields() else {
        return out;
    };
    let engine = DiffEngine::new(doc);
    for (name, field) in fields {
        if field.container_type().is_none() {
            continue;
        }
        let id = engine.root_container(name, field);
        collect_container(doc, &id, field, &mut out);
    }
    out
}

fn collect_container(
    doc: &LoroDoc,
    id: &ContainerID,
    schema: &Schema,
    out: &mut HashMap<ContainerID, Schema>,
) {
    if out.contains_key(id) {
        return;
    }
    out.insert(id.clone(), schema.clone());
    match id.container_type() {
        ContainerType::Map => {
            if let LoroValue::Map(entries) = doc.get_map(id.clone()).get_value() {
                for (key, raw) in entries.iter() {
                    if let LoroValue::Container(child) = raw {
                        collect_container(doc, child, schema.field(key), out);
                    }
                }
            }
        }
        ContainerType::List | ContainerType::MovableList => {
            let value = if id.container_type() == ContainerType::MovableList {
                doc.get_movable_list(id.clone()).get_value()
            } else {
                doc.get_list(id.clone()).get_value()
            };
            if let LoroValue::List(items) = value {
                let item_schema = schema.item_or_any();
                for raw in items.iter() {
                    if let LoroValue::Container(child) = raw {
                        collect_container(doc, child, item_schema, out);
                    }
                }
            }
        }
        ContainerType::Tree => {
            let tree = doc.get_tree(id.clone());
            let data_schema = Schema::Map {
                fields: schema.node_fields().cloned().unwrap_or_default(),
            };
            collect_tree_metas(doc, &tree, None, &data_schema, out);
        }
        _ => {}
    }
}

fn collect_tree_metas(
    doc: &LoroDoc,
    tree: &loro::LoroTree,
    parent: Option<TreeID>,
    data_schema: &Schema,
    out: &mut HashMap<ContainerID, Schema>,
) {
    for id in tree.children(parent).unwrap_or_default() {
        if let Ok(meta) = tree.get_meta(id) {
            collect_container(doc, &meta.id(), data_schema, out);
        }
        collect_tree_metas(doc, tree, Some(id), data_schema, out);
    }
}

/// Copy ignored fields from the draft into a rebuilt state; the document
/// never stores them, so a rebuild alone would drop them.
fn overlay_ignored(schema: &Schema, draft: &Value, mut rebuilt: Value) -> Value {
    overlay_into(schema, draft, &mut rebuilt);
    rebuilt
}

fn overlay_into(schema: &Schema, draft: &Value, out: &mut Value) {
    let Some(fields) = schema.fields() else {
        return;
    };
    let (Some(draft_obj), Some(out_obj)) = (draft.as_object(), out.as_object_mut()) else {
        return;
    };
    for (name, field) in fields {
        match field {
            Schema::Ignore => {
                if let Some(value) = draft_obj.get(name) {
                    out_obj.insert(name.clone(), value.clone());
                }
            }
            Schema::Map { .. } => {
                if let (Some(d), Some(o)) = (draft_obj.get(name), out_obj.get_mut(name)) {
                    overlay_into(field, d, o);
                }
            }
            _ => {}
        }
    }
}

/// Structural comparison between the rebuilt authoritative state and the
/// applied draft, tolerant of `$cid` fields the draft never carried.
/// Returns the path of the first divergence.
fn first_divergence(
    schema: &Schema,
    authoritative: &Value,
    draft: &Value,
    path: &str,
    root: bool,
) -> Option<String> {
    match schema {
        Schema::Ignore => None,
        Schema::Map { .. } => {
            let (Some(auth), Some(draft)) = (authoritative.as_object(), draft.as_object()) else {
                return (authoritative != draft).then(|| path.to_string());
            };
            for (key, draft_value) in draft {
                if key == CID_KEY || matches!(schema.field(key), Schema::Ignore) {
                    continue;
                }
                let child_path = join_path(path, key);
                let Some(auth_value) = auth.get(key) else {
                    return Some(child_path);
                };
                if let Some(found) =
                    first_divergence(schema.field(key), auth_value, draft_value, &child_path, false)
                {
                    return Some(found);
                }
            }
            if !root {
                // A key only the rebuilt side has means a delete never landed.
                for key in auth.keys() {
                    if key != CID_KEY
                        && !matches!(schema.field(key), Schema::Ignore)
                        && !draft.contains_key(key)
                    {
                        return Some(join_path(path, key));
                    }
                }
            }
            None
        }
        Schema::List { .. } | Schema::MovableList { .. } => {
            let (Some(auth), Some(draft)) = (authoritative.as_array(), draft.as_array()) else {
                return (authoritative != draft).then(|| path.to_string());
            };
            if auth.len() != draft.len() {
                return Some(path.to_string());
            }
            let item = schema.item_or_any();
            for (index, (a, d)) in auth.iter().zip(draft).enumerate() {
                let child_path = join_path(path, &index.to_string());
                if let Some(found) = first_divergence(item, a, d, &child_path, false) {
                    return Some(found);
                }
            }
            None
        }
        Schema::Tree { .. } => {
            let data_schema = Schema::Map {
                fields: schema.node_fields().cloned().unwrap_or_default(),
            };
            tree_divergence(&data_schema, authoritative, draft, path)
        }
        Schema::Any => plain_unequal(authoritative, draft).then(|| path.to_string()),
        _ => (authoritative != draft).then(|| path.to_string()),
    }
}

fn tree_divergence(
    data_schema: &Schema,
    authoritative: &Value,
    draft: &Value,
    path: &str,
) -> Option<String> {
    let (Some(auth), Some(draft)) = (authoritative.as_array(), draft.as_array()) else {
        return (authoritative != draft).then(|| path.to_string());
    };
    if auth.len() != draft.len() {
        return Some(path.to_string());
    }
    let empty_object = Value::Object(serde_json::Map::new());
    let empty_array = Value::Array(Vec::new());
    for (index, (a, d)) in auth.iter().zip(draft).enumerate() {
        let node_path = join_path(path, &index.to_string());
        if a.get(TREE_ID_KEY) != d.get(TREE_ID_KEY) {
            return Some(join_path(&node_path, TREE_ID_KEY));
        }
        if let Some(found) = first_divergence(
            data_schema,
            a.get(TREE_DATA_KEY).unwrap_or(&empty_object),
            d.get(TREE_DATA_KEY).unwrap_or(&empty_object),
            &join_path(&node_path, TREE_DATA_KEY),
            false,
        ) {
            return Some(found);
        }
        if let Some(found) = tree_divergence(
            data_schema,
            a.get(TREE_CHILDREN_KEY).unwrap_or(&empty_array),
            d.get(TREE_CHILDREN_KEY).unwrap_or(&empty_array),
            &join_path(&node_path, TREE_CHILDREN_KEY),
        ) {
            return Some(found);
        }
    }
    None
}

/// Deep inequality that disregards `$cid` keys on either side.
fn plain_unequal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => {
            let keys = |m: &serde_json::Map<String, Value>| {
                m.keys().filter(|k| *k != CID_KEY).count()
            };
            if keys(a) != keys(b) {
                return true;
            }
            a.iter().any(|(k, av)| {
                k != CID_KEY && b.get(k).is_none_or(|bv| plain_unequal(av, bv))
            })
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() != b.len() || a.iter().zip(b).any(|(av, bv)| plain_unequal(av, bv))
        }
        _ => a != b,
    }
}

fn join_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}
