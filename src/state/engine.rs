use super::entity::{Outcome, Snapshot, SnapshotChange};
use super::log::BoundedLog;
use crate::error::SyncError;
use crate::event::{EventKind, TypedEvent};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Which event fields a Replace merge copies
#[derive(Clone, Debug, PartialEq)]
pub enum FieldSet {
    All,
    Only(Vec<String>),
}

impl FieldSet {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSet::Only(names.into_iter().map(Into::into).collect())
    }

    fn includes(&self, name: &str) -> bool {
        match self {
            FieldSet::All => true,
            FieldSet::Only(names) => names.iter().any(|n| n == name),
        }
    }
}

/// How one event kind mutates a snapshot
#[derive(Clone, Debug, PartialEq)]
pub enum MergeStrategy {
    /// Partial update: named fields overwrite, everything else is kept
    Replace(FieldSet),
    /// Prepend the event's record to a capped log, skipping known keys
    AppendBounded {
        log: String,
        cap: usize,
        dedup_key: String,
    },
    SetFlag { name: String, value: bool },
}

impl MergeStrategy {
    pub fn replace_all() -> Self {
        MergeStrategy::Replace(FieldSet::All)
    }

    pub fn replace<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MergeStrategy::Replace(FieldSet::only(names))
    }

    pub fn append_bounded(log: &str, cap: usize, dedup_key: &str) -> Self {
        MergeStrategy::AppendBounded {
            log: log.to_string(),
            cap,
            dedup_key: dedup_key.to_string(),
        }
    }

    pub fn set_flag(name: &str, value: bool) -> Self {
        MergeStrategy::SetFlag {
            name: name.to_string(),
            value,
        }
    }
}

/// Strategies for one event kind, and whether that kind may create
#[derive(Clone, Debug, PartialEq)]
pub struct Policy {
    pub creates: bool,
    pub strategies: Vec<MergeStrategy>,
}

impl Policy {
    /// Kind that brings an entity into existence
    pub fn create(strategies: Vec<MergeStrategy>) -> Self {
        Self {
            creates: true,
            strategies,
        }
    }

    /// Kind that only mutates known entities
    pub fn update(strategies: Vec<MergeStrategy>) -> Self {
        Self {
            creates: false,
            strategies,
        }
    }
}

pub type IdExtractor = Arc<dyn Fn(&TypedEvent) -> Option<String> + Send + Sync>;

/// Folds typed events into a keyed collection of snapshots.
///
/// Each instance is independent: two reconcilers over the same stream share
/// no state and converge on their own.
pub struct Reconciler {
    name: String,
    entities: DashMap<String, Snapshot>,
    extract_id: IdExtractor,
    policies: HashMap<EventKind, Policy>,
    changes: broadcast::Sender<SnapshotChange>,
}

impl Reconciler {
    pub fn builder(name: &str) -> ReconcilerBuilder {
        ReconcilerBuilder {
            name: name.to_string(),
            extract_id: Arc::new(|event: &TypedEvent| event.entity_id().map(str::to_string)),
            policies: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self, kind: &EventKind) -> Option<&Policy> {
        self.policies.get(kind)
    }

    /// Apply one event under the policy declared for its kind
    pub fn apply(&self, event: &TypedEvent) -> Outcome {
        let Some(policy) = self.policies.get(&event.kind) else {
            return Outcome::Ignored;
        };
        let Some(id) = (self.extract_id)(event) else {
            debug!(view = %self.name, topic = %event.topic, "No entity id in event, ignoring");
            return Outcome::Ignored;
        };

        let fields = event.body.fields();
        let (outcome, revision) = {
            let (mut snapshot, created) = match self.entities.entry(id.clone()) {
                Entry::Occupied(o) => (o.into_ref(), false),
                Entry::Vacant(v) if policy.creates => (v.insert(Snapshot::new(id.clone())), true),
                Entry::Vacant(_) => {
                    let race = SyncError::UnknownEntity {
                        view: self.name.clone(),
                        entity_id: id,
                    };
                    debug!(kind = %event.kind, "{race}, no-op");
                    return Outcome::UnknownEntity;
                }
            };

            let mut changed = false;
            for strategy in &policy.strategies {
                changed |= merge(&mut snapshot, strategy, &fields, &event.id.to_string());
            }

            let outcome = if created {
                snapshot.touch();
                Outcome::Created
            } else if changed {
                snapshot.touch();
                Outcome::Updated
            } else {
                Outcome::Duplicate
            };
            (outcome, snapshot.revision)
        };

        if outcome == Outcome::Duplicate {
            debug!(view = %self.name, entity_id = %id, kind = %event.kind, "Duplicate event, no-op");
        } else {
            self.notify(&id, outcome, revision);
        }
        outcome
    }

    /// Insert or update a snapshot from a point-in-time fetch. Seeded fields
    /// replace same-named fields; the rest are kept.
    pub fn seed(&self, id: &str, fields: Map<String, Value>) -> Outcome {
        let (outcome, revision) = {
            let (mut snapshot, created) = match self.entities.entry(id.to_string()) {
                Entry::Occupied(o) => (o.into_ref(), false),
                Entry::Vacant(v) => (v.insert(Snapshot::new(id)), true),
            };
            let changed = merge(&mut snapshot, &MergeStrategy::replace_all(), &fields, "");
            let outcome = match (created, changed) {
                (true, _) => Outcome::Created,
                (false, true) => Outcome::Updated,
                (false, false) => Outcome::Duplicate,
            };
            if outcome.changed() {
                snapshot.touch();
            }
            (outcome, snapshot.revision)
        };
        if outcome.changed() {
            self.notify(id, outcome, revision);
        }
        outcome
    }

    /// Set a flag on a known snapshot; unknown ids are ignored
    pub fn seed_flag(&self, id: &str, name: &str, value: bool) -> Outcome {
        let revision = {
            let Some(mut snapshot) = self.entities.get_mut(id) else {
                return Outcome::UnknownEntity;
            };
            if !merge(&mut snapshot, &MergeStrategy::set_flag(name, value), &Map::new(), "") {
                return Outcome::Duplicate;
            }
            snapshot.touch();
            snapshot.revision
        };
        self.notify(id, Outcome::Updated, revision);
        Outcome::Updated
    }

    /// Seed a named log (newest first), creating the snapshot if needed
    pub fn seed_log(&self, id: &str, log: &str, cap: usize, newest_first: Vec<(String, Value)>) -> Outcome {
        let (outcome, revision) = {
            let (mut snapshot, created) = match self.entities.entry(id.to_string()) {
                Entry::Occupied(o) => (o.into_ref(), false),
                Entry::Vacant(v) => (v.insert(Snapshot::new(id)), true),
            };
            let added = snapshot
                .logs
                .entry(log.to_string())
                .or_insert_with(|| BoundedLog::new(cap))
                .seed(newest_first);
            let outcome = match (created, added > 0) {
                (true, _) => Outcome::Created,
                (false, true) => Outcome::Updated,
                (false, false) => Outcome::Duplicate,
            };
            if outcome.changed() {
                snapshot.touch();
            }
            (outcome, snapshot.revision)
        };
        if outcome.changed() {
            self.notify(id, outcome, revision);
        }
        outcome
    }

    /// Get snapshot by ID
    pub fn get(&self, id: &str) -> Option<Snapshot> {
        self.entities.get(id).map(|s| s.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// All snapshots, ordered by id
    pub fn all(&self) -> Vec<Snapshot> {
        let mut all: Vec<Snapshot> = self.entities.iter().map(|s| s.value().clone()).collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entities.iter().map(|s| s.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Forget every snapshot (used when a view changes scope)
    pub fn clear(&self) {
        self.entities.clear();
    }

    /// Subscribe to snapshot changes
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotChange> {
        self.changes.subscribe()
    }

    fn notify(&self, id: &str, outcome: Outcome, revision: u64) {
        // No receivers is fine; views are also read by polling
        let _ = self.changes.send(SnapshotChange {
            view: self.name.clone(),
            entity_id: id.to_string(),
            outcome,
            revision,
        });
    }
}

/// Returns true when the snapshot changed
fn merge(snapshot: &mut Snapshot, strategy: &MergeStrategy, fields: &Map<String, Value>, event_id: &str) -> bool {
    match strategy {
        MergeStrategy::Replace(set) => {
            let mut changed = false;
            for (name, value) in fields.iter().filter(|(name, _)| set.includes(name)) {
                if snapshot.fields.get(name) != Some(value) {
                    snapshot.fields.insert(name.clone(), value.clone());
                    changed = true;
                }
            }
            changed
        }
        MergeStrategy::AppendBounded { log, cap, dedup_key } => {
            let key = match fields.get(dedup_key) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => event_id.to_string(),
            };
            let entry = snapshot
                .logs
                .entry(log.clone())
                .or_insert_with(|| BoundedLog::new(*cap));
            let inserted = entry.insert(key.clone(), Value::Object(fields.clone()));
            if !inserted {
                debug!(entity_id = %snapshot.id(), log = %log, key = %key, "Log entry already present");
            }
            inserted
        }
        MergeStrategy::SetFlag { name, value } => snapshot.flags.insert(name.clone(), *value) != Some(*value),
    }
}

/// Builder for a reconciler configuration
pub struct ReconcilerBuilder {
    name: String,
    extract_id: IdExtractor,
    policies: HashMap<EventKind, Policy>,
}

impl ReconcilerBuilder {
    /// Override the default extractor (topic entity segment, then payload id)
    pub fn id_extractor<F>(mut self, f: F) -> Self
    where
        F: Fn(&TypedEvent) -> Option<String> + Send + Sync + 'static,
    {
        self.extract_id = Arc::new(f);
        self
    }

    pub fn on(mut self, kind: EventKind, policy: Policy) -> Self {
        self.policies.insert(kind, policy);
        self
    }

    pub fn build(self) -> Reconciler {
        let (changes, _) = broadcast::channel(1000);
        Reconciler {
            name: self.name,
            entities: DashMap::new(),
            extract_id: self.extract_id,
            policies: self.policies,
            changes,
        }
    }
}
