use super::log::BoundedLog;
use crate::model::GridPosition;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Current known state of one entity, rebuilt from seed + applied events
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    /// Fixed at creation
    id: String,

    /// Latest value per field (last write by arrival order wins)
    pub fields: Map<String, Value>,

    /// Status flags such as `dead` or `running`
    pub flags: BTreeMap<String, bool>,

    /// Named bounded histories
    pub logs: BTreeMap<String, BoundedLog<Value>>,

    /// Local version, bumped on every effective mutation
    pub revision: u64,

    /// Last mutation timestamp
    pub last_updated: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
            flags: BTreeMap::new(),
            logs: BTreeMap::new(),
            revision: 0,
            last_updated: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn field_i64(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(Value::as_i64)
    }

    pub fn field_u64(&self, name: &str) -> Option<u64> {
        self.fields.get(name).and_then(Value::as_u64)
    }

    pub fn field_f64(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_f64)
    }

    /// Unset flags read as false
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    /// `(x_coord, y_coord)` when both are present
    pub fn position(&self) -> Option<GridPosition> {
        let x = i32::try_from(self.field_i64("x_coord")?).ok()?;
        let y = i32::try_from(self.field_i64("y_coord")?).ok()?;
        Some(GridPosition::new(x, y))
    }

    pub fn log(&self, name: &str) -> Option<&BoundedLog<Value>> {
        self.logs.get(name)
    }

    /// Log entries deserialized as `T`, newest first; entries that do not fit
    /// `T` are skipped.
    pub fn log_as<T: DeserializeOwned>(&self, name: &str) -> Vec<T> {
        self.logs
            .get(name)
            .map(|log| {
                log.iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn touch(&mut self) {
        self.revision += 1;
        self.last_updated = Utc::now();
    }
}

/// Result of folding one event into a view
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Entity did not exist and the event created it
    Created,
    /// At least one field, flag or log changed
    Updated,
    /// Recognised as already applied; nothing changed
    Duplicate,
    /// Entity not known yet and the kind does not create (expected race)
    UnknownEntity,
    /// View declares no policy for this kind, or no entity id could be found
    Ignored,
}

impl Outcome {
    pub fn changed(self) -> bool {
        matches!(self, Outcome::Created | Outcome::Updated)
    }
}

/// Change notification broadcast to view subscribers
#[derive(Clone, Debug)]
pub struct SnapshotChange {
    pub view: String,
    pub entity_id: String,
    pub outcome: Outcome,
    pub revision: u64,
}
