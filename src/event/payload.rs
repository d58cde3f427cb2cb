use super::EventKind;
use crate::error::SyncError;
use crate::model::{ActionLog, GridPosition, Message};
use crate::topic::Topic;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// `agent.<id>.placed`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentPlaced {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub location: GridPosition,
    /// Remaining agent fields, carried through to the roster untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `agent.<id>.moved`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentMoved {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub new_location: Option<GridPosition>,
    #[serde(default)]
    pub start_location: Option<GridPosition>,
    #[serde(default)]
    pub destination: Option<GridPosition>,
    #[serde(default)]
    pub num_steps: Option<u32>,
    #[serde(default)]
    pub new_energy_level: Option<f64>,
}

impl AgentMoved {
    /// Authoritative position after the move.
    pub fn target(&self) -> Option<GridPosition> {
        self.new_location.or(self.destination)
    }
}

/// `agent.<id>.dead`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentDead {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub location: Option<GridPosition>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub death_tick: Option<u64>,
}

/// `resource.<id>.harvested`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceHarvested {
    #[serde(default)]
    pub id: Option<String>,
    pub harvester_id: String,
    pub location: GridPosition,
    #[serde(default)]
    pub start_tick: u64,
    #[serde(default)]
    pub end_tick: u64,
}

/// `resource.<id>.grown`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceGrown {
    #[serde(default)]
    pub id: Option<String>,
    pub location: GridPosition,
}

/// `simulation.<id>.tick`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TickPayload {
    pub tick: u64,
}

/// Tagged variant per topic family.
#[derive(Clone, Debug, PartialEq)]
pub enum SimEvent {
    AgentPlaced(AgentPlaced),
    AgentMoved(AgentMoved),
    AgentDead(AgentDead),
    AgentRemoved,
    Action(ActionLog),
    Communication(Message),
    ResourceHarvested(ResourceHarvested),
    ResourceGrown(ResourceGrown),
    Tick(TickPayload),
    Started,
    Stopped,
    /// Unrecognised kind; only the firehose view cares
    Other,
}

impl SimEvent {
    /// `id` carried inside the payload, if any
    pub fn payload_id(&self) -> Option<&str> {
        match self {
            SimEvent::AgentPlaced(p) => Some(&p.id),
            SimEvent::AgentMoved(m) => m.id.as_deref(),
            SimEvent::AgentDead(d) => d.id.as_deref(),
            SimEvent::Action(a) => Some(&a.agent_id),
            SimEvent::Communication(m) => Some(&m.agent_id),
            SimEvent::ResourceHarvested(h) => h.id.as_deref(),
            SimEvent::ResourceGrown(g) => g.id.as_deref(),
            _ => None,
        }
    }

    /// Flat field record used by Replace merges.
    pub fn fields(&self) -> Map<String, Value> {
        let mut out = Map::new();
        match self {
            SimEvent::AgentPlaced(p) => {
                out.extend(p.extra.clone());
                out.insert("id".into(), json!(p.id));
                out.insert("name".into(), json!(p.name));
                insert_position(&mut out, p.location);
            }
            SimEvent::AgentMoved(m) => {
                if let Some(target) = m.target() {
                    insert_position(&mut out, target);
                }
                if let Some(energy) = m.new_energy_level {
                    out.insert("energy_level".into(), json!(energy));
                }
            }
            SimEvent::AgentDead(d) => {
                if let Some(location) = d.location {
                    insert_position(&mut out, location);
                }
                if let Some(tick) = d.death_tick {
                    out.insert("death_tick".into(), json!(tick));
                }
            }
            SimEvent::ResourceHarvested(h) => {
                out.insert("harvester_id".into(), json!(h.harvester_id));
                out.insert("start_tick".into(), json!(h.start_tick));
                out.insert("end_tick".into(), json!(h.end_tick));
                insert_position(&mut out, h.location);
            }
            SimEvent::ResourceGrown(g) => insert_position(&mut out, g.location),
            SimEvent::Tick(t) => {
                out.insert("tick".into(), json!(t.tick));
            }
            SimEvent::Action(a) => {
                if let Ok(Value::Object(map)) = serde_json::to_value(a) {
                    out = map;
                }
            }
            SimEvent::Communication(m) => {
                if let Ok(Value::Object(map)) = serde_json::to_value(m) {
                    out = map;
                }
            }
            SimEvent::AgentRemoved | SimEvent::Started | SimEvent::Stopped | SimEvent::Other => {}
        }
        out
    }
}

fn insert_position(out: &mut Map<String, Value>, pos: GridPosition) {
    out.insert("x_coord".into(), json!(pos.x));
    out.insert("y_coord".into(), json!(pos.y));
}

fn parse<T: DeserializeOwned>(topic: &Topic, payload: &[u8]) -> Result<T, SyncError> {
    serde_json::from_slice(payload).map_err(|e| SyncError::malformed(topic.as_str(), e))
}

/// Validate a raw payload against its topic family.
pub(super) fn decode(topic: &Topic, kind: &EventKind, payload: &[u8]) -> Result<SimEvent, SyncError> {
    let event = match kind {
        EventKind::Placed => SimEvent::AgentPlaced(parse(topic, payload)?),
        EventKind::Moved => {
            let moved: AgentMoved = parse(topic, payload)?;
            if moved.target().is_none() {
                return Err(SyncError::malformed(
                    topic.as_str(),
                    "moved event carries neither new_location nor destination",
                ));
            }
            SimEvent::AgentMoved(moved)
        }
        EventKind::Dead => SimEvent::AgentDead(parse(topic, payload)?),
        EventKind::Removed => SimEvent::AgentRemoved,
        EventKind::Action => SimEvent::Action(parse(topic, payload)?),
        EventKind::Communication => SimEvent::Communication(parse(topic, payload)?),
        EventKind::Harvested => SimEvent::ResourceHarvested(parse(topic, payload)?),
        EventKind::Grown => SimEvent::ResourceGrown(parse(topic, payload)?),
        EventKind::Tick => SimEvent::Tick(parse(topic, payload)?),
        // Lifecycle signals carry no meaningful body
        EventKind::Started => SimEvent::Started,
        EventKind::Stopped => SimEvent::Stopped,
        EventKind::Other(_) => SimEvent::Other,
    };
    Ok(event)
}
