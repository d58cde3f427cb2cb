use crate::error::SyncError;
use crate::topic::Topic;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

mod payload;

pub use payload::{AgentDead, AgentMoved, AgentPlaced, ResourceGrown, ResourceHarvested, SimEvent, TickPayload};

/// Event kind, named by the final topic segment.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Placed,
    Moved,
    Dead,
    Removed,
    Action,
    Communication,
    Harvested,
    Grown,
    Tick,
    Started,
    Stopped,
    Other(String),
}

impl EventKind {
    pub fn from_segment(segment: &str) -> Self {
        match segment {
            "placed" => EventKind::Placed,
            "moved" => EventKind::Moved,
            "dead" => EventKind::Dead,
            "removed" => EventKind::Removed,
            "action" => EventKind::Action,
            "communication" => EventKind::Communication,
            "harvested" => EventKind::Harvested,
            "grown" => EventKind::Grown,
            "tick" => EventKind::Tick,
            "started" => EventKind::Started,
            "stopped" => EventKind::Stopped,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Placed => "placed",
            EventKind::Moved => "moved",
            EventKind::Dead => "dead",
            EventKind::Removed => "removed",
            EventKind::Action => "action",
            EventKind::Communication => "communication",
            EventKind::Harvested => "harvested",
            EventKind::Grown => "grown",
            EventKind::Tick => "tick",
            EventKind::Started => "started",
            EventKind::Stopped => "stopped",
            EventKind::Other(s) => s,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw envelope as delivered by the bus.
///
/// No ordering holds across topics; within one topic, delivery order is the
/// bus's order.
#[derive(Clone, Debug)]
pub struct BusEvent {
    /// Locally assigned UUIDv7 (the bus carries no event id)
    pub id: Uuid,
    pub topic: Topic,
    pub kind: EventKind,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl BusEvent {
    pub fn new(topic: Topic, payload: Vec<u8>) -> Self {
        let kind = EventKind::from_segment(topic.event_segment());
        Self {
            id: Uuid::now_v7(),
            topic,
            kind,
            payload,
            received_at: Utc::now(),
        }
    }

    /// Parse the payload into the variant its topic promises.
    pub fn decode(&self) -> Result<TypedEvent, SyncError> {
        let body = payload::decode(&self.topic, &self.kind, &self.payload)?;
        Ok(TypedEvent {
            id: self.id,
            topic: self.topic.clone(),
            kind: self.kind.clone(),
            body,
            received_at: self.received_at,
        })
    }

    /// Payload pretty-printed as JSON, or as lossy text when it is not JSON
    pub fn payload_text(&self) -> String {
        match serde_json::from_slice::<serde_json::Value>(&self.payload) {
            Ok(value) => serde_json::to_string_pretty(&value)
                .unwrap_or_else(|_| String::from_utf8_lossy(&self.payload).into_owned()),
            Err(_) => String::from_utf8_lossy(&self.payload).into_owned(),
        }
    }
}

/// Envelope whose payload passed validation at the subscription boundary.
#[derive(Clone, Debug)]
pub struct TypedEvent {
    pub id: Uuid,
    pub topic: Topic,
    pub kind: EventKind,
    pub body: SimEvent,
    pub received_at: DateTime<Utc>,
}

impl TypedEvent {
    /// Entity id from the topic, falling back to the payload's `id`
    pub fn entity_id(&self) -> Option<&str> {
        self.topic.entity_id().or_else(|| self.body.payload_id())
    }
}
