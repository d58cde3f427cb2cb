use crate::error::SyncError;
use std::fmt;


/// Single-segment wildcard
pub const WILDCARD: &str = "*";

/// Rest-of-topic wildcard (only valid as the last segment)
pub const TAIL_WILDCARD: &str = ">";

/// Concrete topic an event arrived on.
///
/// Layout: `simulation.<simId>[.agent|resource.<entityId>].<eventKind>`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Topic {
    raw: String,
    segments: Vec<String>,
}

impl Topic {
    /// Parse a dot-separated subject. Wildcards are not allowed here.
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        let segments = split_segments(raw)?;
        if segments
            .iter()
            .any(|s| s == WILDCARD || s == TAIL_WILDCARD)
        {
            return Err(SyncError::InvalidTopic(raw.to_string()));
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// `<simId>` segment, when the topic is under `simulation.`
    pub fn simulation_id(&self) -> Option<&str> {
        match self.segments.first().map(String::as_str) {
            Some("simulation") => self.segments.get(1).map(String::as_str),
            _ => None,
        }
    }

    /// `agent` or `resource` for entity-scoped topics
    pub fn entity_kind(&self) -> Option<&str> {
        if self.segments.len() != 5 {
            return None;
        }
        self.simulation_id()?;
        self.segments.get(2).map(String::as_str)
    }

    /// `<entityId>` segment for entity-scoped topics
    pub fn entity_id(&self) -> Option<&str> {
        self.entity_kind()?;
        self.segments.get(3).map(String::as_str)
    }

    /// Final segment, naming the event kind
    pub fn event_segment(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Subscription scope, possibly containing `*` and a trailing `>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<String>,
}

impl TopicPattern {
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        let segments = split_segments(raw)?;
        let tail_misplaced = segments
            .iter()
            .enumerate()
            .any(|(i, s)| s == TAIL_WILDCARD && i + 1 != segments.len());
        if tail_misplaced {
            return Err(SyncError::InvalidTopic(raw.to_string()));
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// NATS subject matching: `*` matches exactly one segment, `>` matches
    /// one or more trailing segments.
    pub fn matches(&self, topic: &Topic) -> bool {
        let subject = topic.segments();
        for (i, want) in self.segments.iter().enumerate() {
            if want == TAIL_WILDCARD {
                return subject.len() > i;
            }
            match subject.get(i) {
                Some(got) if want == WILDCARD || want == got => continue,
                _ => return false,
            }
        }
        subject.len() == self.segments.len()
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_segments(raw: &str) -> Result<Vec<String>, SyncError> {
    if raw.is_empty() {
        return Err(SyncError::InvalidTopic(raw.to_string()));
    }
    let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(SyncError::InvalidTopic(raw.to_string()));
    }
    Ok(segments)
}

/// Subject builders for the simulation topic hierarchy.
pub mod topics {
    use super::{TopicPattern, TAIL_WILDCARD};

    fn pattern(raw: String) -> TopicPattern {
        // Builders only ever join non-empty, dot-free segments.
        TopicPattern::parse(&raw).unwrap_or_else(|_| TopicPattern {
            segments: raw.split('.').map(str::to_string).collect(),
            raw,
        })
    }

    /// `simulation.<sim>.<kind>`
    pub fn simulation(sim: &str, kind: &str) -> TopicPattern {
        pattern(format!("simulation.{sim}.{kind}"))
    }

    /// `simulation.<sim>.agent.<agent>.<kind>`; pass `*` for every agent.
    pub fn agent(sim: &str, agent: &str, kind: &str) -> TopicPattern {
        pattern(format!("simulation.{sim}.agent.{agent}.{kind}"))
    }

    /// `simulation.<sim>.resource.<resource>.<kind>`
    pub fn resource(sim: &str, resource: &str, kind: &str) -> TopicPattern {
        pattern(format!("simulation.{sim}.resource.{resource}.{kind}"))
    }

    /// Everything under one simulation.
    pub fn firehose(sim: &str) -> TopicPattern {
        pattern(format!("simulation.{sim}.{TAIL_WILDCARD}"))
    }
}
