use crate::state::BoundedLog;
use crate::subscription::{SubscriptionManager, SubscriptionScope};
use crate::topic::topics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// One raw bus message as shown in the debug panel
#[derive(Clone, Debug, Serialize)]
pub struct DebugEntry {
    pub received_at: DateTime<Utc>,
    pub topic: String,
    pub payload: String,
}

/// Firehose of everything published under one simulation.
///
/// Raw envelopes, so malformed payloads still show up here as text.
pub struct DebugLogView {
    entries: Arc<Mutex<BoundedLog<DebugEntry>>>,
    scope: SubscriptionScope,
}

impl DebugLogView {
    pub async fn mount(manager: &Arc<SubscriptionManager>, sim_id: &str, cap: usize) -> Self {
        let entries = Arc::new(Mutex::new(BoundedLog::new(cap)));
        let scope = manager.scope();
        let sink = Arc::clone(&entries);
        scope
            .subscribe(&topics::firehose(sim_id), move |event| {
                let entry = DebugEntry {
                    received_at: event.received_at,
                    topic: event.topic.to_string(),
                    payload: event.payload_text(),
                };
                sink.lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(event.id.to_string(), entry);
                Ok(())
            })
            .await;
        Self { entries, scope }
    }

    /// Entries, newest first
    pub fn entries(&self) -> Vec<DebugEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn teardown(&self) {
        self.scope.teardown();
    }
}
