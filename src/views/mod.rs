//! Named reconciler configurations, one per consumer.
//!
//! Every view takes its subscription manager and simulation id explicitly;
//! nothing here is global, so any number of independent views can coexist.

mod clock;
mod debug;
mod detail;
mod logs;
mod resources;
mod roster;


pub use clock::ClockView;
pub use debug::{DebugEntry, DebugLogView};
pub use detail::DetailView;
pub use logs::LogView;
pub use resources::ResourceView;
pub use roster::RosterView;

use crate::error::SyncError;
use crate::state::Reconciler;
use crate::subscription::{Subscription, SubscriptionScope};
use crate::topic::TopicPattern;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::error;

/// Route typed events on `pattern` into `state`
async fn bind(scope: &SubscriptionScope, pattern: TopicPattern, state: &Arc<Reconciler>) -> Subscription {
    let state = Arc::clone(state);
    scope
        .subscribe_typed(&pattern, move |event| {
            state.apply(&event);
            Ok(())
        })
        .await
}

/// Serialize a REST record into a flat field map, minus `skip`
fn record_fields<T: Serialize>(record: &T, skip: &[&str]) -> Map<String, Value> {
    match serde_json::to_value(record) {
        Ok(Value::Object(mut map)) => {
            for name in skip {
                map.remove(*name);
            }
            map
        }
        _ => Map::new(),
    }
}

fn seed_failed(view: &str, what: String, source: anyhow::Error) -> SyncError {
    let failure = SyncError::SeedFetchFailure { what, source };
    error!(view = %view, error = %failure, "Seed fetch failed, keeping current snapshot");
    failure
}
