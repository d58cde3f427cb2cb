use super::{bind, seed_failed};
use crate::api::SeedSource;
use crate::error::SyncError;
use crate::event::{EventKind, TypedEvent};
use crate::state::{MergeStrategy, Policy, Reconciler, Snapshot};
use crate::subscription::{SubscriptionManager, SubscriptionScope};
use crate::topic::topics;
use serde_json::{json, Map};
use std::sync::Arc;

/// Simulation tick and running state, one snapshot keyed by simulation id.
pub struct ClockView {
    sim_id: String,
    state: Arc<Reconciler>,
    scope: SubscriptionScope,
}

impl ClockView {
    pub fn reconciler() -> Reconciler {
        Reconciler::builder("clock")
            .id_extractor(|e: &TypedEvent| e.topic.simulation_id().map(str::to_string))
            .on(EventKind::Tick, Policy::create(vec![MergeStrategy::replace(["tick"])]))
            .on(EventKind::Started, Policy::create(vec![MergeStrategy::set_flag("running", true)]))
            .on(EventKind::Stopped, Policy::create(vec![MergeStrategy::set_flag("running", false)]))
            .build()
    }

    pub async fn mount(manager: &Arc<SubscriptionManager>, sim_id: &str) -> Self {
        let state = Arc::new(Self::reconciler());
        let scope = manager.scope();
        for kind in ["tick", "started", "stopped"] {
            bind(&scope, topics::simulation(sim_id, kind), &state).await;
        }
        Self {
            sim_id: sim_id.to_string(),
            state,
            scope,
        }
    }

    pub async fn seed(&self, source: &dyn SeedSource) -> Result<(), SyncError> {
        let simulation = source
            .simulation(&self.sim_id)
            .await
            .map_err(|e| seed_failed("clock", format!("simulation {}", self.sim_id), e))?;
        let mut fields = Map::new();
        fields.insert("tick".into(), json!(simulation.tick));
        self.state.seed(&self.sim_id, fields);
        self.state.seed_flag(&self.sim_id, "running", simulation.running);
        Ok(())
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        self.state.get(&self.sim_id)
    }

    /// Latest tick, 0 before anything is known
    pub fn tick(&self) -> u64 {
        self.snapshot().and_then(|s| s.field_u64("tick")).unwrap_or(0)
    }

    pub fn running(&self) -> bool {
        self.snapshot().map(|s| s.flag("running")).unwrap_or(false)
    }

    pub fn teardown(&self) {
        self.scope.teardown();
    }
}
