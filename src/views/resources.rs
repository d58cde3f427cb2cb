use super::{bind, record_fields, seed_failed};
use crate::api::SeedSource;
use crate::error::SyncError;
use crate::event::EventKind;
use crate::state::{MergeStrategy, Policy, Reconciler, Snapshot, SnapshotChange};
use crate::subscription::{SubscriptionManager, SubscriptionScope};
use crate::topic::topics;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Resource availability, flipped by harvest and regrowth events.
pub struct ResourceView {
    sim_id: String,
    state: Arc<Reconciler>,
    scope: SubscriptionScope,
}

impl ResourceView {
    pub fn reconciler() -> Reconciler {
        Reconciler::builder("resources")
            .on(
                EventKind::Harvested,
                Policy::create(vec![
                    MergeStrategy::set_flag("available", false),
                    MergeStrategy::replace(["harvester_id", "start_tick", "end_tick", "x_coord", "y_coord"]),
                ]),
            )
            .on(
                EventKind::Grown,
                Policy::create(vec![
                    MergeStrategy::set_flag("available", true),
                    MergeStrategy::replace(["x_coord", "y_coord"]),
                ]),
            )
            .build()
    }

    pub async fn mount(manager: &Arc<SubscriptionManager>, sim_id: &str) -> Self {
        let state = Arc::new(Self::reconciler());
        let scope = manager.scope();
        bind(&scope, topics::resource(sim_id, "*", "harvested"), &state).await;
        bind(&scope, topics::resource(sim_id, "*", "grown"), &state).await;
        Self {
            sim_id: sim_id.to_string(),
            state,
            scope,
        }
    }

    pub async fn seed(&self, source: &dyn SeedSource) -> Result<usize, SyncError> {
        let resources = source
            .resources(&self.sim_id)
            .await
            .map_err(|e| seed_failed("resources", format!("resources of simulation {}", self.sim_id), e))?;
        for resource in &resources {
            self.state.seed(&resource.id, record_fields(resource, &["available"]));
            self.state.seed_flag(&resource.id, "available", resource.available);
        }
        Ok(resources.len())
    }

    pub fn get(&self, id: &str) -> Option<Snapshot> {
        self.state.get(id)
    }

    pub fn all(&self) -> Vec<Snapshot> {
        self.state.all()
    }

    pub fn available(&self, id: &str) -> Option<bool> {
        self.state.get(id).map(|s| s.flag("available"))
    }

    pub fn changes(&self) -> broadcast::Receiver<SnapshotChange> {
        self.state.subscribe()
    }

    pub fn teardown(&self) {
        self.scope.teardown();
    }
}
