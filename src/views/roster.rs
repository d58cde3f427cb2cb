use super::{bind, record_fields, seed_failed};
use crate::api::SeedSource;
use crate::error::SyncError;
use crate::event::EventKind;
use crate::state::{MergeStrategy, Policy, Reconciler, Snapshot, SnapshotChange};
use crate::subscription::{SubscriptionManager, SubscriptionScope};
use crate::topic::topics;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Every agent of a simulation, alive or not, at its last known position.
///
/// Terminal events flip a flag; entries are never deleted so logs keep a
/// valid reference.
pub struct RosterView {
    sim_id: String,
    state: Arc<Reconciler>,
    scope: SubscriptionScope,
}

impl RosterView {
    pub fn reconciler() -> Reconciler {
        Reconciler::builder("roster")
            .on(EventKind::Placed, Policy::create(vec![MergeStrategy::replace_all()]))
            .on(EventKind::Moved, Policy::update(vec![MergeStrategy::replace(["x_coord", "y_coord"])]))
            .on(
                EventKind::Dead,
                Policy::update(vec![
                    MergeStrategy::set_flag("dead", true),
                    MergeStrategy::replace(["death_tick"]),
                ]),
            )
            .on(EventKind::Removed, Policy::update(vec![MergeStrategy::set_flag("removed", true)]))
            .build()
    }

    pub async fn mount(manager: &Arc<SubscriptionManager>, sim_id: &str) -> Self {
        let state = Arc::new(Self::reconciler());
        let scope = manager.scope();
        for kind in ["placed", "moved", "dead", "removed"] {
            bind(&scope, topics::agent(sim_id, "*", kind), &state).await;
        }
        Self {
            sim_id: sim_id.to_string(),
            state,
            scope,
        }
    }

    /// Load the agent list. On failure the roster keeps what it has.
    pub async fn seed(&self, source: &dyn SeedSource) -> Result<usize, SyncError> {
        let agents = source
            .agents(&self.sim_id)
            .await
            .map_err(|e| seed_failed("roster", format!("agents of simulation {}", self.sim_id), e))?;
        for agent in &agents {
            self.state.seed(
                &agent.id,
                record_fields(agent, &["last_10_messages", "last_10_action_logs"]),
            );
        }
        info!(simulation = %self.sim_id, count = agents.len(), "Roster seeded");
        Ok(agents.len())
    }

    pub fn get(&self, id: &str) -> Option<Snapshot> {
        self.state.get(id)
    }

    pub fn all(&self) -> Vec<Snapshot> {
        self.state.all()
    }

    /// Agents not flagged dead or removed
    pub fn alive(&self) -> Vec<Snapshot> {
        self.state
            .all()
            .into_iter()
            .filter(|s| !s.flag("dead") && !s.flag("removed"))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn changes(&self) -> broadcast::Receiver<SnapshotChange> {
        self.state.subscribe()
    }

    pub fn state(&self) -> &Arc<Reconciler> {
        &self.state
    }

    pub fn teardown(&self) {
        self.scope.teardown();
    }
}
