use super::{bind, seed_failed};
use crate::api::SeedSource;
use crate::error::SyncError;
use crate::event::EventKind;
use crate::model::{ActionLog, Agent, Message};
use crate::state::{MergeStrategy, Policy, Reconciler, SnapshotChange};
use crate::subscription::{SubscriptionManager, SubscriptionScope};
use crate::topic::topics;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

const MESSAGES: &str = "messages";
const ACTIONS: &str = "actions";

/// Per-agent message and action history, newest first.
///
/// Entries are keyed by the agent segment of the topic they arrived on, so a
/// message shows up under every agent whose channel carried it.
pub struct LogView {
    sim_id: String,
    cap: usize,
    state: Arc<Reconciler>,
    scope: SubscriptionScope,
}

impl LogView {
    pub fn reconciler(cap: usize) -> Reconciler {
        Reconciler::builder("logs")
            .on(
                EventKind::Action,
                Policy::create(vec![MergeStrategy::append_bounded(ACTIONS, cap, "id")]),
            )
            .on(
                EventKind::Communication,
                Policy::create(vec![MergeStrategy::append_bounded(MESSAGES, cap, "id")]),
            )
            .build()
    }

    pub async fn mount(manager: &Arc<SubscriptionManager>, sim_id: &str, cap: usize) -> Self {
        let state = Arc::new(Self::reconciler(cap));
        let scope = manager.scope();
        bind(&scope, topics::agent(sim_id, "*", "action"), &state).await;
        bind(&scope, topics::agent(sim_id, "*", "communication"), &state).await;
        Self {
            sim_id: sim_id.to_string(),
            cap,
            state,
            scope,
        }
    }

    /// Seed from the `last_10_*` histories served with each agent
    pub async fn seed(&self, source: &dyn SeedSource) -> Result<usize, SyncError> {
        let agents = source
            .agents(&self.sim_id)
            .await
            .map_err(|e| seed_failed("logs", format!("agent logs of simulation {}", self.sim_id), e))?;
        self.seed_agents(&agents);
        Ok(agents.len())
    }

    pub fn seed_agents(&self, agents: &[Agent]) {
        for agent in agents {
            self.state.seed_log(
                &agent.id,
                MESSAGES,
                self.cap,
                keyed(&agent.last_10_messages, |m| m.id.clone()),
            );
            self.state.seed_log(
                &agent.id,
                ACTIONS,
                self.cap,
                keyed(&agent.last_10_action_logs, |a| a.id.clone()),
            );
        }
    }

    pub fn messages(&self, agent_id: &str) -> Vec<Message> {
        self.state
            .get(agent_id)
            .map(|s| s.log_as(MESSAGES))
            .unwrap_or_default()
    }

    pub fn actions(&self, agent_id: &str) -> Vec<ActionLog> {
        self.state
            .get(agent_id)
            .map(|s| s.log_as(ACTIONS))
            .unwrap_or_default()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn changes(&self) -> broadcast::Receiver<SnapshotChange> {
        self.state.subscribe()
    }

    pub fn teardown(&self) {
        self.scope.teardown();
    }
}

fn keyed<T: Serialize>(items: &[T], key: impl Fn(&T) -> String) -> Vec<(String, Value)> {
    items
        .iter()
        .filter_map(|item| serde_json::to_value(item).ok().map(|v| (key(item), v)))
        .collect()
}
