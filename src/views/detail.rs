use super::{record_fields, seed_failed};
use crate::api::SeedSource;
use crate::event::EventKind;
use crate::state::{MergeStrategy, Policy, Reconciler, Snapshot, SnapshotChange};
use crate::subscription::{SubscriptionManager, SubscriptionScope};
use crate::topic::topics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// One agent in depth, re-scoped whenever the selection changes.
///
/// A switch tears down the previous agent's subscriptions, seeds the new
/// agent from REST and only then subscribes to its topics. Events published
/// between the seed fetch and the subscription becoming ready are lost; the
/// next event for the same field corrects the snapshot.
pub struct DetailView {
    sim_id: String,
    manager: Arc<SubscriptionManager>,
    source: Arc<dyn SeedSource>,
    state: Arc<Reconciler>,
    selected: RwLock<Option<String>>,
    scope: Mutex<Option<SubscriptionScope>>,
    /// Bumped on every switch; handlers from older scopes compare and bail
    generation: Arc<AtomicU64>,
    /// Serializes concurrent switches
    switching: tokio::sync::Mutex<()>,
}

impl DetailView {
    pub fn reconciler() -> Reconciler {
        Reconciler::builder("detail")
            .on(EventKind::Placed, Policy::create(vec![MergeStrategy::replace_all()]))
            .on(
                EventKind::Moved,
                Policy::update(vec![MergeStrategy::replace(["x_coord", "y_coord", "energy_level"])]),
            )
            .on(
                EventKind::Dead,
                Policy::update(vec![
                    MergeStrategy::set_flag("dead", true),
                    MergeStrategy::replace(["x_coord", "y_coord", "death_tick"]),
                ]),
            )
            .build()
    }

    pub fn new(manager: &Arc<SubscriptionManager>, source: Arc<dyn SeedSource>, sim_id: &str) -> Arc<Self> {
        Arc::new(Self {
            sim_id: sim_id.to_string(),
            manager: Arc::clone(manager),
            source,
            state: Arc::new(Self::reconciler()),
            selected: RwLock::new(None),
            scope: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
            switching: tokio::sync::Mutex::new(()),
        })
    }

    /// Re-scope to `agent_id`, or show nothing for `None`
    pub async fn select(&self, agent_id: Option<String>) {
        let _switch = self.switching.lock().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.drop_scope();
        self.state.clear();
        *self.selected.write().unwrap_or_else(|e| e.into_inner()) = agent_id.clone();

        let Some(agent_id) = agent_id else {
            debug!("Detail view cleared");
            return;
        };

        self.seed_agent(&agent_id).await;

        let scope = self.manager.scope();
        for kind in ["placed", "moved", "dead"] {
            let state = Arc::clone(&self.state);
            let current = Arc::clone(&self.generation);
            let pattern = topics::agent(&self.sim_id, &agent_id, kind);
            scope
                .subscribe_typed(&pattern, move |event| {
                    if current.load(Ordering::SeqCst) == generation {
                        state.apply(&event);
                    }
                    Ok(())
                })
                .await;
        }
        *self.scope.lock().unwrap_or_else(|e| e.into_inner()) = Some(scope);
        info!(agent_id = %agent_id, "Detail view scoped");
    }

    /// Re-scope on every value published on `selection`
    pub fn follow_selection(self: &Arc<Self>, mut selection: watch::Receiver<Option<String>>) -> JoinHandle<()> {
        let view = Arc::clone(self);
        tokio::spawn(async move {
            let initial = selection.borrow_and_update().clone();
            view.select(initial).await;
            while selection.changed().await.is_ok() {
                let next = selection.borrow_and_update().clone();
                if next == view.selected() {
                    continue;
                }
                view.select(next).await;
            }
            debug!("Selection channel closed");
        })
    }

    pub fn selected(&self) -> Option<String> {
        self.selected.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Snapshot of the selected agent, if any is known
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.selected().and_then(|id| self.state.get(&id))
    }

    pub fn changes(&self) -> broadcast::Receiver<SnapshotChange> {
        self.state.subscribe()
    }

    /// Number of live subscriptions for the current scope
    pub fn active_subscriptions(&self) -> usize {
        self.scope
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(SubscriptionScope::active_count)
            .unwrap_or(0)
    }

    /// Re-fetch the selected agent without re-subscribing (after a reconnect)
    pub async fn reseed(&self) {
        let _switch = self.switching.lock().await;
        let Some(agent_id) = self.selected() else {
            return;
        };
        self.seed_agent(&agent_id).await;
    }

    async fn seed_agent(&self, agent_id: &str) {
        match self.source.agent(&self.sim_id, agent_id).await {
            Ok(agent) => {
                self.state.seed(
                    agent_id,
                    record_fields(&agent, &["last_10_messages", "last_10_action_logs"]),
                );
            }
            Err(e) => {
                seed_failed("detail", format!("agent {agent_id}"), e);
            }
        }
    }

    pub fn teardown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.drop_scope();
    }

    fn drop_scope(&self) {
        let old = self.scope.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(old) = old {
            old.teardown();
        }
    }
}
