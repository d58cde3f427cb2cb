use crate::api::SeedSource;
use crate::config::SimwatchConfig;
use crate::error::SyncError;
use crate::grid::{animate, GridCoordinator, MovementFeed, SharedCoordinator};
use crate::model::World;
use crate::nats::Bus;
use crate::selection::SelectionController;
use crate::state::Snapshot;
use crate::subscription::{StatsSnapshot, SubscriptionManager};
use crate::views::{ClockView, DebugLogView, DetailView, LogView, ResourceView, RosterView};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

const FRAME: Duration = Duration::from_millis(16);

/// Point-in-time summary for status output
#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
    pub simulation_id: String,
    pub tick: u64,
    pub running: bool,
    pub agents: usize,
    pub alive: usize,
    pub selected: Option<String>,
    pub subscriptions: StatsSnapshot,
}

/// Every view of one simulation, wired to one bus connection.
///
/// Built with explicit dependencies; two sessions never share state.
pub struct SimulationSession {
    sim_id: String,
    manager: Arc<SubscriptionManager>,
    source: Arc<dyn SeedSource>,
    roster: RosterView,
    detail: Arc<DetailView>,
    logs: LogView,
    clock: ClockView,
    resources: ResourceView,
    debug_log: DebugLogView,
    grid: SharedCoordinator,
    feed: MovementFeed,
    selection: SelectionController,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    torn_down: AtomicBool,
}

impl SimulationSession {
    /// Subscribe every view, seed from REST, then start the grid and the
    /// reconnect watcher
    pub async fn mount(
        config: &SimwatchConfig,
        bus: Arc<dyn Bus>,
        source: Arc<dyn SeedSource>,
        sim_id: &str,
    ) -> Arc<Self> {
        let manager = SubscriptionManager::new(Arc::clone(&bus));

        let roster = RosterView::mount(&manager, sim_id).await;
        let logs = LogView::mount(&manager, sim_id, config.views.log_cap).await;
        let clock = ClockView::mount(&manager, sim_id).await;
        let resources = ResourceView::mount(&manager, sim_id).await;
        let debug_log = DebugLogView::mount(&manager, sim_id, config.views.debug_log_cap).await;
        let detail = DetailView::new(&manager, Arc::clone(&source), sim_id);

        // Seed failures are logged by each view; they keep empty snapshots
        let _ = roster.seed(source.as_ref()).await;
        let _ = logs.seed(source.as_ref()).await;
        let _ = clock.seed(source.as_ref()).await;
        let _ = resources.seed(source.as_ref()).await;

        let world = match source.world(sim_id).await {
            Ok(world) => world,
            Err(e) => {
                let failure = SyncError::SeedFetchFailure {
                    what: format!("world of simulation {sim_id}"),
                    source: e,
                };
                error!(error = %failure, "Grid starts empty");
                World {
                    id: String::new(),
                    simulation_id: sim_id.to_string(),
                    size_x: 0,
                    size_y: 0,
                    base_energy_cost: 0.0,
                    resource_coords: Vec::new(),
                }
            }
        };
        let mut coordinator = GridCoordinator::from_world(&world, &[], config.grid.clone());
        coordinator.sync_roster(&roster.all());
        apply_resources(&mut coordinator, &resources.all());
        let grid: SharedCoordinator = Arc::new(Mutex::new(coordinator));
        let feed = MovementFeed::mount(&manager, sim_id, &grid).await;
        let selection = SelectionController::new(Arc::clone(&grid));

        let tasks = vec![
            animate(Arc::clone(&grid), FRAME),
            detail.follow_selection(selection.subscribe()),
        ];

        let session = Arc::new(Self {
            sim_id: sim_id.to_string(),
            manager,
            source,
            roster,
            detail,
            logs,
            clock,
            resources,
            debug_log,
            grid,
            feed,
            selection,
            tasks: Mutex::new(tasks),
            torn_down: AtomicBool::new(false),
        });

        let watcher = watch_reconnects(Arc::downgrade(&session), bus);
        session.track(watcher);

        info!(
            simulation = %sim_id,
            agents = session.roster.len(),
            tick = session.clock.tick(),
            "Session mounted"
        );
        session
    }

    fn track(&self, task: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(task);
    }

    /// Re-fetch everything seeded at mount. Events missed while the bus was
    /// down are recovered only through this.
    pub async fn reseed(&self) {
        info!(simulation = %self.sim_id, "Reseeding views");
        let source = self.source.as_ref();
        let roster_seeded = self.roster.seed(source).await.is_ok();
        let _ = self.logs.seed(source).await;
        let _ = self.clock.seed(source).await;
        let _ = self.resources.seed(source).await;
        self.detail.reseed().await;

        let roster = self.roster.all();
        let resources = self.resources.all();
        let mut grid = self.grid.lock().unwrap_or_else(|e| e.into_inner());
        // A failed fetch leaves the grid on what the event stream already said
        if roster_seeded {
            grid.sync_roster(&roster);
        }
        apply_resources(&mut grid, &resources);
    }

    /// Unsubscribe every view and stop background tasks. Safe to call more
    /// than once.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.roster.teardown();
        self.logs.teardown();
        self.clock.teardown();
        self.resources.teardown();
        self.debug_log.teardown();
        self.detail.teardown();
        self.feed.teardown();
        for task in self.tasks.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
            task.abort();
        }
        info!(simulation = %self.sim_id, "Session torn down");
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            simulation_id: self.sim_id.clone(),
            tick: self.clock.tick(),
            running: self.clock.running(),
            agents: self.roster.len(),
            alive: self.roster.alive().len(),
            selected: self.selection.current(),
            subscriptions: self.manager.stats().snapshot(),
        }
    }

    pub fn sim_id(&self) -> &str {
        &self.sim_id
    }

    pub fn manager(&self) -> &Arc<SubscriptionManager> {
        &self.manager
    }

    pub fn roster(&self) -> &RosterView {
        &self.roster
    }

    pub fn detail(&self) -> &Arc<DetailView> {
        &self.detail
    }

    pub fn logs(&self) -> &LogView {
        &self.logs
    }

    pub fn clock(&self) -> &ClockView {
        &self.clock
    }

    pub fn resources(&self) -> &ResourceView {
        &self.resources
    }

    pub fn debug_log(&self) -> &DebugLogView {
        &self.debug_log
    }

    pub fn grid(&self) -> &SharedCoordinator {
        &self.grid
    }

    pub fn selection(&self) -> &SelectionController {
        &self.selection
    }
}

impl Drop for SimulationSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Paint harvested and available resource tiles; both are idempotent
fn apply_resources(grid: &mut GridCoordinator, resources: &[Snapshot]) {
    for resource in resources {
        let Some(at) = resource.position() else {
            continue;
        };
        if resource.flag("available") {
            grid.on_resource_grown(at);
        } else {
            grid.on_resource_harvested(at);
        }
    }
}

fn watch_reconnects(session: Weak<SimulationSession>, bus: Arc<dyn Bus>) -> JoinHandle<()> {
    let mut reconnects = bus.reconnects();
    tokio::spawn(async move {
        while reconnects.changed().await.is_ok() {
            let count = *reconnects.borrow_and_update();
            let Some(session) = session.upgrade() else {
                break;
            };
            info!(reconnects = count, "Bus reconnected");
            session.reseed().await;
        }
    })
}
