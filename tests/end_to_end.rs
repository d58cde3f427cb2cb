// End-to-end flows over the in-process bus

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Map};
use simwatch::api::SeedSource;
use simwatch::config::SimwatchConfig;
use simwatch::grid::{Phase, HARVESTED_TILE, RESOURCE_TILE};
use simwatch::model::{Agent, GridPosition, Resource, Simulation, World};
use simwatch::nats::LocalBus;
use simwatch::session::SimulationSession;
use simwatch::subscription::SubscriptionManager;
use simwatch::views::RosterView;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct FixedSeed {
    agents: Vec<Agent>,
    resources: Mutex<Vec<Resource>>,
    tick: AtomicU64,
    failing: AtomicBool,
}

impl FixedSeed {
    fn new(agents: Vec<Agent>) -> Arc<Self> {
        Arc::new(Self {
            agents,
            resources: Mutex::new(Vec::new()),
            tick: AtomicU64::new(1),
            failing: AtomicBool::new(false),
        })
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("server down"));
        }
        Ok(())
    }
}

impl SeedSource for FixedSeed {
    fn simulation<'a>(&'a self, sim: &'a str) -> BoxFuture<'a, Result<Simulation>> {
        async move {
            self.check()?;
            Ok(Simulation {
                id: sim.to_string(),
                tick: self.tick.load(Ordering::SeqCst),
                running: true,
                extra: Map::new(),
            })
        }
        .boxed()
    }

    fn world<'a>(&'a self, sim: &'a str) -> BoxFuture<'a, Result<World>> {
        async move {
            self.check()?;
            Ok(World {
                id: "w1".to_string(),
                simulation_id: sim.to_string(),
                size_x: 12,
                size_y: 12,
                base_energy_cost: 1.0,
                resource_coords: vec![GridPosition::new(4, 5)],
            })
        }
        .boxed()
    }

    fn agents<'a>(&'a self, _sim: &'a str) -> BoxFuture<'a, Result<Vec<Agent>>> {
        async move {
            self.check()?;
            Ok(self.agents.clone())
        }
        .boxed()
    }

    fn agent<'a>(&'a self, _sim: &'a str, agent: &'a str) -> BoxFuture<'a, Result<Agent>> {
        async move {
            self.check()?;
            self.agents
                .iter()
                .find(|a| a.id == agent)
                .cloned()
                .ok_or_else(|| anyhow!("no agent {agent}"))
        }
        .boxed()
    }

    fn resources<'a>(&'a self, _sim: &'a str) -> BoxFuture<'a, Result<Vec<Resource>>> {
        async move {
            self.check()?;
            Ok(self.resources.lock().unwrap().clone())
        }
        .boxed()
    }
}

fn agent(id: &str, x: i32, y: i32) -> Agent {
    serde_json::from_value(json!({
        "id": id,
        "name": id.to_uppercase(),
        "x_coord": x,
        "y_coord": y,
        "last_10_messages": [
            {"id": format!("{id}-m0"), "content": "hello", "agent_id": id}
        ]
    }))
    .unwrap()
}

fn publish(bus: &LocalBus, subject: &str, payload: serde_json::Value) {
    bus.publish_now(subject, serde_json::to_vec(&payload).unwrap())
        .unwrap();
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

#[tokio::test]
async fn roster_counts_placed_agents_and_keeps_the_dead() {
    let bus = Arc::new(LocalBus::new());
    let manager = SubscriptionManager::new(bus.clone());
    let roster = RosterView::mount(&manager, "42").await;

    publish(&bus, "simulation.42.agent.a1.placed", json!({"id": "a1", "name": "A1", "location": [0, 0]}));
    publish(&bus, "simulation.42.agent.a2.placed", json!({"id": "a2", "name": "A2", "location": [1, 1]}));
    settle().await;
    assert_eq!(roster.len(), 2);

    publish(&bus, "simulation.42.agent.a1.dead", json!({"id": "a1"}));
    settle().await;

    assert_eq!(roster.len(), 2);
    assert!(roster.get("a1").unwrap().flag("dead"));
    assert!(!roster.get("a2").unwrap().flag("dead"));
}

#[tokio::test]
async fn session_seeds_streams_and_follows_selection() {
    let bus = Arc::new(LocalBus::new());
    let seed = FixedSeed::new(vec![agent("a1", 3, 5), agent("a2", 8, 8)]);
    let session = SimulationSession::mount(&SimwatchConfig::default(), bus.clone(), seed.clone(), "42").await;

    assert_eq!(session.roster().len(), 2);
    assert_eq!(session.clock().tick(), 1);
    assert!(session.clock().running());
    assert_eq!(session.logs().messages("a1").len(), 1);

    // Selecting a tile with an agent re-scopes the detail view
    let px = session.grid().lock().unwrap().grid_to_world(GridPosition::new(3, 5));
    assert_eq!(session.selection().pointer_down(px).as_deref(), Some("a1"));
    settle().await;
    assert_eq!(session.detail().selected().as_deref(), Some("a1"));

    publish(&bus, "simulation.42.agent.a1.moved", json!({"id": "a1", "new_location": [5, 5]}));
    publish(&bus, "simulation.42.agent.a1.communication", json!({"id": "a1-m0", "content": "hello", "agent_id": "a1"}));
    publish(&bus, "simulation.42.tick", json!({"tick": 2}));
    settle().await;

    assert_eq!(
        session.detail().snapshot().unwrap().position(),
        Some(GridPosition::new(5, 5))
    );
    assert_eq!(session.logs().messages("a1").len(), 1);
    assert_eq!(session.clock().tick(), 2);
    assert!(session.debug_log().len() >= 3);

    // The grid routes around the resource tile at (4, 5)
    {
        let grid = session.grid().lock().unwrap();
        let state = grid.state("a1").unwrap();
        assert!(state.grid_position == GridPosition::new(5, 5) || state.phase() == Phase::Moving);
    }
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(
        session.grid().lock().unwrap().grid_position("a1"),
        Some(GridPosition::new(5, 5))
    );

    session.teardown();
    session.teardown();
    settle().await;
    assert_eq!(bus.subscription_count(), 0);
}

#[tokio::test]
async fn session_reseeds_after_reconnect() {
    let bus = Arc::new(LocalBus::new());
    let seed = FixedSeed::new(vec![agent("a1", 0, 0)]);
    let session = SimulationSession::mount(&SimwatchConfig::default(), bus.clone(), seed.clone(), "42").await;
    assert_eq!(session.clock().tick(), 1);

    // Ticks published while the connection was down are never delivered
    seed.tick.store(9, Ordering::SeqCst);
    bus.simulate_reconnect();
    settle().await;

    assert_eq!(session.clock().tick(), 9);
    session.teardown();
}

#[tokio::test]
async fn failed_reseed_keeps_grid_on_streamed_positions() {
    let bus = Arc::new(LocalBus::new());
    let seed = FixedSeed::new(vec![agent("a1", 1, 1)]);
    let session = SimulationSession::mount(&SimwatchConfig::default(), bus.clone(), seed.clone(), "42").await;

    publish(&bus, "simulation.42.agent.a1.moved", json!({"id": "a1", "new_location": [3, 1]}));
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(
        session.grid().lock().unwrap().grid_position("a1"),
        Some(GridPosition::new(3, 1))
    );
    assert_eq!(session.roster().get("a1").unwrap().position(), Some(GridPosition::new(3, 1)));

    seed.failing.store(true, Ordering::SeqCst);
    bus.simulate_reconnect();
    settle().await;

    let grid = session.grid().lock().unwrap();
    let state = grid.state("a1").unwrap();
    assert_eq!(state.grid_position, GridPosition::new(3, 1));
    assert_eq!(state.phase(), Phase::Idle);
    drop(grid);
    session.teardown();
}

#[tokio::test]
async fn reseed_repaints_resource_tiles() {
    let bus = Arc::new(LocalBus::new());
    let seed = FixedSeed::new(vec![agent("a1", 0, 0)]);
    let tile = GridPosition::new(4, 5);
    let resource = |available: bool| -> Resource {
        serde_json::from_value(json!({"id": "r1", "x_coord": 4, "y_coord": 5, "available": available}))
            .unwrap()
    };
    *seed.resources.lock().unwrap() = vec![resource(true)];
    let session = SimulationSession::mount(&SimwatchConfig::default(), bus.clone(), seed.clone(), "42").await;
    assert_eq!(session.grid().lock().unwrap().map().tile(tile), Some(RESOURCE_TILE));

    // The harvest happened while the connection was down
    *seed.resources.lock().unwrap() = vec![resource(false)];
    bus.simulate_reconnect();
    settle().await;
    assert_eq!(session.resources().available("r1"), Some(false));
    assert_eq!(session.grid().lock().unwrap().map().tile(tile), Some(HARVESTED_TILE));

    // And the regrowth during the next outage
    *seed.resources.lock().unwrap() = vec![resource(true)];
    bus.simulate_reconnect();
    settle().await;
    assert_eq!(session.grid().lock().unwrap().map().tile(tile), Some(RESOURCE_TILE));
    session.teardown();
}

#[tokio::test]
async fn session_mounts_when_seed_fails() {
    let bus = Arc::new(LocalBus::new());
    let seed = FixedSeed::new(vec![]);
    seed.failing.store(true, Ordering::SeqCst);
    let session = SimulationSession::mount(&SimwatchConfig::default(), bus.clone(), seed, "42").await;

    assert!(session.roster().is_empty());
    assert_eq!(session.clock().tick(), 0);

    publish(&bus, "simulation.42.agent.a7.placed", json!({"id": "a7", "location": [0, 0]}));
    settle().await;
    assert_eq!(session.roster().len(), 1);
    session.teardown();
}
