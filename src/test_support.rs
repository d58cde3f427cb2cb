use crate::api::SeedSource;
use crate::model::{Agent, Resource, Simulation, World};
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Map;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Give spawned pump tasks time to drain their channels
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}

pub(crate) fn agent(id: &str, x: i32, y: i32) -> Agent {
    Agent {
        id: id.to_string(),
        name: id.to_uppercase(),
        simulation_id: "42".to_string(),
        model: "test".to_string(),
        hunger: 0.0,
        energy_level: Some(100.0),
        x_coord: x,
        y_coord: y,
        visibility_range: 5,
        range_per_move: 1,
        last_10_messages: vec![],
        last_10_action_logs: vec![],
    }
}

pub(crate) fn resource(id: &str, x: i32, y: i32) -> Resource {
    Resource {
        id: id.to_string(),
        x_coord: x,
        y_coord: y,
        available: true,
        energy_yield: 10.0,
        being_harvested: false,
        harvester: vec![],
    }
}

/// In-memory seed source with a switch to make every fetch fail
pub(crate) struct StubSeed {
    pub simulation: Mutex<Simulation>,
    pub world: Mutex<World>,
    pub agents: Mutex<Vec<Agent>>,
    pub resources: Mutex<Vec<Resource>>,
    pub failing: AtomicBool,
    pub agent_fetches: AtomicUsize,
}

impl StubSeed {
    pub fn new(agents: Vec<Agent>) -> Self {
        Self {
            simulation: Mutex::new(Simulation {
                id: "42".to_string(),
                tick: 0,
                running: false,
                extra: Map::new(),
            }),
            world: Mutex::new(World {
                id: "w1".to_string(),
                simulation_id: "42".to_string(),
                size_x: 10,
                size_y: 10,
                base_energy_cost: 1.0,
                resource_coords: vec![],
            }),
            agents: Mutex::new(agents),
            resources: Mutex::new(vec![]),
            failing: AtomicBool::new(false),
            agent_fetches: AtomicUsize::new(0),
        }
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("seed source unavailable"));
        }
        Ok(())
    }
}

impl SeedSource for StubSeed {
    fn simulation<'a>(&'a self, _sim: &'a str) -> BoxFuture<'a, Result<Simulation>> {
        async move {
            self.check()?;
            Ok(self.simulation.lock().unwrap().clone())
        }
        .boxed()
    }

    fn world<'a>(&'a self, _sim: &'a str) -> BoxFuture<'a, Result<World>> {
        async move {
            self.check()?;
            Ok(self.world.lock().unwrap().clone())
        }
        .boxed()
    }

    fn agents<'a>(&'a self, _sim: &'a str) -> BoxFuture<'a, Result<Vec<Agent>>> {
        async move {
            self.check()?;
            Ok(self.agents.lock().unwrap().clone())
        }
        .boxed()
    }

    fn agent<'a>(&'a self, _sim: &'a str, agent: &'a str) -> BoxFuture<'a, Result<Agent>> {
        async move {
            self.agent_fetches.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            self.agents
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.id == agent)
                .cloned()
                .ok_or_else(|| anyhow!("agent {agent} not found"))
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
