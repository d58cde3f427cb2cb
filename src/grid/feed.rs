use super::coordinator::GridCoordinator;
use crate::event::{SimEvent, TypedEvent};
use crate::subscription::{SubscriptionManager, SubscriptionScope};
use crate::topic::topics;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

pub type SharedCoordinator = Arc<Mutex<GridCoordinator>>;

/// Bus subscriptions that drive the grid coordinator
pub struct MovementFeed {
    scope: SubscriptionScope,
}

impl MovementFeed {
    pub async fn mount(manager: &Arc<SubscriptionManager>, sim_id: &str, grid: &SharedCoordinator) -> Self {
        let scope = manager.scope();
        let patterns = [
            topics::agent(sim_id, "*", "placed"),
            topics::agent(sim_id, "*", "moved"),
            topics::agent(sim_id, "*", "dead"),
            topics::resource(sim_id, "*", "harvested"),
            topics::resource(sim_id, "*", "grown"),
        ];
        for pattern in &patterns {
            let grid = Arc::clone(grid);
            scope
                .subscribe_typed(pattern, move |event| {
                    let mut grid = grid.lock().unwrap_or_else(|e| e.into_inner());
                    dispatch(&mut grid, &event);
                    Ok(())
                })
                .await;
        }
        Self { scope }
    }

    pub fn teardown(&self) {
        self.scope.teardown();
    }
}

fn dispatch(grid: &mut GridCoordinator, event: &TypedEvent) {
    let Some(id) = event.entity_id() else {
        return;
    };
    match &event.body {
        SimEvent::AgentPlaced(placed) => grid.on_agent_placed(id, &placed.name, placed.location),
        SimEvent::AgentMoved(moved) => {
            if let Some(target) = moved.target() {
                grid.on_agent_moved(id, target);
            }
        }
        SimEvent::AgentDead(dead) => grid.on_agent_dead(id, dead.location),
        SimEvent::ResourceHarvested(h) => {
            grid.on_resource_harvested(h.location);
        }
        SimEvent::ResourceGrown(g) => {
            grid.on_resource_grown(g.location);
        }
        _ => debug!(kind = %event.kind, "Event not handled by grid"),
    }
}

/// Advance the grid once per `frame` until the task is aborted
pub fn animate(grid: SharedCoordinator, frame: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(frame);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let dt = frame.as_secs_f32();
        loop {
            interval.tick().await;
            grid.lock().unwrap_or_else(|e| e.into_inner()).advance(dt);
        }
    })
}
