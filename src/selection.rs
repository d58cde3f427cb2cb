use crate::grid::SharedCoordinator;
use tokio::sync::watch;
use tracing::debug;

/// Owns the single selected entity id.
///
/// Selection is pushed to the grid coordinator directly and published on a
/// watch channel for the detail view.
pub struct SelectionController {
    grid: SharedCoordinator,
    tx: watch::Sender<Option<String>>,
}

impl SelectionController {
    pub fn new(grid: SharedCoordinator) -> Self {
        let (tx, _) = watch::channel(None);
        Self { grid, tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Select `id`, or clear with `None`. Re-selecting the current id does
    /// not notify watchers.
    pub fn select(&self, id: Option<String>) {
        self.grid
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .on_select(id.as_deref());
        let changed = self.tx.send_if_modified(|current| {
            if *current == id {
                return false;
            }
            *current = id.clone();
            true
        });
        if changed {
            debug!(selection = ?id, "Selection changed");
        }
    }

    /// Select whatever agent stands on the tile under `world_px`; an empty
    /// tile clears the selection.
    pub fn pointer_down(&self, world_px: (f32, f32)) -> Option<String> {
        let hit = {
            let grid = self.grid.lock().unwrap_or_else(|e| e.into_inner());
            let tile = grid.world_to_grid(world_px);
            grid.character_at(tile).map(str::to_string)
        };
        self.select(hit.clone());
        hit
    }
}
