use super::tilemap::TileMap;
use crate::model::GridPosition;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Shortest 4-neighbour path from `start` to `goal` around colliding tiles.
///
/// The returned steps exclude `start` and end on `goal`. `None` when the goal
/// collides or cannot be reached.
pub fn shortest_path(map: &TileMap, start: GridPosition, goal: GridPosition) -> Option<Vec<GridPosition>> {
    if start == goal {
        return Some(Vec::new());
    }
    if map.collides(goal) || !map.contains(start) {
        return None;
    }

    let width = map.width() as usize;
    let len = width * map.height() as usize;
    let index = |p: GridPosition| p.y as usize * width + p.x as usize;
    let position = |i: usize| GridPosition::new((i % width) as i32, (i / width) as i32);

    let start_index = index(start);
    let goal_index = index(goal);
    let mut dist = vec![u32::MAX; len];
    let mut prev: Vec<Option<usize>> = vec![None; len];
    dist[start_index] = 0;

    let mut heap: BinaryHeap<Reverse<(u32, usize)>> = BinaryHeap::new();
    heap.push(Reverse((0, start_index)));

    while let Some(Reverse((cost, current))) = heap.pop() {
        if current == goal_index {
            break;
        }
        if cost != dist[current] {
            continue;
        }
        for neighbour in position(current).neighbours() {
            if map.collides(neighbour) {
                continue;
            }
            let next = index(neighbour);
            let new_cost = cost + 1;
            if new_cost < dist[next] {
                dist[next] = new_cost;
                prev[next] = Some(current);
                heap.push(Reverse((new_cost, next)));
            }
        }
    }

    if dist[goal_index] == u32::MAX {
        return None;
    }

    let mut steps = Vec::new();
    let mut cur = goal_index;
    while cur != start_index {
        steps.push(position(cur));
        cur = prev[cur]?;
    }
    steps.reverse();
    Some(steps)
}
