//! Odd-r offset hex coordinates: neighbors, reachability, and pathfinding.
//!
//! Odd rows are shifted right by half a hex width, which is why the neighbor
//! offsets differ between even and odd rows (see [`neighbors`]).

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HexCoord {
    pub col: i32,
    pub row: i32,
}

impl HexCoord {
    pub fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }
}

/// The six neighbors of `coord` in odd-r offset layout, before bounds
/// clipping. Row parity changes which diagonal neighbors apply.
pub fn neighbor_offsets(row: i32) -> [(i32, i32); 6] {
    if row % 2 == 0 {
        [(1, 0), (-1, 0), (0, -1), (0, 1), (-1, -1), (-1, 1)]
    } else {
        [(1, 0), (-1, 0), (0, -1), (0, 1), (1, -1), (1, 1)]
    }
}

/// Neighbors of `coord`, clipped to a grid of `cols` by `rows`.
pub fn neighbors(coord: HexCoord, cols: i32, rows: i32) -> Vec<HexCoord> {
    neighbor_offsets(coord.row)
        .iter()
        .map(|(dc, dr)| HexCoord::new(coord.col + dc, coord.row + dr))
        .filter(|c| c.col >= 0 && c.col < cols && c.row >= 0 && c.row < rows)
        .collect()
}

/// Anything that can answer "is this coord passable terrain" for BFS. The
/// hex map implements this; tests can supply a bare closure-backed stand-in.
pub trait PassabilityGrid {
    fn dims(&self) -> (i32, i32);
    fn is_sea(&self, coord: HexCoord) -> bool;
}

/// All hexes reachable from `origin` within `max_steps`, excluding the
/// origin itself. BFS over non-sea neighbors; each hex visited at most once.
pub fn reachable_coords<G: PassabilityGrid>(grid: &G, origin: HexCoord, max_steps: u32) -> Vec<HexCoord> {
    let (cols, rows) = grid.dims();
    let mut visited: HashMap<HexCoord, u32> = HashMap::new();
    visited.insert(origin, 0);
    let mut queue = VecDeque::new();
    queue.push_back(origin);
    let mut result = Vec::new();

    while let Some(current) = queue.pop_front() {
        let depth = visited[&current];
        if depth >= max_steps {
            continue;
        }
        for n in neighbors(current, cols, rows) {
            if visited.contains_key(&n) || grid.is_sea(n) {
                continue;
            }
            visited.insert(n, depth + 1);
            result.push(n);
            queue.push_back(n);
        }
    }
    result
}

/// Shortest ordered path from `origin` to `target` within `max_steps`,
/// excluding the origin. `None` if unreachable in budget, or if the target
/// is sea.
pub fn path_to<G: PassabilityGrid>(
    grid: &G,
    origin: HexCoord,
    target: HexCoord,
    max_steps: u32,
) -> Option<Vec<HexCoord>> {
    if grid.is_sea(target) {
        return None;
    }
    if origin == target {
        return Some(Vec::new());
    }
    let (cols, rows) = grid.dims();
    let mut parent: HashMap<HexCoord, HexCoord> = HashMap::new();
    let mut depth: HashMap<HexCoord, u32> = HashMap::new();
    depth.insert(origin, 0);
    let mut queue = VecDeque::new();
    queue.push_back(origin);

    while let Some(current) = queue.pop_front() {
        let d = depth[&current];
        if d >= max_steps {
            continue;
        }
        for n in neighbors(current, cols, rows) {
            if depth.contains_key(&n) || grid.is_sea(n) {
                continue;
            }
            depth.insert(n, d + 1);
            parent.insert(n, current);
            if n == target {
                return Some(reconstruct_path(&parent, origin, target));
            }
            queue.push_back(n);
        }
    }
    None
}

fn reconstruct_path(parent: &HashMap<HexCoord, HexCoord>, origin: HexCoord, target: HexCoord) -> Vec<HexCoord> {
    let mut steps = vec![target];
    let mut current = target;
    while current != origin {
        current = parent[&current];
        if current == origin {
            break;
        }
        steps.push(current);
    }
    steps.reverse();
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OpenGrid {
        cols: i32,
        rows: i32,
        sea: Vec<HexCoord>,
    }

    impl PassabilityGrid for OpenGrid {
        fn dims(&self) -> (i32, i32) {
            (self.cols, self.rows)
        }
        fn is_sea(&self, coord: HexCoord) -> bool {
            self.sea.contains(&coord)
        }
    }

    #[test]
    fn even_row_neighbor_offsets() {
        let offsets = neighbor_offsets(0);
        assert!(offsets.contains(&(-1, -1)));
        assert!(offsets.contains(&(-1, 1)));
    }

    #[test]
    fn odd_row_neighbor_offsets() {
        let offsets = neighbor_offsets(1);
        assert!(offsets.contains(&(1, -1)));
        assert!(offsets.contains(&(1, 1)));
    }

    #[test]
    fn neighbors_clip_to_grid_bounds() {
        let corner = HexCoord::new(0, 0);
        let ns = neighbors(corner, 5, 5);
        assert!(ns.iter().all(|c| c.col >= 0 && c.row >= 0));
    }

    #[test]
    fn reachable_excludes_origin_and_respects_step_budget() {
        let grid = OpenGrid { cols: 10, rows: 10, sea: vec![] };
        let origin = HexCoord::new(5, 5);
        let reached = reachable_coords(&grid, origin, 1);
        assert!(!reached.contains(&origin));
        assert_eq!(reached.len(), neighbors(origin, 10, 10).len());
    }

    #[test]
    fn reachable_never_crosses_sea() {
        let grid = OpenGrid {
            cols: 3,
            rows: 1,
            sea: vec![HexCoord::new(1, 0)],
        };
        let reached = reachable_coords(&grid, HexCoord::new(0, 0), 5);
        assert!(!reached.contains(&HexCoord::new(2, 0)));
    }

    #[test]
    fn path_to_sea_target_is_none() {
        let grid = OpenGrid {
            cols: 3,
            rows: 1,
            sea: vec![HexCoord::new(2, 0)],
        };
        assert_eq!(path_to(&grid, HexCoord::new(0, 0), HexCoord::new(2, 0), 5), None);
    }

    #[test]
    fn path_to_reconstructs_in_order() {
        let grid = OpenGrid { cols: 5, rows: 1, sea: vec![] };
        let path = path_to(&grid, HexCoord::new(0, 0), HexCoord::new(3, 0), 10).unwrap();
        assert_eq!(path, vec![HexCoord::new(1, 0), HexCoord::new(2, 0), HexCoord::new(3, 0)]);
    }

    #[test]
    fn path_to_unreachable_within_budget_is_none() {
        let grid = OpenGrid { cols: 10, rows: 1, sea: vec![] };
        assert_eq!(path_to(&grid, HexCoord::new(0, 0), HexCoord::new(9, 0), 3), None);
    }
}
