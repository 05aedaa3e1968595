//! Phase: MOVEMENT. Applies `move` orders, skipping invalid ones with a log
//! line (the *InvalidOrder* taxonomy entry — never a hard failure).

use crate::collections::OrderedMap;
use crate::hex::{neighbor_offsets, HexCoord};
use crate::orders::{Order, OrderRejection};
use crate::state::{CivId, GameState};
use tracing::instrument;

fn is_adjacent(from: HexCoord, to: HexCoord) -> bool {
    neighbor_offsets(from.row)
        .iter()
        .any(|(dc, dr)| HexCoord::new(from.col + dc, from.row + dr) == to)
}

fn validate_move(state: &GameState, civ_id: &str, unit_id: u64, path: &[HexCoord]) -> Result<HexCoord, OrderRejection> {
    let (origin, unit) = state.find_unit(unit_id).ok_or(OrderRejection::UnitNotFound(unit_id))?;
    if unit.civilization_id != civ_id {
        return Err(OrderRejection::UnitNotOwned(unit_id, civ_id.to_string()));
    }
    if path.len() as u32 > unit.moves_remaining {
        return Err(OrderRejection::PathExceedsMoves);
    }
    if path.is_empty() {
        return Err(OrderRejection::PathNotAdjacent);
    }

    let mut previous = origin;
    for &step in path {
        if !state.in_bounds(step) {
            return Err(OrderRejection::DestinationOutOfBounds);
        }
        if !is_adjacent(previous, step) {
            return Err(OrderRejection::PathNotAdjacent);
        }
        if state.hex(step).map(|h| h.is_sea()).unwrap_or(true) {
            return Err(OrderRejection::PathCrossesSea);
        }
        previous = step;
    }
    Ok(previous)
}

/// Run all submitted `move` orders, civ by civ in insertion order, orders
/// within a civ in submission order. Returns the new state and log lines.
#[instrument(skip_all, name = "movement")]
pub fn run(state: &GameState, orders_by_civ: &OrderedMap<CivId, Vec<Order>>) -> (GameState, Vec<String>) {
    let mut new_state = state.clone();
    let mut logs = Vec::new();

    for (civ_id, orders) in orders_by_civ.iter() {
        for order in orders {
            let Order::Move { unit_id, path } = order else { continue };
            match validate_move(&new_state, civ_id, *unit_id, path) {
                Ok(destination) => {
                    let (origin, _) = new_state.find_unit(*unit_id).unwrap();
                    let mut unit = {
                        let hex = new_state.hex_mut(origin).unwrap();
                        let idx = hex.units.iter().position(|u| u.id == *unit_id).unwrap();
                        hex.units.remove(idx)
                    };
                    unit.moves_remaining = 0;
                    new_state.hex_mut(destination).unwrap().units.push(unit);
                    logs.push(format!("{civ_id}: unit {unit_id} moved to ({},{})", destination.col, destination.row));
                }
                Err(reason) => {
                    log::debug!("skipping move order for unit {unit_id} (civ {civ_id}): {reason}");
                }
            }
        }
    }

    (new_state, logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Terrain, Unit};

    fn state_with_unit() -> GameState {
        let mut state = crate::testing::GameStateBuilder::new(3, 1)
            .with_civilization("a")
            .build();
        state.map[0][0].units.push(Unit {
            id: 1,
            definition_id: "spear".into(),
            civilization_id: "a".into(),
            strength: 10,
            morale: 5,
            moves_remaining: 2,
            is_garrisoned: false,
        });
        state
    }

    #[test]
    fn valid_move_relocates_unit_and_zeroes_moves() {
        let state = state_with_unit();
        let mut orders = OrderedMap::new();
        orders.insert(
            "a".to_string(),
            vec![Order::Move { unit_id: 1, path: vec![HexCoord::new(1, 0)] }],
        );
        let (new_state, logs) = run(&state, &orders);
        assert!(new_state.map[0][0].units.is_empty());
        let moved = &new_state.map[0][1].units[0];
        assert_eq!(moved.moves_remaining, 0);
        assert_eq!(logs.len(), 1);
    }

    #[test]
    fn move_into_sea_is_rejected() {
        let mut state = state_with_unit();
        state.map[0][1].terrain = Terrain::Sea;
        let mut orders = OrderedMap::new();
        orders.insert(
            "a".to_string(),
            vec![Order::Move { unit_id: 1, path: vec![HexCoord::new(1, 0)] }],
        );
        let (new_state, logs) = run(&state, &orders);
        assert_eq!(new_state.map[0][0].units.len(), 1);
        assert!(logs.is_empty());
    }

    #[test]
    fn move_exceeding_remaining_moves_is_rejected() {
        let state = state_with_unit();
        let mut orders = OrderedMap::new();
        orders.insert(
            "a".to_string(),
            vec![Order::Move {
                unit_id: 1,
                path: vec![HexCoord::new(1, 0), HexCoord::new(2, 0), HexCoord::new(2, 0)],
            }],
        );
        let (new_state, _logs) = run(&state, &orders);
        assert_eq!(new_state.map[0][0].units.len(), 1);
    }

    #[test]
    fn non_adjacent_path_step_is_rejected() {
        let state = state_with_unit();
        let mut orders = OrderedMap::new();
        orders.insert(
            "a".to_string(),
            vec![Order::Move { unit_id: 1, path: vec![HexCoord::new(2, 0)] }],
        );
        let (new_state, _logs) = run(&state, &orders);
        assert_eq!(new_state.map[0][0].units.len(), 1);
    }
}
