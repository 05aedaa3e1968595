//! Builder for minimal valid `GameState`s, so unit tests don't repeat full
//! struct-literal boilerplate. Grounded directly on the corpus's
//! `WorldStateBuilder` pattern.

use crate::collections::OrderedMap;
use crate::config::SimConfig;
use crate::hex::HexCoord;
use crate::state::{CivilizationState, GamePhase, GameState, Hex, Settlement, SettlementType, Terrain};

pub struct GameStateBuilder {
    state: GameState,
}

impl GameStateBuilder {
    pub fn new(cols: i32, rows: i32) -> Self {
        let mut map = Vec::with_capacity(rows as usize);
        for row in 0..rows {
            let mut hex_row = Vec::with_capacity(cols as usize);
            for col in 0..cols {
                hex_row.push(Hex::new(HexCoord::new(col, row), Terrain::Plains));
            }
            map.push(hex_row);
        }
        Self {
            state: GameState {
                game_id: "test-game".into(),
                theme_id: "test-theme".into(),
                turn: 1,
                phase: GamePhase::Active,
                map,
                civilizations: OrderedMap::new(),
                active_events: Vec::new(),
                turn_history: Vec::new(),
                rng_seed: 0,
                rng_state: 0,
                config: SimConfig::default(),
                created_at: 0,
                last_resolved_at: None,
                muwardi_invasion: None,
            },
        }
    }

    pub fn turn(mut self, turn: i64) -> Self {
        self.state.turn = turn;
        self
    }

    pub fn seed(mut self, seed: u32) -> Self {
        self.state.rng_seed = seed;
        self.state.rng_state = seed;
        self
    }

    pub fn with_civilization(mut self, id: &str) -> Self {
        self.state.civilizations.insert(id.to_string(), CivilizationState::new(id));
        self
    }

    pub fn with_civilization_state(mut self, civ: CivilizationState) -> Self {
        self.state.civilizations.insert(civ.id.clone(), civ);
        self
    }

    pub fn with_terrain(mut self, coord: HexCoord, terrain: Terrain) -> Self {
        self.state.map[coord.row as usize][coord.col as usize].terrain = terrain;
        self
    }

    pub fn with_control(mut self, coord: HexCoord, civ_id: Option<&str>) -> Self {
        self.state.map[coord.row as usize][coord.col as usize].controlled_by = civ_id.map(|s| s.to_string());
        self
    }

    pub fn with_capital(mut self, coord: HexCoord, civ_id: &str, settlement_id: &str) -> Self {
        let hex = &mut self.state.map[coord.row as usize][coord.col as usize];
        hex.controlled_by = Some(civ_id.to_string());
        hex.settlement = Some(Settlement {
            id: settlement_id.to_string(),
            name: settlement_id.to_string(),
            settlement_type: SettlementType::Capital,
            population: 1000,
            stability: 100,
            buildings: Vec::new(),
            is_capital: true,
        });
        self
    }

    pub fn build(self) -> GameState {
        self.state
    }
}

impl Default for GameStateBuilder {
    fn default() -> Self {
        Self::new(5, 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_requested_dimensions() {
        let state = GameStateBuilder::new(3, 2).build();
        assert_eq!(state.dims(), (3, 2));
    }

    #[test]
    fn builder_adds_civilizations_in_order() {
        let state = GameStateBuilder::default()
            .with_civilization("b")
            .with_civilization("a")
            .build();
        let ids: Vec<&str> = state.civilizations.keys().map(|s| s.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
