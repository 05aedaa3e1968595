//! The data model: entities and the invariants they must satisfy between
//! turns. Every phase of resolution takes a `&GameState` and produces a new,
//! wholly-owned `GameState` — nothing here is mutated in place across a turn
//! boundary (see the turn resolver).

use std::collections::HashSet;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::collections::OrderedMap;
use crate::hex::HexCoord;

pub type CivId = String;
pub type UnitId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    #[default]
    Plains,
    Mountains,
    Forest,
    Desert,
    Coast,
    Sea,
    River,
}

impl Terrain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Terrain::Plains => "plains",
            Terrain::Mountains => "mountains",
            Terrain::Forest => "forest",
            Terrain::Desert => "desert",
            Terrain::Coast => "coast",
            Terrain::Sea => "sea",
            Terrain::River => "river",
        }
    }

    pub fn is_sea(&self) -> bool {
        matches!(self, Terrain::Sea)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementType {
    Capital,
    City,
    Town,
    Outpost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub settlement_type: SettlementType,
    pub population: i64,
    pub stability: i64,
    pub buildings: Vec<String>,
    pub is_capital: bool,
}

impl Settlement {
    /// Count of a given building id already present, used for per-settlement
    /// cap enforcement during construction.
    pub fn building_count(&self, building_id: &str) -> usize {
        self.buildings.iter().filter(|b| b.as_str() == building_id).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub definition_id: String,
    pub civilization_id: CivId,
    pub strength: i64,
    pub morale: i64,
    pub moves_remaining: u32,
    pub is_garrisoned: bool,
}

impl Unit {
    pub fn is_destroyed(&self) -> bool {
        self.strength <= 0 || self.morale <= 0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hex {
    pub coord: HexCoord,
    pub terrain: Terrain,
    pub settlement: Option<Settlement>,
    pub controlled_by: Option<CivId>,
    pub units: Vec<Unit>,
    pub resources: Vec<String>,
    pub explored_by: HashSet<CivId>,
}

impl Hex {
    pub fn new(coord: HexCoord, terrain: Terrain) -> Self {
        Self {
            coord,
            terrain,
            settlement: None,
            controlled_by: None,
            units: Vec::new(),
            resources: Vec::new(),
            explored_by: HashSet::new(),
        }
    }

    pub fn is_sea(&self) -> bool {
        self.terrain.is_sea()
    }

    pub fn units_of(&self, civ_id: &str) -> impl Iterator<Item = &Unit> {
        self.units.iter().filter(move |u| u.civilization_id == civ_id)
    }

    pub fn distinct_civs_present(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for u in &self.units {
            if !seen.contains(&u.civilization_id.as_str()) {
                seen.push(u.civilization_id.as_str());
            }
        }
        seen
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipState {
    Peace,
    Alliance,
    War,
    Truce,
    Vassal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CivilizationState {
    pub id: CivId,
    pub player_id: Option<String>,
    pub resources: FxHashMap<String, i64>,
    pub tech_progress: FxHashMap<String, i64>,
    pub completed_techs: Vec<String>,
    pub cultural_influence: i64,
    pub stability: i64,
    pub diplomatic_relations: FxHashMap<CivId, RelationshipState>,
    pub tension_axes: FxHashMap<String, i64>,
    pub is_eliminated: bool,
    pub turns_missing_orders: u32,
    pub turns_at_zero_stability: u32,
}

impl CivilizationState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            player_id: None,
            resources: FxHashMap::default(),
            tech_progress: FxHashMap::default(),
            completed_techs: Vec::new(),
            cultural_influence: 0,
            stability: 100,
            diplomatic_relations: FxHashMap::default(),
            tension_axes: FxHashMap::default(),
            is_eliminated: false,
            turns_missing_orders: 0,
            turns_at_zero_stability: 0,
        }
    }

    pub fn relation_with(&self, other: &str) -> RelationshipState {
        self.diplomatic_relations
            .get(other)
            .copied()
            .unwrap_or(RelationshipState::Peace)
    }

    pub fn resource(&self, id: &str) -> i64 {
        self.resources.get(id).copied().unwrap_or(0)
    }

    pub fn add_resource(&mut self, id: &str, delta: i64) {
        let entry = self.resources.entry(id.to_string()).or_insert(0);
        *entry = (*entry + delta).max(0);
    }

    pub fn set_stability(&mut self, value: i64) {
        self.stability = value.clamp(0, 100);
    }

    pub fn adjust_stability(&mut self, delta: i64) {
        self.set_stability(self.stability + delta);
    }

    pub fn tension(&self, axis: &str) -> i64 {
        self.tension_axes.get(axis).copied().unwrap_or(0)
    }

    pub fn set_tension(&mut self, axis: &str, value: i64, range: crate::theme::TensionAxisRange) {
        self.tension_axes
            .insert(axis.to_string(), value.clamp(range.min, range.max));
    }

    pub fn adjust_tension(&mut self, axis: &str, delta: i64, range: crate::theme::TensionAxisRange) {
        let current = self.tension(axis);
        self.set_tension(axis, current + delta, range);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveEvent {
    pub instance_id: String,
    pub definition_id: String,
    pub target_civilization_ids: Vec<CivId>,
    pub activated_on_turn: i64,
    pub expires_on_turn: Option<i64>,
    pub responses: FxHashMap<CivId, String>,
    pub resolved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuwardiInvasion {
    pub active: bool,
    pub spawned_on_turn: i64,
    pub instigator_civ_id: Option<CivId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub game_id: String,
    pub theme_id: String,
    pub turn: i64,
    pub phase: GamePhase,
    /// Row-major: `map[row][col]`.
    pub map: Vec<Vec<Hex>>,
    pub civilizations: OrderedMap<CivId, CivilizationState>,
    pub active_events: Vec<ActiveEvent>,
    pub turn_history: Vec<TurnSummary>,
    pub rng_seed: u32,
    pub rng_state: u32,
    pub config: crate::config::SimConfig,
    pub created_at: i64,
    pub last_resolved_at: Option<i64>,
    pub muwardi_invasion: Option<MuwardiInvasion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatResultSummary {
    pub hex: HexCoord,
    pub attacker: CivId,
    pub defender: CivId,
    /// >0 attacker won, <0 defender won, 0 draw.
    pub outcome_sign: i32,
    pub attacker_casualties: i64,
    pub defender_casualties: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CivTurnSummary {
    pub civ_id: CivId,
    pub resource_deltas: FxHashMap<String, i64>,
    pub techs_completed: Vec<String>,
    pub combat_results: Vec<CombatResultSummary>,
    pub activated_event_ids: Vec<String>,
    pub narrative_lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnSummary {
    pub turn: i64,
    pub civ_summaries: Vec<CivTurnSummary>,
}

impl GameState {
    pub fn dims(&self) -> (i32, i32) {
        let rows = self.map.len() as i32;
        let cols = self.map.first().map(|r| r.len()).unwrap_or(0) as i32;
        (cols, rows)
    }

    pub fn hex(&self, coord: HexCoord) -> Option<&Hex> {
        self.map
            .get(coord.row as usize)
            .and_then(|row| row.get(coord.col as usize))
    }

    pub fn hex_mut(&mut self, coord: HexCoord) -> Option<&mut Hex> {
        self.map
            .get_mut(coord.row as usize)
            .and_then(|row| row.get_mut(coord.col as usize))
    }

    pub fn in_bounds(&self, coord: HexCoord) -> bool {
        let (cols, rows) = self.dims();
        coord.col >= 0 && coord.col < cols && coord.row >= 0 && coord.row < rows
    }

    /// Iterate hexes row-major top-left to bottom-right, the iteration order
    /// every phase must use for reproducibility.
    pub fn hexes_row_major(&self) -> impl Iterator<Item = &Hex> {
        self.map.iter().flatten()
    }

    pub fn find_unit(&self, unit_id: UnitId) -> Option<(HexCoord, &Unit)> {
        for hex in self.hexes_row_major() {
            if let Some(u) = hex.units.iter().find(|u| u.id == unit_id) {
                return Some((hex.coord, u));
            }
        }
        None
    }

    pub fn capital_hex_of(&self, civ_id: &str) -> Option<HexCoord> {
        self.hexes_row_major()
            .find(|h| {
                h.settlement
                    .as_ref()
                    .map(|s| s.is_capital && h.controlled_by.as_deref() == Some(civ_id))
                    .unwrap_or(false)
            })
            .map(|h| h.coord)
    }

    pub fn next_unit_id(&self) -> UnitId {
        self.hexes_row_major()
            .flat_map(|h| h.units.iter())
            .map(|u| u.id)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// A stable, deterministic hash of the state's turn-relevant fields,
    /// suitable as an optimistic-concurrency token for the host's
    /// transactional store. Not part of simulation output.
    pub fn checksum(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.turn.hash(&mut hasher);
        self.rng_state.hash(&mut hasher);
        let mut civ_ids: Vec<&str> = self.civilizations.keys().map(|s| s.as_str()).collect();
        civ_ids.sort_unstable();
        for id in civ_ids {
            let civ = self.civilizations.get(&id.to_string()).unwrap();
            id.hash(&mut hasher);
            civ.stability.hash(&mut hasher);
            let mut resource_ids: Vec<&str> = civ.resources.keys().map(|s| s.as_str()).collect();
            resource_ids.sort_unstable();
            for rid in resource_ids {
                rid.hash(&mut hasher);
                civ.resources[rid].hash(&mut hasher);
            }
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_destroyed_at_zero_strength_or_morale() {
        let mut u = Unit {
            id: 1,
            definition_id: "spear".into(),
            civilization_id: "a".into(),
            strength: 0,
            morale: 5,
            moves_remaining: 1,
            is_garrisoned: false,
        };
        assert!(u.is_destroyed());
        u.strength = 5;
        u.morale = 0;
        assert!(u.is_destroyed());
        u.morale = 1;
        assert!(!u.is_destroyed());
    }

    #[test]
    fn add_resource_never_goes_negative() {
        let mut civ = CivilizationState::new("a");
        civ.add_resource("dinars", 10);
        civ.add_resource("dinars", -50);
        assert_eq!(civ.resource("dinars"), 0);
    }

    #[test]
    fn stability_clamped_to_0_100() {
        let mut civ = CivilizationState::new("a");
        civ.adjust_stability(1000);
        assert_eq!(civ.stability, 100);
        civ.adjust_stability(-1000);
        assert_eq!(civ.stability, 0);
    }
}
