//! Theme package schema: a fully-validated, versioned description of all
//! game content. Loaded once at game creation and treated as immutable for
//! the lifetime of the game — see [`load_theme`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::hex::HexCoord;

#[derive(Debug, thiserror::Error)]
pub enum ThemeError {
    #[error("theme is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("civilization `{civ}` references unknown starting tech `{tech}`")]
    UnknownStartingTech { civ: String, tech: String },
    #[error("tech `{tech}` declares prerequisite `{prereq}` which does not exist")]
    UnknownPrereq { tech: String, prereq: String },
    #[error("building `{building}` requires tech `{tech}` which does not exist")]
    UnknownBuildingPrereqTech { building: String, tech: String },
    #[error("unit `{unit}` requires tech `{tech}` which does not exist")]
    UnknownUnitPrereqTech { unit: String, tech: String },
    #[error("event `{event}` declares default choice `{choice}` which is not one of its choices")]
    UnknownDefaultChoice { event: String, choice: String },
    #[error("map zone `{zone}` has an ill-formed shape")]
    IllFormedZoneShape { zone: String },
    #[error("tension axis `{axis}` has min {min} >= max {max}")]
    IllFormedTensionAxisRange { axis: String, min: i64, max: i64 },
    #[error("theme version `{0}` is not supported")]
    UnsupportedVersion(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemePackage {
    pub version: String,
    pub civilizations: Vec<CivilizationDef>,
    pub map: MapConfig,
    pub resources: Vec<ResourceDef>,
    pub techs: Vec<TechDef>,
    pub buildings: Vec<BuildingDef>,
    pub units: Vec<UnitDef>,
    pub events: Vec<EventDef>,
    pub diplomacy_options: Vec<DiplomacyOptionDef>,
    pub victory_conditions: Vec<VictoryCondition>,
    pub defeat_conditions: Vec<DefeatCondition>,
    pub mechanics: Mechanics,
    #[serde(default)]
    pub flavor: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CivilizationDef {
    pub id: String,
    pub color: String,
    pub religion: Option<String>,
    #[serde(default)]
    pub starting_resources: HashMap<String, i64>,
    #[serde(default)]
    pub starting_techs: Vec<String>,
    #[serde(default)]
    pub special_abilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    pub cols: i32,
    pub rows: i32,
    pub zones: Vec<MapZone>,
    pub anchors: Vec<SettlementAnchor>,
    #[serde(default)]
    pub default_terrain_weights: HashMap<String, f64>,
    #[serde(default)]
    pub sea_edge: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapZone {
    pub id: String,
    pub shape: MapZoneShape,
    #[serde(default)]
    pub terrain_weights: HashMap<String, f64>,
    #[serde(default)]
    pub initial_controlled_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MapZoneShape {
    RectangularBounds { min: HexCoord, max: HexCoord },
    ExplicitHexes { hexes: Vec<HexCoord> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementAnchor {
    pub id: String,
    pub name: String,
    pub owner_civ_id: String,
    pub is_capital: bool,
    pub approx_coord: HexCoord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDef {
    pub id: String,
    pub base_yield: f64,
    #[serde(default)]
    pub terrain_yields: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechDef {
    pub id: String,
    pub cost: i64,
    #[serde(default)]
    pub prereqs: Vec<String>,
    #[serde(default)]
    pub effects: Vec<TechEffect>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TechEffect {
    UnlockUnit { unit_id: String },
    UnlockBuilding { building_id: String },
    ResourceModifier { resource: String, multiplier: f64 },
    CombatModifier { value: f64 },
    StabilityModifier { value: i64 },
    Custom { key: String, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingDef {
    pub id: String,
    pub cost: i64,
    #[serde(default)]
    pub upkeep: i64,
    /// `(resource_id, delta)`; `resource_id == "stability"` routes to the
    /// stability delta instead of the resource ledger.
    #[serde(default)]
    pub effects: Vec<(String, i64)>,
    pub prereq_tech: Option<String>,
    pub max_per_settlement: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitDef {
    pub id: String,
    pub display_name: String,
    pub strength: i64,
    pub morale: i64,
    pub moves: u32,
    pub cost: i64,
    #[serde(default)]
    pub upkeep: i64,
    pub prereq_tech: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDef {
    pub id: String,
    pub trigger: EventTrigger,
    pub targeting: EventTargeting,
    pub choices: Vec<EventChoice>,
    pub default_choice_id: String,
    #[serde(default)]
    pub repeatable: bool,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventTargeting {
    All,
    RandomOne,
    Explicit { civ_ids: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventChoice {
    pub id: String,
    #[serde(default)]
    pub effects: Vec<EventEffect>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventEffect {
    ResourceDelta { resource: String, delta: i64 },
    StabilityDelta { delta: i64 },
    TensionDelta { axis: String, delta: i64 },
    SpawnUnit { unit_id: String, at: HexCoord },
    DestroySettlement { at: HexCoord },
    ForceWar { other_civ_id: String },
    Narrative { text: String },
    Custom { key: String, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventTrigger {
    TurnNumber { turn: i64 },
    TurnRange { min: i64, max: i64 },
    ResourceBelow { resource: String, amount: i64 },
    StabilityBelow { amount: i64 },
    TensionAbove { axis: String, amount: i64 },
    TechCompleted { tech_id: String },
    WarDeclared,
    Always,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiplomacyOptionDef {
    pub action: String,
    pub allowed_relation_states: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VictoryCondition {
    EliminateAll,
    ControlHexes { count: u32 },
    ResourceAccumulate { resource: String, amount: i64 },
    TechAdvance { tech_id: String },
    SurviveTurns { turns: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DefeatCondition {
    CapitalLost,
    StabilityZero {
        #[serde(default)]
        turns_at_zero: Option<u32>,
    },
    EliminatedByCombat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mechanics {
    #[serde(default)]
    pub tension_axes: HashMap<String, TensionAxisRange>,
    #[serde(default)]
    pub combat_modifiers_by_terrain: HashMap<String, f64>,
    #[serde(default)]
    pub resource_interactions: Vec<ResourceInteraction>,
    pub turn_cycle_length: u32,
    #[serde(default)]
    pub turn_cycle_names: Vec<String>,
    #[serde(default)]
    pub turn_cycle_effects: Vec<TurnCycleEffect>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TensionAxisRange {
    pub min: i64,
    pub max: i64,
}

impl Default for TensionAxisRange {
    fn default() -> Self {
        Self { min: 0, max: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInteraction {
    pub source: String,
    pub target: String,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnCycleEffect {
    #[serde(default)]
    pub resource_multipliers: HashMap<String, f64>,
    #[serde(default)]
    pub combat_modifier: f64,
    #[serde(default)]
    pub stability_modifier: i64,
}

/// Validate and return a [`ThemePackage`]. Fails closed: anything missing,
/// dangling, or ill-typed is rejected rather than patched over.
pub fn load_theme(raw: &str) -> Result<ThemePackage, ThemeError> {
    let theme: ThemePackage =
        serde_json::from_str(raw).map_err(|_| ThemeError::MissingField("<malformed json>"))?;
    validate(&theme)?;
    Ok(theme)
}

fn validate(theme: &ThemePackage) -> Result<(), ThemeError> {
    if theme.version.is_empty() {
        return Err(ThemeError::MissingField("version"));
    }

    let tech_ids: std::collections::HashSet<&str> = theme.techs.iter().map(|t| t.id.as_str()).collect();

    for civ in &theme.civilizations {
        for tech in &civ.starting_techs {
            if !tech_ids.contains(tech.as_str()) {
                return Err(ThemeError::UnknownStartingTech {
                    civ: civ.id.clone(),
                    tech: tech.clone(),
                });
            }
        }
    }

    for tech in &theme.techs {
        for prereq in &tech.prereqs {
            if !tech_ids.contains(prereq.as_str()) {
                return Err(ThemeError::UnknownPrereq {
                    tech: tech.id.clone(),
                    prereq: prereq.clone(),
                });
            }
        }
    }

    for building in &theme.buildings {
        if let Some(tech) = &building.prereq_tech {
            if !tech_ids.contains(tech.as_str()) {
                return Err(ThemeError::UnknownBuildingPrereqTech {
                    building: building.id.clone(),
                    tech: tech.clone(),
                });
            }
        }
    }

    for unit in &theme.units {
        if let Some(tech) = &unit.prereq_tech {
            if !tech_ids.contains(tech.as_str()) {
                return Err(ThemeError::UnknownUnitPrereqTech {
                    unit: unit.id.clone(),
                    tech: tech.clone(),
                });
            }
        }
    }

    for event in &theme.events {
        if !event.choices.iter().any(|c| c.id == event.default_choice_id) {
            return Err(ThemeError::UnknownDefaultChoice {
                event: event.id.clone(),
                choice: event.default_choice_id.clone(),
            });
        }
    }

    for zone in &theme.map.zones {
        if let MapZoneShape::RectangularBounds { min, max } = &zone.shape {
            if min.col > max.col || min.row > max.row {
                return Err(ThemeError::IllFormedZoneShape { zone: zone.id.clone() });
            }
        }
    }

    for (axis, range) in &theme.mechanics.tension_axes {
        if range.min >= range.max {
            return Err(ThemeError::IllFormedTensionAxisRange {
                axis: axis.clone(),
                min: range.min,
                max: range.max,
            });
        }
    }

    Ok(())
}

impl ThemePackage {
    pub fn tech(&self, id: &str) -> Option<&TechDef> {
        self.techs.iter().find(|t| t.id == id)
    }

    pub fn building(&self, id: &str) -> Option<&BuildingDef> {
        self.buildings.iter().find(|b| b.id == id)
    }

    pub fn unit(&self, id: &str) -> Option<&UnitDef> {
        self.units.iter().find(|u| u.id == id)
    }

    pub fn event(&self, id: &str) -> Option<&EventDef> {
        self.events.iter().find(|e| e.id == id)
    }

    pub fn civilization(&self, id: &str) -> Option<&CivilizationDef> {
        self.civilizations.iter().find(|c| c.id == id)
    }

    pub fn resource(&self, id: &str) -> Option<&ResourceDef> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub fn tension_axis_range(&self, axis: &str) -> TensionAxisRange {
        self.mechanics
            .tension_axes
            .get(axis)
            .copied()
            .unwrap_or_default()
    }

    /// `(turn - 1) mod turn_cycle_length`, or `None` if the theme declares
    /// no seasonal cycle.
    pub fn turn_cycle_phase(&self, turn: i64) -> Option<usize> {
        if self.mechanics.turn_cycle_length == 0 {
            return None;
        }
        let phase = (turn - 1).rem_euclid(self.mechanics.turn_cycle_length as i64);
        Some(phase as usize)
    }

    pub fn turn_cycle_effect(&self, turn: i64) -> Option<&TurnCycleEffect> {
        let phase = self.turn_cycle_phase(turn)?;
        self.mechanics.turn_cycle_effects.get(phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_theme_json() -> &'static str {
        r#"{
            "version": "1",
            "civilizations": [],
            "map": {"cols": 1, "rows": 1, "zones": [], "anchors": []},
            "resources": [],
            "techs": [],
            "buildings": [],
            "units": [],
            "events": [],
            "diplomacy_options": [],
            "victory_conditions": [],
            "defeat_conditions": [],
            "mechanics": {"turn_cycle_length": 0}
        }"#
    }

    #[test]
    fn minimal_theme_loads() {
        let theme = load_theme(minimal_theme_json()).unwrap();
        assert_eq!(theme.version, "1");
    }

    #[test]
    fn unknown_starting_tech_rejected() {
        let raw = r#"{
            "version": "1",
            "civilizations": [{"id": "c", "color": "#fff", "religion": null, "starting_techs": ["nope"]}],
            "map": {"cols": 1, "rows": 1, "zones": [], "anchors": []},
            "resources": [], "techs": [], "buildings": [], "units": [], "events": [],
            "diplomacy_options": [], "victory_conditions": [], "defeat_conditions": [],
            "mechanics": {"turn_cycle_length": 0}
        }"#;
        assert!(matches!(load_theme(raw), Err(ThemeError::UnknownStartingTech { .. })));
    }

    #[test]
    fn event_with_bad_default_choice_rejected() {
        let raw = r#"{
            "version": "1",
            "civilizations": [],
            "map": {"cols": 1, "rows": 1, "zones": [], "anchors": []},
            "resources": [], "techs": [], "buildings": [], "units": [],
            "events": [{"id": "e", "trigger": {"kind": "always"}, "targeting": {"kind": "all"},
                        "choices": [{"id": "a", "effects": []}], "default_choice_id": "missing"}],
            "diplomacy_options": [], "victory_conditions": [], "defeat_conditions": [],
            "mechanics": {"turn_cycle_length": 0}
        }"#;
        assert!(matches!(load_theme(raw), Err(ThemeError::UnknownDefaultChoice { .. })));
    }

    #[test]
    fn turn_cycle_phase_zero_length_is_none() {
        let theme = load_theme(minimal_theme_json()).unwrap();
        assert_eq!(theme.turn_cycle_phase(5), None);
    }
}
