//! Phase: the Muwardi invasion mechanic. Optional, theme-driven: tracks a
//! `muwardi_threat` counter per Asharite civ and, once sustained for two
//! consecutive turns, spawns a hostile `muwardi` faction that everyone else
//! goes to war with. Deactivates and drops the instigator's fervor once the
//! invading force is wiped out.

use crate::hex::HexCoord;
use crate::state::{CivilizationState, GameState, MuwardiInvasion, RelationshipState};
use crate::theme::ThemePackage;
use tracing::instrument;

const FERVOR_THRESHOLD: i64 = 90;
const TURNS_REQUIRED: i64 = 2;
const MIN_INVADERS: usize = 3;

fn is_asharite(theme: &ThemePackage, civ_id: &str) -> bool {
    theme
        .civilization(civ_id)
        .and_then(|c| c.religion.as_ref())
        .map(|r| r.eq_ignore_ascii_case("asharite"))
        .unwrap_or(false)
}

fn muwardi_unit_id(theme: &ThemePackage) -> Option<String> {
    theme
        .units
        .iter()
        .find(|u| u.id.to_lowercase().contains("muwardi") || u.display_name.to_lowercase().contains("muwardi"))
        .map(|u| u.id.clone())
}

fn spawn_row(state: &GameState) -> Option<i32> {
    let (_, rows) = state.dims();
    (0..rows).rev().find(|&row| state.map[row as usize].iter().any(|h| !h.is_sea()))
}

#[instrument(skip_all, name = "muwardi")]
pub fn run(state: &GameState, theme: &ThemePackage) -> (GameState, Vec<String>) {
    let mut new_state = state.clone();
    let mut logs = Vec::new();

    if theme.civilization("muwardi").is_none() {
        return (new_state, logs);
    }
    let Some(unit_id) = muwardi_unit_id(theme) else { return (new_state, logs) };

    // Deactivation: invading force fully eliminated (never on the spawn turn itself).
    if let Some(invasion) = new_state.muwardi_invasion.clone() {
        if invasion.active && invasion.spawned_on_turn < new_state.turn {
            let still_present = new_state.hexes_row_major().any(|h| h.units_of("muwardi").next().is_some());
            if !still_present {
                if let Some(invasion_mut) = new_state.muwardi_invasion.as_mut() {
                    invasion_mut.active = false;
                }
                if let Some(instigator) = invasion.instigator_civ_id.clone() {
                    let range = theme.tension_axis_range("religious_fervor");
                    if let Some(civ) = new_state.civilizations.get_mut(&instigator) {
                        civ.adjust_tension("religious_fervor", -20, range);
                    }
                }
                logs.push("muwardi invasion repelled".to_string());
            }
        }
    }

    let already_active = new_state.muwardi_invasion.as_ref().map(|m| m.active).unwrap_or(false);
    if already_active {
        return (new_state, logs);
    }

    let threat_range = theme.tension_axis_range("muwardi_threat");
    let civ_ids: Vec<String> = new_state.civilizations.keys().cloned().collect();
    let mut instigator: Option<String> = None;

    for civ_id in civ_ids {
        if civ_id == "muwardi" {
            continue;
        }
        let Some(civ) = new_state.civilizations.get(&civ_id) else { continue };
        if civ.is_eliminated || !is_asharite(theme, &civ_id) {
            continue;
        }
        let over_threshold = civ.tension("religious_fervor") > FERVOR_THRESHOLD;
        let next_counter = if over_threshold { civ.tension("muwardi_threat") + 1 } else { 0 };
        if let Some(civ) = new_state.civilizations.get_mut(&civ_id) {
            civ.set_tension("muwardi_threat", next_counter, threat_range);
        }
        if next_counter >= TURNS_REQUIRED && instigator.is_none() {
            instigator = Some(civ_id);
        }
    }

    let Some(instigator_civ_id) = instigator else { return (new_state, logs) };
    let Some(row) = spawn_row(&new_state) else { return (new_state, logs) };

    let (cols, _) = new_state.dims();
    let row_hexes: Vec<HexCoord> = (0..cols)
        .map(|col| HexCoord::new(col, row))
        .filter(|c| new_state.hex(*c).map(|h| !h.is_sea()).unwrap_or(false))
        .collect();
    if row_hexes.is_empty() {
        return (new_state, logs);
    }

    if !new_state.civilizations.contains_key(&"muwardi".to_string()) {
        new_state.civilizations.insert("muwardi".to_string(), CivilizationState::new("muwardi"));
    }
    let unit_def = theme.unit(&unit_id).unwrap().clone();
    for i in 0..MIN_INVADERS {
        let coord = row_hexes[i % row_hexes.len()];
        let new_id = new_state.next_unit_id();
        new_state.hex_mut(coord).unwrap().units.push(crate::state::Unit {
            id: new_id,
            definition_id: unit_id.clone(),
            civilization_id: "muwardi".to_string(),
            strength: unit_def.strength,
            morale: unit_def.morale,
            moves_remaining: unit_def.moves,
            is_garrisoned: false,
        });
    }

    let other_civ_ids: Vec<String> = new_state
        .civilizations
        .keys()
        .filter(|id| id.as_str() != "muwardi")
        .cloned()
        .collect();
    for civ_id in other_civ_ids {
        if let Some(civ) = new_state.civilizations.get_mut(&civ_id) {
            civ.diplomatic_relations.insert("muwardi".to_string(), RelationshipState::War);
        }
        if let Some(civ) = new_state.civilizations.get_mut(&"muwardi".to_string()) {
            civ.diplomatic_relations.insert(civ_id.clone(), RelationshipState::War);
        }
    }

    new_state.muwardi_invasion = Some(MuwardiInvasion {
        active: true,
        spawned_on_turn: new_state.turn,
        instigator_civ_id: Some(instigator_civ_id.clone()),
    });
    logs.push(format!("muwardi invasion triggered by {instigator_civ_id}'s religious fervor"));

    (new_state, logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::*;
    use std::collections::HashMap;

    fn theme_with_muwardi() -> ThemePackage {
        ThemePackage {
            version: "1".into(),
            civilizations: vec![
                CivilizationDef { id: "muwardi".into(), color: "#000".into(), religion: None, starting_resources: HashMap::new(), starting_techs: vec![], special_abilities: vec![] },
                CivilizationDef { id: "asharite-civ".into(), color: "#a".into(), religion: Some("asharite".into()), starting_resources: HashMap::new(), starting_techs: vec![], special_abilities: vec![] },
            ],
            map: MapConfig { cols: 3, rows: 3, zones: vec![], anchors: vec![], default_terrain_weights: HashMap::new(), sea_edge: false },
            resources: vec![],
            techs: vec![],
            buildings: vec![],
            units: vec![UnitDef { id: "muwardi_raider".into(), display_name: "Muwardi Raider".into(), strength: 8, morale: 6, moves: 2, cost: 0, upkeep: 0, prereq_tech: None }],
            events: vec![],
            diplomacy_options: vec![],
            victory_conditions: vec![],
            defeat_conditions: vec![],
            mechanics: Mechanics {
                tension_axes: HashMap::from([
                    ("religious_fervor".to_string(), TensionAxisRange { min: -100, max: 100 }),
                    ("muwardi_threat".to_string(), TensionAxisRange { min: 0, max: 10 }),
                ]),
                combat_modifiers_by_terrain: HashMap::new(), resource_interactions: vec![], turn_cycle_length: 0, turn_cycle_names: vec![], turn_cycle_effects: vec![],
            },
            flavor: HashMap::new(),
        }
    }

    #[test]
    fn two_consecutive_turns_above_threshold_triggers_invasion() {
        let mut civ = CivilizationState::new("asharite-civ");
        let theme = theme_with_muwardi();
        let range = theme.tension_axis_range("religious_fervor");
        civ.set_tension("religious_fervor", 95, range);
        let mut state = crate::testing::GameStateBuilder::new(3, 3).with_civilization_state(civ).build();

        let (after_turn_one, _logs) = run(&state, &theme);
        assert!(after_turn_one.muwardi_invasion.is_none());
        state = after_turn_one;
        state.turn += 1;

        let (after_turn_two, logs) = run(&state, &theme);
        assert!(after_turn_two.muwardi_invasion.as_ref().unwrap().active);
        assert_eq!(
            after_turn_two.hexes_row_major().flat_map(|h| h.units_of("muwardi")).count(),
            3
        );
        assert!(logs.iter().any(|l| l.contains("triggered")));
        assert_eq!(
            after_turn_two.civilizations.get(&"asharite-civ".to_string()).unwrap().relation_with("muwardi"),
            RelationshipState::War
        );
    }

    #[test]
    fn one_turn_above_threshold_does_not_trigger() {
        let mut civ = CivilizationState::new("asharite-civ");
        let theme = theme_with_muwardi();
        let range = theme.tension_axis_range("religious_fervor");
        civ.set_tension("religious_fervor", 95, range);
        let state = crate::testing::GameStateBuilder::new(3, 3).with_civilization_state(civ).build();
        let (new_state, _logs) = run(&state, &theme);
        assert!(new_state.muwardi_invasion.is_none());
    }
}
