//! Phase: VICTORY/DEFEAT. Evaluates defeat conditions per civ, then victory
//! conditions among survivors, setting `phase = completed` on the first win.

use crate::state::{GamePhase, GameState};
use crate::theme::{DefeatCondition, ThemePackage, VictoryCondition};
use tracing::instrument;

#[instrument(skip_all, name = "victory")]
pub fn run(state: &GameState, theme: &ThemePackage) -> (GameState, Vec<String>) {
    let mut new_state = state.clone();
    let mut logs = Vec::new();

    let civ_ids: Vec<String> = new_state.civilizations.keys().cloned().collect();
    for civ_id in &civ_ids {
        if new_state.civilizations.get(civ_id).map(|c| c.is_eliminated).unwrap_or(true) {
            continue;
        }
        let defeated = evaluate_defeat(&new_state, theme, civ_id);
        if defeated {
            if let Some(civ) = new_state.civilizations.get_mut(civ_id) {
                civ.is_eliminated = true;
            }
            logs.push(format!("{civ_id}: eliminated"));
        }
    }

    if new_state.phase == GamePhase::Completed {
        return (new_state, logs);
    }

    let survivors: Vec<String> = new_state
        .civilizations
        .iter()
        .filter(|(_, c)| !c.is_eliminated)
        .map(|(id, _)| id.clone())
        .collect();

    for condition in &theme.victory_conditions {
        if let Some(winner_note) = evaluate_victory(&new_state, theme, condition, &survivors) {
            new_state.phase = GamePhase::Completed;
            logs.push(winner_note);
            break;
        }
    }

    (new_state, logs)
}

fn evaluate_defeat(state: &GameState, theme: &ThemePackage, civ_id: &str) -> bool {
    for condition in &theme.defeat_conditions {
        match condition {
            DefeatCondition::CapitalLost => {
                if state.capital_hex_of(civ_id).is_none() {
                    return true;
                }
            }
            DefeatCondition::StabilityZero { turns_at_zero } => {
                let Some(civ) = state.civilizations.get(&civ_id.to_string()) else { continue };
                if civ.stability == 0 {
                    match turns_at_zero {
                        Some(required) => {
                            if civ.turns_at_zero_stability >= *required {
                                return true;
                            }
                        }
                        None => return true,
                    }
                }
            }
            DefeatCondition::EliminatedByCombat => {
                let has_units = state.hexes_row_major().any(|h| h.units_of(civ_id).next().is_some());
                let has_settlement = state
                    .hexes_row_major()
                    .any(|h| h.controlled_by.as_deref() == Some(civ_id) && h.settlement.is_some());
                if !has_units && !has_settlement {
                    return true;
                }
            }
        }
    }
    false
}

fn evaluate_victory(
    state: &GameState,
    _theme: &ThemePackage,
    condition: &VictoryCondition,
    survivors: &[String],
) -> Option<String> {
    match condition {
        VictoryCondition::EliminateAll => {
            if survivors.len() == 1 {
                return Some(format!("{} wins by elimination", survivors[0]));
            }
        }
        VictoryCondition::ControlHexes { count } => {
            for civ_id in survivors {
                let controlled = state.hexes_row_major().filter(|h| h.controlled_by.as_deref() == Some(civ_id.as_str())).count();
                if controlled as u32 >= *count {
                    return Some(format!("{civ_id} wins by controlling {controlled} hexes"));
                }
            }
        }
        VictoryCondition::ResourceAccumulate { resource, amount } => {
            for civ_id in survivors {
                if let Some(civ) = state.civilizations.get(civ_id) {
                    if civ.resource(resource) >= *amount {
                        return Some(format!("{civ_id} wins by accumulating {resource}"));
                    }
                }
            }
        }
        VictoryCondition::TechAdvance { tech_id } => {
            for civ_id in survivors {
                if let Some(civ) = state.civilizations.get(civ_id) {
                    if civ.completed_techs.iter().any(|t| t == tech_id) {
                        return Some(format!("{civ_id} wins by researching {tech_id}"));
                    }
                }
            }
        }
        VictoryCondition::SurviveTurns { turns } => {
            if state.turn >= *turns && !survivors.is_empty() {
                return Some(format!("all surviving civs share victory by reaching turn {}", state.turn));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CivilizationState;
    use crate::theme::*;
    use std::collections::HashMap;

    fn theme_with(conditions: Vec<VictoryCondition>) -> ThemePackage {
        ThemePackage {
            version: "1".into(), civilizations: vec![],
            map: MapConfig { cols: 1, rows: 1, zones: vec![], anchors: vec![], default_terrain_weights: HashMap::new(), sea_edge: false },
            resources: vec![], techs: vec![], buildings: vec![], units: vec![], events: vec![], diplomacy_options: vec![],
            victory_conditions: conditions,
            defeat_conditions: vec![DefeatCondition::CapitalLost, DefeatCondition::EliminatedByCombat],
            mechanics: Mechanics { tension_axes: HashMap::new(), combat_modifiers_by_terrain: HashMap::new(), resource_interactions: vec![], turn_cycle_length: 0, turn_cycle_names: vec![], turn_cycle_effects: vec![] },
            flavor: HashMap::new(),
        }
    }

    #[test]
    fn eliminate_all_completes_game_with_one_survivor() {
        let mut state = crate::testing::GameStateBuilder::default()
            .with_civilization_state(CivilizationState::new("a"))
            .with_civilization_state({ let mut c = CivilizationState::new("b"); c.is_eliminated = true; c })
            .build();
        state.civilizations.get_mut(&"b".to_string()).unwrap().is_eliminated = true;
        let theme = theme_with(vec![VictoryCondition::EliminateAll]);
        let (new_state, logs) = run(&state, &theme);
        assert_eq!(new_state.phase, crate::state::GamePhase::Completed);
        assert_eq!(logs.len(), 1);
    }

    #[test]
    fn civ_with_no_capital_and_no_units_is_eliminated() {
        let state = crate::testing::GameStateBuilder::default().with_civilization_state(CivilizationState::new("a")).build();
        let theme = theme_with(vec![]);
        let (new_state, _logs) = run(&state, &theme);
        assert!(new_state.civilizations.get(&"a".to_string()).unwrap().is_eliminated);
    }
}
