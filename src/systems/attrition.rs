//! Phase: ATTRITION. Grain starvation and sustained-war stability drain.

use crate::state::{GameState, RelationshipState};
use crate::theme::ThemePackage;
use tracing::instrument;

#[instrument(skip_all, name = "attrition")]
pub fn run(state: &GameState, theme: &ThemePackage) -> (GameState, Vec<String>) {
    let mut new_state = state.clone();
    let mut logs = Vec::new();
    let declares_grain = theme.resource("grain").is_some();

    let civ_ids: Vec<String> = new_state.civilizations.keys().cloned().collect();
    for civ_id in civ_ids {
        let Some(civ) = new_state.civilizations.get(&civ_id) else { continue };
        if civ.is_eliminated {
            continue;
        }
        let mut delta = 0;
        if declares_grain && civ.resource("grain") == 0 {
            delta -= 10;
        }
        let at_war = civ.diplomatic_relations.values().any(|r| *r == RelationshipState::War);
        if at_war {
            delta -= 2;
        }
        if delta != 0 {
            if let Some(civ) = new_state.civilizations.get_mut(&civ_id) {
                civ.adjust_stability(delta);
            }
            logs.push(format!("{civ_id}: attrition stability delta {delta}"));
        }

        if let Some(civ) = new_state.civilizations.get_mut(&civ_id) {
            if civ.stability == 0 {
                civ.turns_at_zero_stability += 1;
            } else {
                civ.turns_at_zero_stability = 0;
            }
        }
    }

    (new_state, logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CivilizationState;
    use crate::theme::*;
    use std::collections::HashMap;

    fn theme_with_grain() -> ThemePackage {
        ThemePackage {
            version: "1".into(), civilizations: vec![],
            map: MapConfig { cols: 1, rows: 1, zones: vec![], anchors: vec![], default_terrain_weights: HashMap::new(), sea_edge: false },
            resources: vec![ResourceDef { id: "grain".into(), base_yield: 1.0, terrain_yields: HashMap::new() }],
            techs: vec![], buildings: vec![], units: vec![], events: vec![], diplomacy_options: vec![],
            victory_conditions: vec![], defeat_conditions: vec![],
            mechanics: Mechanics { tension_axes: HashMap::new(), combat_modifiers_by_terrain: HashMap::new(), resource_interactions: vec![], turn_cycle_length: 0, turn_cycle_names: vec![], turn_cycle_effects: vec![] },
            flavor: HashMap::new(),
        }
    }

    #[test]
    fn zero_grain_drops_stability_by_ten() {
        let state = crate::testing::GameStateBuilder::default().with_civilization_state(CivilizationState::new("a")).build();
        let theme = theme_with_grain();
        let (new_state, _logs) = run(&state, &theme);
        assert_eq!(new_state.civilizations.get(&"a".to_string()).unwrap().stability, 90);
    }

    #[test]
    fn no_grain_resource_declared_means_no_starvation_penalty() {
        let mut theme = theme_with_grain();
        theme.resources.clear();
        let state = crate::testing::GameStateBuilder::default().with_civilization_state(CivilizationState::new("a")).build();
        let (new_state, _logs) = run(&state, &theme);
        assert_eq!(new_state.civilizations.get(&"a".to_string()).unwrap().stability, 100);
    }

    #[test]
    fn zero_stability_increments_streak_each_turn() {
        let mut theme = theme_with_grain();
        theme.resources.clear();
        let mut civ = CivilizationState::new("a");
        civ.set_stability(0);
        let state = crate::testing::GameStateBuilder::default().with_civilization_state(civ).build();

        let (after_one, _) = run(&state, &theme);
        assert_eq!(after_one.civilizations.get(&"a".to_string()).unwrap().turns_at_zero_stability, 1);

        let (after_two, _) = run(&after_one, &theme);
        assert_eq!(after_two.civilizations.get(&"a".to_string()).unwrap().turns_at_zero_stability, 2);
    }

    #[test]
    fn nonzero_stability_resets_streak() {
        let mut theme = theme_with_grain();
        theme.resources.clear();
        let mut civ = CivilizationState::new("a");
        civ.turns_at_zero_stability = 3;
        let state = crate::testing::GameStateBuilder::default().with_civilization_state(civ).build();
        let (new_state, _) = run(&state, &theme);
        assert_eq!(new_state.civilizations.get(&"a".to_string()).unwrap().turns_at_zero_stability, 0);
    }
}
