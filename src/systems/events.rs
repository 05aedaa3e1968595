//! Phase: EVENTS. Three steps every resolution: apply responses to active
//! events, auto-resolve anything stale, then evaluate triggers and activate
//! new instances. Runs against its own PRNG fork (for `random_one`
//! targeting).

use crate::orders::Order;
use crate::prng::Prng;
use crate::state::{ActiveEvent, CivId, GameState};
use crate::theme::{EventEffect, EventTargeting, EventTrigger, ThemePackage};
use tracing::instrument;

#[instrument(skip_all, name = "events")]
pub fn run(
    state: &GameState,
    orders: &[(CivId, Order)],
    theme: &ThemePackage,
    prng: &mut Prng,
) -> (GameState, Vec<String>) {
    let mut new_state = state.clone();
    let mut logs = Vec::new();
    let current_turn = new_state.turn;

    // Step 1: responses.
    for (civ_id, order) in orders {
        let Order::EventResponse { event_instance_id, choice_id } = order else { continue };
        let Some(idx) = new_state.active_events.iter().position(|e| &e.instance_id == event_instance_id && !e.resolved)
        else {
            continue;
        };
        let definition_id = new_state.active_events[idx].definition_id.clone();
        let Some(def) = theme.event(&definition_id) else { continue };
        let Some(choice) = def.choices.iter().find(|c| &c.id == choice_id) else { continue };
        let effects = choice.effects.clone();
        apply_effects(&mut new_state, theme, civ_id, &effects, &mut logs);
        new_state.active_events[idx].responses.insert(civ_id.clone(), choice_id.clone());
        new_state.active_events[idx].resolved = true;
    }

    // Step 2: stale auto-resolve.
    let stale_indices: Vec<usize> = new_state
        .active_events
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.resolved && e.activated_on_turn < current_turn)
        .map(|(i, _)| i)
        .collect();
    for idx in stale_indices {
        let definition_id = new_state.active_events[idx].definition_id.clone();
        let targets = new_state.active_events[idx].target_civilization_ids.clone();
        if let Some(def) = theme.event(&definition_id) {
            if let Some(choice) = def.choices.iter().find(|c| c.id == def.default_choice_id) {
                let effects = choice.effects.clone();
                for target in &targets {
                    apply_effects(&mut new_state, theme, target, &effects, &mut logs);
                }
            }
        }
        new_state.active_events[idx].resolved = true;
    }

    // Step 3: activation.
    let mut activated_ids = Vec::new();
    for def in &theme.events {
        if !def.repeatable && new_state.active_events.iter().any(|e| e.definition_id == def.id) {
            continue;
        }
        let candidate_civs: Vec<CivId> = new_state
            .civilizations
            .iter()
            .filter(|(_, c)| !c.is_eliminated)
            .filter(|(id, _)| trigger_holds(&new_state, theme, id, &def.trigger))
            .map(|(id, _)| id.clone())
            .collect();
        if candidate_civs.is_empty() {
            continue;
        }

        let targets: Vec<CivId> = match &def.targeting {
            EventTargeting::All => candidate_civs.clone(),
            EventTargeting::RandomOne => {
                let weighted: Vec<(&str, f64)> = candidate_civs.iter().map(|c| (c.as_str(), 1.0)).collect();
                match prng.weighted_choice(&weighted) {
                    Ok(chosen) => vec![chosen.to_string()],
                    Err(_) => Vec::new(),
                }
            }
            EventTargeting::Explicit { civ_ids } => civ_ids
                .iter()
                .filter(|id| candidate_civs.contains(id))
                .cloned()
                .collect(),
        };

        for target in targets {
            let instance_id = format!("{}-{}-{}", def.id, target, current_turn);
            if let Some(choice) = def.choices.iter().find(|c| c.id == def.default_choice_id) {
                let effects = choice.effects.clone();
                apply_effects(&mut new_state, theme, &target, &effects, &mut logs);
            }
            new_state.active_events.push(ActiveEvent {
                instance_id,
                definition_id: def.id.clone(),
                target_civilization_ids: vec![target.clone()],
                activated_on_turn: current_turn,
                expires_on_turn: None,
                responses: Default::default(),
                resolved: true,
            });
            activated_ids.push(def.id.clone());
        }
    }

    (new_state, logs)
}

fn trigger_holds(state: &GameState, theme: &ThemePackage, civ_id: &str, trigger: &EventTrigger) -> bool {
    let Some(civ) = state.civilizations.get(&civ_id.to_string()) else { return false };
    match trigger {
        EventTrigger::TurnNumber { turn } => state.turn == *turn,
        EventTrigger::TurnRange { min, max } => state.turn >= *min && state.turn <= *max,
        EventTrigger::ResourceBelow { resource, amount } => civ.resource(resource) < *amount,
        EventTrigger::StabilityBelow { amount } => civ.stability < *amount,
        EventTrigger::TensionAbove { axis, amount } => civ.tension(axis) > *amount,
        EventTrigger::TechCompleted { tech_id } => civ.completed_techs.iter().any(|t| t == tech_id),
        EventTrigger::WarDeclared => civ
            .diplomatic_relations
            .values()
            .any(|r| *r == crate::state::RelationshipState::War),
        EventTrigger::Always => {
            let _ = theme;
            true
        }
    }
}

pub fn apply_effects(state: &mut GameState, theme: &ThemePackage, civ_id: &str, effects: &[EventEffect], logs: &mut Vec<String>) {
    for effect in effects {
        match effect {
            EventEffect::ResourceDelta { resource, delta } => {
                if let Some(civ) = state.civilizations.get_mut(&civ_id.to_string()) {
                    civ.add_resource(resource, *delta);
                }
            }
            EventEffect::StabilityDelta { delta } => {
                if let Some(civ) = state.civilizations.get_mut(&civ_id.to_string()) {
                    civ.adjust_stability(*delta);
                }
            }
            EventEffect::TensionDelta { axis, delta } => {
                let range = theme.tension_axis_range(axis);
                if let Some(civ) = state.civilizations.get_mut(&civ_id.to_string()) {
                    civ.adjust_tension(axis, *delta, range);
                }
            }
            EventEffect::SpawnUnit { unit_id, at } => {
                if let Some(def) = theme.unit(unit_id) {
                    let new_id = state.next_unit_id();
                    if let Some(hex) = state.hex_mut(*at) {
                        hex.units.push(crate::state::Unit {
                            id: new_id,
                            definition_id: def.id.clone(),
                            civilization_id: civ_id.to_string(),
                            strength: def.strength,
                            morale: def.morale,
                            moves_remaining: def.moves,
                            is_garrisoned: false,
                        });
                    }
                }
            }
            EventEffect::DestroySettlement { at } => {
                if let Some(hex) = state.hex_mut(*at) {
                    hex.settlement = None;
                }
            }
            EventEffect::ForceWar { other_civ_id } => {
                if let Some(civ) = state.civilizations.get_mut(&civ_id.to_string()) {
                    civ.diplomatic_relations.insert(other_civ_id.clone(), crate::state::RelationshipState::War);
                }
                if let Some(other) = state.civilizations.get_mut(other_civ_id) {
                    other.diplomatic_relations.insert(civ_id.to_string(), crate::state::RelationshipState::War);
                }
            }
            EventEffect::Narrative { text } => {
                logs.push(format!("{civ_id}: {text}"));
            }
            EventEffect::Custom { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::*;
    use std::collections::HashMap;

    fn theme_with_event(repeatable: bool) -> ThemePackage {
        ThemePackage {
            version: "1".into(),
            civilizations: vec![],
            map: MapConfig { cols: 1, rows: 1, zones: vec![], anchors: vec![], default_terrain_weights: HashMap::new(), sea_edge: false },
            resources: vec![],
            techs: vec![],
            buildings: vec![],
            units: vec![],
            events: vec![EventDef {
                id: "famine".into(),
                trigger: EventTrigger::Always,
                targeting: EventTargeting::All,
                choices: vec![EventChoice { id: "default".into(), effects: vec![EventEffect::StabilityDelta { delta: -5 }] }],
                default_choice_id: "default".into(),
                repeatable,
                weight: 1.0,
            }],
            diplomacy_options: vec![],
            victory_conditions: vec![],
            defeat_conditions: vec![],
            mechanics: Mechanics { tension_axes: HashMap::new(), combat_modifiers_by_terrain: HashMap::new(), resource_interactions: vec![], turn_cycle_length: 0, turn_cycle_names: vec![], turn_cycle_effects: vec![] },
            flavor: HashMap::new(),
        }
    }

    #[test]
    fn always_trigger_activates_for_every_civ_once() {
        let state = crate::testing::GameStateBuilder::default().with_civilization("a").build();
        let theme = theme_with_event(false);
        let mut prng = Prng::new(1);
        let (new_state, _logs) = run(&state, &[], &theme, &mut prng);
        assert_eq!(new_state.civilizations.get(&"a".to_string()).unwrap().stability, 95);
        assert_eq!(new_state.active_events.len(), 1);
    }

    #[test]
    fn non_repeatable_event_does_not_activate_twice() {
        let mut state = crate::testing::GameStateBuilder::default().with_civilization("a").build();
        let theme = theme_with_event(false);
        let mut prng = Prng::new(1);
        let (state2, _logs) = run(&state, &[], &theme, &mut prng);
        state = state2;
        let (state3, _logs) = run(&state, &[], &theme, &mut prng);
        assert_eq!(state3.active_events.len(), 1);
    }
}
