//! Phase: RESEARCH. Applies `research` orders: progress accumulates, and a
//! tech that reaches its cost completes, including any `trigger_event`
//! custom effect firing immediately.

use crate::collections::OrderedMap;
use crate::orders::Order;
use crate::state::{ActiveEvent, CivId, GameState};
use crate::theme::{TechEffect, ThemePackage};
use tracing::instrument;

#[instrument(skip_all, name = "research")]
pub fn run(state: &GameState, theme: &ThemePackage, orders_by_civ: &OrderedMap<CivId, Vec<Order>>) -> (GameState, Vec<String>) {
    let mut new_state = state.clone();
    let mut logs = Vec::new();
    let current_turn = new_state.turn;

    for (civ_id, orders) in orders_by_civ.iter() {
        for order in orders {
            let Order::Research { tech_id, points_allocated } = order else { continue };
            let Some(tech) = theme.tech(tech_id) else {
                log::debug!("skipping research order for {civ_id}: unknown tech {tech_id}");
                continue;
            };
            let Some(civ) = new_state.civilizations.get_mut(civ_id) else { continue };
            if civ.completed_techs.iter().any(|t| t == tech_id) {
                continue;
            }
            let progress = civ.tech_progress.entry(tech_id.clone()).or_insert(0);
            *progress += points_allocated;
            let completed = *progress >= tech.cost;
            if completed {
                civ.tech_progress.remove(tech_id);
                civ.completed_techs.push(tech_id.clone());
                logs.push(format!("{civ_id}: completed tech {tech_id}"));

                for effect in &tech.effects {
                    if let TechEffect::Custom { key, value } = effect {
                        if key == "trigger_event" {
                            if let Some(event_def) = theme.event(value) {
                                let instance_id = format!("{}-{}-{}", event_def.id, civ_id, current_turn);
                                if let Some(choice) =
                                    event_def.choices.iter().find(|c| c.id == event_def.default_choice_id)
                                {
                                    let effects = choice.effects.clone();
                                    super::events::apply_effects(&mut new_state, theme, civ_id, &effects, &mut logs);
                                }
                                new_state.active_events.push(ActiveEvent {
                                    instance_id,
                                    definition_id: event_def.id.clone(),
                                    target_civilization_ids: vec![civ_id.clone()],
                                    activated_on_turn: current_turn,
                                    expires_on_turn: None,
                                    responses: Default::default(),
                                    resolved: true,
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    (new_state, logs)
}
