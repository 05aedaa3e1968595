//! Phase: HEALING. On every friendly-settlement hex, each own unit heals
//! +1 strength (capped at its definition's maximum), plus any bonus from a
//! civ's completed `unit_heal_rate` custom tech effect.

use crate::state::GameState;
use crate::theme::{TechEffect, ThemePackage};
use tracing::instrument;

#[instrument(skip_all, name = "healing")]
pub fn run(state: &GameState, theme: &ThemePackage) -> (GameState, Vec<String>) {
    let mut new_state = state.clone();
    let mut logs = Vec::new();

    let civ_ids: Vec<String> = new_state.civilizations.keys().cloned().collect();
    let mut heal_bonus: rustc_hash::FxHashMap<String, i64> = rustc_hash::FxHashMap::default();
    for civ_id in &civ_ids {
        let Some(civ) = new_state.civilizations.get(civ_id) else { continue };
        let mut bonus = 0;
        for tech_id in &civ.completed_techs {
            let Some(tech) = theme.tech(tech_id) else { continue };
            for effect in &tech.effects {
                if let TechEffect::Custom { key, value } = effect {
                    if key == "unit_heal_rate" {
                        bonus += value.parse::<i64>().unwrap_or(0);
                    }
                }
            }
        }
        heal_bonus.insert(civ_id.clone(), bonus);
    }

    let mut healed = 0;
    for row in new_state.map.iter_mut() {
        for hex in row.iter_mut() {
            let Some(settlement_owner) = hex.controlled_by.clone() else { continue };
            if hex.settlement.is_none() {
                continue;
            }
            let bonus = heal_bonus.get(&settlement_owner).copied().unwrap_or(0);
            for unit in hex.units.iter_mut() {
                if unit.civilization_id != settlement_owner {
                    continue;
                }
                let Some(def) = theme.unit(&unit.definition_id) else { continue };
                if unit.strength < def.strength {
                    unit.strength = (unit.strength + 1 + bonus).min(def.strength);
                    healed += 1;
                }
            }
        }
    }
    if healed > 0 {
        logs.push(format!("healing: {healed} units healed on friendly settlements"));
    }

    (new_state, logs)
}
