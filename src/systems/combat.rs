//! Phase: COMBAT. Power calculation, dice resolution, casualties, retreat,
//! and (at the end of all combat this turn) control transfer.
//!
//! Hexes are scanned row-major and resolved sequentially against a single
//! PRNG fork so the sequence of dice rolls is reproducible regardless of how
//! many encounters occur.

use regex::Regex;

use crate::hex::{self, HexCoord, PassabilityGrid};
use crate::prng::Prng;
use crate::state::{CivId, CombatResultSummary, GameState, RelationshipState, Unit};
use crate::theme::ThemePackage;
use tracing::instrument;

fn cavalry_name_pattern() -> Regex {
    Regex::new(r"(?i)cavalry|horseman|knight|rider").unwrap()
}

fn at_war(state: &GameState, a: &str, b: &str) -> bool {
    state
        .civilizations
        .get(&a.to_string())
        .map(|c| c.relation_with(b) == RelationshipState::War)
        .unwrap_or(false)
}

fn select_defender(hex: &crate::state::Hex, prng: &mut Prng) -> CivId {
    if let Some(controller) = &hex.controlled_by {
        if hex.units_of(controller).next().is_some() {
            return controller.clone();
        }
    }
    let civs = hex.distinct_civs_present();
    let weighted: Vec<(&str, f64)> = civs.iter().map(|c| (*c, 1.0)).collect();
    prng.weighted_choice(&weighted).map(|s| s.to_string()).unwrap_or_else(|_| civs[0].to_string())
}

fn select_attacker(state: &GameState, hex: &crate::state::Hex, defender: &str) -> Option<CivId> {
    hex.distinct_civs_present()
        .into_iter()
        .find(|c| *c != defender && at_war(state, c, defender))
        .map(|s| s.to_string())
}

struct PowerInputs<'a> {
    theme: &'a ThemePackage,
    state: &'a GameState,
    hex: &'a crate::state::Hex,
    civ_id: &'a str,
    is_attacker: bool,
    opponent_civ_id: &'a str,
}

fn compute_power(inputs: &PowerInputs) -> f64 {
    let units: Vec<&Unit> = inputs.hex.units_of(inputs.civ_id).collect();
    let total_strength: i64 = units.iter().map(|u| u.strength).sum();

    let side_multiplier = if inputs.is_attacker {
        *inputs
            .theme
            .mechanics
            .combat_modifiers_by_terrain
            .get(inputs.hex.terrain.as_str())
            .unwrap_or(&1.0)
    } else {
        let any_garrisoned = units.iter().any(|u| u.is_garrisoned);
        if any_garrisoned {
            1.25
        } else {
            1.0
        }
    };

    let civ = inputs.state.civilizations.get(&inputs.civ_id.to_string());
    let completed_techs = civ.map(|c| c.completed_techs.clone()).unwrap_or_default();

    let mut tech_bonus = 0.0;
    let has_settlement = inputs.hex.settlement.is_some();
    let cavalry_re = cavalry_name_pattern();
    let side_has_cavalry = units.iter().any(|u| {
        inputs
            .theme
            .unit(&u.definition_id)
            .map(|def| cavalry_re.is_match(&def.display_name))
            .unwrap_or(false)
    });

    for tech_id in &completed_techs {
        let Some(tech) = inputs.theme.tech(tech_id) else { continue };
        for effect in &tech.effects {
            match effect {
                crate::theme::TechEffect::CombatModifier { value } => tech_bonus += value,
                crate::theme::TechEffect::Custom { key, value } => match key.as_str() {
                    "settlement_defense_bonus" if !inputs.is_attacker && has_settlement => {
                        tech_bonus += value.parse::<f64>().unwrap_or(0.0)
                    }
                    "capital_defense_combat_bonus"
                        if !inputs.is_attacker
                            && inputs.hex.settlement.as_ref().map(|s| s.is_capital).unwrap_or(false) =>
                    {
                        tech_bonus += value.parse::<f64>().unwrap_or(0.0)
                    }
                    "siege_combat_bonus" if inputs.is_attacker && has_settlement => {
                        tech_bonus += value.parse::<f64>().unwrap_or(0.0)
                    }
                    "cavalry_combat_bonus" if side_has_cavalry => tech_bonus += value.parse::<f64>().unwrap_or(0.0),
                    _ => {}
                },
                _ => {}
            }
        }
    }

    let seasonal_mod = inputs
        .theme
        .turn_cycle_effect(inputs.state.turn)
        .map(|e| e.combat_modifier)
        .unwrap_or(0.0);

    let mut civ_ability_bonus = 0.0;
    let special_abilities = inputs
        .theme
        .civilization(inputs.civ_id)
        .map(|c| c.special_abilities.clone())
        .unwrap_or_default();
    for ability in &special_abilities {
        let lower = ability.to_lowercase();
        if inputs.is_attacker && lower.contains("gain +") && lower.contains("when attacking") {
            if let Some(v) = extract_bonus_value(ability) {
                civ_ability_bonus += v;
            }
        }
        if !inputs.is_attacker && lower.contains("defending in") {
            if let Some(terrain_word) = lower.split("defending in").nth(1) {
                if terrain_word.trim_start().starts_with(inputs.hex.terrain.as_str()) {
                    if let Some(v) = extract_bonus_value(ability) {
                        civ_ability_bonus += v;
                    }
                }
            }
        }
        if inputs.is_attacker && lower.contains("reconquista") {
            let attacker_religion = inputs.theme.civilization(inputs.civ_id).and_then(|c| c.religion.clone());
            let defender_religion = inputs.theme.civilization(inputs.opponent_civ_id).and_then(|c| c.religion.clone());
            if let (Some(a), Some(b)) = (attacker_religion, defender_religion) {
                if a != b {
                    if let Some(v) = extract_bonus_value(ability) {
                        civ_ability_bonus += v;
                    }
                }
            }
        }
    }

    (total_strength as f64) * side_multiplier + tech_bonus + seasonal_mod + civ_ability_bonus
}

fn extract_bonus_value(text: &str) -> Option<f64> {
    text.split_whitespace()
        .find(|tok| tok.starts_with('+'))
        .and_then(|tok| tok.trim_start_matches('+').parse::<f64>().ok())
}

struct CapitalGrid<'a> {
    state: &'a GameState,
}

impl<'a> PassabilityGrid for CapitalGrid<'a> {
    fn dims(&self) -> (i32, i32) {
        self.state.dims()
    }
    fn is_sea(&self, coord: HexCoord) -> bool {
        self.state.hex(coord).map(|h| h.is_sea()).unwrap_or(true)
    }
}

fn retreat_destination(state: &GameState, from: HexCoord, civ_id: &str) -> Option<HexCoord> {
    let capital = state.capital_hex_of(civ_id)?;
    let grid = CapitalGrid { state };
    let path = hex::path_to(&grid, from, capital, u32::MAX)?;
    path.first().copied()
}

/// Run the combat phase against a single PRNG fork, in row-major hex order.
#[instrument(skip_all, name = "combat")]
pub fn run(state: &GameState, theme: &ThemePackage, prng: &mut Prng) -> (GameState, Vec<CombatResultSummary>, Vec<String>) {
    let mut new_state = state.clone();
    let mut results = Vec::new();
    let mut logs = Vec::new();

    let coords: Vec<HexCoord> = new_state.hexes_row_major().map(|h| h.coord).collect();

    for coord in coords {
        let hex_snapshot = new_state.hex(coord).unwrap().clone();
        let civs_present = hex_snapshot.distinct_civs_present();
        if civs_present.len() < 2 {
            continue;
        }
        let any_war_pair = civs_present
            .iter()
            .enumerate()
            .any(|(i, a)| civs_present[i + 1..].iter().any(|b| at_war(&new_state, a, b)));
        if !any_war_pair {
            continue;
        }

        let defender = select_defender(&hex_snapshot, prng);
        let Some(attacker) = select_attacker(&new_state, &hex_snapshot, &defender) else { continue };

        let attacker_power = compute_power(&PowerInputs {
            theme,
            state: &new_state,
            hex: &hex_snapshot,
            civ_id: &attacker,
            is_attacker: true,
            opponent_civ_id: &defender,
        });
        let defender_power = compute_power(&PowerInputs {
            theme,
            state: &new_state,
            hex: &hex_snapshot,
            civ_id: &defender,
            is_attacker: false,
            opponent_civ_id: &attacker,
        });

        let attacker_roll = prng.next_int(1, 6) as f64;
        let defender_roll = prng.next_int(1, 6) as f64;
        let attacker_score = attacker_power * attacker_roll;
        let defender_score = defender_power * defender_roll;
        let outcome_sign = (attacker_score - defender_score).signum() as i32;

        let (winner, loser, winner_frac, loser_frac) = match outcome_sign {
            s if s > 0 => (attacker.clone(), defender.clone(), 0.15, 0.60),
            s if s < 0 => (defender.clone(), attacker.clone(), 0.15, 0.60),
            _ => (attacker.clone(), defender.clone(), 0.40, 0.40),
        };

        let winner_total: i64 = hex_snapshot.units_of(&winner).map(|u| u.strength).sum();
        let loser_total: i64 = hex_snapshot.units_of(&loser).map(|u| u.strength).sum();
        let winner_casualties = ((winner_total as f64 * winner_frac).floor() as i64).max(1).min(winner_total);
        let loser_casualties = ((loser_total as f64 * loser_frac).floor() as i64).max(1).min(loser_total);

        apply_casualties(&mut new_state, coord, &winner, winner_casualties);
        apply_casualties(&mut new_state, coord, &loser, loser_casualties);

        logs.push(format!(
            "combat at ({},{}): {} attacked {}, {} wins (outcome {})",
            coord.col, coord.row, attacker, defender, winner, outcome_sign
        ));
        results.push(CombatResultSummary {
            hex: coord,
            attacker: attacker.clone(),
            defender: defender.clone(),
            outcome_sign,
            attacker_casualties: if winner == attacker { winner_casualties } else { loser_casualties },
            defender_casualties: if winner == defender { winner_casualties } else { loser_casualties },
        });

        // retreat: survivors of the losing side.
        if let Some(destination) = retreat_destination(&new_state, coord, &loser) {
            let survivors: Vec<Unit> = {
                let hex_mut = new_state.hex_mut(coord).unwrap();
                let (keep, remove): (Vec<Unit>, Vec<Unit>) =
                    hex_mut.units.drain(..).partition(|u| u.civilization_id != loser);
                hex_mut.units = keep;
                remove
            };
            new_state.hex_mut(destination).unwrap().units.extend(survivors);
        }
    }

    // control transfer: after all combat this turn, sole-civ hexes flip control.
    for coord in new_state.hexes_row_major().map(|h| h.coord).collect::<Vec<_>>() {
        let hex = new_state.hex(coord).unwrap();
        let civs = hex.distinct_civs_present();
        if civs.len() == 1 {
            let sole = civs[0].to_string();
            new_state.hex_mut(coord).unwrap().controlled_by = Some(sole);
        }
    }

    (new_state, results, logs)
}

/// Sort the losing side's units ascending by strength; absorb damage
/// weakest-first until exhausted. Every unit that took damage loses 1
/// morale. Destroyed units (strength<=0 or morale<=0) are removed.
fn apply_casualties(state: &mut GameState, coord: HexCoord, civ_id: &str, mut remaining_damage: i64) {
    let hex = state.hex_mut(coord).unwrap();
    let mut indices: Vec<usize> = hex
        .units
        .iter()
        .enumerate()
        .filter(|(_, u)| u.civilization_id == civ_id)
        .map(|(i, _)| i)
        .collect();
    indices.sort_by_key(|&i| hex.units[i].strength);

    for idx in indices {
        if remaining_damage <= 0 {
            break;
        }
        let unit = &mut hex.units[idx];
        let absorbed = remaining_damage.min(unit.strength);
        unit.strength -= absorbed;
        unit.morale -= 1;
        remaining_damage -= absorbed;
    }

    hex.units.retain(|u| u.civilization_id != civ_id || !u.is_destroyed());
}
