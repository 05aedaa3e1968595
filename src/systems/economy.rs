//! Phase: ECONOMY. Terrain yields, building effects, upkeep, resource
//! interactions, civilization special abilities, and tension-driven
//! stability/faith effects. Total over a validated theme — the only failure
//! mode is a dangling resource id, which validation at theme load already
//! excludes, so in practice this phase never errors at runtime.

use regex::Regex;
use rustc_hash::FxHashMap;

use crate::orders::Order;
use crate::state::{CivId, GameState};
use crate::theme::ThemePackage;
use tracing::instrument;

#[derive(Debug, thiserror::Error)]
pub enum EconomyError {
    #[error("resource `{0}` referenced by theme content has no definition")]
    UnknownResource(String),
}

fn cavalry_name_pattern() -> Regex {
    Regex::new(r"(?i)cavalry|horseman|knight|rider").unwrap()
}

/// Run the economy phase for every non-eliminated civ.
///
/// `allocation_weights` is the per-civ resource-allocation weight map
/// collected from `resource_allocation` orders this turn; civs without an
/// entry get the uniform default (1/N across resources).
#[instrument(skip_all, name = "economy")]
pub fn run(
    state: &GameState,
    theme: &ThemePackage,
    allocation_weights: &FxHashMap<CivId, FxHashMap<String, f64>>,
) -> Result<(GameState, Vec<String>), EconomyError> {
    let mut new_state = state.clone();
    let mut logs = Vec::new();
    let cavalry_re = cavalry_name_pattern();

    let cycle_effect = theme.turn_cycle_effect(new_state.turn);

    let civ_ids: Vec<CivId> = new_state.civilizations.keys().cloned().collect();
    for civ_id in civ_ids {
        if new_state.civilizations.get(&civ_id).map(|c| c.is_eliminated).unwrap_or(true) {
            continue;
        }

        let special_abilities = theme
            .civilization(&civ_id)
            .map(|c| c.special_abilities.clone())
            .unwrap_or_default();
        let boost_faith_buildings = special_abilities
            .iter()
            .any(|a| a.to_lowercase().contains("culture buildings produce") && a.contains("50%"));
        let cavalry_market_bonus = special_abilities
            .iter()
            .any(|a| a.to_lowercase().contains("cavalry") && a.to_lowercase().contains("market"));
        let capital_trade_bonus: Option<i64> = special_abilities.iter().find_map(|a| {
            if a.to_lowercase().contains("connected to capital") {
                a.split_whitespace().find_map(|tok| tok.trim_start_matches('+').parse::<i64>().ok())
            } else {
                None
            }
        });

        let mut resource_deltas: FxHashMap<String, i64> = FxHashMap::default();
        let mut stability_delta: i64 = 0;
        let mut upkeep_dinars: i64 = 0;

        let weights = allocation_weights.get(&civ_id);

        let capital_coord = new_state.capital_hex_of(&civ_id);
        let connected_settlements: Vec<crate::hex::HexCoord> = if capital_trade_bonus.is_some() {
            if let Some(capital) = capital_coord {
                reachable_own_settlements(&new_state, &civ_id, capital)
            } else {
                Vec::new()
            }
        } else {
            Vec::new()
        };

        for hex in new_state.hexes_row_major() {
            if hex.controlled_by.as_deref() != Some(civ_id.as_str()) {
                continue;
            }
            for resource in &theme.resources {
                let Some(&terrain_yield) = resource.terrain_yields.get(hex.terrain.as_str()) else { continue };
                let seasonal = cycle_effect
                    .and_then(|e| e.resource_multipliers.get(&resource.id))
                    .copied()
                    .unwrap_or(1.0);
                let weight = weights
                    .and_then(|w| w.get(&resource.id))
                    .copied()
                    .unwrap_or_else(|| 1.0 / theme.resources.len().max(1) as f64);
                let mut amount = (terrain_yield * seasonal * weight).floor() as i64;
                if boost_faith_buildings && resource.id == "faith" {
                    amount += (amount as f64 * 0.5).floor() as i64;
                }
                *resource_deltas.entry(resource.id.clone()).or_insert(0) += amount;
            }

            if let Some(settlement) = &hex.settlement {
                for building_id in &settlement.buildings {
                    let Some(building) = theme.building(building_id) else { continue };
                    for (resource_id, delta) in &building.effects {
                        if resource_id == "stability" {
                            stability_delta += delta;
                        } else {
                            *resource_deltas.entry(resource_id.clone()).or_insert(0) += delta;
                        }
                    }
                    upkeep_dinars += building.upkeep;
                }
                if capital_trade_bonus.is_some()
                    && !hex.settlement.as_ref().map(|s| s.is_capital).unwrap_or(false)
                    && connected_settlements.contains(&hex.coord)
                {
                    *resource_deltas.entry("trade_goods".to_string()).or_insert(0) += capital_trade_bonus.unwrap();
                }
            }
        }

        if cavalry_market_bonus {
            for hex in new_state.hexes_row_major() {
                if hex.controlled_by.as_deref() != Some(civ_id.as_str()) {
                    continue;
                }
                let has_market = hex.settlement.as_ref().map(|s| s.building_count("market") > 0).unwrap_or(false);
                if !has_market {
                    continue;
                }
                let cavalry_units = hex
                    .units_of(&civ_id)
                    .filter(|u| {
                        theme
                            .unit(&u.definition_id)
                            .map(|def| cavalry_re.is_match(&def.display_name))
                            .unwrap_or(false)
                    })
                    .count() as i64;
                *resource_deltas.entry("dinars".to_string()).or_insert(0) += 2 * cavalry_units;
            }
        }

        // unit upkeep, regardless of hex control
        for hex in new_state.hexes_row_major() {
            for unit in hex.units_of(&civ_id) {
                if let Some(def) = theme.unit(&unit.definition_id) {
                    upkeep_dinars += def.upkeep;
                }
            }
        }

        // resource interactions
        let snapshot: Vec<(String, i64)> = resource_deltas.iter().map(|(k, v)| (k.clone(), *v)).collect();
        for interaction in &theme.mechanics.resource_interactions {
            let Some((_, source_amount)) = snapshot.iter().find(|(k, _)| k == &interaction.source) else { continue };
            let derived = (*source_amount as f64 * interaction.multiplier).floor() as i64;
            *resource_deltas.entry(interaction.target.clone()).or_insert(0) += derived;
        }

        // custom tech effects
        if let Some(civ) = new_state.civilizations.get(&civ_id) {
            for tech_id in &civ.completed_techs {
                let Some(tech) = theme.tech(tech_id) else { continue };
                for effect in &tech.effects {
                    if let crate::theme::TechEffect::Custom { key, value } = effect {
                        match key.as_str() {
                            "resource_conversion" => {
                                if let Some((from, from_amount, to, to_amount)) = parse_resource_conversion(value) {
                                    let available = civ.resource(&from) + resource_deltas.get(&from).copied().unwrap_or(0);
                                    if available >= from_amount {
                                        *resource_deltas.entry(from).or_insert(0) -= from_amount;
                                        *resource_deltas.entry(to).or_insert(0) += to_amount;
                                    }
                                }
                            }
                            "cultural_victory_progress" => {
                                if let Ok(v) = value.parse::<i64>() {
                                    *resource_deltas.entry("faith".to_string()).or_insert(0) += v;
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        // tension-axis effects on stability/faith
        if let Some(civ) = new_state.civilizations.get(&civ_id) {
            let fervor = civ.tension("religious_fervor");
            if fervor > 70 {
                stability_delta -= 3;
            } else if fervor < 30 {
                stability_delta += 2;
                *resource_deltas.entry("faith".to_string()).or_insert(0) += 2;
            }
        }

        if let Some(seasonal_stability) = cycle_effect.map(|e| e.stability_modifier) {
            stability_delta += seasonal_stability;
        }

        // apply upkeep last
        *resource_deltas.entry("dinars".to_string()).or_insert(0) -= upkeep_dinars;

        if let Some(civ) = new_state.civilizations.get_mut(&civ_id) {
            for (resource, delta) in &resource_deltas {
                civ.add_resource(resource, *delta);
            }
            civ.adjust_stability(stability_delta);
        }
        logs.push(format!("{civ_id}: economy resolved ({} resource changes)", resource_deltas.len()));
    }

    Ok((new_state, logs))
}

fn reachable_own_settlements(state: &GameState, civ_id: &str, capital: crate::hex::HexCoord) -> Vec<crate::hex::HexCoord> {
    struct OwnGrid<'a> {
        state: &'a GameState,
        civ_id: &'a str,
    }
    impl<'a> crate::hex::PassabilityGrid for OwnGrid<'a> {
        fn dims(&self) -> (i32, i32) {
            self.state.dims()
        }
        fn is_sea(&self, coord: crate::hex::HexCoord) -> bool {
            match self.state.hex(coord) {
                Some(h) => h.controlled_by.as_deref() != Some(self.civ_id),
                None => true,
            }
        }
    }
    let grid = OwnGrid { state, civ_id };
    crate::hex::reachable_coords(&grid, capital, u32::MAX)
        .into_iter()
        .filter(|c| state.hex(*c).and_then(|h| h.settlement.as_ref()).is_some())
        .collect()
}

fn parse_resource_conversion(value: &str) -> Option<(String, i64, String, i64)> {
    // encoded as "from:amount->to:amount"
    let (lhs, rhs) = value.split_once("->")?;
    let (from, from_amount) = lhs.split_once(':')?;
    let (to, to_amount) = rhs.split_once(':')?;
    Some((from.to_string(), from_amount.parse().ok()?, to.to_string(), to_amount.parse().ok()?))
}

/// Pull `resource_allocation` orders out of a turn's submitted orders into
/// the per-civ weight map `run` expects.
pub fn collect_allocation_weights(orders: &[Order]) -> FxHashMap<CivId, FxHashMap<String, f64>> {
    let mut map = FxHashMap::default();
    for order in orders {
        if let Order::ResourceAllocation { civ_id, weights } = order {
            map.insert(civ_id.clone(), weights.clone());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex::HexCoord;
    use crate::state::Terrain;
    use crate::theme::{Mechanics, ResourceDef};
    use std::collections::HashMap;

    fn theme_with_grain() -> ThemePackage {
        ThemePackage {
            version: "1".into(),
            civilizations: vec![],
            map: crate::theme::MapConfig {
                cols: 1, rows: 1, zones: vec![], anchors: vec![],
                default_terrain_weights: HashMap::new(), sea_edge: false,
            },
            resources: vec![ResourceDef {
                id: "grain".into(),
                base_yield: 1.0,
                terrain_yields: HashMap::from([("plains".to_string(), 5.0)]),
            }],
            techs: vec![],
            buildings: vec![],
            units: vec![],
            events: vec![],
            diplomacy_options: vec![],
            victory_conditions: vec![],
            defeat_conditions: vec![],
            mechanics: Mechanics {
                tension_axes: HashMap::new(),
                combat_modifiers_by_terrain: HashMap::new(),
                resource_interactions: vec![],
                turn_cycle_length: 0,
                turn_cycle_names: vec![],
                turn_cycle_effects: vec![],
            },
            flavor: HashMap::new(),
        }
    }

    #[test]
    fn terrain_yield_credited_to_controller() {
        let theme = theme_with_grain();
        let state = crate::testing::GameStateBuilder::new(1, 1)
            .with_civilization("a")
            .with_control(HexCoord::new(0, 0), Some("a"))
            .with_terrain(HexCoord::new(0, 0), Terrain::Plains)
            .build();
        let (new_state, _logs) = run(&state, &theme, &FxHashMap::default()).unwrap();
        assert_eq!(new_state.civilizations.get(&"a".to_string()).unwrap().resource("grain"), 5);
    }

    #[test]
    fn uncontrolled_hex_yields_nothing() {
        let theme = theme_with_grain();
        let state = crate::testing::GameStateBuilder::new(1, 1)
            .with_civilization("a")
            .with_terrain(HexCoord::new(0, 0), Terrain::Plains)
            .build();
        let (new_state, _logs) = run(&state, &theme, &FxHashMap::default()).unwrap();
        assert_eq!(new_state.civilizations.get(&"a".to_string()).unwrap().resource("grain"), 0);
    }
}
