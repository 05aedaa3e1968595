//! One function per governor heuristic. Each takes the shared [`super::Context`]
//! and returns the orders it wants to emit, marking any unit it moves as
//! used so a later heuristic in the same turn doesn't double-book it.

use std::collections::HashSet;

use crate::hex::{self, HexCoord, PassabilityGrid};
use crate::orders::{DiplomaticActionType, DiplomaticPayload, Order};
use crate::state::{CivId, GameState, RelationshipState, Unit, UnitId};
use crate::theme::{TechEffect, ThemePackage};

use super::{Context, Personality};

struct OwnGrid<'a> {
    state: &'a GameState,
}

impl<'a> PassabilityGrid for OwnGrid<'a> {
    fn dims(&self) -> (i32, i32) {
        self.state.dims()
    }
    fn is_sea(&self, coord: HexCoord) -> bool {
        self.state.hex(coord).map(|h| h.is_sea()).unwrap_or(true)
    }
}

fn idle_units(ctx: &Context) -> Vec<(HexCoord, Unit)> {
    ctx.state
        .hexes_row_major()
        .flat_map(|h| h.units_of(ctx.civ_id).map(move |u| (h.coord, u.clone())))
        .filter(|(_, u)| u.moves_remaining > 0 && !ctx.used_units.contains(&u.id))
        .collect()
}

fn path_toward(ctx: &Context, from: HexCoord, to: HexCoord) -> Option<Vec<HexCoord>> {
    let grid = OwnGrid { state: ctx.state };
    let full = hex::path_to(&grid, from, to, u32::MAX)?;
    Some(full)
}

fn truncate_to_moves(path: Vec<HexCoord>, moves: u32) -> Vec<HexCoord> {
    path.into_iter().take(moves as usize).collect()
}

pub fn garrison(ctx: &mut Context) -> Vec<Order> {
    let Some(capital) = ctx.state.capital_hex_of(ctx.civ_id) else { return Vec::new() };
    let occupied = ctx.state.hex(capital).map(|h| h.units_of(ctx.civ_id).next().is_some()).unwrap_or(false);
    if occupied {
        return Vec::new();
    }
    let mut candidates = idle_units(ctx);
    candidates.sort_by_key(|(coord, _)| path_toward(ctx, *coord, capital).map(|p| p.len()).unwrap_or(usize::MAX));
    let Some((coord, unit)) = candidates.into_iter().next() else { return Vec::new() };
    let Some(path) = path_toward(ctx, coord, capital) else { return Vec::new() };
    if path.is_empty() {
        return Vec::new();
    }
    let path = truncate_to_moves(path, unit.moves_remaining);
    if path.is_empty() {
        return Vec::new();
    }
    ctx.used_units.insert(unit.id);
    vec![Order::Move { unit_id: unit.id, path }]
}

fn expand_budget(personality: Personality) -> usize {
    match personality {
        Personality::Military => usize::MAX,
        Personality::Merchant => 2,
        Personality::Diplomatic => 1,
        Personality::Pacifist => 0,
    }
}

fn unclaimed_settlements(state: &GameState) -> Vec<HexCoord> {
    state
        .hexes_row_major()
        .filter(|h| h.settlement.is_some() && h.controlled_by.is_none())
        .map(|h| h.coord)
        .collect()
}

pub fn expand(ctx: &mut Context) -> Vec<Order> {
    let budget = expand_budget(ctx.personality);
    if budget == 0 {
        return Vec::new();
    }
    let targets = unclaimed_settlements(ctx.state);
    if targets.is_empty() {
        return Vec::new();
    }
    let mut orders = Vec::new();
    for (coord, unit) in idle_units(ctx) {
        if orders.len() >= budget {
            break;
        }
        let nearest = targets
            .iter()
            .filter_map(|t| path_toward(ctx, coord, *t).map(|p| (p.len(), *t)))
            .min_by_key(|(len, _)| *len);
        let Some((_, target)) = nearest else { continue };
        let Some(path) = path_toward(ctx, coord, target) else { continue };
        let path = truncate_to_moves(path, unit.moves_remaining);
        if path.is_empty() {
            continue;
        }
        ctx.used_units.insert(unit.id);
        orders.push(Order::Move { unit_id: unit.id, path });
    }
    orders
}

fn at_war(state: &GameState, a: &str, b: &str) -> bool {
    state.civilizations.get(&a.to_string()).map(|c| c.relation_with(b) == RelationshipState::War).unwrap_or(false)
}

pub fn attack(ctx: &mut Context) -> Vec<Order> {
    if ctx.personality == Personality::Pacifist {
        return Vec::new();
    }
    if ctx.personality == Personality::Diplomatic {
        let stability = ctx.state.civilizations.get(ctx.civ_id).map(|c| c.stability).unwrap_or(100);
        if stability > 60 {
            return Vec::new();
        }
    }

    let enemy_hexes: Vec<HexCoord> = ctx
        .state
        .hexes_row_major()
        .filter(|h| h.distinct_civs_present().iter().any(|c| *c != ctx.civ_id.as_str() && at_war(ctx.state, ctx.civ_id, c)))
        .map(|h| h.coord)
        .collect();
    if enemy_hexes.is_empty() {
        return Vec::new();
    }

    let units = idle_units(ctx);

    let closest_enemy_hex = enemy_hexes
        .iter()
        .filter_map(|t| {
            units.iter().filter_map(|(c, _)| path_toward(ctx, *c, *t).map(|p| p.len())).min().map(|len| (len, *t))
        })
        .min_by_key(|(len, _)| *len)
        .map(|(_, t)| t);
    let Some(target) = closest_enemy_hex else { return Vec::new() };

    let mut orders = Vec::new();
    for (coord, unit) in units {
        let Some(path) = path_toward(ctx, coord, target) else { continue };
        let path = truncate_to_moves(path, unit.moves_remaining);
        if path.is_empty() {
            continue;
        }
        ctx.used_units.insert(unit.id);
        orders.push(Order::Move { unit_id: unit.id, path });
    }
    orders
}

pub fn events(ctx: &mut Context) -> Vec<Order> {
    ctx.state
        .active_events
        .iter()
        .filter(|e| !e.resolved && e.target_civilization_ids.iter().any(|c| c == ctx.civ_id) && !e.responses.contains_key(ctx.civ_id))
        .filter_map(|e| {
            let def = ctx.theme.event(&e.definition_id)?;
            Some(Order::EventResponse { event_instance_id: e.instance_id.clone(), choice_id: def.default_choice_id.clone() })
        })
        .collect()
}

fn tech_score(tech: &crate::theme::TechDef, personality: Personality) -> f64 {
    match personality {
        Personality::Military => tech
            .effects
            .iter()
            .map(|e| match e {
                TechEffect::CombatModifier { value } => *value,
                TechEffect::UnlockUnit { .. } => 1.0,
                _ => 0.0,
            })
            .sum(),
        Personality::Merchant => tech
            .effects
            .iter()
            .map(|e| match e {
                TechEffect::ResourceModifier { multiplier, .. } => (*multiplier - 1.0).abs(),
                TechEffect::UnlockBuilding { .. } => 1.0,
                _ => 0.0,
            })
            .sum(),
        Personality::Diplomatic => tech
            .effects
            .iter()
            .map(|e| match e {
                TechEffect::StabilityModifier { value } => value.unsigned_abs() as f64,
                _ => 0.0,
            })
            .sum(),
        Personality::Pacifist => -(tech.cost as f64),
    }
}

pub fn research(ctx: &mut Context) -> Vec<Order> {
    let Some(civ) = ctx.state.civilizations.get(ctx.civ_id) else { return Vec::new() };
    let best = ctx
        .theme
        .techs
        .iter()
        .filter(|t| !civ.completed_techs.iter().any(|c| c == &t.id))
        .max_by(|a, b| tech_score(a, ctx.personality).partial_cmp(&tech_score(b, ctx.personality)).unwrap());
    let Some(tech) = best else { return Vec::new() };
    vec![Order::Research { tech_id: tech.id.clone(), points_allocated: 20 }]
}

fn recruit_threshold(personality: Personality) -> i64 {
    match personality {
        Personality::Military => 5,
        Personality::Diplomatic => 3,
        Personality::Merchant => 3,
        Personality::Pacifist => 1,
    }
}

pub fn recruit(ctx: &mut Context) -> Vec<Order> {
    let unit_count = ctx.state.hexes_row_major().flat_map(|h| h.units_of(ctx.civ_id)).count() as i64;
    let threshold = recruit_threshold(ctx.personality);
    if ctx.personality == Personality::Pacifist {
        let threatened = ctx
            .state
            .hexes_row_major()
            .any(|h| h.distinct_civs_present().iter().any(|c| *c != ctx.civ_id.as_str() && at_war(ctx.state, ctx.civ_id, c)));
        if !threatened {
            return Vec::new();
        }
    }
    if unit_count >= threshold {
        return Vec::new();
    }

    let Some(civ) = ctx.state.civilizations.get(ctx.civ_id) else { return Vec::new() };
    let dinars = civ.resource("dinars");
    let mut eligible: Vec<&crate::theme::UnitDef> = ctx
        .theme
        .units
        .iter()
        .filter(|u| u.prereq_tech.as_ref().map(|t| civ.completed_techs.iter().any(|c| c == t)).unwrap_or(true))
        .filter(|u| u.cost <= dinars)
        .collect();
    eligible.sort_by_key(|u| u.cost);
    let Some(unit_def) = eligible.into_iter().next() else { return Vec::new() };

    let settlement_id = ctx
        .state
        .capital_hex_of(ctx.civ_id)
        .and_then(|c| ctx.state.hex(c))
        .and_then(|h| h.settlement.as_ref())
        .map(|s| s.id.clone())
        .or_else(|| {
            ctx.state
                .hexes_row_major()
                .find(|h| h.controlled_by.as_deref() == Some(ctx.civ_id.as_str()) && h.settlement.is_some())
                .and_then(|h| h.settlement.as_ref())
                .map(|s| s.id.clone())
        });
    let Some(settlement_id) = settlement_id else { return Vec::new() };

    vec![Order::Recruit { settlement_id, unit_definition_id: unit_def.id.clone() }]
}

fn total_strength(state: &GameState, civ_id: &str) -> i64 {
    state.hexes_row_major().flat_map(|h| h.units_of(civ_id)).map(|u| u.strength).sum()
}

pub fn diplomacy(ctx: &mut Context) -> Vec<Order> {
    let Some(civ) = ctx.state.civilizations.get(ctx.civ_id) else { return Vec::new() };
    let at_war_with_any = civ.diplomatic_relations.values().any(|r| *r == RelationshipState::War);

    if civ.stability < 40 && at_war_with_any {
        if let Some((target, _)) = civ.diplomatic_relations.iter().find(|(_, r)| **r == RelationshipState::War) {
            return vec![Order::Diplomatic {
                action_type: DiplomaticActionType::ProposePeace,
                target_civ_id: target.clone(),
                payload: DiplomaticPayload::default(),
            }];
        }
    }

    if ctx.personality == Personality::Military {
        let own_strength = total_strength(ctx.state, ctx.civ_id);
        let own_units = ctx.state.hexes_row_major().flat_map(|h| h.units_of(ctx.civ_id)).count();
        if own_units >= 3 {
            let weaker_peer = ctx
                .state
                .civilizations
                .keys()
                .filter(|id| id.as_str() != ctx.civ_id.as_str())
                .find(|id| {
                    civ.relation_with(id) == RelationshipState::Peace && total_strength(ctx.state, id) < own_strength
                });
            if let Some(target) = weaker_peer {
                return vec![Order::Diplomatic {
                    action_type: DiplomaticActionType::DeclareWar,
                    target_civ_id: target.clone(),
                    payload: DiplomaticPayload::default(),
                }];
            }
        }
    }

    Vec::new()
}

fn build_preferences(personality: Personality) -> &'static [&'static str] {
    match personality {
        Personality::Military => &["barracks", "stables", "granary", "market"],
        Personality::Merchant => &["market", "port", "granary", "library"],
        Personality::Diplomatic => &["library", "embassy", "mosque", "granary"],
        Personality::Pacifist => &["library", "granary", "market", "mosque"],
    }
}

pub fn build(ctx: &mut Context) -> Vec<Order> {
    let Some(civ) = ctx.state.civilizations.get(ctx.civ_id) else { return Vec::new() };
    let dinars = civ.resource("dinars");
    for building_id in build_preferences(ctx.personality) {
        let Some(building) = ctx.theme.building(building_id) else { continue };
        if building.cost > dinars {
            continue;
        }
        if let Some(tech) = &building.prereq_tech {
            if !civ.completed_techs.iter().any(|c| c == tech) {
                continue;
            }
        }
        let settlement = ctx.state.hexes_row_major().find(|h| {
            h.controlled_by.as_deref() == Some(ctx.civ_id.as_str())
                && h.settlement.as_ref().map(|s| s.building_count(building_id) < building.max_per_settlement as usize).unwrap_or(false)
        });
        if let Some(hex) = settlement {
            let settlement_id = hex.settlement.as_ref().unwrap().id.clone();
            return vec![Order::Construction { settlement_id, building_definition_id: building_id.to_string() }];
        }
    }
    Vec::new()
}

fn surplus_deficit_factor(personality: Personality) -> (f64, f64) {
    match personality {
        Personality::Merchant => (1.2, 0.7),
        _ => (1.5, 0.5),
    }
}

pub fn trade(ctx: &mut Context) -> Vec<Order> {
    if ctx.personality == Personality::Military {
        return Vec::new();
    }
    let Some(civ) = ctx.state.civilizations.get(ctx.civ_id) else { return Vec::new() };
    if ctx.theme.resources.is_empty() {
        return Vec::new();
    }
    let amounts: Vec<(String, i64)> = ctx.theme.resources.iter().map(|r| (r.id.clone(), civ.resource(&r.id))).collect();
    let mean = amounts.iter().map(|(_, a)| *a as f64).sum::<f64>() / amounts.len() as f64;
    let (surplus_factor, deficit_factor) = surplus_deficit_factor(ctx.personality);

    let Some((surplus_id, surplus_amount)) = amounts.iter().find(|(_, a)| (*a as f64) > mean * surplus_factor) else { return Vec::new() };
    let Some((deficit_id, _)) = amounts.iter().find(|(_, a)| (*a as f64) < mean * deficit_factor) else { return Vec::new() };

    let peer = ctx
        .state
        .civilizations
        .keys()
        .filter(|id| id.as_str() != ctx.civ_id.as_str())
        .find(|id| civ.relation_with(id) != RelationshipState::War);
    let Some(peer) = peer else { return Vec::new() };

    let amount = (*surplus_amount).min(10);
    if amount <= 0 {
        return Vec::new();
    }
    let mut offers = rustc_hash::FxHashMap::default();
    offers.insert(surplus_id.clone(), amount);
    let mut wants = rustc_hash::FxHashMap::default();
    wants.insert(deficit_id.clone(), amount);

    vec![Order::Diplomatic {
        action_type: DiplomaticActionType::OfferTrade,
        target_civ_id: peer.clone(),
        payload: DiplomaticPayload { message: None, offers, wants },
    }]
}

/// Every Muwardi unit BFS-steps toward the nearest settlement it doesn't
/// already control.
pub fn muwardi_orders(state: &GameState, civ_id: &CivId) -> Vec<Order> {
    let grid = OwnGrid { state };
    let targets: Vec<HexCoord> = state
        .hexes_row_major()
        .filter(|h| h.settlement.is_some() && h.controlled_by.as_deref() != Some(civ_id.as_str()))
        .map(|h| h.coord)
        .collect();
    if targets.is_empty() {
        return Vec::new();
    }

    let mut orders = Vec::new();
    let mut used: HashSet<UnitId> = HashSet::new();
    for hex in state.hexes_row_major() {
        for unit in hex.units_of(civ_id) {
            if unit.moves_remaining == 0 || used.contains(&unit.id) {
                continue;
            }
            let nearest = targets
                .iter()
                .filter_map(|t| hex::path_to(&grid, hex.coord, *t, u32::MAX).map(|p| (p.len(), *t)))
                .min_by_key(|(len, _)| *len);
            let Some((_, target)) = nearest else { continue };
            let Some(path) = hex::path_to(&grid, hex.coord, target, u32::MAX) else { continue };
            let path = truncate_to_moves(path, unit.moves_remaining);
            if path.is_empty() {
                continue;
            }
            used.insert(unit.id);
            orders.push(Order::Move { unit_id: unit.id, path });
        }
    }
    orders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex::HexCoord;
    use crate::state::{CivilizationState, Unit};
    use crate::theme::*;
    use std::collections::HashMap;

    fn bare_theme() -> ThemePackage {
        ThemePackage {
            version: "1".into(), civilizations: vec![],
            map: MapConfig { cols: 3, rows: 1, zones: vec![], anchors: vec![], default_terrain_weights: HashMap::new(), sea_edge: false },
            resources: vec![], techs: vec![], buildings: vec![], units: vec![], events: vec![], diplomacy_options: vec![],
            victory_conditions: vec![], defeat_conditions: vec![],
            mechanics: Mechanics { tension_axes: HashMap::new(), combat_modifiers_by_terrain: HashMap::new(), resource_interactions: vec![], turn_cycle_length: 0, turn_cycle_names: vec![], turn_cycle_effects: vec![] },
            flavor: HashMap::new(),
        }
    }

    #[test]
    fn garrison_moves_nearest_idle_unit_to_empty_capital() {
        let civ = CivilizationState::new("a");
        let mut state = crate::testing::GameStateBuilder::new(3, 1)
            .with_civilization_state(civ)
            .with_capital(HexCoord::new(1, 0), "a", "home")
            .build();
        state.map[0][0].units.push(Unit { id: 1, definition_id: "spear".into(), civilization_id: "a".into(), strength: 10, morale: 5, moves_remaining: 2, is_garrisoned: false });
        let theme = bare_theme();
        let mut ctx = Context { state: &state, civ_id: &"a".to_string(), theme: &theme, personality: Personality::Military, used_units: HashSet::new() };
        let orders = garrison(&mut ctx);
        assert_eq!(orders.len(), 1);
        match &orders[0] {
            Order::Move { unit_id, path } => {
                assert_eq!(*unit_id, 1);
                assert_eq!(path, &vec![HexCoord::new(1, 0)]);
            }
            _ => panic!("expected move order"),
        }
    }

    #[test]
    fn pacifist_expand_budget_is_zero() {
        let civ = CivilizationState::new("a");
        let state = crate::testing::GameStateBuilder::new(3, 1).with_civilization_state(civ).build();
        let theme = bare_theme();
        let mut ctx = Context { state: &state, civ_id: &"a".to_string(), theme: &theme, personality: Personality::Pacifist, used_units: HashSet::new() };
        assert!(expand(&mut ctx).is_empty());
    }
}
