//! Phase: RECRUITMENT. Applies `recruit` orders, one per settlement per
//! turn.

use std::collections::HashSet;

use crate::collections::OrderedMap;
use crate::hex::HexCoord;
use crate::orders::{Order, OrderRejection};
use crate::state::{CivId, GameState, Unit};
use crate::theme::ThemePackage;
use tracing::instrument;

fn validate(
    state: &GameState,
    theme: &ThemePackage,
    civ_id: &str,
    settlement_id: &str,
    unit_def_id: &str,
    already_recruited: &HashSet<String>,
) -> Result<HexCoord, OrderRejection> {
    if already_recruited.contains(settlement_id) {
        return Err(OrderRejection::AlreadyRecruitedThisTurn(settlement_id.to_string()));
    }
    let def = theme.unit(unit_def_id).ok_or_else(|| OrderRejection::UnknownUnitDefinition(unit_def_id.to_string()))?;
    let hex = state
        .hexes_row_major()
        .find(|h| h.settlement.as_ref().map(|s| s.id == settlement_id).unwrap_or(false))
        .ok_or_else(|| OrderRejection::UnknownSettlement(settlement_id.to_string()))?;
    if hex.controlled_by.as_deref() != Some(civ_id) {
        return Err(OrderRejection::SettlementNotOwned(settlement_id.to_string(), civ_id.to_string()));
    }
    if let Some(tech) = &def.prereq_tech {
        let has_tech = state
            .civilizations
            .get(&civ_id.to_string())
            .map(|c| c.completed_techs.iter().any(|t| t == tech))
            .unwrap_or(false);
        if !has_tech {
            return Err(OrderRejection::PrereqTechMissing(tech.clone()));
        }
    }
    let available = state.civilizations.get(&civ_id.to_string()).map(|c| c.resource("dinars")).unwrap_or(0);
    if available < def.cost {
        return Err(OrderRejection::InsufficientFunds { required: def.cost, available });
    }
    Ok(hex.coord)
}

#[instrument(skip_all, name = "recruitment")]
pub fn run(state: &GameState, theme: &ThemePackage, orders_by_civ: &OrderedMap<CivId, Vec<Order>>) -> (GameState, Vec<String>) {
    let mut new_state = state.clone();
    let mut logs = Vec::new();
    let mut already_recruited: HashSet<String> = HashSet::new();

    for (civ_id, orders) in orders_by_civ.iter() {
        for order in orders {
            let Order::Recruit { settlement_id, unit_definition_id } = order else { continue };
            match validate(&new_state, theme, civ_id, settlement_id, unit_definition_id, &already_recruited) {
                Ok(coord) => {
                    let def = theme.unit(unit_definition_id).unwrap();
                    let new_id = new_state.next_unit_id();
                    new_state.hex_mut(coord).unwrap().units.push(Unit {
                        id: new_id,
                        definition_id: unit_definition_id.clone(),
                        civilization_id: civ_id.clone(),
                        strength: def.strength,
                        morale: def.morale,
                        moves_remaining: def.moves,
                        is_garrisoned: true,
                    });
                    if let Some(civ) = new_state.civilizations.get_mut(civ_id) {
                        civ.add_resource("dinars", -def.cost);
                    }
                    already_recruited.insert(settlement_id.clone());
                    logs.push(format!("{civ_id}: recruited {unit_definition_id} at {settlement_id}"));
                }
                Err(reason) => {
                    log::debug!("skipping recruit order for {civ_id}: {reason}");
                }
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

    fn theme_with_spear() -> ThemePackage {
        ThemePackage {
            version: "1".into(),
            civilizations: vec![],
            map: MapConfig { cols: 1, rows: 1, zones: vec![], anchors: vec![], default_terrain_weights: HashMap::new(), sea_edge: false },
            resources: vec![],
            techs: vec![],
            buildings: vec![],
            units: vec![UnitDef { id: "spear".into(), display_name: "Spearman".into(), strength: 10, morale: 5, moves: 2, cost: 15, upkeep: 1, prereq_tech: None }],
            events: vec![],
            diplomacy_options: vec![],
            victory_conditions: vec![],
            defeat_conditions: vec![],
            mechanics: Mechanics { tension_axes: HashMap::new(), combat_modifiers_by_terrain: HashMap::new(), resource_interactions: vec![], turn_cycle_length: 0, turn_cycle_names: vec![], turn_cycle_effects: vec![] },
            flavor: HashMap::new(),
        }
    }

    #[test]
    fn recruit_spawns_garrisoned_unit_and_deducts_cost() {
        let mut civ = CivilizationState::new("civ-a");
        civ.resources.insert("dinars".into(), 50);
        let state = crate::testing::GameStateBuilder::new(1, 1)
            .with_civilization_state(civ)
            .with_capital(HexCoord::new(0, 0), "civ-a", "home")
            .build();
        let theme = theme_with_spear();
        let mut orders = OrderedMap::new();
        orders.insert("civ-a".to_string(), vec![Order::Recruit { settlement_id: "home".into(), unit_definition_id: "spear".into() }]);
        let (new_state, logs) = run(&state, &theme, &orders);
        assert_eq!(new_state.civilizations.get(&"civ-a".to_string()).unwrap().resource("dinars"), 35);
        assert_eq!(new_state.map[0][0].units.len(), 1);
        assert!(new_state.map[0][0].units[0].is_garrisoned);
        assert_eq!(logs.len(), 1);
    }

    #[test]
    fn second_recruit_at_same_settlement_same_turn_rejected() {
        let mut civ = CivilizationState::new("civ-a");
        civ.resources.insert("dinars".into(), 100);
        let state = crate::testing::GameStateBuilder::new(1, 1)
            .with_civilization_state(civ)
            .with_capital(HexCoord::new(0, 0), "civ-a", "home")
            .build();
        let theme = theme_with_spear();
        let mut orders = OrderedMap::new();
        orders.insert(
            "civ-a".to_string(),
            vec![
                Order::Recruit { settlement_id: "home".into(), unit_definition_id: "spear".into() },
                Order::Recruit { settlement_id: "home".into(), unit_definition_id: "spear".into() },
            ],
        );
        let (new_state, logs) = run(&state, &theme, &orders);
        assert_eq!(new_state.map[0][0].units.len(), 1);
        assert_eq!(logs.len(), 1);
    }
}
