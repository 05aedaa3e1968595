//! Phase: CONSTRUCTION. Applies `construction` orders.

use crate::collections::OrderedMap;
use crate::hex::neighbors;
use crate::orders::{Order, OrderRejection};
use crate::state::{CivId, GameState};
use crate::theme::ThemePackage;
use tracing::instrument;

/// A building counts as "religious" when one of its effects routes to the
/// `faith` resource — the schema has no dedicated flag for it.
fn is_religious_building(building: &crate::theme::BuildingDef) -> bool {
    building.effects.iter().any(|(resource_id, _)| resource_id == "faith")
}

fn validate(
    state: &GameState,
    theme: &ThemePackage,
    civ_id: &str,
    settlement_id: &str,
    building_id: &str,
) -> Result<(), OrderRejection> {
    let building = theme.building(building_id).ok_or_else(|| OrderRejection::UnknownBuilding(building_id.to_string()))?;
    let hex = state
        .hexes_row_major()
        .find(|h| h.settlement.as_ref().map(|s| s.id == settlement_id).unwrap_or(false))
        .ok_or_else(|| OrderRejection::UnknownSettlement(settlement_id.to_string()))?;
    if hex.controlled_by.as_deref() != Some(civ_id) {
        return Err(OrderRejection::SettlementNotOwned(settlement_id.to_string(), civ_id.to_string()));
    }
    if let Some(tech) = &building.prereq_tech {
        let has_tech = state
            .civilizations
            .get(&civ_id.to_string())
            .map(|c| c.completed_techs.iter().any(|t| t == tech))
            .unwrap_or(false);
        if !has_tech {
            return Err(OrderRejection::PrereqTechMissing(tech.clone()));
        }
    }
    let settlement = hex.settlement.as_ref().unwrap();
    if settlement.building_count(building_id) as u32 >= building.max_per_settlement {
        return Err(OrderRejection::BuildingCapReached(building_id.to_string()));
    }
    let available = state.civilizations.get(&civ_id.to_string()).map(|c| c.resource("dinars")).unwrap_or(0);
    if available < building.cost {
        return Err(OrderRejection::InsufficientFunds { required: building.cost, available });
    }
    Ok(())
}

#[instrument(skip_all, name = "construction")]
pub fn run(state: &GameState, theme: &ThemePackage, orders_by_civ: &OrderedMap<CivId, Vec<Order>>) -> (GameState, Vec<String>) {
    let mut new_state = state.clone();
    let mut logs = Vec::new();

    for (civ_id, orders) in orders_by_civ.iter() {
        for order in orders {
            let Order::Construction { settlement_id, building_definition_id } = order else { continue };
            match validate(&new_state, theme, civ_id, settlement_id, building_definition_id) {
                Ok(()) => {
                    let building = theme.building(building_definition_id).unwrap();
                    let coord = new_state
                        .hexes_row_major()
                        .find(|h| h.settlement.as_ref().map(|s| &s.id == settlement_id).unwrap_or(false))
                        .map(|h| h.coord)
                        .unwrap();
                    new_state.hex_mut(coord).unwrap().settlement.as_mut().unwrap().buildings.push(building_definition_id.clone());
                    if let Some(civ) = new_state.civilizations.get_mut(civ_id) {
                        civ.add_resource("dinars", -building.cost);
                    }
                    logs.push(format!("{civ_id}: built {building_definition_id} in {settlement_id}"));

                    if is_religious_building(building) {
                        let range = theme.tension_axis_range("religious_fervor");
                        if let Some(civ) = new_state.civilizations.get_mut(civ_id) {
                            civ.adjust_tension("religious_fervor", 3, range);
                        }
                        let owner_religion = theme.civilization(civ_id).and_then(|c| c.religion.clone());
                        let (cols, rows) = new_state.dims();
                        for neighbor_coord in neighbors(coord, cols, rows) {
                            let Some(neighbor_civ) = new_state.hex(neighbor_coord).and_then(|h| h.controlled_by.clone()) else { continue };
                            if &neighbor_civ == civ_id {
                                continue;
                            }
                            let neighbor_religion = theme.civilization(&neighbor_civ).and_then(|c| c.religion.clone());
                            if owner_religion.is_some() && neighbor_religion.is_some() && owner_religion != neighbor_religion {
                                if let Some(n_civ) = new_state.civilizations.get_mut(&neighbor_civ) {
                                    n_civ.adjust_tension("religious_fervor", 5, range);
                                }
                            }
                        }
                    }
                }
                Err(reason) => {
                    log::debug!("skipping construction order for {civ_id}: {reason}");
                }
            }
        }
    }

    (new_state, logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex::HexCoord;
    use crate::state::CivilizationState;
    use crate::theme::*;
    use std::collections::HashMap;

    fn theme_with_granary() -> ThemePackage {
        ThemePackage {
            version: "1".into(),
            civilizations: vec![],
            map: MapConfig { cols: 1, rows: 1, zones: vec![], anchors: vec![], default_terrain_weights: HashMap::new(), sea_edge: false },
            resources: vec![],
            techs: vec![],
            buildings: vec![BuildingDef { id: "granary".into(), cost: 30, upkeep: 0, effects: vec![], prereq_tech: None, max_per_settlement: 1 }],
            units: vec![],
            events: vec![],
            diplomacy_options: vec![],
            victory_conditions: vec![],
            defeat_conditions: vec![],
            mechanics: Mechanics { tension_axes: HashMap::new(), combat_modifiers_by_terrain: HashMap::new(), resource_interactions: vec![], turn_cycle_length: 0, turn_cycle_names: vec![], turn_cycle_effects: vec![] },
            flavor: HashMap::new(),
        }
    }

    #[test]
    fn build_and_deduct_seed_scenario_2() {
        let mut civ = CivilizationState::new("civ-a");
        civ.resources.insert("dinars".into(), 100);
        let state = crate::testing::GameStateBuilder::new(1, 1)
            .with_civilization_state(civ)
            .with_capital(HexCoord::new(0, 0), "civ-a", "home")
            .build();
        let theme = theme_with_granary();
        let mut orders = OrderedMap::new();
        orders.insert("civ-a".to_string(), vec![Order::Construction { settlement_id: "home".into(), building_definition_id: "granary".into() }]);
        let (new_state, logs) = run(&state, &theme, &orders);
        assert_eq!(new_state.civilizations.get(&"civ-a".to_string()).unwrap().resource("dinars"), 70);
        assert_eq!(new_state.map[0][0].settlement.as_ref().unwrap().buildings, vec!["granary".to_string()]);
        assert_eq!(logs.len(), 1);
    }

    #[test]
    fn insufficient_funds_rejected() {
        let mut civ = CivilizationState::new("civ-a");
        civ.resources.insert("dinars".into(), 5);
        let state = crate::testing::GameStateBuilder::new(1, 1)
            .with_civilization_state(civ)
            .with_capital(HexCoord::new(0, 0), "civ-a", "home")
            .build();
        let theme = theme_with_granary();
        let mut orders = OrderedMap::new();
        orders.insert("civ-a".to_string(), vec![Order::Construction { settlement_id: "home".into(), building_definition_id: "granary".into() }]);
        let (new_state, logs) = run(&state, &theme, &orders);
        assert_eq!(new_state.civilizations.get(&"civ-a".to_string()).unwrap().resource("dinars"), 5);
        assert!(logs.is_empty());
    }

    #[test]
    fn religious_building_raises_owner_fervor_and_different_religion_neighbor() {
        let mut civ_a = CivilizationState::new("civ-a");
        civ_a.resources.insert("dinars".into(), 100);
        let civ_b = CivilizationState::new("civ-b");
        let mut theme = theme_with_granary();
        theme.buildings.push(BuildingDef {
            id: "temple".into(), cost: 20, upkeep: 0,
            effects: vec![("faith".to_string(), 2)], prereq_tech: None, max_per_settlement: 1,
        });
        theme.civilizations = vec![
            CivilizationDef { id: "civ-a".into(), color: "#a".into(), religion: Some("sunni".into()), starting_resources: HashMap::new(), starting_techs: vec![], special_abilities: vec![] },
            CivilizationDef { id: "civ-b".into(), color: "#b".into(), religion: Some("christian".into()), starting_resources: HashMap::new(), starting_techs: vec![], special_abilities: vec![] },
        ];
        let state = crate::testing::GameStateBuilder::new(2, 1)
            .with_civilization_state(civ_a)
            .with_civilization_state(civ_b)
            .with_capital(HexCoord::new(0, 0), "civ-a", "home")
            .with_control(HexCoord::new(1, 0), Some("civ-b"))
            .build();
        let mut orders = OrderedMap::new();
        orders.insert("civ-a".to_string(), vec![Order::Construction { settlement_id: "home".into(), building_definition_id: "temple".into() }]);
        let (new_state, _logs) = run(&state, &theme, &orders);
        assert_eq!(new_state.civilizations.get(&"civ-a".to_string()).unwrap().tension("religious_fervor"), 3);
        assert_eq!(new_state.civilizations.get(&"civ-b".to_string()).unwrap().tension("religious_fervor"), 5);
    }
}
