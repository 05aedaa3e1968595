//! Phase: DIPLOMACY. Relation transitions, war cascades, mutual-proposal
//! matching, and trade settlement. Never throws — unknown target civ ids
//! and non-diplomatic orders are silently ignored.

use rustc_hash::FxHashMap;

use crate::orders::{DiplomaticActionType, DiplomaticPayload, Order};
use crate::state::{CivId, GameState, RelationshipState};
use crate::theme::ThemePackage;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct DiplomaticMessage {
    pub from: CivId,
    pub to: CivId,
    pub text: String,
}

struct DiploOrder<'a> {
    civ_id: CivId,
    action_type: DiplomaticActionType,
    target: CivId,
    payload: &'a DiplomaticPayload,
}

fn tech_unlocks_action(theme: &ThemePackage, completed_techs: &[String], action: DiplomaticActionType) -> bool {
    let gated = theme.techs.iter().any(|t| {
        t.effects.iter().any(|e| {
            matches!(e, crate::theme::TechEffect::Custom { key, value }
                if key == "unlock_diplomacy_action" && action_name(action) == value)
        })
    });
    if !gated {
        return true;
    }
    completed_techs.iter().any(|tid| {
        theme.tech(tid).map(|t| {
            t.effects.iter().any(|e| {
                matches!(e, crate::theme::TechEffect::Custom { key, value }
                    if key == "unlock_diplomacy_action" && action_name(action) == value)
            })
        }).unwrap_or(false)
    })
}

fn action_name(action: DiplomaticActionType) -> &'static str {
    match action {
        DiplomaticActionType::DeclareWar => "declare_war",
        DiplomaticActionType::ProposePeace => "propose_peace",
        DiplomaticActionType::ProposeAlliance => "propose_alliance",
        DiplomaticActionType::BreakAlliance => "break_alliance",
        DiplomaticActionType::ProposeTruce => "propose_truce",
        DiplomaticActionType::ProposeVassalage => "propose_vassalage",
        DiplomaticActionType::SendMessage => "send_message",
        DiplomaticActionType::OfferTrade => "offer_trade",
    }
}

fn set_relation(state: &mut GameState, a: &str, b: &str, relation: RelationshipState) {
    if let Some(civ) = state.civilizations.get_mut(&a.to_string()) {
        civ.diplomatic_relations.insert(b.to_string(), relation);
    }
    if let Some(civ) = state.civilizations.get_mut(&b.to_string()) {
        civ.diplomatic_relations.insert(a.to_string(), relation);
    }
}

fn religion_of(theme: &ThemePackage, civ_id: &str) -> Option<String> {
    theme.civilization(civ_id).and_then(|c| c.religion.clone())
}

fn adjust_fervor_both(state: &mut GameState, theme: &ThemePackage, a: &str, b: &str, delta: i64) {
    let range = theme.tension_axis_range("religious_fervor");
    if let Some(civ) = state.civilizations.get_mut(&a.to_string()) {
        civ.adjust_tension("religious_fervor", delta, range);
    }
    if let Some(civ) = state.civilizations.get_mut(&b.to_string()) {
        civ.adjust_tension("religious_fervor", delta, range);
    }
}

#[instrument(skip_all, name = "diplomacy")]
pub fn run(
    state: &GameState,
    orders: &[(CivId, Order)],
    theme: &ThemePackage,
) -> (GameState, Vec<DiplomaticMessage>, Vec<String>) {
    let mut new_state = state.clone();
    let mut messages = Vec::new();
    let mut logs = Vec::new();

    let diplo_orders: Vec<DiploOrder> = orders
        .iter()
        .filter_map(|(civ_id, order)| match order {
            Order::Diplomatic { action_type, target_civ_id, payload } => Some(DiploOrder {
                civ_id: civ_id.clone(),
                action_type: *action_type,
                target: target_civ_id.clone(),
                payload,
            }),
            _ => None,
        })
        .collect();

    let tech_gated: Vec<&DiploOrder> = diplo_orders
        .iter()
        .filter(|o| {
            let completed = new_state
                .civilizations
                .get(&o.civ_id)
                .map(|c| c.completed_techs.clone())
                .unwrap_or_default();
            tech_unlocks_action(theme, &completed, o.action_type)
        })
        .collect();

    // Step 3: immediate actions, in collection order.
    for order in &tech_gated {
        if !new_state.civilizations.contains_key(&order.target) && order.action_type != DiplomaticActionType::SendMessage {
            logs.push(format!("{}: unknown target civ {} ignored", order.civ_id, order.target));
            continue;
        }
        match order.action_type {
            DiplomaticActionType::DeclareWar => {
                set_relation(&mut new_state, &order.civ_id, &order.target, RelationshipState::War);
                if let Some(civ) = new_state.civilizations.get_mut(&order.civ_id) {
                    civ.adjust_stability(-10);
                }
                // war cascade: every ally of the target also goes to war with the issuer.
                let allies: Vec<CivId> = new_state
                    .civilizations
                    .get(&order.target)
                    .map(|c| {
                        c.diplomatic_relations
                            .iter()
                            .filter(|(_, rel)| **rel == RelationshipState::Alliance)
                            .map(|(id, _)| id.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                for ally in allies {
                    set_relation(&mut new_state, &order.civ_id, &ally, RelationshipState::War);
                    logs.push(format!("war cascade: {} drawn into war with {}", ally, order.civ_id));
                }
                let issuer_religion = religion_of(theme, &order.civ_id);
                let target_religion = religion_of(theme, &order.target);
                if issuer_religion.is_some() && target_religion.is_some() && issuer_religion != target_religion {
                    adjust_fervor_both(&mut new_state, theme, &order.civ_id, &order.target, 10);
                }
            }
            DiplomaticActionType::BreakAlliance => {
                set_relation(&mut new_state, &order.civ_id, &order.target, RelationshipState::Peace);
                if let Some(civ) = new_state.civilizations.get_mut(&order.civ_id) {
                    civ.adjust_stability(-5);
                }
            }
            DiplomaticActionType::ProposeVassalage => {
                set_relation(&mut new_state, &order.civ_id, &order.target, RelationshipState::Vassal);
            }
            DiplomaticActionType::SendMessage => {
                if let Some(text) = &order.payload.message {
                    if !text.is_empty() {
                        messages.push(DiplomaticMessage {
                            from: order.civ_id.clone(),
                            to: order.target.clone(),
                            text: text.clone(),
                        });
                    }
                }
            }
            DiplomaticActionType::OfferTrade => {} // deferred to trade matching
            DiplomaticActionType::ProposePeace
            | DiplomaticActionType::ProposeAlliance
            | DiplomaticActionType::ProposeTruce => {} // deferred to mutual matching
        }
    }

    // Step 4: mutual proposal matching.
    for (action, relation) in [
        (DiplomaticActionType::ProposePeace, RelationshipState::Peace),
        (DiplomaticActionType::ProposeAlliance, RelationshipState::Alliance),
        (DiplomaticActionType::ProposeTruce, RelationshipState::Truce),
    ] {
        let proposals: Vec<(CivId, CivId)> = tech_gated
            .iter()
            .filter(|o| o.action_type == action)
            .map(|o| (o.civ_id.clone(), o.target.clone()))
            .collect();
        let mut fervor_adjusted: Vec<(CivId, CivId)> = Vec::new();
        for (a, b) in &proposals {
            if proposals.iter().any(|(x, y)| x == b && y == a) {
                set_relation(&mut new_state, a, b, relation);
                let already_adjusted = fervor_adjusted.iter().any(|(x, y)| (x == a && y == b) || (x == b && y == a));
                if relation == RelationshipState::Alliance && !already_adjusted {
                    let a_religion = religion_of(theme, a);
                    let b_religion = religion_of(theme, b);
                    if a_religion.is_some() && a_religion == b_religion {
                        adjust_fervor_both(&mut new_state, theme, a, b, -5);
                    }
                    fervor_adjusted.push((a.clone(), b.clone()));
                }
            }
        }
    }

    // Step 5: trade matching.
    let trade_offers: Vec<&DiploOrder> = tech_gated
        .iter()
        .filter(|o| o.action_type == DiplomaticActionType::OfferTrade)
        .copied()
        .collect();
    let mut matched: Vec<usize> = Vec::new();
    for (i, a) in trade_offers.iter().enumerate() {
        if matched.contains(&i) {
            continue;
        }
        for (j, b) in trade_offers.iter().enumerate() {
            if i == j || matched.contains(&j) {
                continue;
            }
            if a.civ_id != b.target || b.civ_id != a.target {
                continue;
            }
            if trades_match(a.payload, b.payload) && can_afford(&new_state, &a.civ_id, &a.payload.offers)
                && can_afford(&new_state, &b.civ_id, &b.payload.offers)
            {
                execute_trade(&mut new_state, &a.civ_id, &b.civ_id, &a.payload.offers);
                execute_trade(&mut new_state, &b.civ_id, &a.civ_id, &b.payload.offers);
                matched.push(i);
                matched.push(j);
                logs.push(format!("trade executed between {} and {}", a.civ_id, b.civ_id));
                break;
            }
        }
    }

    (new_state, messages, logs)
}

/// `(A offers X wants Y, B offers Y' wants X')` match iff `Y' >= Y`
/// component-wise and `X >= X'` component-wise.
fn trades_match(a: &DiplomaticPayload, b: &DiplomaticPayload) -> bool {
    a.wants.iter().all(|(res, amount)| b.offers.get(res).copied().unwrap_or(0) >= *amount)
        && b.wants.iter().all(|(res, amount)| a.offers.get(res).copied().unwrap_or(0) >= *amount)
}

fn can_afford(state: &GameState, civ_id: &str, offers: &FxHashMap<String, i64>) -> bool {
    state
        .civilizations
        .get(&civ_id.to_string())
        .map(|civ| offers.iter().all(|(r, amount)| civ.resource(r) >= *amount))
        .unwrap_or(false)
}

fn execute_trade(state: &mut GameState, from: &str, to: &str, offers: &FxHashMap<String, i64>) {
    if let Some(civ) = state.civilizations.get_mut(&from.to_string()) {
        for (resource, amount) in offers {
            civ.add_resource(resource, -amount);
        }
    }
    if let Some(civ) = state.civilizations.get_mut(&to.to_string()) {
        for (resource, amount) in offers {
            civ.add_resource(resource, *amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::*;
    use std::collections::HashMap;

    fn bare_theme() -> ThemePackage {
        ThemePackage {
            version: "1".into(),
            civilizations: vec![],
            map: MapConfig { cols: 1, rows: 1, zones: vec![], anchors: vec![], default_terrain_weights: HashMap::new(), sea_edge: false },
            resources: vec![],
            techs: vec![],
            buildings: vec![],
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
    fn declare_war_cascades_to_ally() {
        let mut state = crate::testing::GameStateBuilder::default()
            .with_civilization("a")
            .with_civilization("b")
            .with_civilization("c")
            .build();
        set_relation(&mut state, "b", "c", RelationshipState::Alliance);
        let orders = vec![(
            "a".to_string(),
            Order::Diplomatic {
                action_type: DiplomaticActionType::DeclareWar,
                target_civ_id: "b".to_string(),
                payload: Default::default(),
            },
        )];
        let (new_state, _msgs, _logs) = run(&state, &orders, &bare_theme());
        assert_eq!(new_state.civilizations.get(&"a".to_string()).unwrap().relation_with("b"), RelationshipState::War);
        assert_eq!(new_state.civilizations.get(&"a".to_string()).unwrap().relation_with("c"), RelationshipState::War);
        assert_eq!(new_state.civilizations.get(&"c".to_string()).unwrap().relation_with("a"), RelationshipState::War);
    }

    #[test]
    fn mutual_peace_proposal_overrides_war() {
        let mut state = crate::testing::GameStateBuilder::default()
            .with_civilization("a")
            .with_civilization("b")
            .build();
        set_relation(&mut state, "a", "b", RelationshipState::War);
        let orders = vec![
            ("a".to_string(), Order::Diplomatic { action_type: DiplomaticActionType::ProposePeace, target_civ_id: "b".to_string(), payload: Default::default() }),
            ("b".to_string(), Order::Diplomatic { action_type: DiplomaticActionType::ProposePeace, target_civ_id: "a".to_string(), payload: Default::default() }),
        ];
        let (new_state, _msgs, _logs) = run(&state, &orders, &bare_theme());
        assert_eq!(new_state.civilizations.get(&"a".to_string()).unwrap().relation_with("b"), RelationshipState::Peace);
    }

    #[test]
    fn one_sided_peace_proposal_has_no_effect() {
        let mut state = crate::testing::GameStateBuilder::default()
            .with_civilization("a")
            .with_civilization("b")
            .build();
        set_relation(&mut state, "a", "b", RelationshipState::War);
        let orders = vec![(
            "a".to_string(),
            Order::Diplomatic { action_type: DiplomaticActionType::ProposePeace, target_civ_id: "b".to_string(), payload: Default::default() },
        )];
        let (new_state, _msgs, _logs) = run(&state, &orders, &bare_theme());
        assert_eq!(new_state.civilizations.get(&"a".to_string()).unwrap().relation_with("b"), RelationshipState::War);
    }

    #[test]
    fn unknown_target_civ_is_ignored_not_fatal() {
        let state = crate::testing::GameStateBuilder::default().with_civilization("a").build();
        let orders = vec![(
            "a".to_string(),
            Order::Diplomatic { action_type: DiplomaticActionType::DeclareWar, target_civ_id: "ghost".to_string(), payload: Default::default() },
        )];
        let (_new_state, _msgs, logs) = run(&state, &orders, &bare_theme());
        assert_eq!(logs.len(), 1);
    }

    fn theme_with_religions() -> ThemePackage {
        let mut theme = bare_theme();
        theme.civilizations = vec![
            CivilizationDef { id: "a".into(), color: "#a".into(), religion: Some("sunni".into()), starting_resources: HashMap::new(), starting_techs: vec![], special_abilities: vec![] },
            CivilizationDef { id: "b".into(), color: "#b".into(), religion: Some("christian".into()), starting_resources: HashMap::new(), starting_techs: vec![], special_abilities: vec![] },
            CivilizationDef { id: "c".into(), color: "#c".into(), religion: Some("sunni".into()), starting_resources: HashMap::new(), starting_techs: vec![], special_abilities: vec![] },
        ];
        theme.mechanics.tension_axes.insert("religious_fervor".to_string(), TensionAxisRange { min: -100, max: 100 });
        theme
    }

    #[test]
    fn cross_religion_war_raises_fervor_on_both_sides() {
        let state = crate::testing::GameStateBuilder::default().with_civilization("a").with_civilization("b").build();
        let orders = vec![(
            "a".to_string(),
            Order::Diplomatic { action_type: DiplomaticActionType::DeclareWar, target_civ_id: "b".to_string(), payload: Default::default() },
        )];
        let (new_state, _msgs, _logs) = run(&state, &orders, &theme_with_religions());
        assert_eq!(new_state.civilizations.get(&"a".to_string()).unwrap().tension("religious_fervor"), 10);
        assert_eq!(new_state.civilizations.get(&"b".to_string()).unwrap().tension("religious_fervor"), 10);
    }

    #[test]
    fn same_religion_mutual_alliance_lowers_fervor_once_each() {
        let state = crate::testing::GameStateBuilder::default().with_civilization("a").with_civilization("c").build();
        let orders = vec![
            ("a".to_string(), Order::Diplomatic { action_type: DiplomaticActionType::ProposeAlliance, target_civ_id: "c".to_string(), payload: Default::default() }),
            ("c".to_string(), Order::Diplomatic { action_type: DiplomaticActionType::ProposeAlliance, target_civ_id: "a".to_string(), payload: Default::default() }),
        ];
        let (new_state, _msgs, _logs) = run(&state, &orders, &theme_with_religions());
        assert_eq!(new_state.civilizations.get(&"a".to_string()).unwrap().tension("religious_fervor"), -5);
        assert_eq!(new_state.civilizations.get(&"c".to_string()).unwrap().tension("religious_fervor"), -5);
    }
}
