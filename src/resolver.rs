//! The turn resolver: the single pure function `resolve_turn` that takes a
//! state and a batch of submitted orders and produces the next state, plus
//! the narrative summary for that turn. Every phase below runs in the fixed
//! order the data model's ordering guarantees require; nothing here forks
//! or threads concurrently within a turn.

use std::collections::HashSet;
use std::time::Instant;

use rustc_hash::FxHashMap;
use tracing::instrument;

use crate::ai;
use crate::collections::OrderedMap;
use crate::metrics::SimMetrics;
use crate::orders::{Order, PlayerOrders};
use crate::prng::Prng;
use crate::state::{
    CivId, CivTurnSummary, CombatResultSummary, GamePhase, GameState, TurnSummary,
};
use crate::systems::{
    attrition, combat, construction, diplomacy, economy, events, healing, movement, muwardi,
    recruitment, research, victory,
};
use crate::theme::ThemePackage;

/// Reset every unit's `moves_remaining` to its definition's base `moves`,
/// the first step of every turn.
fn reset_moves(state: &mut GameState, theme: &ThemePackage) {
    for row in state.map.iter_mut() {
        for hex in row.iter_mut() {
            for unit in hex.units.iter_mut() {
                if let Some(def) = theme.unit(&unit.definition_id) {
                    unit.moves_remaining = def.moves;
                }
            }
        }
    }
}

struct TurnSnapshot {
    resources: FxHashMap<CivId, FxHashMap<String, i64>>,
    completed_techs: FxHashMap<CivId, Vec<String>>,
}

fn snapshot(state: &GameState) -> TurnSnapshot {
    let mut resources = FxHashMap::default();
    let mut completed_techs = FxHashMap::default();
    for (civ_id, civ) in state.civilizations.iter() {
        resources.insert(civ_id.clone(), civ.resources.clone());
        completed_techs.insert(civ_id.clone(), civ.completed_techs.clone());
    }
    TurnSnapshot { resources, completed_techs }
}

/// Fill in a `PlayerOrders` for every non-eliminated civ that didn't submit
/// one this turn, using the AI governor. Per the resolver's forking
/// discipline this whole step draws from one fork of the main stream, and
/// each civ it fills for gets its own fork derived from that. Also maintains
/// each civ's `turns_missing_orders` streak, independent of whether the AI
/// governor is even enabled to fill the gap.
fn fill_missing_orders(
    state: &mut GameState,
    theme: &ThemePackage,
    submitted: &mut Vec<PlayerOrders>,
    main_prng: &mut Prng,
    timestamp: i64,
) {
    let originally_submitted: HashSet<CivId> =
        submitted.iter().map(|o| o.civilization_id.clone()).collect();
    let civ_ids: Vec<CivId> = state.civilizations.keys().cloned().collect();

    for civ_id in &civ_ids {
        let Some(civ) = state.civilizations.get_mut(civ_id) else { continue };
        if civ.is_eliminated {
            continue;
        }
        if originally_submitted.contains(civ_id) {
            civ.turns_missing_orders = 0;
        } else {
            civ.turns_missing_orders += 1;
        }
    }

    if !state.config.allow_ai_governor {
        return;
    }
    let mut ai_fill_fork = main_prng.fork();
    for civ_id in &civ_ids {
        let Some(civ) = state.civilizations.get(civ_id) else { continue };
        if civ.is_eliminated || originally_submitted.contains(civ_id) {
            continue;
        }
        let mut civ_fork = ai_fill_fork.fork();
        ai_fill_fork.next();
        submitted.push(ai::generate_orders(state, civ_id, theme, &mut civ_fork, timestamp));
    }
}

/// Group submitted orders by civilization, in `civilizations`' own insertion
/// order, the iteration order every downstream phase relies on.
fn orders_by_civ(state: &GameState, submitted: &[PlayerOrders]) -> OrderedMap<CivId, Vec<Order>> {
    let mut map = OrderedMap::new();
    for civ_id in state.civilizations.keys() {
        let orders = submitted
            .iter()
            .filter(|o| &o.civilization_id == civ_id)
            .flat_map(|o| o.orders.iter().cloned())
            .collect();
        map.insert(civ_id.clone(), orders);
    }
    map
}

/// Flatten to `(civ, order)` pairs in the same civ order, submission order
/// within a civ — the shape the diplomacy and events phases consume.
fn flat_orders(orders_by_civ: &OrderedMap<CivId, Vec<Order>>) -> Vec<(CivId, Order)> {
    orders_by_civ
        .iter()
        .flat_map(|(civ_id, orders)| orders.iter().map(move |o| (civ_id.clone(), o.clone())))
        .collect()
}

/// Claim any settlement hex with no controller where exactly one
/// civilization's units now stand, after movement has resolved. Combat's own
/// control-transfer only fires for hexes where a fight actually happened
/// (two or more civs present); this covers the uncontested case.
fn claim_uncontested_settlements(state: &mut GameState) {
    let coords: Vec<crate::hex::HexCoord> = state.hexes_row_major().map(|h| h.coord).collect();
    for coord in coords {
        let hex = state.hex_mut(coord).unwrap();
        if hex.settlement.is_none() || hex.controlled_by.is_some() {
            continue;
        }
        let civs = hex.distinct_civs_present();
        if civs.len() == 1 {
            let sole = civs[0].to_string();
            hex.controlled_by = Some(sole);
        }
    }
}

fn civ_prefixed_lines<'a>(logs: &'a [String], civ_id: &str) -> impl Iterator<Item = String> + 'a {
    let prefix = format!("{civ_id}: ");
    logs.iter().filter(move |l| l.starts_with(&prefix)).cloned()
}

fn build_summary(
    state: &GameState,
    snapshot: &TurnSnapshot,
    all_logs: &[String],
    combat_results: &[CombatResultSummary],
    newly_activated: &FxHashMap<CivId, Vec<String>>,
) -> TurnSummary {
    let civ_summaries = state
        .civilizations
        .iter()
        .map(|(civ_id, civ)| {
            let before_resources = snapshot.resources.get(civ_id).cloned().unwrap_or_default();
            let mut resource_deltas = FxHashMap::default();
            for (resource_id, after) in &civ.resources {
                let before = before_resources.get(resource_id).copied().unwrap_or(0);
                if *after != before {
                    resource_deltas.insert(resource_id.clone(), after - before);
                }
            }
            for resource_id in before_resources.keys() {
                if !civ.resources.contains_key(resource_id) {
                    resource_deltas.insert(resource_id.clone(), -before_resources[resource_id]);
                }
            }

            let before_techs = snapshot.completed_techs.get(civ_id).cloned().unwrap_or_default();
            let techs_completed = civ
                .completed_techs
                .iter()
                .filter(|t| !before_techs.contains(t))
                .cloned()
                .collect();

            let combat_results = combat_results
                .iter()
                .filter(|r| &r.attacker == civ_id || &r.defender == civ_id)
                .cloned()
                .collect();

            let activated_event_ids = newly_activated.get(civ_id).cloned().unwrap_or_default();
            let narrative_lines = civ_prefixed_lines(all_logs, civ_id).collect();

            CivTurnSummary {
                civ_id: civ_id.clone(),
                resource_deltas,
                techs_completed,
                combat_results,
                activated_event_ids,
                narrative_lines,
            }
        })
        .collect();

    TurnSummary { turn: state.turn, civ_summaries }
}

/// Run a full turn of resolution. `submitted_orders` need not cover every
/// civilization — the AI governor fills any gap, when the config allows it.
/// `timestamp` stamps AI-authored `PlayerOrders` and the state's
/// `last_resolved_at`; `metrics`, if given, accumulates per-phase wall time
/// and never affects the returned state.
#[instrument(skip_all, name = "resolve_turn")]
pub fn resolve_turn(
    state: &GameState,
    theme: &ThemePackage,
    submitted_orders: Vec<PlayerOrders>,
    timestamp: i64,
    mut metrics: Option<&mut SimMetrics>,
) -> GameState {
    let turn_start = Instant::now();
    if state.phase == GamePhase::Completed {
        return state.clone();
    }

    let mut new_state = state.clone();
    reset_moves(&mut new_state, theme);
    let snap = snapshot(&new_state);

    let mut main_prng = Prng::new(state.rng_state);
    let mut all_orders = submitted_orders;

    let t = Instant::now();
    fill_missing_orders(&mut new_state, theme, &mut all_orders, &mut main_prng, timestamp);
    if let Some(m) = metrics.as_deref_mut() {
        m.ai_fill += t.elapsed();
    }

    let by_civ = orders_by_civ(&new_state, &all_orders);
    let flat = flat_orders(&by_civ);
    let mut all_logs: Vec<String> = Vec::new();

    // Phase DIPLOMACY.
    let t = Instant::now();
    let (s, _messages, logs) = diplomacy::run(&new_state, &flat, theme);
    new_state = s;
    all_logs.extend(logs);
    if let Some(m) = metrics.as_deref_mut() {
        m.diplomacy += t.elapsed();
    }

    // Phase ORDERS is a pass-through: `resource_allocation` orders are read
    // directly by the economy phase below, nothing to resolve here.

    // Phase MOVEMENT.
    let t = Instant::now();
    let (s, logs) = movement::run(&new_state, &by_civ);
    new_state = s;
    all_logs.extend(logs);
    if let Some(m) = metrics.as_deref_mut() {
        m.movement += t.elapsed();
    }

    // Phase COMBAT.
    let t = Instant::now();
    let mut combat_fork = main_prng.fork();
    let (s, combat_results, logs) = combat::run(&new_state, theme, &mut combat_fork);
    new_state = s;
    all_logs.extend(logs);
    if let Some(m) = metrics.as_deref_mut() {
        m.combat += t.elapsed();
    }

    claim_uncontested_settlements(&mut new_state);

    // Phase ECONOMY.
    let t = Instant::now();
    let all_orders_flat: Vec<Order> = by_civ.values().flat_map(|os| os.iter().cloned()).collect();
    let allocation_weights = economy::collect_allocation_weights(&all_orders_flat);
    match economy::run(&new_state, theme, &allocation_weights) {
        Ok((s, logs)) => {
            new_state = s;
            all_logs.extend(logs);
        }
        Err(err) => {
            log::error!("economy phase failed: {err}");
        }
    }
    if let Some(m) = metrics.as_deref_mut() {
        m.economy += t.elapsed();
    }

    // Phase HEALING.
    let t = Instant::now();
    let (s, logs) = healing::run(&new_state, theme);
    new_state = s;
    all_logs.extend(logs);
    if let Some(m) = metrics.as_deref_mut() {
        m.healing += t.elapsed();
    }

    // Phase CONSTRUCTION.
    let t = Instant::now();
    let (s, logs) = construction::run(&new_state, theme, &by_civ);
    new_state = s;
    all_logs.extend(logs);
    if let Some(m) = metrics.as_deref_mut() {
        m.construction += t.elapsed();
    }

    // Phase RECRUITMENT.
    let t = Instant::now();
    let (s, logs) = recruitment::run(&new_state, theme, &by_civ);
    new_state = s;
    all_logs.extend(logs);
    if let Some(m) = metrics.as_deref_mut() {
        m.recruitment += t.elapsed();
    }

    // Phase RESEARCH.
    let t = Instant::now();
    let (s, logs) = research::run(&new_state, theme, &by_civ);
    new_state = s;
    all_logs.extend(logs);
    if let Some(m) = metrics.as_deref_mut() {
        m.research += t.elapsed();
    }

    // Phase EVENTS.
    let t = Instant::now();
    let events_before: std::collections::HashSet<String> =
        new_state.active_events.iter().map(|e| e.instance_id.clone()).collect();
    let mut events_fork = main_prng.fork();
    let (s, logs) = events::run(&new_state, &flat, theme, &mut events_fork);
    new_state = s;
    all_logs.extend(logs);
    let mut newly_activated: FxHashMap<CivId, Vec<String>> = FxHashMap::default();
    for event in &new_state.active_events {
        if events_before.contains(&event.instance_id) {
            continue;
        }
        for civ_id in &event.target_civilization_ids {
            newly_activated.entry(civ_id.clone()).or_default().push(event.definition_id.clone());
        }
    }
    if let Some(m) = metrics.as_deref_mut() {
        m.events += t.elapsed();
    }

    // Phase ATTRITION.
    let t = Instant::now();
    let (s, logs) = attrition::run(&new_state, theme);
    new_state = s;
    all_logs.extend(logs);
    if let Some(m) = metrics.as_deref_mut() {
        m.attrition += t.elapsed();
    }

    // Muwardi invasion check rides on the tension axes settled by now, ahead
    // of victory/defeat evaluation.
    let t = Instant::now();
    let (s, logs) = muwardi::run(&new_state, theme);
    new_state = s;
    all_logs.extend(logs);

    // Phase VICTORY/DEFEAT.
    let (s, logs) = victory::run(&new_state, theme);
    new_state = s;
    all_logs.extend(logs);
    if let Some(m) = metrics.as_deref_mut() {
        m.victory += t.elapsed();
    }

    // Phase SUMMARY.
    let t = Instant::now();
    let summary = build_summary(&new_state, &snap, &all_logs, &combat_results, &newly_activated);
    new_state.turn_history.push(summary);
    if let Some(m) = metrics.as_deref_mut() {
        m.summary += t.elapsed();
    }

    // Advance the turn counter, tick the master PRNG stream forward for next
    // turn's phase forks, and stamp resolution time.
    new_state.turn += 1;
    main_prng.next();
    new_state.rng_state = main_prng.state();
    new_state.last_resolved_at = Some(timestamp);

    if let Some(m) = metrics {
        m.total += turn_start.elapsed();
    }

    new_state
}
