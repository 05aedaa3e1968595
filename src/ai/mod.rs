//! The AI governor: fills in a civ's `PlayerOrders` for a turn it has none
//! submitted for. Personality is inferred once from the civ's textual
//! special abilities and picks a priority order over a fixed set of
//! heuristics; each heuristic may emit zero or more orders.

mod heuristics;

use std::collections::HashSet;

use crate::orders::PlayerOrders;
use crate::prng::Prng;
use crate::state::{CivId, GameState, UnitId};
use crate::theme::ThemePackage;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Personality {
    Military,
    Diplomatic,
    Merchant,
    Pacifist,
}

impl Personality {
    fn priority(self) -> &'static [Heuristic] {
        use Heuristic::*;
        match self {
            Personality::Military => &[Garrison, Recruit, Diplomacy, Attack, Expand, Events, Research, Build],
            Personality::Diplomatic => &[Garrison, Diplomacy, Trade, Events, Research, Recruit, Build, Expand, Attack],
            Personality::Merchant => &[Garrison, Diplomacy, Trade, Expand, Events, Recruit, Build, Research, Attack],
            Personality::Pacifist => &[Diplomacy, Trade, Events, Research, Recruit, Build],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Heuristic {
    Garrison,
    Expand,
    Attack,
    Events,
    Research,
    Recruit,
    Diplomacy,
    Build,
    Trade,
}

/// Infer personality from special-ability text. Default is diplomatic when
/// no keyword matches, per the governor's own design notes.
pub fn infer_personality(theme: &ThemePackage, civ_id: &str) -> Personality {
    let abilities = theme
        .civilization(civ_id)
        .map(|c| c.special_abilities.join(" ").to_lowercase())
        .unwrap_or_default();
    if abilities.contains("pacifist") {
        Personality::Pacifist
    } else if abilities.contains("military") {
        Personality::Military
    } else if abilities.contains("merchant") {
        Personality::Merchant
    } else if abilities.contains("diplomatic") {
        Personality::Diplomatic
    } else {
        Personality::Diplomatic
    }
}

pub(crate) struct Context<'a> {
    pub state: &'a GameState,
    pub civ_id: &'a CivId,
    pub theme: &'a ThemePackage,
    pub personality: Personality,
    pub used_units: HashSet<UnitId>,
}

/// Generate a full turn of orders for `civ_id`. `prng` is a fork dedicated
/// to this civ for the turn (unused by the current heuristic set, which is
/// fully deterministic, but threaded through so a future heuristic can draw
/// on it without changing the call signature).
#[instrument(skip_all, name = "ai_fill")]
pub fn generate_orders(
    state: &GameState,
    civ_id: &CivId,
    theme: &ThemePackage,
    _prng: &mut Prng,
    timestamp: i64,
) -> PlayerOrders {
    if civ_id == "muwardi" {
        return PlayerOrders {
            player_id: "ai-muwardi".to_string(),
            civilization_id: civ_id.clone(),
            turn_number: state.turn,
            orders: heuristics::muwardi_orders(state, civ_id),
            submitted_at: timestamp,
        };
    }

    let personality = infer_personality(theme, civ_id);
    let mut ctx = Context { state, civ_id, theme, personality, used_units: HashSet::new() };
    let mut orders = Vec::new();

    for heuristic in personality.priority() {
        let emitted = match heuristic {
            Heuristic::Garrison => heuristics::garrison(&mut ctx),
            Heuristic::Expand => heuristics::expand(&mut ctx),
            Heuristic::Attack => heuristics::attack(&mut ctx),
            Heuristic::Events => heuristics::events(&mut ctx),
            Heuristic::Research => heuristics::research(&mut ctx),
            Heuristic::Recruit => heuristics::recruit(&mut ctx),
            Heuristic::Diplomacy => heuristics::diplomacy(&mut ctx),
            Heuristic::Build => heuristics::build(&mut ctx),
            Heuristic::Trade => heuristics::trade(&mut ctx),
        };
        orders.extend(emitted);
    }

    PlayerOrders {
        player_id: format!("ai-{civ_id}"),
        civilization_id: civ_id.clone(),
        turn_number: state.turn,
        orders,
        submitted_at: timestamp,
    }
}
