//! Player-submitted orders: the sum type the resolver consumes each turn.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::hex::HexCoord;
use crate::state::{CivId, UnitId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiplomaticActionType {
    DeclareWar,
    ProposePeace,
    ProposeAlliance,
    BreakAlliance,
    ProposeTruce,
    ProposeVassalage,
    SendMessage,
    OfferTrade,
}

/// Payload shape varies with `action_type`; kept as a loose bag of fields
/// rather than a further nested enum since the theme may carry
/// free-text messages and arbitrary trade baskets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiplomaticPayload {
    #[serde(default)]
    pub message: Option<String>,
    /// `offer_trade`: what this civ gives.
    #[serde(default)]
    pub offers: FxHashMap<String, i64>,
    /// `offer_trade`: what this civ wants in return.
    #[serde(default)]
    pub wants: FxHashMap<String, i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Order {
    Move {
        unit_id: UnitId,
        path: Vec<HexCoord>,
    },
    Research {
        tech_id: String,
        points_allocated: i64,
    },
    Construction {
        settlement_id: String,
        building_definition_id: String,
    },
    Recruit {
        settlement_id: String,
        unit_definition_id: String,
    },
    Diplomatic {
        action_type: DiplomaticActionType,
        target_civ_id: CivId,
        #[serde(default)]
        payload: DiplomaticPayload,
    },
    EventResponse {
        event_instance_id: String,
        choice_id: String,
    },
    ResourceAllocation {
        civ_id: CivId,
        weights: FxHashMap<String, f64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerOrders {
    pub player_id: String,
    pub civilization_id: CivId,
    pub turn_number: i64,
    pub orders: Vec<Order>,
    pub submitted_at: i64,
}

/// Typed reasons an order was rejected. Never propagated as a `Result` from
/// the resolver — attached only to a skipped-order log line, per the
/// *InvalidOrder* entry in the error taxonomy (local recovery, not failure).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderRejection {
    #[error("unit {0} not found")]
    UnitNotFound(UnitId),
    #[error("unit {0} is not owned by {1}")]
    UnitNotOwned(UnitId, CivId),
    #[error("path length exceeds remaining moves")]
    PathExceedsMoves,
    #[error("path step is not adjacent to the previous position")]
    PathNotAdjacent,
    #[error("destination is outside the map")]
    DestinationOutOfBounds,
    #[error("path crosses a sea hex")]
    PathCrossesSea,
    #[error("unknown building {0}")]
    UnknownBuilding(String),
    #[error("unknown settlement {0}")]
    UnknownSettlement(String),
    #[error("settlement {0} is not owned by {1}")]
    SettlementNotOwned(String, CivId),
    #[error("prerequisite tech {0} is not completed")]
    PrereqTechMissing(String),
    #[error("building {0} has reached its per-settlement cap")]
    BuildingCapReached(String),
    #[error("insufficient dinars: need {required}, have {available}")]
    InsufficientFunds { required: i64, available: i64 },
    #[error("unknown unit definition {0}")]
    UnknownUnitDefinition(String),
    #[error("settlement {0} already recruited this turn")]
    AlreadyRecruitedThisTurn(String),
    #[error("unknown target civilization {0}")]
    UnknownTargetCiv(CivId),
    #[error("diplomatic action {0:?} is tech-gated and not yet unlocked")]
    DiplomaticActionLocked(DiplomaticActionType),
    #[error("event instance {0} not found or already resolved")]
    UnknownOrResolvedEvent(String),
    #[error("choice {0} is not valid for this event")]
    UnknownEventChoice(String),
}
