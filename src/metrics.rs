//! Per-turn timing accumulator. Purely a host-observability hook: never
//! read by the engine itself, never affects output.

use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    pub ai_fill: Duration,
    pub diplomacy: Duration,
    pub movement: Duration,
    pub combat: Duration,
    pub economy: Duration,
    pub healing: Duration,
    pub construction: Duration,
    pub recruitment: Duration,
    pub research: Duration,
    pub events: Duration,
    pub attrition: Duration,
    pub victory: Duration,
    pub summary: Duration,
    pub total: Duration,
}
