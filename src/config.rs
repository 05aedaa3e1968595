//! Per-game configuration. No environment variable or global static may
//! affect engine output — every knob the resolver reads comes from here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Hard turn limit, if the host wants one. `None` means unlimited.
    pub max_turns: Option<i64>,
    /// Wall-clock days a player gets to submit orders before the host
    /// considers them missing (enforced by the host, not the engine).
    pub turn_deadline_days: u32,
    /// Whether the AI governor may fill orders for civs without a human
    /// controller at all, vs. only filling gaps for players who missed the
    /// deadline.
    pub allow_ai_governor: bool,
    /// Multiplier applied by the host's AI tuning; the engine threads it
    /// through but does not interpret it itself.
    pub difficulty_modifier: f64,
    pub fog_of_war: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_turns: None,
            turn_deadline_days: 2,
            allow_ai_governor: true,
            difficulty_modifier: 1.0,
            fog_of_war: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = SimConfig::default();
        assert!(config.allow_ai_governor);
        assert!(config.max_turns.is_none());
    }
}
