//! Engine configuration options.

use crate::dnr::DNR_GC_FREQUENCY;
use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// Log every emitted event at debug level.
    pub verbose: bool,
    /// Blocks between trader volume garbage collections.
    pub dnr_gc_frequency: i64,
    /// Denom rebates are minted in.
    pub staking_denom: String,
    /// Quote denom of the oracle pairs used to convert rebates.
    pub price_reference_denom: String,
    /// Collateral used until an admin sets one.
    pub default_collateral_denom: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            verbose: false,
            dnr_gc_frequency: DNR_GC_FREQUENCY,
            staking_denom: "unibi".to_string(),
            price_reference_denom: "uusd".to_string(),
            default_collateral_denom: "unusd".to_string(),
        }
    }
}
