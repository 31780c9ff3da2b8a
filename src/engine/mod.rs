// 8.0: perp engine. wires the pure modules (amm, twap, funding, dnr, liquidation)
// to the ledger: positions, pools, bank transfers and events.
// every public operation is all-or-nothing.

mod admin;
mod clearing_house;
mod config;
mod core;
mod dnr;
mod funding;
mod liquidations;
mod margin;
mod results;
mod swaps;
mod twap;
mod vault;

#[cfg(test)]
mod fixtures;

pub use admin::CreateMarketArgs;
pub use config::EngineConfig;
pub use core::Engine;
pub use results::{EngineError, LiquidationResult, MarginResult};
