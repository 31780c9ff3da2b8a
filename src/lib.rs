// vamm-perps: perpetual futures settlement core on a pegged virtual AMM.
// positions trade against virtual reserves; margin lives in a vault, losses
// beyond margin are covered by the ecosystem fund.
// all computation is deterministic fixed point with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Pair, Address, Direction, SignedSize, Coin, Timestamp
//   1.9  math.rs: 18-digit rounding helpers
//   2.x  amm.rs: reserves, peg, swaps, repeg and re-depth costs, settlement price
//   3.x  market.rs: per-version risk parameters and validation
//   4.x  position.rs: position struct, funding, pnl, margin ratio
//   5.x  twap.rs: time weighted prices over reserve snapshots
//   6.x  funding.rs: premium fraction, epochs
//   6.5  liquidation.rs: partial vs full, fee split, batch responses
//   7.x  dnr.rs: discount and rebate tiers
//   8.x  engine/: clearing house, margin, liquidations, funding hook, admin
//   9.x  store.rs: namespaced tables and keys
//   10.x bank.rs, oracle.rs, sudo.rs: collaborators behind traits
//   11.x events.rs: state transition events for audit

// core modules
pub mod amm;
pub mod engine;
pub mod events;
pub mod funding;
pub mod liquidation;
pub mod market;
pub mod math;
pub mod position;
pub mod twap;
pub mod types;

// fees and storage
pub mod dnr;
pub mod store;

// collaborators
pub mod bank;
pub mod oracle;
pub mod sudo;

// re exports for convenience
pub use amm::*;
pub use bank::*;
pub use engine::*;
pub use events::*;
pub use funding::*;
pub use liquidation::*;
pub use market::*;
pub use oracle::*;
pub use position::*;
pub use store::*;
pub use sudo::*;
pub use twap::*;
pub use types::*;
