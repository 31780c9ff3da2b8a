// 11.0: every settled state change produces an event. used for indexing and audit trails.
// the EventPayload enum lists all event types; each carries block height and time.

use crate::liquidation::LiquidationFailedReason;
use crate::position::{ChangeReason, Position};
use crate::types::{Address, Coin, Pair, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub block_height: i64,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, block_height: i64, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            block_height,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    // Position events
    PositionChanged(PositionChangedEvent),
    PositionLiquidated(PositionLiquidatedEvent),
    LiquidationFailed(LiquidationFailedEvent),

    // Market events
    FundingRateChanged(FundingRateChangedEvent),
    ShiftPegMultiplier(ShiftPegMultiplierEvent),
    ShiftSwapInvariant(ShiftSwapInvariantEvent),
    MarketCreated(MarketCreatedEvent),
    MarketClosed(MarketClosedEvent),

    // Fund events
    WithdrawFromPerpFund(WithdrawFromPerpFundEvent),
    DonateToEcosystemFund(DonateToEcosystemFundEvent),
    RebatePaid(RebatePaidEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionChangedEvent {
    pub final_position: Position,
    pub position_notional: Decimal,
    pub transaction_fee: Coin,
    pub realized_pnl: Decimal,
    pub bad_debt: Coin,
    pub funding_payment: Decimal,
    /// Negative when the trader paid in.
    pub margin_to_user: Decimal,
    pub change_reason: ChangeReason,
    pub exchanged_size: Decimal,
    pub exchanged_notional: Decimal,
    pub block_height: i64,
    pub block_time_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionLiquidatedEvent {
    pub pair: Pair,
    pub trader: Address,
    pub liquidator: Address,
    pub exchanged_quote_amount: Decimal,
    pub exchanged_position_size: Decimal,
    pub fee_to_liquidator: Coin,
    pub fee_to_ecosystem_fund: Coin,
    pub bad_debt: Coin,
    pub margin: Coin,
    pub position_notional: Decimal,
    pub position_size: Decimal,
    pub unrealized_pnl: Decimal,
    pub mark_price: Decimal,
    pub block_height: i64,
    pub block_time_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationFailedEvent {
    pub pair: Pair,
    pub trader: Address,
    pub liquidator: Address,
    pub reason: LiquidationFailedReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRateChangedEvent {
    pub pair: Pair,
    pub mark_price_twap: Decimal,
    pub index_price_twap: Decimal,
    pub latest_funding_rate: Decimal,
    pub premium_fraction: Decimal,
    pub cumulative_premium_fraction: Decimal,
    pub block_height: i64,
    pub block_time_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftPegMultiplierEvent {
    pub pair: Pair,
    pub old_peg_multiplier: Decimal,
    pub new_peg_multiplier: Decimal,
    pub cost_paid: Coin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftSwapInvariantEvent {
    pub pair: Pair,
    pub old_swap_invariant: Decimal,
    pub new_swap_invariant: Decimal,
    pub cost_paid: Coin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketCreatedEvent {
    pub pair: Pair,
    pub version: u64,
    pub sqrt_depth: Decimal,
    pub price_multiplier: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketClosedEvent {
    pub pair: Pair,
    pub version: u64,
    pub settlement_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawFromPerpFundEvent {
    pub to: Address,
    pub funds: Coin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonateToEcosystemFundEvent {
    pub sender: Address,
    pub funds: Coin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebatePaidEvent {
    pub trader: Address,
    pub epoch: u64,
    pub rebate: Coin,
}

/// Anything that can receive engine events.
pub trait EventEmitter {
    fn emit(&mut self, event: Event);
}

/// Collects events in memory. Useful for tests.
#[derive(Debug, Default)]
pub struct EventCollector {
    pub events: Vec<Event>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn liquidation_failures(&self) -> impl Iterator<Item = &LiquidationFailedEvent> {
        self.events.iter().filter_map(|event| match &event.payload {
            EventPayload::LiquidationFailed(failed) => Some(failed),
            _ => None,
        })
    }
}

impl EventEmitter for EventCollector {
    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}
