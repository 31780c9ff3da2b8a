//! Liquidation rules and batch bookkeeping.
//!
//! A position below maintenance margin is liquidated partially when its spot
//! margin ratio still covers the liquidation fee, and fully otherwise. Fees
//! are split between the liquidator and the ecosystem fund. This module holds
//! the pure decisions; the engine executes them.

use crate::math::quo;
use crate::types::{Address, Coin, Pair};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationFailedReason {
    NonexistentPair,
    NonexistentPosition,
    PositionHealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidationKind {
    Partial,
    Full,
}

/// Strictly below maintenance. A ratio exactly at maintenance is healthy.
pub fn is_liquidatable(margin_ratio: Decimal, maintenance_margin_ratio: Decimal) -> bool {
    margin_ratio < maintenance_margin_ratio
}

/// Partial while the spot margin ratio still pays the liquidation fee.
pub fn liquidation_kind(spot_margin_ratio: Decimal, liquidation_fee_ratio: Decimal) -> LiquidationKind {
    if spot_margin_ratio >= liquidation_fee_ratio {
        LiquidationKind::Partial
    } else {
        LiquidationKind::Full
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationRequest {
    pub pair: Pair,
    pub trader: Address,
}

/// Outcome of one item in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationResponse {
    pub success: bool,
    pub error: Option<String>,
    pub liquidator_fee: Option<Coin>,
    pub ecosystem_fund_fee: Option<Coin>,
    pub trader: Address,
    pub pair: Pair,
}

/// Liquidator gets half of `fee`, the ecosystem fund the rest.
pub fn split_fee(fee: Decimal) -> (Decimal, Decimal) {
    let to_liquidator = quo(fee, dec!(2)).unwrap_or(Decimal::ZERO);
    (to_liquidator, fee - to_liquidator)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullLiquidationSplit {
    pub fee_to_liquidator: Decimal,
    pub fee_to_ecosystem_fund: Decimal,
    pub bad_debt: Decimal,
}

/// Liquidator takes half the fee first; whatever margin is left goes to the
/// ecosystem fund, and a fee the margin cannot cover becomes bad debt.
pub fn full_liquidation_split(
    remaining_margin: Decimal,
    exchanged_notional: Decimal,
    liquidation_fee_ratio: Decimal,
    bad_debt: Decimal,
) -> FullLiquidationSplit {
    let fee_to_liquidator = quo(liquidation_fee_ratio * exchanged_notional, dec!(2)).unwrap_or(Decimal::ZERO);
    if fee_to_liquidator > remaining_margin {
        FullLiquidationSplit {
            fee_to_liquidator,
            fee_to_ecosystem_fund: Decimal::ZERO,
            bad_debt: bad_debt + fee_to_liquidator - remaining_margin,
        }
    } else {
        FullLiquidationSplit {
            fee_to_liquidator,
            fee_to_ecosystem_fund: remaining_margin - fee_to_liquidator,
            bad_debt,
        }
    }
}

/// Pretty JSON of a batch, attached to the error when every item failed.
pub fn render_responses(responses: &[LiquidationResponse]) -> String {
    serde_json::to_string_pretty(responses).unwrap_or_else(|err| format!("unrenderable responses: {err}"))
}
