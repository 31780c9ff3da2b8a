//! Virtual AMM: constant-product reserves scaled by a price multiplier (peg).
//!
//! Reserves are synthetic. Quote-asset amounts enter the curve divided by the
//! peg and leave it multiplied by the peg, so `mark = peg * quote / base`.

use crate::math::{ceil_int, mul, quo, sqrt};
use crate::types::{Direction, Pair};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmmError {
    #[error("base reserve must be positive, got {0}")]
    NonPositiveBaseReserve(Decimal),

    #[error("quote reserve must be positive, got {0}")]
    NonPositiveQuoteReserve(Decimal),

    #[error("price multiplier must be positive, got {0}")]
    NonPositivePegMultiplier(Decimal),

    #[error("swap invariant must be positive, got {0}")]
    NonPositiveSwapInvariant(Decimal),

    #[error("sqrt depth {stored} does not match reserves (computed {computed})")]
    LiquidityDepthMismatch { stored: Decimal, computed: Decimal },

    #[error("reserves cannot cover closing every open short")]
    BaseBorrowedTooHigh,

    #[error("swap would leave the base reserve at or below zero")]
    BaseReserveAtZero,

    #[error("swap would leave the quote reserve at or below zero")]
    QuoteReserveAtZero,

    #[error("swap amount must not be negative, got {0}")]
    NegativeInputAmount(Decimal),

    #[error("reserve product overflows fixed-point range")]
    DepthOverflow,
}

/// 2.0: pool state for one market version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amm {
    pub pair: Pair,
    pub version: u64,
    pub base_reserve: Decimal,
    pub quote_reserve: Decimal,
    /// sqrt(base * quote), kept as the anchor for depth changes.
    pub sqrt_depth: Decimal,
    pub price_multiplier: Decimal,
    /// Cumulative base bought by longs (and by shorts closing).
    pub total_long: Decimal,
    /// Cumulative base sold by shorts (and by longs closing).
    pub total_short: Decimal,
    /// Only set when the market is closed.
    pub settlement_price: Decimal,
}

impl Amm {
    /// Fresh pool with both reserves at `sqrt_depth`.
    pub fn new(pair: Pair, version: u64, sqrt_depth: Decimal, price_multiplier: Decimal) -> Self {
        Self {
            pair,
            version,
            base_reserve: sqrt_depth,
            quote_reserve: sqrt_depth,
            sqrt_depth,
            price_multiplier,
            total_long: Decimal::ZERO,
            total_short: Decimal::ZERO,
            settlement_price: Decimal::ZERO,
        }
    }

    // 2.1: validation
    pub fn validate(&self) -> Result<(), AmmError> {
        if self.base_reserve <= Decimal::ZERO {
            return Err(AmmError::NonPositiveBaseReserve(self.base_reserve));
        }
        if self.quote_reserve <= Decimal::ZERO {
            return Err(AmmError::NonPositiveQuoteReserve(self.quote_reserve));
        }
        if self.price_multiplier <= Decimal::ZERO {
            return Err(AmmError::NonPositivePegMultiplier(self.price_multiplier));
        }
        if self.sqrt_depth <= Decimal::ZERO {
            return Err(AmmError::NonPositiveSwapInvariant(self.sqrt_depth));
        }

        let computed = self.compute_sqrt_depth()?;
        if (computed - self.sqrt_depth).abs() > dec!(1) {
            return Err(AmmError::LiquidityDepthMismatch {
                stored: self.sqrt_depth,
                computed,
            });
        }

        let mut unwind = self.clone();
        unwind
            .swap_base_asset(self.total_short, Direction::Long)
            .map_err(|_| AmmError::BaseBorrowedTooHigh)?;

        Ok(())
    }

    pub fn swap_invariant(&self) -> Result<Decimal, AmmError> {
        self.base_reserve
            .checked_mul(self.quote_reserve)
            .ok_or(AmmError::DepthOverflow)
    }

    pub fn compute_sqrt_depth(&self) -> Result<Decimal, AmmError> {
        let k = self.swap_invariant()?;
        sqrt(k).ok_or(AmmError::NonPositiveSwapInvariant(k))
    }

    // 2.2: unit conversion between quote asset and quote reserve
    pub fn quote_asset_to_reserve(&self, quote_asset: Decimal) -> Result<Decimal, AmmError> {
        quo(quote_asset, self.price_multiplier)
            .ok_or(AmmError::NonPositivePegMultiplier(self.price_multiplier))
    }

    pub fn quote_reserve_to_asset(&self, quote_reserve: Decimal) -> Result<Decimal, AmmError> {
        mul(quote_reserve, self.price_multiplier).ok_or(AmmError::DepthOverflow)
    }

    /// Base reserve moved when `quote_reserve_amt` enters (long) or leaves (short) the pool.
    pub fn base_reserve_delta(&self, quote_reserve_amt: Decimal, direction: Direction) -> Result<Decimal, AmmError> {
        if quote_reserve_amt < Decimal::ZERO {
            return Err(AmmError::NegativeInputAmount(quote_reserve_amt));
        }
        if quote_reserve_amt.is_zero() {
            return Ok(Decimal::ZERO);
        }

        let invariant = self.swap_invariant()?;
        let quote_after = match direction {
            Direction::Long => self.quote_reserve.checked_add(quote_reserve_amt),
            Direction::Short => self.quote_reserve.checked_sub(quote_reserve_amt),
        }
        .ok_or(AmmError::DepthOverflow)?;
        if quote_after <= Decimal::ZERO {
            return Err(AmmError::QuoteReserveAtZero);
        }

        let base_after = quo(invariant, quote_after).ok_or(AmmError::QuoteReserveAtZero)?;
        Ok((base_after - self.base_reserve).abs())
    }

    /// Quote reserve moved when `base_amt` leaves (long) or enters (short) the pool.
    pub fn quote_reserve_delta(&self, base_amt: Decimal, direction: Direction) -> Result<Decimal, AmmError> {
        if base_amt < Decimal::ZERO {
            return Err(AmmError::NegativeInputAmount(base_amt));
        }
        if base_amt.is_zero() {
            return Ok(Decimal::ZERO);
        }

        let invariant = self.swap_invariant()?;
        let base_after = match direction {
            Direction::Long => self.base_reserve.checked_sub(base_amt),
            Direction::Short => self.base_reserve.checked_add(base_amt),
        }
        .ok_or(AmmError::DepthOverflow)?;
        if base_after <= Decimal::ZERO {
            return Err(AmmError::BaseReserveAtZero);
        }

        let quote_after = quo(invariant, base_after).ok_or(AmmError::BaseReserveAtZero)?;
        Ok((quote_after - self.quote_reserve).abs())
    }

    // 2.3: swaps. both leave the pool untouched on error.

    /// Trades `quote_asset_amt` of quote for base. Returns the base delta.
    pub fn swap_quote_asset(&mut self, quote_asset_amt: Decimal, direction: Direction) -> Result<Decimal, AmmError> {
        let quote_reserve_amt = self.quote_asset_to_reserve(quote_asset_amt)?;
        let base_delta = self.base_reserve_delta(quote_reserve_amt, direction)?;

        match direction {
            Direction::Long => {
                self.quote_reserve += quote_reserve_amt;
                self.base_reserve -= base_delta;
                self.total_long += base_delta;
            }
            Direction::Short => {
                self.quote_reserve -= quote_reserve_amt;
                self.base_reserve += base_delta;
                self.total_short += base_delta;
            }
        }
        Ok(base_delta)
    }

    /// Trades `base_amt` of base for quote. Returns the quote asset delta.
    pub fn swap_base_asset(&mut self, base_amt: Decimal, direction: Direction) -> Result<Decimal, AmmError> {
        let quote_delta = self.quote_reserve_delta(base_amt, direction)?;

        match direction {
            Direction::Long => {
                self.base_reserve -= base_amt;
                self.quote_reserve += quote_delta;
                self.total_long += base_amt;
            }
            Direction::Short => {
                self.base_reserve += base_amt;
                self.quote_reserve -= quote_delta;
                self.total_short += base_amt;
            }
        }
        self.quote_reserve_to_asset(quote_delta)
    }

    // 2.4: prices and exposure

    pub fn mark_price(&self) -> Decimal {
        if self.base_reserve.is_zero() || self.quote_reserve.is_zero() {
            return Decimal::ZERO;
        }
        quo(self.quote_reserve, self.base_reserve)
            .and_then(|ratio| mul(ratio, self.price_multiplier))
            .unwrap_or(Decimal::ZERO)
    }

    /// Net long-minus-short base exposure.
    pub fn bias(&self) -> Decimal {
        self.total_long - self.total_short
    }

    fn bias_closing_direction(bias: Decimal) -> Direction {
        if bias > Decimal::ZERO {
            Direction::Short
        } else {
            Direction::Long
        }
    }

    /// Signed quote paid out if every open position closed now.
    pub fn market_value(&self) -> Result<Decimal, AmmError> {
        let bias = self.bias();
        if bias.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let quote_reserve = self.quote_reserve_delta(bias.abs(), Self::bias_closing_direction(bias))?;
        let value = self.quote_reserve_to_asset(quote_reserve)?;
        Ok(if bias < Decimal::ZERO { -value } else { value })
    }

    // 2.5: re-calibration

    /// Quote the ecosystem fund pays (positive) or receives (negative) to move the peg.
    pub fn calc_repeg_cost(&self, new_price_multiplier: Decimal) -> Result<Decimal, AmmError> {
        if new_price_multiplier <= Decimal::ZERO {
            return Err(AmmError::NonPositivePegMultiplier(new_price_multiplier));
        }
        let bias = self.bias();
        if bias.is_zero() {
            return Ok(Decimal::ZERO);
        }

        let bias_in_quote_reserve = self.quote_reserve_delta(bias.abs(), Self::bias_closing_direction(bias))?;
        let cost = mul(bias_in_quote_reserve, new_price_multiplier - self.price_multiplier)
            .ok_or(AmmError::DepthOverflow)?;
        let cost = if bias < Decimal::ZERO { -cost } else { cost };
        Ok(ceil_int(cost))
    }

    /// Rescales both reserves so `sqrt_depth = sqrt(new_invariant)`; price is unchanged.
    pub fn update_swap_invariant(&mut self, new_invariant: Decimal) -> Result<(), AmmError> {
        if new_invariant <= Decimal::ZERO {
            return Err(AmmError::NonPositiveSwapInvariant(new_invariant));
        }
        let new_sqrt_depth = sqrt(new_invariant).ok_or(AmmError::NonPositiveSwapInvariant(new_invariant))?;
        if new_sqrt_depth == self.sqrt_depth {
            return Ok(());
        }

        let multiplier = quo(new_sqrt_depth, self.sqrt_depth)
            .ok_or(AmmError::NonPositiveSwapInvariant(self.sqrt_depth))?;
        let mut updated = self.clone();
        updated.base_reserve = mul(self.base_reserve, multiplier).ok_or(AmmError::DepthOverflow)?;
        updated.quote_reserve = mul(self.quote_reserve, multiplier).ok_or(AmmError::DepthOverflow)?;
        updated.sqrt_depth = new_sqrt_depth;
        updated.validate()?;

        *self = updated;
        Ok(())
    }

    pub fn calc_swap_invariant_cost(&self, new_invariant: Decimal) -> Result<Decimal, AmmError> {
        if new_invariant <= Decimal::ZERO {
            return Err(AmmError::NonPositiveSwapInvariant(new_invariant));
        }
        if mul(self.sqrt_depth, self.sqrt_depth) == Some(new_invariant) {
            return Ok(Decimal::ZERO);
        }

        let before = self.market_value()?;
        let mut rescaled = self.clone();
        rescaled.update_swap_invariant(new_invariant)?;
        let after = rescaled.market_value()?;
        Ok(ceil_int(after - before))
    }

    /// Average price at which the whole bias unwinds. Mark price when flat.
    pub fn compute_settlement_price(&self) -> Result<Decimal, AmmError> {
        let bias = self.bias();
        if bias.is_zero() {
            return Ok(self.mark_price());
        }
        let mut unwind = self.clone();
        let quote = unwind.swap_base_asset(bias.abs(), Self::bias_closing_direction(bias))?;
        quo(quote.abs(), bias.abs()).ok_or(AmmError::BaseReserveAtZero)
    }
}
