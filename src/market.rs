//! Market parameters and runtime funding state.
//!
//! A market is one trading pair at one version. Closing a market only flips
//! `enabled`; re-creating it bumps the version and starts a fresh pool.

use crate::types::{Coin, Pair, TypesError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Denom every oracle pair is quoted in by default.
pub const DEFAULT_ORACLE_QUOTE: &str = "uusd";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    #[error("{field} must be within [0, 1], got {value}")]
    RatioOutOfRange { field: &'static str, value: Decimal },

    #[error("max leverage must be positive, got {0}")]
    NonPositiveMaxLeverage(Decimal),

    #[error("maintenance margin ratio {mmr} exceeds 1 / max leverage {max_leverage}")]
    MarginRatioAboveInitial { mmr: Decimal, max_leverage: Decimal },

    #[error("max funding rate must not be negative, got {0}")]
    NegativeMaxFundingRate(Decimal),

    #[error("twap lookback window must be positive, got {0}ms")]
    NonPositiveTwapLookback(i64),

    #[error("funding epoch identifier must not be empty")]
    EmptyFundingEpoch,

    #[error("invalid oracle pair: {0}")]
    InvalidOraclePair(#[from] TypesError),
}

/// 3.0: per-market risk and fee parameters plus funding state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub pair: Pair,
    pub version: u64,
    pub enabled: bool,
    /// Below this margin ratio a position can be liquidated.
    pub maintenance_margin_ratio: Decimal,
    pub max_leverage: Decimal,
    /// Sum of every premium fraction applied so far. Signed.
    pub latest_cumulative_premium_fraction: Decimal,
    /// Fee to the fee pool, as a fraction of exchanged notional.
    pub exchange_fee_ratio: Decimal,
    /// Fee to the ecosystem fund, as a fraction of exchanged notional.
    pub ecosystem_fund_fee_ratio: Decimal,
    pub liquidation_fee_ratio: Decimal,
    /// Share of the position closed by a partial liquidation.
    pub partial_liquidation_ratio: Decimal,
    pub funding_rate_epoch_id: String,
    pub max_funding_rate: Decimal,
    pub twap_lookback_window_ms: i64,
    /// Credit drawn before the ecosystem fund when bad debt is realized.
    pub prepaid_bad_debt: Coin,
    pub oracle_pair: Pair,
}

impl Market {
    pub fn default_for(pair: Pair, collateral_denom: &str) -> Result<Self, MarketError> {
        let oracle_pair = Pair::new(pair.base_denom(), DEFAULT_ORACLE_QUOTE)?;
        Ok(Self {
            pair,
            version: 1,
            enabled: true,
            maintenance_margin_ratio: dec!(0.0625),
            max_leverage: dec!(10),
            latest_cumulative_premium_fraction: Decimal::ZERO,
            exchange_fee_ratio: dec!(0.001),
            ecosystem_fund_fee_ratio: dec!(0.001),
            liquidation_fee_ratio: dec!(0.05),
            partial_liquidation_ratio: dec!(0.5),
            funding_rate_epoch_id: "30 min".to_string(),
            max_funding_rate: dec!(0.02),
            twap_lookback_window_ms: 30 * 60 * 1000,
            prepaid_bad_debt: Coin::zero(collateral_denom),
            oracle_pair,
        })
    }

    pub fn validate(&self) -> Result<(), MarketError> {
        let ratios = [
            ("maintenance_margin_ratio", self.maintenance_margin_ratio),
            ("exchange_fee_ratio", self.exchange_fee_ratio),
            ("ecosystem_fund_fee_ratio", self.ecosystem_fund_fee_ratio),
            ("liquidation_fee_ratio", self.liquidation_fee_ratio),
            ("partial_liquidation_ratio", self.partial_liquidation_ratio),
        ];
        for (field, value) in ratios {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(MarketError::RatioOutOfRange { field, value });
            }
        }

        if self.max_leverage <= Decimal::ZERO {
            return Err(MarketError::NonPositiveMaxLeverage(self.max_leverage));
        }
        if Decimal::ONE / self.max_leverage < self.maintenance_margin_ratio {
            return Err(MarketError::MarginRatioAboveInitial {
                mmr: self.maintenance_margin_ratio,
                max_leverage: self.max_leverage,
            });
        }
        if self.max_funding_rate < Decimal::ZERO {
            return Err(MarketError::NegativeMaxFundingRate(self.max_funding_rate));
        }
        if self.twap_lookback_window_ms <= 0 {
            return Err(MarketError::NonPositiveTwapLookback(self.twap_lookback_window_ms));
        }
        if self.funding_rate_epoch_id.trim().is_empty() {
            return Err(MarketError::EmptyFundingEpoch);
        }
        Ok(())
    }

    pub fn twap_lookback_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.twap_lookback_window_ms)
    }

    /// Combined fee ratio charged on exchanged notional, before discounts.
    pub fn total_fee_ratio(&self) -> Decimal {
        self.exchange_fee_ratio + self.ecosystem_fund_fee_ratio
    }
}
