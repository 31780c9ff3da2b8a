// 5.0: time weighted average prices over the reserve snapshot history.
// snapshots are walked newest first; each one's price is weighted by how long it was live.

use crate::amm::{Amm, AmmError};
use crate::math::quo;
use crate::types::{Direction, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TwapError {
    #[error("no reserve snapshot at or before the requested time")]
    NoValidTwap,

    #[error(transparent)]
    Amm(#[from] AmmError),
}

/// Immutable copy of a pool as it stood at `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSnapshot {
    pub amm: Amm,
    pub timestamp: Timestamp,
}

/// How a snapshot is turned into a "price".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwapCalcOption {
    /// `peg * quote / base`
    Spot,
    /// Base moved by trading `amount` of quote asset.
    QuoteAssetSwap { direction: Direction, amount: Decimal },
    /// Quote asset moved by trading `amount` of base.
    BaseAssetSwap { direction: Direction, amount: Decimal },
}

impl TwapCalcOption {
    pub fn price(&self, amm: &Amm) -> Result<Decimal, AmmError> {
        match *self {
            TwapCalcOption::Spot => Ok(amm.mark_price()),
            TwapCalcOption::QuoteAssetSwap { direction, amount } => {
                let quote_reserve = amm.quote_asset_to_reserve(amount)?;
                amm.base_reserve_delta(quote_reserve, direction)
            }
            TwapCalcOption::BaseAssetSwap { direction, amount } => {
                let quote_reserve = amm.quote_reserve_delta(amount, direction)?;
                amm.quote_reserve_to_asset(quote_reserve)
            }
        }
    }
}

/// `snapshots` must be newest first and none later than `now`.
/// Consumption stops after the first snapshot at or before `lower_limit`.
pub fn time_weighted_average<'a, I>(
    snapshots: I,
    now: Timestamp,
    lower_limit: Timestamp,
    option: TwapCalcOption,
) -> Result<Decimal, TwapError>
where
    I: IntoIterator<Item = &'a ReserveSnapshot>,
{
    let mut window = Vec::new();
    for snapshot in snapshots {
        window.push(snapshot);
        if snapshot.timestamp <= lower_limit {
            break;
        }
    }

    let latest = window.first().ok_or(TwapError::NoValidTwap)?;
    if window.len() == 1 {
        return Ok(option.price(&latest.amm)?);
    }

    let mut cumulative_price = Decimal::ZERO;
    let mut cumulative_period_ms = 0i64;
    let mut prev = now;

    for snapshot in &window {
        let start = snapshot.timestamp.max(lower_limit);
        let elapsed_ms = prev.as_millis() - start.as_millis();
        cumulative_price = option
            .price(&snapshot.amm)?
            .checked_mul(Decimal::from(elapsed_ms))
            .and_then(|weighted| cumulative_price.checked_add(weighted))
            .ok_or(AmmError::DepthOverflow)?;
        cumulative_period_ms += elapsed_ms;

        if snapshot.timestamp <= lower_limit {
            break;
        }
        prev = snapshot.timestamp;
    }

    if cumulative_period_ms == 0 {
        return Ok(option.price(&latest.amm)?);
    }
    quo(cumulative_price, Decimal::from(cumulative_period_ms)).ok_or(TwapError::NoValidTwap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(peg: Decimal, ts_ms: i64) -> ReserveSnapshot {
        ReserveSnapshot {
            amm: Amm::new("ubtc:unusd".parse().unwrap(), 1, dec!(100), peg),
            timestamp: Timestamp::from_millis(ts_ms),
        }
    }

    fn history() -> Vec<ReserveSnapshot> {
        // newest first
        vec![snapshot(dec!(9.5), 30_000), snapshot(dec!(8.5), 20_000), snapshot(dec!(9), 10_000)]
    }

    #[test]
    fn spot_twap_weights_by_live_time() {
        let now = Timestamp::from_millis(30_000);
        let lower = now.saturating_sub(chrono::Duration::seconds(30));
        let twap = time_weighted_average(&history(), now, lower, TwapCalcOption::Spot).unwrap();
        assert_eq!(twap, dec!(8.75));
    }

    #[test]
    fn lookback_clips_oldest_snapshot() {
        let now = Timestamp::from_millis(35_000);
        let lower = Timestamp::from_millis(15_000);
        // 9.5 for 5s, 8.5 for 10s, 9 for the clipped 5s
        let twap = time_weighted_average(&history(), now, lower, TwapCalcOption::Spot).unwrap();
        assert_eq!(twap, dec!(8.875));
    }

    #[test]
    fn single_snapshot_returns_its_price() {
        let only = vec![snapshot(dec!(7), 30_000)];
        let now = Timestamp::from_millis(30_000);
        let twap = time_weighted_average(&only, now, Timestamp::from_millis(0), TwapCalcOption::Spot).unwrap();
        assert_eq!(twap, dec!(7));
    }

    #[test]
    fn zero_period_falls_back_to_latest() {
        let now = Timestamp::from_millis(30_000);
        let twap = time_weighted_average(&history(), now, now, TwapCalcOption::Spot).unwrap();
        assert_eq!(twap, dec!(9.5));
    }

    #[test]
    fn empty_history_has_no_twap() {
        let empty: Vec<ReserveSnapshot> = Vec::new();
        let now = Timestamp::from_millis(1);
        assert_eq!(
            time_weighted_average(&empty, now, now, TwapCalcOption::Spot),
            Err(TwapError::NoValidTwap)
        );
    }

    #[test]
    fn overflowing_weighted_price_is_an_error() {
        let huge = vec![snapshot(Decimal::MAX, 20_000), snapshot(dec!(1), 10_000)];
        let now = Timestamp::from_millis(30_000);
        assert_eq!(
            time_weighted_average(&huge, now, Timestamp::from_millis(0), TwapCalcOption::Spot),
            Err(TwapError::Amm(AmmError::DepthOverflow))
        );
    }

    #[test]
    fn swap_modes_price_against_reserves() {
        let amm = Amm::new("ubtc:unusd".parse().unwrap(), 1, dec!(100), dec!(2));
        let quote_swap = TwapCalcOption::QuoteAssetSwap { direction: Direction::Long, amount: dec!(50) };
        // 50 quote asset = 25 quote reserve, base 100 -> 80
        assert_eq!(quote_swap.price(&amm).unwrap(), dec!(20));

        let base_swap = TwapCalcOption::BaseAssetSwap { direction: Direction::Short, amount: dec!(25) };
        // base 100 -> 125, quote 100 -> 80, times peg
        assert_eq!(base_swap.price(&amm).unwrap(), dec!(40));
    }
}
