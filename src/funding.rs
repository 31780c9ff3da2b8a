// 6.0: funding. once per funding epoch the mark/index divergence is turned into a
// premium fraction and added to the market's cumulative premium fraction.
// 6.0 has the epoch collaborator. 6.1 has the premium math.

use crate::math::{mul, quo};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochInfo {
    pub identifier: String,
    pub duration: chrono::Duration,
    pub current_epoch: u64,
}

/// Epoch scheduler metadata.
pub trait EpochSource: fmt::Debug {
    fn epoch_info(&self, identifier: &str) -> Option<EpochInfo>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticEpochs {
    epochs: HashMap<String, EpochInfo>,
}

impl StaticEpochs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identifier: &str, duration: chrono::Duration) {
        self.epochs.insert(
            identifier.to_string(),
            EpochInfo {
                identifier: identifier.to_string(),
                duration,
                current_epoch: 0,
            },
        );
    }
}

impl EpochSource for StaticEpochs {
    fn epoch_info(&self, identifier: &str) -> Option<EpochInfo> {
        self.epochs.get(identifier).cloned()
    }
}

/// Whole funding intervals per day. `None` for epochs longer than a day.
pub fn intervals_per_day(epoch_duration: chrono::Duration) -> Option<i64> {
    let epoch_ms = epoch_duration.num_milliseconds();
    if epoch_ms <= 0 {
        return None;
    }
    let intervals = chrono::Duration::hours(24).num_milliseconds() / epoch_ms;
    (intervals > 0).then_some(intervals)
}

// 6.1: premium fraction for one interval. positive = longs pay shorts.
pub fn calculate_premium_fraction(
    mark_twap: Decimal,
    index_twap: Decimal,
    max_funding_rate: Decimal,
    intervals_per_day: i64,
) -> Option<Decimal> {
    let intervals = Decimal::from(intervals_per_day);
    let divergence = quo(mark_twap - index_twap, index_twap)?;
    if divergence.abs() <= max_funding_rate {
        return quo(mark_twap - index_twap, intervals);
    }
    let clamped = divergence.max(-max_funding_rate).min(max_funding_rate);
    quo(mul(clamped, index_twap)?, intervals)
}

/// Premium fraction expressed as a rate of the index price.
pub fn calculate_funding_rate(premium_fraction: Decimal, index_twap: Decimal) -> Decimal {
    quo(premium_fraction, index_twap).unwrap_or(Decimal::ZERO)
}
