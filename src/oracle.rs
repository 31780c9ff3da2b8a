// 9.0: oracle collaborator. the core only ever asks for a current or twap rate by pair.
// StaticOracle is the in-memory source used by the simulator and tests.

use crate::types::Pair;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("no exchange rate for {0}")]
    UnknownPair(Pair),
}

pub trait Oracle: fmt::Debug {
    fn exchange_rate(&self, pair: &Pair) -> Result<Decimal, OracleError>;
    fn exchange_rate_twap(&self, pair: &Pair) -> Result<Decimal, OracleError>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    rates: HashMap<Pair, Decimal>,
    twaps: HashMap<Pair, Decimal>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets both the current rate and the twap.
    pub fn set_price(&mut self, pair: Pair, price: Decimal) {
        self.rates.insert(pair.clone(), price);
        self.twaps.insert(pair, price);
    }

    pub fn set_twap(&mut self, pair: Pair, twap: Decimal) {
        self.twaps.insert(pair, twap);
    }
}

impl Oracle for StaticOracle {
    fn exchange_rate(&self, pair: &Pair) -> Result<Decimal, OracleError> {
        self.rates
            .get(pair)
            .copied()
            .ok_or_else(|| OracleError::UnknownPair(pair.clone()))
    }

    fn exchange_rate_twap(&self, pair: &Pair) -> Result<Decimal, OracleError> {
        self.twaps
            .get(pair)
            .copied()
            .ok_or_else(|| OracleError::UnknownPair(pair.clone()))
    }
}
