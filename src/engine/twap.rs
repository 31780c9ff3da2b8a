// 8.7 engine/twap.rs: twap queries over the stored reserve snapshots.

use super::core::Engine;
use super::results::EngineError;
use crate::bank::Bank;
use crate::position::Position;
use crate::twap::{time_weighted_average, TwapCalcOption};
use crate::types::Pair;
use rust_decimal::Decimal;

impl<B: Bank> Engine<B> {
    /// Twap of `option` over the last `lookback`, ending at the current block time.
    pub fn calc_twap(
        &self,
        pair: &Pair,
        option: TwapCalcOption,
        lookback: chrono::Duration,
    ) -> Result<Decimal, EngineError> {
        let now = self.block.time;
        let lower_limit = now.saturating_sub(lookback);
        let snapshots = self.ledger.state.snapshots_until(pair, now);
        Ok(time_weighted_average(snapshots, now, lower_limit, option)?)
    }

    pub fn mark_price_twap(&self, pair: &Pair, lookback: chrono::Duration) -> Result<Decimal, EngineError> {
        self.calc_twap(pair, TwapCalcOption::Spot, lookback)
    }

    /// Twap of the quote received for closing `position`.
    pub(super) fn position_notional_twap(
        &self,
        position: &Position,
        lookback: chrono::Duration,
    ) -> Result<Decimal, EngineError> {
        if position.size.is_zero() {
            return Ok(Decimal::ZERO);
        }
        self.calc_twap(
            &position.pair,
            TwapCalcOption::BaseAssetSwap {
                direction: position.size.closing_direction(),
                amount: position.size.abs(),
            },
            lookback,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use crate::amm::Amm;
    use crate::twap::TwapError;
    use crate::types::Direction;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn mark_twap_weights_each_snapshot() {
        let mut engine = setup_engine();
        // genesis snapshot at price 1, then a repriced pool 10s later
        engine.advance_block(10_000);
        let mut amm: Amm = engine.amm(&btc()).unwrap();
        amm.price_multiplier = dec!(2);
        engine.save_amm(&amm);
        engine.advance_block(10_000);

        let twap = engine
            .mark_price_twap(&btc(), chrono::Duration::seconds(20))
            .unwrap();
        assert_eq!(twap, dec!(1.5));
    }

    #[test]
    fn no_history_means_no_twap() {
        let engine = setup_engine();
        let unknown: Pair = "ueth:unusd".parse().unwrap();
        let err = engine
            .mark_price_twap(&unknown, chrono::Duration::minutes(30))
            .unwrap_err();
        assert_eq!(err, EngineError::Twap(TwapError::NoValidTwap));
    }

    #[test]
    fn zero_amount_swap_twap_is_zero() {
        let engine = setup_engine();
        let twap = engine
            .calc_twap(
                &btc(),
                TwapCalcOption::QuoteAssetSwap {
                    direction: Direction::Long,
                    amount: dec!(0),
                },
                chrono::Duration::minutes(30),
            )
            .unwrap();
        assert_eq!(twap, Decimal::ZERO);
    }
}
