//! Epoch hook: funding payments accrue into each market's cumulative premium fraction.

use super::core::Engine;
use super::results::EngineError;
use crate::bank::Bank;
use crate::events::{EventPayload, FundingRateChangedEvent};
use crate::funding::{calculate_funding_rate, calculate_premium_fraction, intervals_per_day};
use crate::market::Market;

impl<B: Bank> Engine<B> {
    /// Called when epoch `epoch_identifier` finishes number `epoch_number`.
    ///
    /// Every enabled market whose funding epoch matches gets a new premium
    /// fraction. Markets without a usable index or mark twap are skipped with
    /// a warning; they never abort the hook.
    pub fn after_epoch_end(&mut self, epoch_identifier: &str, epoch_number: u64) -> Result<(), EngineError> {
        self.transact(|engine| {
            engine.maybe_update_dnr_epoch(epoch_identifier, epoch_number);

            for market in engine.funding_markets(epoch_identifier) {
                engine.settle_funding(market, epoch_identifier);
            }
            Ok(())
        })
    }

    fn funding_markets(&self, epoch_identifier: &str) -> Vec<Market> {
        let state = &self.ledger.state;
        state
            .market_last_version
            .iter()
            .filter_map(|(pair, version)| self.market_by_version(pair, *version).ok())
            .filter(|market| market.enabled && market.funding_rate_epoch_id == epoch_identifier)
            .collect()
    }

    fn settle_funding(&mut self, mut market: Market, epoch_identifier: &str) {
        let pair = market.pair.clone();

        let index_twap = match self.oracle.exchange_rate_twap(&market.oracle_pair) {
            Ok(price) if !price.is_zero() => price,
            Ok(_) => {
                log::warn!("skipping funding for {pair}: index twap is zero");
                return;
            }
            Err(err) => {
                log::warn!("skipping funding for {pair}: {err}");
                return;
            }
        };

        let mark_twap = match self.mark_price_twap(&pair, market.twap_lookback_window()) {
            Ok(price) if !price.is_zero() => price,
            Ok(_) => {
                log::warn!("skipping funding for {pair}: mark twap is zero");
                return;
            }
            Err(err) => {
                log::warn!("skipping funding for {pair}: {err}");
                return;
            }
        };

        let Some(epoch) = self.epochs.epoch_info(epoch_identifier) else {
            log::warn!("skipping funding for {pair}: unknown epoch {epoch_identifier}");
            return;
        };
        let Some(intervals) = intervals_per_day(epoch.duration) else {
            log::warn!("skipping funding for {pair}: epoch {epoch_identifier} does not divide a day");
            return;
        };
        let Some(premium_fraction) =
            calculate_premium_fraction(mark_twap, index_twap, market.max_funding_rate, intervals)
        else {
            log::warn!("skipping funding for {pair}: premium fraction undefined");
            return;
        };

        market.latest_cumulative_premium_fraction += premium_fraction;
        let cumulative_premium_fraction = market.latest_cumulative_premium_fraction;
        self.save_market(market);

        let latest_funding_rate = calculate_funding_rate(premium_fraction, index_twap);
        log::debug!("funding {pair}: premium {premium_fraction}, rate {latest_funding_rate}");
        self.emit_event(EventPayload::FundingRateChanged(FundingRateChangedEvent {
            pair,
            mark_price_twap: mark_twap,
            index_price_twap: index_twap,
            latest_funding_rate,
            premium_fraction,
            cumulative_premium_fraction,
            block_height: self.block.height,
            block_time_ms: self.block.time.as_millis(),
        }));
    }
}
