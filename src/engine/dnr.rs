// 8.10 engine/dnr.rs: volume accounting, fee discounts and rebates.
// tiers are looked up with the trader's volume from the previous epoch, so a
// trader's first epoch never gets a discount or rebate.

use super::core::Engine;
use super::results::EngineError;
use crate::bank::{Bank, Holder};
use crate::dnr::{is_gc_block, resolve_tier};
use crate::events::{EventPayload, RebatePaidEvent};
use crate::math::{mul, quo, truncate_int};
use crate::store::{TierKey, VolumeKey};
use crate::types::{Address, Coin, Pair};
use rust_decimal::Decimal;

fn check_ratio(ratio: Decimal) -> Result<(), EngineError> {
    if ratio < Decimal::ZERO || ratio > Decimal::ONE {
        return Err(EngineError::InvalidRatio(ratio));
    }
    Ok(())
}

impl<B: Bank> Engine<B> {
    pub fn dnr_epoch(&self) -> u64 {
        self.ledger.state.dnr_epoch.get().copied().unwrap_or(0)
    }

    /// Notional volume of `trader` in `epoch`. Zero when nothing was recorded.
    pub fn trader_volume(&self, trader: &Address, epoch: u64) -> Decimal {
        self.ledger
            .state
            .trader_volumes
            .get(&VolumeKey {
                trader: trader.clone(),
                epoch,
            })
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn last_epoch_volume(&self, trader: &Address, current_epoch: u64) -> Decimal {
        match current_epoch.checked_sub(1) {
            Some(previous) => self.trader_volume(trader, previous),
            None => Decimal::ZERO,
        }
    }

    pub(super) fn maybe_update_dnr_epoch(&mut self, epoch_identifier: &str, epoch_number: u64) {
        let is_dnr_epoch = self
            .ledger
            .state
            .dnr_epoch_name
            .get()
            .map_or(false, |name| name == epoch_identifier);
        if is_dnr_epoch {
            self.ledger.state.dnr_epoch.set(epoch_number);
            log::info!("dnr epoch advanced to {epoch_number}");
        }
    }

    /// Adds `volume` to the trader's current epoch and, on gc blocks, drops
    /// entries older than the previous epoch.
    fn increase_trader_volume(&mut self, epoch: u64, trader: &Address, volume: Decimal) {
        let key = VolumeKey {
            trader: trader.clone(),
            epoch,
        };
        let current = self.ledger.state.trader_volumes.get(&key).copied().unwrap_or(Decimal::ZERO);
        self.ledger.state.trader_volumes.insert(key, current.saturating_add(volume));

        if is_gc_block(self.block.height, self.config.dnr_gc_frequency) && epoch >= 2 {
            let stale = self.ledger.state.trader_volume_keys_before(trader, epoch - 1);
            for key in &stale {
                self.ledger.state.trader_volumes.remove(key);
            }
            if !stale.is_empty() {
                log::debug!("dropped {} stale volume entries for {}", stale.len(), trader);
            }
        }
    }

    /// Records volume, pays any rebate and returns the exchange fee ratio after discounts.
    pub(super) fn apply_discounts_and_rebates(
        &mut self,
        trader: &Address,
        notional: Decimal,
        exchange_fee_ratio: Decimal,
    ) -> Result<Decimal, EngineError> {
        let epoch = self.dnr_epoch();
        self.increase_trader_volume(epoch, trader, truncate_int(notional));

        let past_volume = self.last_epoch_volume(trader, epoch);
        if past_volume <= Decimal::ZERO {
            return Ok(exchange_fee_ratio);
        }

        let state = &self.ledger.state;
        let rebate_ratio = resolve_tier(&state.global_rebates, &state.trader_rebates, trader, past_volume);
        let discount = resolve_tier(&state.global_discounts, &state.trader_discounts, trader, past_volume);

        if let Some(ratio) = rebate_ratio {
            let rebate = mul(notional, ratio).ok_or(EngineError::NotionalOverflow)?;
            self.pay_rebate(trader, epoch, rebate)?;
        }
        Ok(discount.unwrap_or(exchange_fee_ratio))
    }

    /// Mints the rebate in the staking denom. Skipped with a warning when prices are missing.
    fn pay_rebate(&mut self, trader: &Address, epoch: u64, quote_amount: Decimal) -> Result<(), EngineError> {
        let staking = self.config.staking_denom.clone();
        let amount = match self.quote_to_staking(quote_amount) {
            Ok(amount) => amount,
            Err(err) => {
                log::warn!("skipping rebate for {trader}: {err}");
                return Ok(());
            }
        };
        if amount <= Decimal::ZERO {
            return Ok(());
        }

        let rebate = Coin::new(staking, amount);
        self.ledger.bank.mint(&Holder::Account(trader.clone()), &rebate)?;
        self.emit_event(EventPayload::RebatePaid(RebatePaidEvent {
            trader: trader.clone(),
            epoch,
            rebate,
        }));
        Ok(())
    }

    fn quote_to_staking(&self, quote_amount: Decimal) -> Result<Decimal, EngineError> {
        let collateral = self.collateral_denom();
        let staking = &self.config.staking_denom;
        if &collateral == staking {
            return Ok(truncate_int(quote_amount));
        }
        let reference = &self.config.price_reference_denom;
        let quote_price = self.oracle.exchange_rate(&Pair::new(&collateral, reference)?)?;
        let staking_price = self.oracle.exchange_rate(&Pair::new(staking, reference)?)?;
        let value = mul(quote_amount, quote_price).ok_or(EngineError::NotionalOverflow)?;
        let converted = quo(value, staking_price).unwrap_or(Decimal::ZERO);
        Ok(truncate_int(converted))
    }

    // 8.10.1: admin configuration

    pub fn set_dnr_epoch_name(&mut self, sender: &Address, name: &str) -> Result<(), EngineError> {
        self.transact(|engine| {
            engine.ensure_authorized(sender)?;
            engine.ledger.state.dnr_epoch_name.set(name.to_string());
            Ok(())
        })
    }

    pub fn set_global_discount(&mut self, sender: &Address, volume: Decimal, ratio: Decimal) -> Result<(), EngineError> {
        self.transact(|engine| {
            engine.ensure_authorized(sender)?;
            check_ratio(ratio)?;
            engine.ledger.state.global_discounts.insert(volume, ratio);
            Ok(())
        })
    }

    pub fn set_trader_discount(
        &mut self,
        sender: &Address,
        trader: &Address,
        volume: Decimal,
        ratio: Decimal,
    ) -> Result<(), EngineError> {
        self.transact(|engine| {
            engine.ensure_authorized(sender)?;
            check_ratio(ratio)?;
            let key = TierKey {
                trader: trader.clone(),
                threshold: volume,
            };
            engine.ledger.state.trader_discounts.insert(key, ratio);
            Ok(())
        })
    }

    pub fn set_global_rebate(&mut self, sender: &Address, volume: Decimal, ratio: Decimal) -> Result<(), EngineError> {
        self.transact(|engine| {
            engine.ensure_authorized(sender)?;
            check_ratio(ratio)?;
            engine.ledger.state.global_rebates.insert(volume, ratio);
            Ok(())
        })
    }

    pub fn set_trader_rebate(
        &mut self,
        sender: &Address,
        trader: &Address,
        volume: Decimal,
        ratio: Decimal,
    ) -> Result<(), EngineError> {
        self.transact(|engine| {
            engine.ensure_authorized(sender)?;
            check_ratio(ratio)?;
            let key = TierKey {
                trader: trader.clone(),
                threshold: volume,
            };
            engine.ledger.state.trader_rebates.insert(key, ratio);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::bank::ModuleAccount;
    use crate::types::Direction;
    use rust_decimal_macros::dec;

    fn enter_epoch(engine: &mut Engine, epoch: u64) {
        engine.maybe_update_dnr_epoch("dnr", epoch);
    }

    fn trade(engine: &mut Engine, trader: &Address) {
        engine
            .market_order(&btc(), Direction::Long, trader, dec!(100), dec!(10), Decimal::ZERO)
            .unwrap();
    }

    #[test]
    fn epoch_only_moves_for_the_configured_name() {
        let mut engine = setup_engine();
        engine.set_dnr_epoch_name(&admin(), "dnr").unwrap();
        engine.maybe_update_dnr_epoch("30 min", 7);
        assert_eq!(engine.dnr_epoch(), 0);
        enter_epoch(&mut engine, 3);
        assert_eq!(engine.dnr_epoch(), 3);
    }

    #[test]
    fn volume_is_recorded_per_epoch() {
        let mut engine = setup_engine();
        trade(&mut engine, &alice());
        assert_eq!(engine.trader_volume(&alice(), 0), dec!(1000));
        assert_eq!(engine.trader_volume(&alice(), 1), Decimal::ZERO);
    }

    #[test]
    fn discount_applies_from_previous_epoch_volume() {
        let mut engine = setup_engine();
        engine.set_dnr_epoch_name(&admin(), "dnr").unwrap();
        engine.set_global_discount(&admin(), dec!(500), dec!(0.0005)).unwrap();

        enter_epoch(&mut engine, 1);
        trade(&mut engine, &alice());
        // no volume in epoch 0 yet: full 1 + 1
        assert_eq!(balance(&engine, Holder::Module(ModuleAccount::FeePool)), dec!(1));

        enter_epoch(&mut engine, 2);
        trade(&mut engine, &alice());
        // 1000 volume in epoch 1 unlocks the 0.0005 tier: a 0.5 fee rounds half to even
        assert_eq!(balance(&engine, Holder::Module(ModuleAccount::FeePool)), dec!(1));
    }

    #[test]
    fn trader_tier_overrides_global() {
        let mut engine = setup_engine();
        engine.set_dnr_epoch_name(&admin(), "dnr").unwrap();
        engine.set_global_discount(&admin(), dec!(1), dec!(0.0009)).unwrap();
        engine.set_trader_discount(&admin(), &alice(), dec!(1), dec!(0)).unwrap();

        enter_epoch(&mut engine, 1);
        trade(&mut engine, &alice());
        enter_epoch(&mut engine, 2);
        let pool_before = balance(&engine, Holder::Module(ModuleAccount::FeePool));
        trade(&mut engine, &alice());
        assert_eq!(balance(&engine, Holder::Module(ModuleAccount::FeePool)), pool_before);
    }

    #[test]
    fn rebate_is_minted_in_staking_denom() {
        let mut engine = setup_engine();
        engine.set_dnr_epoch_name(&admin(), "dnr").unwrap();
        engine.set_global_rebate(&admin(), dec!(1), dec!(0.01)).unwrap();

        enter_epoch(&mut engine, 1);
        trade(&mut engine, &alice());
        enter_epoch(&mut engine, 2);
        trade(&mut engine, &alice());

        // 1% of 1000 quote at unusd=1, unibi=2
        let staking = engine.config().staking_denom.clone();
        assert_eq!(engine.bank().balance(&Holder::Account(alice()), &staking), dec!(5));
        assert!(engine
            .events()
            .iter()
            .any(|e| matches!(e.payload, EventPayload::RebatePaid(_))));
    }

    #[test]
    fn stale_volume_collected_on_gc_block() {
        let mut engine = setup_engine();
        engine.set_dnr_epoch_name(&admin(), "dnr").unwrap();
        for epoch in 1..=3 {
            enter_epoch(&mut engine, epoch);
            engine.advance_block(1_000);
            trade(&mut engine, &alice());
        }
        assert_eq!(engine.trader_volume(&alice(), 1), dec!(1000));

        let time = engine.block().time;
        engine.set_block(1000, time);
        trade(&mut engine, &alice());

        assert_eq!(engine.trader_volume(&alice(), 1), Decimal::ZERO);
        assert_eq!(engine.trader_volume(&alice(), 2), dec!(1000));
        assert_eq!(engine.trader_volume(&alice(), 3), dec!(2000));
    }

    #[test]
    fn ratios_validated_and_gated() {
        let mut engine = setup_engine();
        assert_eq!(
            engine.set_global_rebate(&admin(), dec!(1), dec!(1.5)),
            Err(EngineError::InvalidRatio(dec!(1.5)))
        );
        assert_eq!(
            engine.set_global_rebate(&alice(), dec!(1), dec!(0.5)),
            Err(EngineError::Unauthorized(alice()))
        );
    }
}
