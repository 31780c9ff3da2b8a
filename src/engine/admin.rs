// 8.12 engine/admin.rs: governance operations. every entry point checks the
// sender against the authority before touching state.

use super::core::Engine;
use super::results::{ensure_whole, EngineError};
use crate::amm::{Amm, AmmError};
use crate::bank::{Bank, ModuleAccount};
use crate::events::{
    EventPayload, MarketClosedEvent, MarketCreatedEvent, ShiftPegMultiplierEvent, ShiftSwapInvariantEvent,
    WithdrawFromPerpFundEvent,
};
use crate::market::Market;
use crate::math::mul;
use crate::types::{validate_denom, Address, Coin, Pair};
use rust_decimal::Decimal;

/// Parameters for a new market version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateMarketArgs {
    pub pair: Pair,
    pub price_multiplier: Decimal,
    pub sqrt_depth: Decimal,
    /// Risk parameters; defaults when `None`.
    pub market: Option<Market>,
    pub enable: bool,
}

impl<B: Bank> Engine<B> {
    /// Creates the next version of `args.pair`. Fails while the current version is enabled.
    pub fn create_market(&mut self, sender: &Address, args: CreateMarketArgs) -> Result<u64, EngineError> {
        self.transact(|engine| {
            engine.ensure_authorized(sender)?;
            let pair = args.pair;

            if let Ok(existing) = engine.market(&pair) {
                if existing.enabled {
                    return Err(EngineError::MarketAlreadyExists(pair));
                }
            }
            let version = engine
                .ledger
                .state
                .market_last_version
                .get(&pair)
                .map_or(1, |last| last + 1);

            let collateral = engine.collateral_denom();
            let mut market = match args.market {
                Some(market) => market,
                None => Market::default_for(pair.clone(), &collateral)?,
            };
            market.pair = pair.clone();
            market.version = version;
            market.enabled = args.enable;
            market.prepaid_bad_debt = Coin::zero(collateral);
            market.validate()?;

            let amm = Amm::new(pair.clone(), version, args.sqrt_depth, args.price_multiplier);
            amm.validate()?;

            engine.save_market(market);
            engine.save_amm(&amm);
            engine.ledger.state.market_last_version.insert(pair.clone(), version);

            engine.emit_event(EventPayload::MarketCreated(MarketCreatedEvent {
                pair: pair.clone(),
                version,
                sqrt_depth: amm.sqrt_depth,
                price_multiplier: amm.price_multiplier,
            }));
            log::info!("created market {pair} version {version}");
            Ok(version)
        })
    }

    /// Disables the live version and fixes its settlement price.
    pub fn close_market(&mut self, sender: &Address, pair: &Pair) -> Result<Decimal, EngineError> {
        self.transact(|engine| {
            engine.ensure_authorized(sender)?;
            let mut market = engine.enabled_market(pair)?;
            let mut amm = engine.amm_for(&market)?;

            let settlement_price = amm.compute_settlement_price()?;
            amm.settlement_price = settlement_price;
            engine.save_amm(&amm);

            market.enabled = false;
            let version = market.version;
            engine.save_market(market);

            engine.emit_event(EventPayload::MarketClosed(MarketClosedEvent {
                pair: pair.clone(),
                version,
                settlement_price,
            }));
            log::info!("closed market {pair} version {version} at {settlement_price}");
            Ok(settlement_price)
        })
    }

    pub fn change_collateral_denom(&mut self, sender: &Address, denom: &str) -> Result<(), EngineError> {
        self.transact(|engine| {
            engine.ensure_authorized(sender)?;
            validate_denom(denom)?;
            engine.ledger.state.collateral.set(denom.to_string());
            log::info!("collateral denom set to {denom}");
            Ok(())
        })
    }

    /// Moves the peg. The ecosystem fund pays for (or receives) the change in
    /// what open positions are owed.
    pub fn shift_peg_multiplier(
        &mut self,
        sender: &Address,
        pair: &Pair,
        new_peg_multiplier: Decimal,
    ) -> Result<Coin, EngineError> {
        self.transact(|engine| {
            engine.ensure_authorized(sender)?;
            let market = engine.enabled_market(pair)?;
            let mut amm = engine.amm_for(&market)?;

            let old_peg_multiplier = amm.price_multiplier;
            if old_peg_multiplier == new_peg_multiplier {
                return Ok(Coin::zero(engine.collateral_denom()));
            }

            let cost = amm.calc_repeg_cost(new_peg_multiplier)?;
            let cost_paid = engine.handle_market_update_cost(cost)?;

            amm.price_multiplier = new_peg_multiplier;
            amm.validate()?;
            engine.save_amm(&amm);

            engine.emit_event(EventPayload::ShiftPegMultiplier(ShiftPegMultiplierEvent {
                pair: pair.clone(),
                old_peg_multiplier,
                new_peg_multiplier,
                cost_paid: cost_paid.clone(),
            }));
            log::info!("peg of {pair} moved {old_peg_multiplier} -> {new_peg_multiplier}, cost {cost}");
            Ok(cost_paid)
        })
    }

    /// Rescales pool depth to `sqrt(new_swap_invariant)` at the same price.
    pub fn shift_swap_invariant(
        &mut self,
        sender: &Address,
        pair: &Pair,
        new_swap_invariant: Decimal,
    ) -> Result<Coin, EngineError> {
        self.transact(|engine| {
            engine.ensure_authorized(sender)?;
            let market = engine.enabled_market(pair)?;
            let mut amm = engine.amm_for(&market)?;

            if new_swap_invariant <= Decimal::ZERO {
                return Err(AmmError::NonPositiveSwapInvariant(new_swap_invariant).into());
            }
            let old_swap_invariant = mul(amm.sqrt_depth, amm.sqrt_depth).ok_or(AmmError::DepthOverflow)?;
            if old_swap_invariant == new_swap_invariant {
                return Ok(Coin::zero(engine.collateral_denom()));
            }

            let cost = amm.calc_swap_invariant_cost(new_swap_invariant)?;
            let cost_paid = engine.handle_market_update_cost(cost)?;

            amm.update_swap_invariant(new_swap_invariant)?;
            engine.save_amm(&amm);

            engine.emit_event(EventPayload::ShiftSwapInvariant(ShiftSwapInvariantEvent {
                pair: pair.clone(),
                old_swap_invariant,
                new_swap_invariant,
                cost_paid: cost_paid.clone(),
            }));
            log::info!("swap invariant of {pair} moved {old_swap_invariant} -> {new_swap_invariant}, cost {cost}");
            Ok(cost_paid)
        })
    }

    /// Pays out of the ecosystem fund. `denom` defaults to the collateral.
    pub fn withdraw_from_perp_fund(
        &mut self,
        sender: &Address,
        amount: Decimal,
        to: &Address,
        denom: Option<&str>,
    ) -> Result<(), EngineError> {
        self.transact(|engine| {
            engine.ensure_authorized(sender)?;
            if amount <= Decimal::ZERO {
                return Err(EngineError::NonPositiveAmount(amount));
            }
            ensure_whole(amount)?;
            let denom = denom.map_or_else(|| engine.collateral_denom(), str::to_string);
            let funds = Coin::new(denom, amount);
            engine
                .ledger
                .bank
                .send_from_module_to_account(ModuleAccount::EcosystemFund, to, &funds)?;
            engine.emit_event(EventPayload::WithdrawFromPerpFund(WithdrawFromPerpFundEvent {
                to: to.clone(),
                funds,
            }));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::bank::Holder;
    use crate::types::Direction;
    use rust_decimal_macros::dec;

    fn btc_args() -> CreateMarketArgs {
        CreateMarketArgs {
            pair: btc(),
            price_multiplier: dec!(1),
            sqrt_depth: dec!(1_000_000),
            market: None,
            enable: true,
        }
    }

    #[test]
    fn only_sudoers_administer() {
        let mut engine = setup_engine();
        assert_eq!(
            engine.close_market(&alice(), &btc()),
            Err(EngineError::Unauthorized(alice()))
        );
        assert_eq!(
            engine.change_collateral_denom(&alice(), "uusdc"),
            Err(EngineError::Unauthorized(alice()))
        );
    }

    #[test]
    fn versions_increase_after_close() {
        let mut engine = setup_engine();
        assert_eq!(
            engine.create_market(&admin(), btc_args()),
            Err(EngineError::MarketAlreadyExists(btc()))
        );

        engine.close_market(&admin(), &btc()).unwrap();
        assert_eq!(engine.create_market(&admin(), btc_args()), Ok(2));

        assert_eq!(engine.market(&btc()).unwrap().version, 2);
        assert!(!engine.market_by_version(&btc(), 1).unwrap().enabled);
        assert_eq!(engine.amm(&btc()).unwrap().sqrt_depth, dec!(1_000_000));
    }

    #[test]
    fn closed_market_rejects_orders() {
        let mut engine = setup_engine();
        engine.close_market(&admin(), &btc()).unwrap();
        let err = engine
            .market_order(&btc(), Direction::Long, &alice(), dec!(10), dec!(1), Decimal::ZERO)
            .unwrap_err();
        assert_eq!(err, EngineError::MarketNotEnabled(btc()));
    }

    #[test]
    fn flat_market_repegs_for_free() {
        let mut engine = setup_engine();
        let paid = engine.shift_peg_multiplier(&admin(), &btc(), dec!(2)).unwrap();
        assert_eq!(paid, Coin::new(COLLATERAL, Decimal::ZERO));
        assert_eq!(engine.mark_price(&btc()).unwrap(), dec!(2));
    }

    #[test]
    fn repeg_with_long_bias_is_paid_by_ecosystem_fund() {
        let mut engine = setup_engine();
        engine
            .market_order(&btc(), Direction::Long, &alice(), dec!(1000), dec!(10), Decimal::ZERO)
            .unwrap();
        let fund_before = balance(&engine, Holder::Module(ModuleAccount::EcosystemFund));

        let paid = engine.shift_peg_multiplier(&admin(), &btc(), dec!(1.1)).unwrap();

        // ~10000 quote of long exposure gains 10%
        assert_eq!(paid.amount, dec!(1000));
        assert_eq!(
            balance(&engine, Holder::Module(ModuleAccount::EcosystemFund)),
            fund_before - dec!(1000)
        );
        assert!(engine
            .events()
            .iter()
            .any(|e| matches!(e.payload, EventPayload::ShiftPegMultiplier(_))));
    }

    #[test]
    fn swap_invariant_shift_keeps_price() {
        let mut engine = setup_engine();
        let price = engine.mark_price(&btc()).unwrap();
        engine
            .shift_swap_invariant(&admin(), &btc(), dec!(4_000_000_000_000_000_000_000_000))
            .unwrap();
        let amm = engine.amm(&btc()).unwrap();
        assert!((amm.sqrt_depth - dec!(2_000_000_000_000)).abs() < dec!(0.000001));
        assert_eq!(engine.mark_price(&btc()).unwrap(), price);
    }

    #[test]
    fn perp_fund_withdrawal() {
        let mut engine = setup_engine();
        engine
            .withdraw_from_perp_fund(&admin(), dec!(100), &bob(), None)
            .unwrap();
        assert_eq!(balance(&engine, Holder::Account(bob())), dec!(1_000_100));
        assert!(engine
            .withdraw_from_perp_fund(&admin(), dec!(100), &bob(), Some("uatom"))
            .is_err());

        let err = engine
            .withdraw_from_perp_fund(&admin(), dec!(2.5), &bob(), None)
            .unwrap_err();
        assert_eq!(err, EngineError::FractionalAmount(dec!(2.5)));
        assert_eq!(balance(&engine, Holder::Account(bob())), dec!(1_000_100));
    }
}
