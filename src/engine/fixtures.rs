// shared setup for the engine test modules.

use super::admin::CreateMarketArgs;
use super::config::EngineConfig;
use super::core::Engine;
use crate::bank::{Bank, BankLedger, Holder, ModuleAccount};
use crate::funding::StaticEpochs;
use crate::oracle::StaticOracle;
use crate::sudo::Sudoers;
use crate::types::{Address, Coin, Pair, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub(super) const COLLATERAL: &str = "unusd";
pub(super) const START_HEIGHT: i64 = 1;
pub(super) const START_MS: i64 = 1_700_000_000_000;

pub(super) fn admin() -> Address {
    Address::new("admin").unwrap()
}

pub(super) fn alice() -> Address {
    Address::new("alice").unwrap()
}

pub(super) fn bob() -> Address {
    Address::new("bob").unwrap()
}

pub(super) fn liquidator() -> Address {
    Address::new("liquidator").unwrap()
}

pub(super) fn btc() -> Pair {
    "ubtc:unusd".parse().unwrap()
}

pub(super) fn oracle_with_btc(price: Decimal) -> StaticOracle {
    let mut oracle = StaticOracle::new();
    oracle.set_price("ubtc:uusd".parse().unwrap(), price);
    oracle.set_price("unusd:uusd".parse().unwrap(), dec!(1));
    oracle.set_price("unibi:uusd".parse().unwrap(), dec!(2));
    oracle
}

/// Engine with one enabled 1e12 x 1e12 btc market, funded traders and a funded ecosystem fund.
pub(super) fn setup_engine() -> Engine {
    let mut epochs = StaticEpochs::new();
    epochs.insert("30 min", chrono::Duration::minutes(30));

    let mut engine = Engine::new(
        EngineConfig::default(),
        BankLedger::new(),
        Box::new(oracle_with_btc(dec!(1))),
        Box::new(epochs),
        Box::new(Sudoers::new([admin()])),
    );
    engine.set_block(START_HEIGHT, Timestamp::from_millis(START_MS));

    engine
        .create_market(
            &admin(),
            CreateMarketArgs {
                pair: btc(),
                price_multiplier: dec!(1),
                sqrt_depth: dec!(1_000_000_000_000),
                market: None,
                enable: true,
            },
        )
        .unwrap();

    fund(&mut engine, &alice(), dec!(1_000_000));
    fund(&mut engine, &bob(), dec!(1_000_000));
    engine
        .bank_mut()
        .fund(Holder::Module(ModuleAccount::EcosystemFund), Coin::new(COLLATERAL, dec!(1_000_000)));
    engine
}

pub(super) fn fund(engine: &mut Engine, trader: &Address, amount: Decimal) {
    engine
        .bank_mut()
        .fund(Holder::Account(trader.clone()), Coin::new(COLLATERAL, amount));
}

pub(super) fn balance(engine: &Engine, holder: Holder) -> Decimal {
    engine.bank().balance(&holder, COLLATERAL)
}

pub(super) fn vault(engine: &Engine) -> Decimal {
    balance(engine, Holder::Module(ModuleAccount::Vault))
}
