//! Stress tests: liquidation cascades, long funding runs, market churn and
//! high event volume.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use vamm_perps::*;

const COLLATERAL: &str = "unusd";

fn addr(name: &str) -> Address {
    Address::new(name).unwrap()
}

fn btc() -> Pair {
    Pair::new("ubtc", COLLATERAL).unwrap()
}

fn admin() -> Address {
    addr("admin")
}

fn btc_market_args() -> CreateMarketArgs {
    CreateMarketArgs {
        pair: btc(),
        price_multiplier: dec!(1),
        sqrt_depth: dec!(1_000_000_000_000),
        market: None,
        enable: true,
    }
}

fn setup_with(config: EngineConfig) -> Engine {
    let mut oracle = StaticOracle::new();
    oracle.set_price(Pair::new("ubtc", "uusd").unwrap(), dec!(1));
    oracle.set_price(Pair::new(COLLATERAL, "uusd").unwrap(), dec!(1));

    let mut epochs = StaticEpochs::new();
    epochs.insert("30 min", chrono::Duration::minutes(30));

    let mut engine = Engine::new(
        config,
        BankLedger::new(),
        Box::new(oracle),
        Box::new(epochs),
        Box::new(Sudoers::new([admin()])),
    );
    engine.set_block(1, Timestamp::from_millis(1_700_000_000_000));
    engine.create_market(&admin(), btc_market_args()).unwrap();
    engine
        .bank_mut()
        .fund(Holder::Module(ModuleAccount::EcosystemFund), Coin::new(COLLATERAL, dec!(10_000_000)));
    engine
}

fn setup() -> Engine {
    setup_with(EngineConfig::default())
}

fn fund(engine: &mut Engine, trader: &Address, amount: Decimal) {
    engine
        .bank_mut()
        .fund(Holder::Account(trader.clone()), Coin::new(COLLATERAL, amount));
}

fn supply(engine: &Engine) -> Decimal {
    engine.bank().total_supply(COLLATERAL)
}

mod cascade_tests {
    use super::*;

    /// Longs at increasing leverage, then a ~9.5% dump.
    fn dumped_engine(leverages: &[i64]) -> (Engine, Vec<Address>) {
        let mut engine = setup();
        let traders: Vec<Address> = leverages.iter().map(|l| addr(&format!("long{l}x"))).collect();
        for (trader, leverage) in traders.iter().zip(leverages) {
            fund(&mut engine, trader, dec!(10_000));
            engine
                .market_order(&btc(), Direction::Long, trader, dec!(1000), Decimal::from(*leverage), Decimal::ZERO)
                .unwrap();
        }

        let whale = addr("whale");
        fund(&mut engine, &whale, dec!(100_000_000_000));
        engine
            .market_order(&btc(), Direction::Short, &whale, dec!(4_870_000_000), dec!(10), Decimal::ZERO)
            .unwrap();
        (engine, traders)
    }

    #[test]
    fn cascade_liquidates_only_overleveraged() {
        let leverages = [2, 3, 5, 7, 8, 10];
        let (mut engine, traders) = dumped_engine(&leverages);
        let initial_supply = supply(&engine);
        engine.advance_block(5_000);

        let requests: Vec<LiquidationRequest> = traders
            .iter()
            .map(|trader| LiquidationRequest {
                pair: btc(),
                trader: trader.clone(),
            })
            .collect();
        let responses = engine.multi_liquidate(&addr("keeper"), &requests).unwrap();

        let outcome: Vec<bool> = responses.iter().map(|r| r.success).collect();
        assert_eq!(outcome, vec![false, false, false, true, true, true]);

        // 7x is only partially closed, 8x and 10x are gone
        assert!(engine.position(&btc(), &traders[3]).is_ok());
        assert!(engine.position(&btc(), &traders[4]).is_err());
        assert!(engine.position(&btc(), &traders[5]).is_err());

        let mut collector = EventCollector::new();
        engine.drain_events_into(&mut collector);
        assert_eq!(collector.liquidation_failures().count(), 3);
        assert!(collector
            .liquidation_failures()
            .all(|failure| failure.reason == LiquidationFailedReason::PositionHealthy));
        assert_eq!(supply(&engine), initial_supply);
    }

    #[test]
    fn repeated_batches_drain_remaining_risk() {
        let leverages = [7, 7, 7];
        let (mut engine, traders) = dumped_engine(&leverages);
        engine.advance_block(5_000);

        let requests: Vec<LiquidationRequest> = traders
            .iter()
            .map(|trader| LiquidationRequest {
                pair: btc(),
                trader: trader.clone(),
            })
            .collect();

        let first = engine.multi_liquidate(&addr("keeper"), &requests).unwrap();
        assert!(first.iter().all(|r| r.success));

        // survivors of a partial pass may still be under maintenance
        for _ in 0..5 {
            engine.advance_block(5_000);
            match engine.multi_liquidate(&addr("keeper"), &requests) {
                Ok(responses) => assert!(responses.iter().any(|r| r.success)),
                Err(err) => {
                    assert!(matches!(err, EngineError::AllLiquidationsFailed(_)));
                    break;
                }
            }
        }
        assert!(engine.bank().balance(&Holder::Account(addr("keeper")), COLLATERAL) > Decimal::ZERO);
    }

    #[test]
    fn failed_batch_leaves_no_trace() {
        let mut engine = setup();
        let alice = addr("alice");
        fund(&mut engine, &alice, dec!(10_000));
        engine
            .market_order(&btc(), Direction::Long, &alice, dec!(1000), dec!(5), Decimal::ZERO)
            .unwrap();

        let events_before = engine.events().len();
        let position_before = engine.position(&btc(), &alice).unwrap();

        let requests = vec![
            LiquidationRequest {
                pair: btc(),
                trader: alice.clone(),
            },
            LiquidationRequest {
                pair: btc(),
                trader: addr("ghost"),
            },
        ];
        let err = engine.multi_liquidate(&addr("keeper"), &requests).unwrap_err();
        assert!(matches!(err, EngineError::AllLiquidationsFailed(_)));

        assert_eq!(engine.events().len(), events_before);
        assert_eq!(engine.position(&btc(), &alice).unwrap(), position_before);
    }
}

mod funding_tests {
    use super::*;

    #[test]
    fn long_bias_pays_funding_every_epoch() {
        let mut engine = setup();
        let long = addr("long");
        let short = addr("short");
        fund(&mut engine, &long, dec!(1_000_000_000));
        fund(&mut engine, &short, dec!(100_000));
        let initial_supply = supply(&engine);

        engine
            .market_order(&btc(), Direction::Long, &long, dec!(50_000_000), dec!(10), Decimal::ZERO)
            .unwrap();
        engine
            .market_order(&btc(), Direction::Short, &short, dec!(1_000), dec!(10), Decimal::ZERO)
            .unwrap();

        let mut last_cpf = Decimal::ZERO;
        for epoch in 1..=40 {
            engine.advance_block(30 * 60 * 1000);
            engine.after_epoch_end("30 min", epoch).unwrap();
            let cpf = engine.market(&btc()).unwrap().latest_cumulative_premium_fraction;
            assert!(cpf > last_cpf, "epoch {epoch}: {cpf} <= {last_cpf}");
            last_cpf = cpf;
        }

        let long_resp = engine.close_position(&btc(), &long).unwrap();
        let short_resp = engine.close_position(&btc(), &short).unwrap();
        assert!(long_resp.funding_payment > Decimal::ZERO);
        assert!(short_resp.funding_payment < Decimal::ZERO);
        assert_eq!(supply(&engine), initial_supply);
    }
}

mod churn_tests {
    use super::*;

    #[test]
    fn market_versions_churn() {
        let mut engine = setup();
        let alice = addr("alice");
        fund(&mut engine, &alice, dec!(1_000_000));
        let initial_supply = supply(&engine);

        for version in 1..=5u64 {
            assert_eq!(engine.market(&btc()).unwrap().version, version);
            engine
                .market_order(&btc(), Direction::Long, &alice, dec!(1000), dec!(3), Decimal::ZERO)
                .unwrap();
            engine.advance_block(5_000);
            engine.close_market(&admin(), &btc()).unwrap();
            assert_eq!(engine.create_market(&admin(), btc_market_args()), Ok(version + 1));
        }

        // the live version knows nothing of the old positions
        assert!(engine.position(&btc(), &alice).is_err());
        for version in 1..=5u64 {
            engine.settle_position(&btc(), version, &alice).unwrap();
        }
        assert_eq!(supply(&engine), initial_supply);
    }

    #[test]
    fn many_traders_open_and_close() {
        let mut engine = setup_with(EngineConfig {
            max_events: 50,
            ..EngineConfig::default()
        });
        let traders: Vec<Address> = (0..40).map(|i| addr(&format!("trader{i}"))).collect();
        for trader in &traders {
            fund(&mut engine, trader, dec!(100_000));
        }
        let initial_supply = supply(&engine);

        for (i, trader) in traders.iter().enumerate() {
            let direction = if i % 2 == 0 { Direction::Long } else { Direction::Short };
            engine
                .market_order(&btc(), direction, trader, Decimal::from(100 + i as i64 * 10), dec!(4), Decimal::ZERO)
                .unwrap();
            engine.advance_block(1_000);
        }
        for trader in &traders {
            engine.close_position(&btc(), trader).unwrap();
            engine.advance_block(1_000);
        }

        assert_eq!(engine.events().len(), 50);
        let ids: Vec<u64> = engine.events().iter().map(|event| event.id.0).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(ids[49] - ids[0], 49);
        assert!(ids[0] > 1);
        assert!(engine.amm(&btc()).unwrap().bias().abs() < dec!(0.000000001));
        assert_eq!(supply(&engine), initial_supply);
    }
}
