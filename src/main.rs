//! vAMM Perpetuals Simulation.
//!
//! Walks the settlement engine through a market's life: trading against the
//! virtual pool, margin management, funding epochs, liquidations, and finally
//! closing the market and settling what is left.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use vamm_perps::*;

const COLLATERAL: &str = "unusd";
const BLOCK_MS: i64 = 5_000;

type SimResult = Result<(), EngineError>;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("vAMM Perpetuals Settlement Simulation");
    println!("Pegged virtual pool, isolated margin, full market lifecycle\n");

    let scenarios: [(&str, fn() -> SimResult); 6] = [
        ("basic trading", scenario_1_basic_trading),
        ("margin management", scenario_2_margin_management),
        ("funding epochs", scenario_3_funding_epochs),
        ("liquidation batch", scenario_4_liquidation_batch),
        ("repeg and settlement", scenario_5_repeg_and_settlement),
        ("many traders", scenario_6_many_traders),
    ];

    for (name, scenario) in scenarios {
        if let Err(err) = scenario() {
            eprintln!("scenario '{name}' failed: {err}");
            std::process::exit(1);
        }
    }

    println!("\nAll simulations completed successfully.");
}

fn address(name: &str) -> Result<Address, EngineError> {
    Ok(Address::new(name)?)
}

fn btc() -> Result<Pair, EngineError> {
    Ok(Pair::new("ubtc", COLLATERAL)?)
}

fn coin(amount: Decimal) -> Coin {
    Coin::new(COLLATERAL, amount)
}

fn oracle(btc_price: Decimal) -> Result<StaticOracle, EngineError> {
    let mut oracle = StaticOracle::new();
    oracle.set_price(Pair::new("ubtc", "uusd")?, btc_price);
    oracle.set_price(Pair::new(COLLATERAL, "uusd")?, dec!(1));
    oracle.set_price(Pair::new("unibi", "uusd")?, dec!(2));
    Ok(oracle)
}

/// Engine with one btc market at the given depth, ecosystem fund seeded.
fn new_engine(admin: &Address, sqrt_depth: Decimal) -> Result<Engine, EngineError> {
    let mut epochs = StaticEpochs::new();
    epochs.insert("30 min", chrono::Duration::minutes(30));
    epochs.insert("week", chrono::Duration::weeks(1));

    let mut engine = Engine::new(
        EngineConfig::default(),
        BankLedger::new(),
        Box::new(oracle(dec!(1))?),
        Box::new(epochs),
        Box::new(Sudoers::new([admin.clone()])),
    );
    engine.set_block(1, Timestamp::from_millis(1_700_000_000_000));

    engine.create_market(
        admin,
        CreateMarketArgs {
            pair: btc()?,
            price_multiplier: dec!(1),
            sqrt_depth,
            market: None,
            enable: true,
        },
    )?;
    engine
        .bank_mut()
        .fund(Holder::Module(ModuleAccount::EcosystemFund), coin(dec!(10_000_000)));
    Ok(engine)
}

fn fund(engine: &mut Engine, trader: &Address, amount: Decimal) {
    engine.bank_mut().fund(Holder::Account(trader.clone()), coin(amount));
}

fn balance(engine: &Engine, holder: Holder) -> Decimal {
    engine.bank().balance(&holder, COLLATERAL)
}

/// Open, extend, partially close and close a long against the pool.
fn scenario_1_basic_trading() -> SimResult {
    println!("Scenario 1: Basic Trading\n");

    let admin = address("admin")?;
    let alice = address("alice")?;
    let pair = btc()?;
    let mut engine = new_engine(&admin, dec!(1_000_000_000_000))?;
    fund(&mut engine, &alice, dec!(100_000));

    println!("  Pool depth 1e12, peg 1, mark ${}", engine.mark_price(&pair)?);

    let resp = engine.market_order(&pair, Direction::Long, &alice, dec!(1000), dec!(10), Decimal::ZERO)?;
    println!(
        "  Alice opens 10x long with 1000 margin: size {}, notional {}",
        resp.position.size.value(),
        resp.position.open_notional
    );
    engine.advance_block(BLOCK_MS);

    let resp = engine.market_order(&pair, Direction::Long, &alice, dec!(500), dec!(5), Decimal::ZERO)?;
    println!("  Alice adds 500 at 5x: size {}", resp.position.size.value());
    engine.advance_block(BLOCK_MS);

    let half = resp.position.size.abs() / dec!(2);
    let resp = engine.partial_close(&pair, &alice, half)?;
    println!(
        "  Alice closes half: realized pnl {}, remaining size {}",
        resp.realized_pnl,
        resp.position.size.value()
    );
    engine.advance_block(BLOCK_MS);

    let resp = engine.close_position(&pair, &alice)?;
    println!("  Alice closes the rest: margin returned {}", -resp.margin_to_vault);
    println!(
        "  Alice balance ${}, vault ${}, fee pool ${}\n",
        balance(&engine, Holder::Account(alice)),
        balance(&engine, Holder::Module(ModuleAccount::Vault)),
        balance(&engine, Holder::Module(ModuleAccount::FeePool))
    );
    Ok(())
}

/// Margin top up and withdrawal against maintenance requirements.
fn scenario_2_margin_management() -> SimResult {
    println!("Scenario 2: Margin Management\n");

    let admin = address("admin")?;
    let bob = address("bob")?;
    let pair = btc()?;
    let mut engine = new_engine(&admin, dec!(1_000_000_000_000))?;
    fund(&mut engine, &bob, dec!(100_000));

    engine.market_order(&pair, Direction::Short, &bob, dec!(2000), dec!(8), Decimal::ZERO)?;
    println!("  Bob opens 8x short with 2000 margin");

    let result = engine.add_margin(&pair, &bob, coin(dec!(1000)))?;
    println!("  Bob adds 1000: margin {}", result.position.margin);

    let result = engine.remove_margin(&pair, &bob, coin(dec!(1500)))?;
    println!("  Bob removes 1500: margin {}", result.position.margin);

    match engine.remove_margin(&pair, &bob, coin(dec!(1400))) {
        Ok(_) => println!("  Unexpected: withdrawal under maintenance accepted"),
        Err(err) => println!("  Withdrawing 1400 more is refused: {err}"),
    }
    println!("  Margin after refusal: {}\n", engine.position(&pair, &bob)?.margin);
    Ok(())
}

/// Funding paid by the crowded side when the mark trades over index.
fn scenario_3_funding_epochs() -> SimResult {
    println!("Scenario 3: Funding Epochs\n");

    let admin = address("admin")?;
    let long = address("long_trader")?;
    let short = address("short_trader")?;
    let pair = btc()?;
    let mut engine = new_engine(&admin, dec!(1_000_000_000_000))?;
    fund(&mut engine, &long, dec!(1_000_000_000));
    fund(&mut engine, &short, dec!(100_000));

    engine.market_order(&pair, Direction::Long, &long, dec!(50_000_000), dec!(10), Decimal::ZERO)?;
    engine.market_order(&pair, Direction::Short, &short, dec!(10_000), dec!(5), Decimal::ZERO)?;
    println!("  Longs push the mark to ${}", engine.mark_price(&pair)?);

    for epoch in 1..=3 {
        engine.advance_block(30 * 60 * 1000);
        engine.after_epoch_end("30 min", epoch)?;
        let rate = engine.events().iter().rev().find_map(|event| match &event.payload {
            EventPayload::FundingRateChanged(changed) => Some(changed.latest_funding_rate),
            _ => None,
        });
        println!(
            "  Epoch {epoch}: funding rate {:?}, cumulative premium {}",
            rate,
            engine.market(&pair)?.latest_cumulative_premium_fraction
        );
    }

    let long_resp = engine.close_position(&pair, &long)?;
    let short_resp = engine.close_position(&pair, &short)?;
    println!(
        "  Funding paid on close: long {}, short {}\n",
        long_resp.funding_payment, short_resp.funding_payment
    );
    Ok(())
}

/// A batch where some requests fail and one succeeds.
fn scenario_4_liquidation_batch() -> SimResult {
    println!("Scenario 4: Liquidation Batch\n");

    let admin = address("admin")?;
    let aggressive = address("aggressive")?;
    let conservative = address("conservative")?;
    let whale = address("whale")?;
    let keeper = address("keeper")?;
    let pair = btc()?;
    let mut engine = new_engine(&admin, dec!(1_000_000_000_000))?;
    fund(&mut engine, &aggressive, dec!(10_000));
    fund(&mut engine, &conservative, dec!(10_000));
    fund(&mut engine, &whale, dec!(100_000_000_000));

    engine.market_order(&pair, Direction::Long, &aggressive, dec!(1000), dec!(10), Decimal::ZERO)?;
    engine.market_order(&pair, Direction::Long, &conservative, dec!(5000), dec!(2), Decimal::ZERO)?;
    engine.advance_block(BLOCK_MS);

    engine.market_order(&pair, Direction::Short, &whale, dec!(4_870_000_000), dec!(10), Decimal::ZERO)?;
    println!("  Whale dumps, mark falls to ${}", engine.mark_price(&pair)?);
    engine.advance_block(BLOCK_MS);

    let requests = [
        LiquidationRequest {
            pair: pair.clone(),
            trader: aggressive.clone(),
        },
        LiquidationRequest {
            pair: pair.clone(),
            trader: conservative.clone(),
        },
        LiquidationRequest {
            pair: Pair::new("ueth", COLLATERAL)?,
            trader: aggressive.clone(),
        },
    ];
    let responses = engine.multi_liquidate(&keeper, &requests)?;
    for response in &responses {
        match &response.error {
            None => println!(
                "  {} liquidated, keeper fee {:?}",
                response.trader,
                response.liquidator_fee.as_ref().map(|fee| fee.amount)
            ),
            Some(err) => println!("  {} in {} skipped: {err}", response.trader, response.pair),
        }
    }

    let mut collector = EventCollector::new();
    engine.drain_events_into(&mut collector);
    println!(
        "  {} events drained, {} liquidation failures recorded",
        collector.events.len(),
        collector.liquidation_failures().count()
    );
    println!("  Keeper balance ${}\n", balance(&engine, Holder::Account(keeper)));
    Ok(())
}

/// Governance repegs, closes the market and traders settle at the fixed price.
fn scenario_5_repeg_and_settlement() -> SimResult {
    println!("Scenario 5: Repeg and Settlement\n");

    let admin = address("admin")?;
    let alice = address("alice")?;
    let bob = address("bob")?;
    let pair = btc()?;
    let mut engine = new_engine(&admin, dec!(1_000_000_000_000))?;
    fund(&mut engine, &alice, dec!(100_000));
    fund(&mut engine, &bob, dec!(100_000));

    engine.market_order(&pair, Direction::Long, &alice, dec!(3000), dec!(10), Decimal::ZERO)?;
    engine.market_order(&pair, Direction::Short, &bob, dec!(1000), dec!(10), Decimal::ZERO)?;

    engine.set_oracle(Box::new(oracle(dec!(1.05))?));
    let cost = engine.shift_peg_multiplier(&admin, &pair, dec!(1.05))?;
    println!("  Peg moved to 1.05, ecosystem fund paid {}", cost.amount);

    let cost = engine.shift_swap_invariant(&admin, &pair, dec!(4_000_000_000_000_000_000_000_000))?;
    println!("  Depth doubled, ecosystem fund paid {}", cost.amount);
    engine.advance_block(BLOCK_MS);

    let version = engine.market(&pair)?.version;
    let settlement_price = engine.close_market(&admin, &pair)?;
    println!("  Market closed at settlement price {settlement_price}");

    for trader in [&alice, &bob] {
        let resp = engine.settle_position(&pair, version, trader)?;
        println!(
            "  {trader} settles: realized pnl {}, paid out {}",
            resp.realized_pnl, -resp.margin_to_vault
        );
    }

    let version = engine.create_market(
        &admin,
        CreateMarketArgs {
            pair: pair.clone(),
            price_multiplier: dec!(1.05),
            sqrt_depth: dec!(1_000_000_000_000),
            market: None,
            enable: true,
        },
    )?;
    println!("  Market relaunched as version {version}\n");
    Ok(())
}

/// Many small traders against a shallow pool, with rebates and a liquidation sweep.
fn scenario_6_many_traders() -> SimResult {
    println!("Scenario 6: Many Traders\n");

    let admin = address("admin")?;
    let keeper = address("keeper")?;
    let pair = btc()?;
    let mut engine = new_engine(&admin, dec!(10_000_000))?;
    engine.set_dnr_epoch_name(&admin, "week")?;
    engine.set_global_rebate(&admin, dec!(0), dec!(0.0005))?;
    engine.after_epoch_end("week", 1)?;

    let traders = (0..20)
        .map(|i| address(&format!("trader{i}")))
        .collect::<Result<Vec<_>, _>>()?;
    for (i, trader) in traders.iter().enumerate() {
        fund(&mut engine, trader, dec!(10_000));
        let direction = if i % 3 == 0 { Direction::Short } else { Direction::Long };
        let margin = Decimal::from(100 + 25 * i as i64);
        let leverage = Decimal::from(2 + (i % 9) as i64);
        if let Err(err) = engine.market_order(&pair, direction, trader, margin, leverage, Decimal::ZERO) {
            println!("  {trader} order rejected: {err}");
        }
        engine.advance_block(BLOCK_MS);
    }
    println!("  After the crowd: mark ${}, bias {}", engine.mark_price(&pair)?, engine.amm(&pair)?.bias());

    // last week's volume now earns rebates on new trades
    engine.after_epoch_end("week", 2)?;
    for trader in traders.iter().take(5) {
        if engine.position(&pair, trader).is_ok() {
            engine.add_margin(&pair, trader, coin(dec!(50)))?;
        }
        if let Err(err) = engine.market_order(&pair, Direction::Long, trader, dec!(100), dec!(2), Decimal::ZERO) {
            println!("  {trader} follow-up rejected: {err}");
        }
        engine.advance_block(BLOCK_MS);
    }

    let shock = address("shock")?;
    fund(&mut engine, &shock, dec!(10_000_000));
    engine.market_order(&pair, Direction::Short, &shock, dec!(200_000), dec!(10), Decimal::ZERO)?;
    engine.advance_block(BLOCK_MS);
    println!("  Shock short moves the mark to ${}", engine.mark_price(&pair)?);

    let requests: Vec<_> = traders
        .iter()
        .map(|trader| LiquidationRequest {
            pair: pair.clone(),
            trader: trader.clone(),
        })
        .collect();
    match engine.multi_liquidate(&keeper, &requests) {
        Ok(responses) => {
            let liquidated = responses.iter().filter(|r| r.success).count();
            println!("  Liquidated {liquidated}/{} positions", responses.len());
        }
        Err(EngineError::AllLiquidationsFailed(_)) => println!("  Every position survived the shock"),
        Err(err) => return Err(err),
    }

    let open = traders
        .iter()
        .filter(|trader| engine.position(&pair, trader).is_ok())
        .count();
    println!("  Open positions: {open}/{}", traders.len());
    println!("  Rebates minted: {} unibi", engine.bank().total_supply("unibi"));
    println!("  Events retained: {}\n", engine.events().len());
    Ok(())
}
