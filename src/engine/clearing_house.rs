// 8.9 engine/clearing_house.rs: position lifecycle.
//
// market orders either grow a position (increase) or trade against it (reverse).
// a reverse smaller than the position decreases it; a larger one closes it and
// opens the remainder on the other side. every path ends in after_position_update,
// which checks margin, moves collateral, charges fees and records the event.

use super::core::Engine;
use super::results::{ensure_whole, EngineError};
use crate::amm::Amm;
use crate::bank::{Bank, ModuleAccount};
use crate::events::{EventPayload, PositionChangedEvent};
use crate::market::Market;
use crate::math::{mul, quo, round_int};
use crate::position::{position_notional_spot, preferred_position_notional, ChangeReason, Position, PositionResp};
use crate::store::{MarketKey, PositionKey};
use crate::types::{Address, Coin, Direction, Pair};
use rust_decimal::Decimal;

/// How much of a position a decrease trades away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DecreaseAmount {
    /// Quote notional, swapped through the quote side with a base limit.
    Notional { amount: Decimal, base_limit: Decimal },
    /// Exact base size.
    Size(Decimal),
}

pub(super) fn market_key(market: &Market) -> MarketKey {
    MarketKey {
        pair: market.pair.clone(),
        version: market.version,
    }
}

impl<B: Bank> Engine<B> {
    // 8.9.1: public operations

    /// Opens, grows, shrinks or flips the trader's position with `quote_amt * leverage` notional.
    pub fn market_order(
        &mut self,
        pair: &Pair,
        direction: Direction,
        trader: &Address,
        quote_amt: Decimal,
        leverage: Decimal,
        base_amt_limit: Decimal,
    ) -> Result<PositionResp, EngineError> {
        self.transact(|engine| {
            let market = engine.enabled_market(pair)?;
            if quote_amt <= Decimal::ZERO {
                return Err(EngineError::NonPositiveQuoteAmount(quote_amt));
            }
            ensure_whole(quote_amt)?;
            if leverage <= Decimal::ZERO {
                return Err(EngineError::NonPositiveLeverage(leverage));
            }
            if leverage > market.max_leverage {
                return Err(EngineError::LeverageTooHigh {
                    leverage,
                    max: market.max_leverage,
                });
            }

            let amm = engine.amm_for(&market)?;
            let position = engine.position_or_zero(&market, trader);
            let is_increase = position.size.direction().map_or(true, |current| current == direction);

            let (amm, resp) = if is_increase {
                let notional = mul(leverage, quote_amt).ok_or(EngineError::NotionalOverflow)?;
                engine.increase_position(&market, amm, position, direction, notional, leverage, base_amt_limit)?
            } else {
                engine.open_reverse_position(&market, amm, position, quote_amt, leverage, base_amt_limit)?
            };

            engine.after_position_update(&market, &amm, trader, &resp, ChangeReason::MarketOrder)?;
            log::debug!(
                "market order {} {:?} by {}: size {} -> {}",
                pair,
                direction,
                trader,
                resp.exchanged_position_size,
                resp.position.size
            );
            Ok(resp)
        })
    }

    /// Closes the whole position at spot.
    pub fn close_position(&mut self, pair: &Pair, trader: &Address) -> Result<PositionResp, EngineError> {
        self.transact(|engine| {
            let market = engine.enabled_market(pair)?;
            let amm = engine.amm_for(&market)?;
            let position = engine.existing_position(&market, trader)?;

            let (amm, resp) = engine.close_position_entirely(&market, amm, position, Decimal::ZERO)?;
            engine.realize_bad_debt(&market_key(&market), round_int(resp.bad_debt))?;
            engine.after_position_update(&market, &amm, trader, &resp, ChangeReason::ClosePosition)?;
            Ok(resp)
        })
    }

    /// Closes exactly `size` base of the position. Closing the full size is a close.
    pub fn partial_close(&mut self, pair: &Pair, trader: &Address, size: Decimal) -> Result<PositionResp, EngineError> {
        self.transact(|engine| {
            if size <= Decimal::ZERO {
                return Err(EngineError::NonPositiveSize(size));
            }
            let market = engine.enabled_market(pair)?;
            let amm = engine.amm_for(&market)?;
            let position = engine.existing_position(&market, trader)?;

            let available = position.size.abs();
            if size > available {
                return Err(EngineError::SizeExceedsPosition {
                    requested: size,
                    available,
                });
            }

            let (amm, resp) = if size == available {
                engine.close_position_entirely(&market, amm, position, Decimal::ZERO)?
            } else {
                engine.decrease_position(&market, amm, position, DecreaseAmount::Size(size))?
            };
            engine.realize_bad_debt(&market_key(&market), round_int(resp.bad_debt))?;
            engine.after_position_update(&market, &amm, trader, &resp, ChangeReason::PartialClose)?;
            Ok(resp)
        })
    }

    /// Closes a position of a disabled market version at its settlement price.
    pub fn settle_position(&mut self, pair: &Pair, version: u64, trader: &Address) -> Result<PositionResp, EngineError> {
        self.transact(|engine| {
            let market = engine.market_by_version(pair, version)?;
            if market.enabled {
                return Err(EngineError::MarketEnabled(pair.clone()));
            }
            let amm = engine.amm_by_version(pair, version)?;
            let key = PositionKey {
                pair: pair.clone(),
                version,
                trader: trader.clone(),
            };
            let position = engine
                .ledger
                .state
                .positions
                .get(&key)
                .cloned()
                .ok_or_else(|| EngineError::PositionNotFound {
                    pair: pair.clone(),
                    trader: trader.clone(),
                })?;

            let notional = mul(amm.settlement_price, position.size.abs()).ok_or(EngineError::NotionalOverflow)?;
            let unrealized = position.unrealized_pnl(notional);
            let funding = position
                .funding_payment(market.latest_cumulative_premium_fraction)
                .ok_or(EngineError::NotionalOverflow)?;
            let remaining = position.margin + unrealized - funding;
            let (margin_to_vault, bad_debt) = if remaining > Decimal::ZERO {
                (-remaining, Decimal::ZERO)
            } else {
                (Decimal::ZERO, -remaining)
            };

            let resp = PositionResp {
                position: Position::zero(
                    pair.clone(),
                    trader.clone(),
                    market.latest_cumulative_premium_fraction,
                    engine.block.height,
                ),
                exchanged_notional_value: notional,
                exchanged_position_size: -position.size.value(),
                bad_debt,
                funding_payment: funding,
                realized_pnl: unrealized,
                unrealized_pnl_after: Decimal::ZERO,
                margin_to_vault,
                position_notional: Decimal::ZERO,
            };

            let vault_key = market_key(&market);
            engine.realize_bad_debt(&vault_key, round_int(bad_debt))?;
            let payout = round_int(-margin_to_vault);
            engine.withdraw_from_vault(&vault_key, trader, payout)?;
            engine.delete_position(&key);

            let collateral = engine.collateral_denom();
            engine.emit_position_changed(
                &resp,
                Coin::zero(collateral.clone()),
                Coin::new(collateral, round_int(bad_debt)),
                payout,
                ChangeReason::Settlement,
            );
            Ok(resp)
        })
    }

    // 8.9.2: lookups shared with margin and liquidation paths

    pub(super) fn enabled_market(&self, pair: &Pair) -> Result<Market, EngineError> {
        let market = self.market(pair)?;
        if !market.enabled {
            return Err(EngineError::MarketNotEnabled(pair.clone()));
        }
        Ok(market)
    }

    pub(super) fn existing_position(&self, market: &Market, trader: &Address) -> Result<Position, EngineError> {
        self.position_in(market, trader)
            .ok_or_else(|| EngineError::PositionNotFound {
                pair: market.pair.clone(),
                trader: trader.clone(),
            })
    }

    /// Fails unless the margin ratio at the trader-preferred notional stays at or above maintenance.
    pub(super) fn check_margin_ratio(&self, market: &Market, amm: &Amm, position: &Position) -> Result<(), EngineError> {
        let spot = position_notional_spot(amm, position)?;
        let twap = self.position_notional_twap(position, market.twap_lookback_window())?;
        let notional = preferred_position_notional(position.size, spot, twap);
        let ratio = position
            .margin_ratio(notional, market.latest_cumulative_premium_fraction)
            .ok_or(EngineError::NotionalOverflow)?;
        if ratio < market.maintenance_margin_ratio {
            return Err(EngineError::MarginRatioTooLow {
                ratio,
                maintenance: market.maintenance_margin_ratio,
            });
        }
        Ok(())
    }

    // 8.9.3: primitives. each swaps against the pool and describes the new position.

    #[allow(clippy::too_many_arguments)]
    pub(super) fn increase_position(
        &mut self,
        market: &Market,
        amm: Amm,
        position: Position,
        direction: Direction,
        increased_notional: Decimal,
        leverage: Decimal,
        base_amt_limit: Decimal,
    ) -> Result<(Amm, PositionResp), EngineError> {
        let margin_increase = quo(increased_notional, leverage).ok_or(EngineError::NonPositiveLeverage(leverage))?;
        let funding = position
            .funding_payment(market.latest_cumulative_premium_fraction)
            .ok_or(EngineError::NotionalOverflow)?;
        let remaining_margin = position.margin + margin_increase - funding;
        let notional_before = position_notional_spot(&amm, &position)?;

        let (amm, base_amt) = self.swap_quote_asset(amm, direction, increased_notional, base_amt_limit)?;
        let exchanged_size = direction.sign() * base_amt;

        let (margin, bad_debt) = if remaining_margin < Decimal::ZERO {
            (Decimal::ZERO, -remaining_margin)
        } else {
            (remaining_margin, Decimal::ZERO)
        };
        let updated = Position {
            size: position.size.add(exchanged_size),
            margin,
            open_notional: position.open_notional + increased_notional,
            latest_cumulative_premium_fraction: market.latest_cumulative_premium_fraction,
            last_updated_block_number: self.block.height,
            ..position
        };
        let position_notional = notional_before + increased_notional;
        let unrealized_pnl_after = updated.unrealized_pnl(position_notional);

        Ok((
            amm,
            PositionResp {
                position: updated,
                exchanged_notional_value: increased_notional,
                exchanged_position_size: exchanged_size,
                bad_debt,
                funding_payment: funding,
                realized_pnl: Decimal::ZERO,
                unrealized_pnl_after,
                margin_to_vault: margin_increase,
                position_notional,
            },
        ))
    }

    pub(super) fn decrease_position(
        &mut self,
        market: &Market,
        amm: Amm,
        position: Position,
        amount: DecreaseAmount,
    ) -> Result<(Amm, PositionResp), EngineError> {
        if position.size.is_zero() {
            return Err(EngineError::PositionNotFound {
                pair: position.pair.clone(),
                trader: position.trader.clone(),
            });
        }
        let notional_before = position_notional_spot(&amm, &position)?;
        let unrealized = position.unrealized_pnl(notional_before);
        let direction = position.size.closing_direction();

        let (amm, exchanged_base, exchanged_notional) = match amount {
            DecreaseAmount::Notional { amount, base_limit } => {
                let (amm, base) = self.swap_quote_asset(amm, direction, amount, base_limit)?;
                (amm, base, amount)
            }
            DecreaseAmount::Size(size) => {
                let (amm, quote) = self.swap_base_asset(amm, direction, size, Decimal::ZERO)?;
                (amm, size, quote)
            }
        };
        let exchanged_size = direction.sign() * exchanged_base;

        let realized_pnl = quo(mul(unrealized, exchanged_base).ok_or(EngineError::NotionalOverflow)?, position.size.abs()).unwrap_or(Decimal::ZERO);
        let funding = position
            .funding_payment(market.latest_cumulative_premium_fraction)
            .ok_or(EngineError::NotionalOverflow)?;
        let remaining_margin = position.margin + realized_pnl - funding;
        let bad_debt = if remaining_margin < Decimal::ZERO {
            -remaining_margin
        } else {
            Decimal::ZERO
        };

        let unrealized_pnl_after = unrealized - realized_pnl;
        let position_notional = notional_before - exchanged_notional;
        let open_notional = if position.size.is_long() {
            position_notional - unrealized_pnl_after
        } else {
            position_notional + unrealized_pnl_after
        };
        if open_notional < Decimal::ZERO {
            return Err(EngineError::NegativeOpenNotional(open_notional));
        }

        let updated = Position {
            size: position.size.add(exchanged_size),
            margin: remaining_margin.max(Decimal::ZERO),
            open_notional,
            latest_cumulative_premium_fraction: market.latest_cumulative_premium_fraction,
            last_updated_block_number: self.block.height,
            ..position
        };

        Ok((
            amm,
            PositionResp {
                position: updated,
                exchanged_notional_value: exchanged_notional,
                exchanged_position_size: exchanged_size,
                bad_debt,
                funding_payment: funding,
                realized_pnl,
                unrealized_pnl_after,
                margin_to_vault: Decimal::ZERO,
                position_notional,
            },
        ))
    }

    /// Swaps the full size away. Whatever margin survives pnl and funding is owed back
    /// to the trader (negative margin_to_vault); a shortfall is bad debt.
    pub(super) fn close_position_entirely(
        &mut self,
        market: &Market,
        amm: Amm,
        position: Position,
        quote_amt_limit: Decimal,
    ) -> Result<(Amm, PositionResp), EngineError> {
        if position.size.is_zero() {
            return Err(EngineError::PositionNotFound {
                pair: position.pair.clone(),
                trader: position.trader.clone(),
            });
        }
        let notional_before = position_notional_spot(&amm, &position)?;
        let unrealized = position.unrealized_pnl(notional_before);
        let funding = position
            .funding_payment(market.latest_cumulative_premium_fraction)
            .ok_or(EngineError::NotionalOverflow)?;
        let remaining_margin = position.margin + unrealized - funding;
        let (margin_to_vault, bad_debt) = if remaining_margin > Decimal::ZERO {
            (-remaining_margin, Decimal::ZERO)
        } else {
            (Decimal::ZERO, -remaining_margin)
        };

        let (amm, exchanged_notional) = self.swap_base_asset(
            amm,
            position.size.closing_direction(),
            position.size.abs(),
            quote_amt_limit,
        )?;

        let closed = Position::zero(
            position.pair.clone(),
            position.trader.clone(),
            market.latest_cumulative_premium_fraction,
            self.block.height,
        );
        Ok((
            amm,
            PositionResp {
                position: closed,
                exchanged_notional_value: exchanged_notional,
                exchanged_position_size: -position.size.value(),
                bad_debt,
                funding_payment: funding,
                realized_pnl: unrealized,
                unrealized_pnl_after: Decimal::ZERO,
                margin_to_vault,
                position_notional: Decimal::ZERO,
            },
        ))
    }

    fn open_reverse_position(
        &mut self,
        market: &Market,
        amm: Amm,
        position: Position,
        quote_amt: Decimal,
        leverage: Decimal,
        base_amt_limit: Decimal,
    ) -> Result<(Amm, PositionResp), EngineError> {
        let notional = mul(leverage, quote_amt).ok_or(EngineError::NotionalOverflow)?;
        let current_notional = position_notional_spot(&amm, &position)?;

        if current_notional > notional {
            self.decrease_position(
                market,
                amm,
                position,
                DecreaseAmount::Notional {
                    amount: notional,
                    base_limit: base_amt_limit,
                },
            )
        } else {
            self.close_and_open_reverse_position(market, amm, position, quote_amt, leverage, base_amt_limit)
        }
    }

    fn close_and_open_reverse_position(
        &mut self,
        market: &Market,
        amm: Amm,
        position: Position,
        quote_amt: Decimal,
        leverage: Decimal,
        base_amt_limit: Decimal,
    ) -> Result<(Amm, PositionResp), EngineError> {
        let reverse_direction = position.size.closing_direction();
        let (pair, trader) = (position.pair.clone(), position.trader.clone());

        let (amm, close) = self.close_position_entirely(market, amm, position, Decimal::ZERO)?;
        if close.bad_debt > Decimal::ZERO {
            return Err(EngineError::UnderwaterPosition(close.bad_debt));
        }

        let remaining_notional = mul(leverage, quote_amt).ok_or(EngineError::NotionalOverflow)? - close.exchanged_notional_value;
        if remaining_notional <= Decimal::ZERO {
            return Ok((amm, close));
        }

        let closed_size = close.exchanged_position_size.abs();
        let base_limit = if base_amt_limit > Decimal::ZERO {
            let limit = base_amt_limit - closed_size;
            if limit < Decimal::ZERO {
                return Err(EngineError::BaseLimitBelowClosedSize {
                    limit: base_amt_limit,
                    closed: closed_size,
                });
            }
            limit
        } else {
            base_amt_limit
        };

        let fresh = Position::zero(pair, trader, market.latest_cumulative_premium_fraction, self.block.height);
        let (amm, open) = self.increase_position(
            market,
            amm,
            fresh,
            reverse_direction,
            remaining_notional,
            leverage,
            base_limit,
        )?;

        Ok((
            amm,
            PositionResp {
                exchanged_notional_value: close.exchanged_notional_value + open.exchanged_notional_value,
                exchanged_position_size: close.exchanged_position_size + open.exchanged_position_size,
                bad_debt: close.bad_debt + open.bad_debt,
                funding_payment: close.funding_payment + open.funding_payment,
                realized_pnl: close.realized_pnl + open.realized_pnl,
                margin_to_vault: close.margin_to_vault + open.margin_to_vault,
                ..open
            },
        ))
    }

    // 8.9.4: settlement of a primitive's result

    pub(super) fn after_position_update(
        &mut self,
        market: &Market,
        amm: &Amm,
        trader: &Address,
        resp: &PositionResp,
        reason: ChangeReason,
    ) -> Result<(), EngineError> {
        if reason == ChangeReason::MarketOrder && resp.bad_debt > Decimal::ZERO {
            return Err(EngineError::BadDebt(resp.bad_debt));
        }
        if !resp.position.size.is_zero() {
            self.check_margin_ratio(market, amm, &resp.position)?;
        }

        let collateral = self.collateral_denom();
        let margin_to_vault = round_int(resp.margin_to_vault);
        if margin_to_vault > Decimal::ZERO {
            self.ledger.bank.send_from_account_to_module(
                trader,
                ModuleAccount::Vault,
                &Coin::new(collateral.clone(), margin_to_vault),
            )?;
        } else if margin_to_vault < Decimal::ZERO {
            self.withdraw_from_vault(&market_key(market), trader, -margin_to_vault)?;
        }

        let fee = self.transfer_fee(market, trader, resp.exchanged_notional_value)?;
        self.save_position(market, resp.position.clone());

        self.emit_position_changed(
            resp,
            Coin::new(collateral.clone(), fee),
            Coin::new(collateral, round_int(resp.bad_debt)),
            -margin_to_vault - fee,
            reason,
        );
        Ok(())
    }

    /// Charges the exchange fee (after discounts) to the fee pool and the
    /// ecosystem fee to the ecosystem fund. Returns the total charged.
    pub(super) fn transfer_fee(
        &mut self,
        market: &Market,
        trader: &Address,
        exchanged_notional: Decimal,
    ) -> Result<Decimal, EngineError> {
        let notional = exchanged_notional.abs();
        let exchange_fee_ratio = self.apply_discounts_and_rebates(trader, notional, market.exchange_fee_ratio)?;
        let collateral = self.collateral_denom();

        let fee_to_pool = round_int(mul(exchange_fee_ratio, notional).ok_or(EngineError::NotionalOverflow)?);
        if fee_to_pool > Decimal::ZERO {
            self.ledger.bank.send_from_account_to_module(
                trader,
                ModuleAccount::FeePool,
                &Coin::new(collateral.clone(), fee_to_pool),
            )?;
        }

        let fee_to_ecosystem_fund = round_int(mul(market.ecosystem_fund_fee_ratio, notional).ok_or(EngineError::NotionalOverflow)?);
        if fee_to_ecosystem_fund > Decimal::ZERO {
            self.ledger.bank.send_from_account_to_module(
                trader,
                ModuleAccount::EcosystemFund,
                &Coin::new(collateral, fee_to_ecosystem_fund),
            )?;
        }

        Ok(fee_to_pool.max(Decimal::ZERO) + fee_to_ecosystem_fund.max(Decimal::ZERO))
    }

    pub(super) fn emit_position_changed(
        &mut self,
        resp: &PositionResp,
        transaction_fee: Coin,
        bad_debt: Coin,
        margin_to_user: Decimal,
        change_reason: ChangeReason,
    ) {
        let position = &resp.position;
        let position_notional = if position.size.is_long() {
            position.open_notional + resp.unrealized_pnl_after
        } else if position.size.is_short() {
            position.open_notional - resp.unrealized_pnl_after
        } else {
            Decimal::ZERO
        };
        self.emit_event(EventPayload::PositionChanged(PositionChangedEvent {
            final_position: position.clone(),
            position_notional,
            transaction_fee,
            realized_pnl: resp.realized_pnl,
            bad_debt,
            funding_payment: resp.funding_payment,
            margin_to_user,
            change_reason,
            exchanged_size: resp.exchanged_position_size,
            exchanged_notional: resp.exchanged_notional_value,
            block_height: self.block.height,
            block_time_ms: self.block.time.as_millis(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::amm::AmmError;
    use crate::bank::Holder;
    use rust_decimal_macros::dec;

    fn open_long(engine: &mut Engine, margin: Decimal, leverage: Decimal) -> PositionResp {
        engine
            .market_order(&btc(), Direction::Long, &alice(), margin, leverage, Decimal::ZERO)
            .unwrap()
    }

    #[test]
    fn open_long_takes_margin_and_fees() {
        let mut engine = setup_engine();
        let before = balance(&engine, Holder::Account(alice()));

        let resp = open_long(&mut engine, dec!(1000), dec!(10));

        assert_eq!(resp.exchanged_notional_value, dec!(10000));
        assert!(resp.position.size.is_long());
        // 1e12 * 1e12 / (1e12 + 1e4) leaves just under 1e4 base
        assert!(resp.position.size.abs() < dec!(10000));
        assert!(resp.position.size.abs() > dec!(9999.9999));
        assert_eq!(resp.position.margin, dec!(1000));
        assert_eq!(resp.position.open_notional, dec!(10000));
        assert_eq!(resp.margin_to_vault, dec!(1000));

        assert_eq!(vault(&engine), dec!(1000));
        assert_eq!(balance(&engine, Holder::Module(ModuleAccount::FeePool)), dec!(10));
        // fee 10 to pool + 10 to the ecosystem fund
        assert_eq!(balance(&engine, Holder::Account(alice())), before - dec!(1020));

        let stored = engine.position(&btc(), &alice()).unwrap();
        assert_eq!(stored, resp.position);
    }

    #[test]
    fn order_validation() {
        let mut engine = setup_engine();
        let err = engine
            .market_order(&btc(), Direction::Long, &alice(), dec!(0), dec!(10), Decimal::ZERO)
            .unwrap_err();
        assert_eq!(err, EngineError::NonPositiveQuoteAmount(dec!(0)));

        let err = engine
            .market_order(&btc(), Direction::Long, &alice(), dec!(10), dec!(11), Decimal::ZERO)
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::LeverageTooHigh {
                leverage: dec!(11),
                max: dec!(10)
            }
        );
        assert!(engine.events().iter().all(|e| !matches!(e.payload, EventPayload::PositionChanged(_))));
    }

    #[test]
    fn fractional_quote_rejected() {
        let mut engine = setup_engine();
        let before = balance(&engine, Holder::Account(alice()));

        let err = engine
            .market_order(&btc(), Direction::Long, &alice(), dec!(0.5), dec!(10), Decimal::ZERO)
            .unwrap_err();
        assert_eq!(err, EngineError::FractionalAmount(dec!(0.5)));
        assert!(engine.position(&btc(), &alice()).is_err());
        assert_eq!(vault(&engine), Decimal::ZERO);
        assert_eq!(balance(&engine, Holder::Account(alice())), before);
    }

    #[test]
    fn oversized_order_is_an_error() {
        let mut engine = setup_engine();
        let amm_before = engine.amm(&btc()).unwrap();
        let before = balance(&engine, Holder::Account(alice()));

        let err = engine
            .market_order(
                &btc(),
                Direction::Long,
                &alice(),
                dec!(10_000_000_000_000_000_000_000_000_000),
                dec!(10),
                Decimal::ZERO,
            )
            .unwrap_err();
        assert_eq!(err, EngineError::NotionalOverflow);
        assert_eq!(engine.amm(&btc()).unwrap(), amm_before);
        assert_eq!(balance(&engine, Holder::Account(alice())), before);

        // fits the range, but no pool can absorb it
        let err = engine
            .market_order(&btc(), Direction::Short, &alice(), Decimal::MAX, dec!(1), Decimal::ZERO)
            .unwrap_err();
        assert_eq!(err, EngineError::Amm(AmmError::QuoteReserveAtZero));
        assert_eq!(engine.amm(&btc()).unwrap(), amm_before);
    }

    #[test]
    fn close_returns_margin_minus_fees() {
        let mut engine = setup_engine();
        let start = balance(&engine, Holder::Account(alice()));
        open_long(&mut engine, dec!(1000), dec!(10));

        let resp = engine.close_position(&btc(), &alice()).unwrap();

        assert!(resp.position.size.is_zero());
        assert!(engine.position(&btc(), &alice()).is_err());
        // open fee 20 + close fee 20, pnl rounds away at this depth
        assert_eq!(balance(&engine, Holder::Account(alice())), start - dec!(40));
        assert_eq!(vault(&engine), Decimal::ZERO);
    }

    #[test]
    fn partial_close_reduces_by_exact_size() {
        let mut engine = setup_engine();
        let opened = open_long(&mut engine, dec!(1000), dec!(10));
        let half = opened.position.size.abs() / dec!(2);

        let resp = engine.partial_close(&btc(), &alice(), half).unwrap();
        assert_eq!(resp.exchanged_position_size, -half);
        assert_eq!(resp.position.size.abs(), opened.position.size.abs() - half);

        let err = engine.partial_close(&btc(), &alice(), dec!(1_000_000)).unwrap_err();
        assert!(matches!(err, EngineError::SizeExceedsPosition { .. }));
    }

    #[test]
    fn reverse_smaller_than_position_decreases() {
        let mut engine = setup_engine();
        open_long(&mut engine, dec!(1000), dec!(10));

        let resp = engine
            .market_order(&btc(), Direction::Short, &alice(), dec!(100), dec!(10), Decimal::ZERO)
            .unwrap();
        assert!(resp.position.size.is_long());
        assert_eq!(resp.exchanged_notional_value, dec!(1000));
        assert_eq!(resp.margin_to_vault, Decimal::ZERO);
    }

    #[test]
    fn reverse_larger_than_position_flips() {
        let mut engine = setup_engine();
        open_long(&mut engine, dec!(1000), dec!(10));

        let resp = engine
            .market_order(&btc(), Direction::Short, &alice(), dec!(2000), dec!(10), Decimal::ZERO)
            .unwrap();
        assert!(resp.position.size.is_short());
        assert_eq!(resp.exchanged_notional_value, dec!(20000));
        assert!(resp.position.open_notional > dec!(9999));
        assert!(resp.position.margin > dec!(999));
        let stored = engine.position(&btc(), &alice()).unwrap();
        assert!(stored.size.is_short());
    }

    #[test]
    fn failed_order_rolls_back_pool() {
        let mut engine = setup_engine();
        let amm_before = engine.amm(&btc()).unwrap();
        // asking for more base than 1000 quote can buy
        let err = engine
            .market_order(&btc(), Direction::Long, &alice(), dec!(100), dec!(10), dec!(2000))
            .unwrap_err();
        assert!(matches!(err, EngineError::AssetFailsUserLimit { .. }));
        assert_eq!(engine.amm(&btc()).unwrap(), amm_before);
        assert_eq!(vault(&engine), Decimal::ZERO);
    }

    #[test]
    fn settle_requires_closed_market() {
        let mut engine = setup_engine();
        open_long(&mut engine, dec!(1000), dec!(10));
        let err = engine.settle_position(&btc(), 1, &alice()).unwrap_err();
        assert_eq!(err, EngineError::MarketEnabled(btc()));

        engine.close_market(&admin(), &btc()).unwrap();
        let resp = engine.settle_position(&btc(), 1, &alice()).unwrap();
        assert!(resp.position.size.is_zero());
        assert!(engine.state().positions.is_empty());
        assert!(matches!(
            engine.events().last().map(|e| &e.payload),
            Some(EventPayload::PositionChanged(PositionChangedEvent {
                change_reason: ChangeReason::Settlement,
                ..
            }))
        ));
    }
}
