//! Liquidation execution.
//!
//! A batch liquidates each request against its own checkpoint: a failing item
//! is rolled back and reported without touching the items around it.

use super::clearing_house::{market_key, DecreaseAmount};
use super::core::Engine;
use super::results::{EngineError, LiquidationResult};
use crate::amm::Amm;
use crate::bank::{Bank, ModuleAccount};
use crate::events::{EventPayload, LiquidationFailedEvent, PositionLiquidatedEvent};
use crate::liquidation::{
    full_liquidation_split, is_liquidatable, liquidation_kind, render_responses, split_fee, LiquidationFailedReason,
    LiquidationKind, LiquidationRequest, LiquidationResponse,
};
use crate::market::Market;
use crate::math::{mul, round_int};
use crate::position::{position_notional_spot, preferred_position_notional, Position, PositionResp};
use crate::store::MarketKey;
use crate::types::{Address, Coin, Pair};
use rust_decimal::Decimal;

fn failure_reason(err: &EngineError) -> Option<LiquidationFailedReason> {
    match err {
        EngineError::PairNotFound(_) => Some(LiquidationFailedReason::NonexistentPair),
        EngineError::PositionNotFound { .. } => Some(LiquidationFailedReason::NonexistentPosition),
        EngineError::PositionHealthy => Some(LiquidationFailedReason::PositionHealthy),
        _ => None,
    }
}

impl<B: Bank> Engine<B> {
    /// Liquidates one position below maintenance margin. A missing pair or position,
    /// or a healthy one, still leaves a `LiquidationFailed` event behind the error.
    pub fn liquidate(
        &mut self,
        liquidator: &Address,
        pair: &Pair,
        trader: &Address,
    ) -> Result<LiquidationResult, EngineError> {
        self.transact(|engine| engine.liquidate_position(liquidator, pair, trader))
            .map_err(|err| {
                self.emit_liquidation_failed(liquidator, pair, trader, &err);
                err
            })
    }

    /// Liquidates every request independently. Fails only when no request succeeds.
    pub fn multi_liquidate(
        &mut self,
        liquidator: &Address,
        requests: &[LiquidationRequest],
    ) -> Result<Vec<LiquidationResponse>, EngineError> {
        if requests.is_empty() {
            return Err(EngineError::EmptyLiquidationBatch);
        }

        let batch_checkpoint = self.ledger.clone();
        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            let checkpoint = self.ledger.clone();
            match self.liquidate_position(liquidator, &request.pair, &request.trader) {
                Ok(result) => responses.push(LiquidationResponse {
                    success: true,
                    error: None,
                    liquidator_fee: Some(result.fee_to_liquidator),
                    ecosystem_fund_fee: Some(result.fee_to_ecosystem_fund),
                    trader: request.trader.clone(),
                    pair: request.pair.clone(),
                }),
                Err(err) => {
                    self.ledger = checkpoint;
                    self.emit_liquidation_failed(liquidator, &request.pair, &request.trader, &err);
                    responses.push(LiquidationResponse {
                        success: false,
                        error: Some(err.to_string()),
                        liquidator_fee: None,
                        ecosystem_fund_fee: None,
                        trader: request.trader.clone(),
                        pair: request.pair.clone(),
                    });
                }
            }
        }

        if responses.iter().all(|response| !response.success) {
            self.ledger = batch_checkpoint;
            return Err(EngineError::AllLiquidationsFailed(render_responses(&responses)));
        }
        Ok(responses)
    }

    fn liquidate_position(
        &mut self,
        liquidator: &Address,
        pair: &Pair,
        trader: &Address,
    ) -> Result<LiquidationResult, EngineError> {
        let market = self.market(pair)?;
        let amm = self.amm_for(&market)?;
        let position = self.existing_position(&market, trader)?;
        let cpf = market.latest_cumulative_premium_fraction;

        let spot_notional = position_notional_spot(&amm, &position)?;
        let twap_notional = self.position_notional_twap(&position, market.twap_lookback_window())?;
        let preferred = preferred_position_notional(position.size, spot_notional, twap_notional);
        let margin_ratio = position.margin_ratio(preferred, cpf).ok_or(EngineError::NotionalOverflow)?;
        if !is_liquidatable(margin_ratio, market.maintenance_margin_ratio) {
            return Err(EngineError::PositionHealthy);
        }

        let spot_margin_ratio = position
            .margin_ratio(spot_notional, cpf)
            .ok_or(EngineError::NotionalOverflow)?;
        let mark_price = amm.mark_price();
        let result = match liquidation_kind(spot_margin_ratio, market.liquidation_fee_ratio) {
            LiquidationKind::Partial => self.partial_liquidation(&market, amm, position, liquidator, mark_price)?,
            LiquidationKind::Full => self.full_liquidation(&market, amm, position, liquidator, mark_price)?,
        };
        log::info!(
            "liquidated {} in {}: liquidator fee {}, ecosystem fund fee {}",
            trader,
            pair,
            result.fee_to_liquidator,
            result.fee_to_ecosystem_fund
        );
        Ok(result)
    }

    fn partial_liquidation(
        &mut self,
        market: &Market,
        amm: Amm,
        position: Position,
        liquidator: &Address,
        mark_price: Decimal,
    ) -> Result<LiquidationResult, EngineError> {
        let size = mul(position.size.abs(), market.partial_liquidation_ratio).ok_or(EngineError::NotionalOverflow)?;
        let (_, resp) = self.decrease_position(market, amm, position, DecreaseAmount::Size(size))?;

        let fee = mul(resp.exchanged_notional_value, market.liquidation_fee_ratio).ok_or(EngineError::NotionalOverflow)?;
        let mut remaining = resp.position.clone();
        remaining.margin -= fee;
        self.save_position(market, remaining.clone());

        let (to_liquidator, to_ecosystem_fund) = split_fee(fee);
        let collateral = self.collateral_denom();
        let result = LiquidationResult {
            fee_to_liquidator: Coin::new(collateral.clone(), round_int(to_liquidator)),
            fee_to_ecosystem_fund: Coin::new(collateral.clone(), round_int(to_ecosystem_fund)),
        };
        self.distribute_liquidation_rewards(&market_key(market), liquidator, &result)?;

        // partial liquidations never realize bad debt
        self.emit_liquidated(
            mark_price,
            &resp,
            liquidator,
            &result,
            Coin::zero(collateral.clone()),
            Coin::new(collateral, round_int(remaining.margin)),
            &remaining,
        );
        Ok(result)
    }

    fn full_liquidation(
        &mut self,
        market: &Market,
        amm: Amm,
        position: Position,
        liquidator: &Address,
        mark_price: Decimal,
    ) -> Result<LiquidationResult, EngineError> {
        let key = Self::position_key(market, &position.trader);
        let (_, resp) = self.close_position_entirely(market, amm, position, Decimal::ZERO)?;

        let remaining_margin = resp.margin_to_vault.abs();
        let split = full_liquidation_split(
            remaining_margin,
            resp.exchanged_notional_value,
            market.liquidation_fee_ratio,
            resp.bad_debt,
        );
        let vault_key: MarketKey = market_key(market);
        self.realize_bad_debt(&vault_key, round_int(split.bad_debt))?;

        let collateral = self.collateral_denom();
        let result = LiquidationResult {
            fee_to_liquidator: Coin::new(collateral.clone(), round_int(split.fee_to_liquidator)),
            fee_to_ecosystem_fund: Coin::new(collateral.clone(), round_int(split.fee_to_ecosystem_fund)),
        };
        self.distribute_liquidation_rewards(&vault_key, liquidator, &result)?;
        self.delete_position(&key);

        self.emit_liquidated(
            mark_price,
            &resp,
            liquidator,
            &result,
            Coin::new(collateral.clone(), round_int(split.bad_debt)),
            Coin::new(collateral, round_int(resp.position.margin)),
            &resp.position,
        );
        Ok(result)
    }

    /// Ecosystem fund share leaves the vault first, then the liquidator is paid.
    fn distribute_liquidation_rewards(
        &mut self,
        key: &MarketKey,
        liquidator: &Address,
        result: &LiquidationResult,
    ) -> Result<(), EngineError> {
        if result.fee_to_ecosystem_fund.is_positive() {
            self.ledger.bank.send_from_module_to_module(
                ModuleAccount::Vault,
                ModuleAccount::EcosystemFund,
                &result.fee_to_ecosystem_fund,
            )?;
        }
        self.withdraw_from_vault(key, liquidator, result.fee_to_liquidator.amount)
    }

    fn emit_liquidation_failed(&mut self, liquidator: &Address, pair: &Pair, trader: &Address, err: &EngineError) {
        if let Some(reason) = failure_reason(err) {
            self.emit_event(EventPayload::LiquidationFailed(LiquidationFailedEvent {
                pair: pair.clone(),
                trader: trader.clone(),
                liquidator: liquidator.clone(),
                reason,
            }));
        }
        log::debug!("liquidation of {trader} in {pair} failed: {err}");
    }

    /// `mark_price` is the pool's mark before the liquidation swap.
    #[allow(clippy::too_many_arguments)]
    fn emit_liquidated(
        &mut self,
        mark_price: Decimal,
        resp: &PositionResp,
        liquidator: &Address,
        result: &LiquidationResult,
        bad_debt: Coin,
        margin: Coin,
        position: &Position,
    ) {
        self.emit_event(EventPayload::PositionLiquidated(PositionLiquidatedEvent {
            pair: position.pair.clone(),
            trader: position.trader.clone(),
            liquidator: liquidator.clone(),
            exchanged_quote_amount: resp.exchanged_notional_value,
            exchanged_position_size: resp.exchanged_position_size,
            fee_to_liquidator: result.fee_to_liquidator.clone(),
            fee_to_ecosystem_fund: result.fee_to_ecosystem_fund.clone(),
            bad_debt,
            margin,
            position_notional: resp.position_notional,
            position_size: position.size.value(),
            unrealized_pnl: resp.unrealized_pnl_after,
            mark_price,
            block_height: self.block.height,
            block_time_ms: self.block.time.as_millis(),
        }));
    }
}
