// 8.11 engine/margin.rs: adding and removing margin on an open position.
// both settle outstanding funding into the margin before anything else.

use super::clearing_house::market_key;
use super::core::Engine;
use super::results::{ensure_whole, EngineError, MarginResult};
use crate::bank::{Bank, ModuleAccount};
use crate::market::Market;
use crate::position::{position_notional_spot, ChangeReason, Position, PositionResp};
use crate::types::{Address, Coin, Pair};
use rust_decimal::Decimal;

impl<B: Bank> Engine<B> {
    pub fn add_margin(&mut self, pair: &Pair, trader: &Address, margin: Coin) -> Result<MarginResult, EngineError> {
        self.transact(|engine| {
            let market = engine.enabled_market(pair)?;
            engine.check_collateral(&margin)?;
            let mut position = engine.existing_position(&market, trader)?;

            let funding = position
                .funding_payment(market.latest_cumulative_premium_fraction)
                .ok_or(EngineError::NotionalOverflow)?;
            let remaining = position
                .margin
                .checked_add(margin.amount)
                .and_then(|total| total.checked_sub(funding))
                .ok_or(EngineError::NotionalOverflow)?;
            if remaining < Decimal::ZERO {
                return Err(EngineError::BadDebt(-remaining));
            }

            engine
                .ledger
                .bank
                .send_from_account_to_module(trader, ModuleAccount::Vault, &margin)?;

            position.margin = remaining;
            position.latest_cumulative_premium_fraction = market.latest_cumulative_premium_fraction;
            position.last_updated_block_number = engine.block.height;
            engine.save_position(&market, position.clone());

            engine.emit_margin_change(&market, &position, funding, -margin.amount, ChangeReason::AddMargin)?;
            Ok(MarginResult {
                funding_payment: funding,
                position,
            })
        })
    }

    /// Withdraws margin the position does not need. Unrealized losses at the worse of
    /// spot and twap count against the free amount; unrealized profits do not.
    pub fn remove_margin(&mut self, pair: &Pair, trader: &Address, margin: Coin) -> Result<MarginResult, EngineError> {
        self.transact(|engine| {
            let market = engine.enabled_market(pair)?;
            engine.check_collateral(&margin)?;
            let amm = engine.amm_for(&market)?;
            let mut position = engine.existing_position(&market, trader)?;

            let spot = position_notional_spot(&amm, &position)?;
            let twap = engine.position_notional_twap(&position, market.twap_lookback_window())?;
            let unrealized = position.unrealized_pnl(spot.min(twap));
            let funding = position
                .funding_payment(market.latest_cumulative_premium_fraction)
                .ok_or(EngineError::NotionalOverflow)?;

            let free = position.margin - funding + unrealized.min(Decimal::ZERO);
            if margin.amount > free {
                return Err(EngineError::FreeCollateralExceeded {
                    requested: margin.amount,
                    free,
                });
            }

            position.margin = position.margin - funding - margin.amount;
            position.latest_cumulative_premium_fraction = market.latest_cumulative_premium_fraction;
            position.last_updated_block_number = engine.block.height;
            engine.check_margin_ratio(&market, &amm, &position)?;

            engine.withdraw_from_vault(&market_key(&market), trader, margin.amount)?;
            engine.save_position(&market, position.clone());

            engine.emit_margin_change(&market, &position, funding, margin.amount, ChangeReason::RemoveMargin)?;
            Ok(MarginResult {
                funding_payment: funding,
                position,
            })
        })
    }

    fn check_collateral(&self, margin: &Coin) -> Result<(), EngineError> {
        let collateral = self.collateral_denom();
        if margin.denom != collateral {
            return Err(EngineError::DenomMismatch {
                expected: collateral,
                got: margin.denom.clone(),
            });
        }
        if !margin.is_positive() {
            return Err(EngineError::NonPositiveAmount(margin.amount));
        }
        ensure_whole(margin.amount)
    }

    fn emit_margin_change(
        &mut self,
        market: &Market,
        position: &Position,
        funding: Decimal,
        margin_to_user: Decimal,
        reason: ChangeReason,
    ) -> Result<(), EngineError> {
        let amm = self.amm_for(market)?;
        let notional = position_notional_spot(&amm, position)?;
        let resp = PositionResp {
            funding_payment: funding,
            unrealized_pnl_after: position.unrealized_pnl(notional),
            ..PositionResp::empty(position.clone())
        };
        let collateral = self.collateral_denom();
        self.emit_position_changed(
            &resp,
            Coin::zero(collateral.clone()),
            Coin::zero(collateral),
            margin_to_user,
            reason,
        );
        Ok(())
    }
}
