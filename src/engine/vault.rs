// 8.8 engine/vault.rs: money movement between traders, the vault and the ecosystem fund.
// the vault never pays out more than it holds; shortfalls are pulled from the
// ecosystem fund and remembered as prepaid bad debt on the market.

use super::core::Engine;
use super::results::{ensure_whole, EngineError};
use crate::bank::{Bank, Holder, ModuleAccount};
use crate::events::{DonateToEcosystemFundEvent, EventPayload};
use crate::store::MarketKey;
use crate::types::{Address, Coin};
use rust_decimal::Decimal;

impl<B: Bank> Engine<B> {
    /// Pays `amount` of collateral from the vault to `receiver`, topping the vault
    /// up from the ecosystem fund if it is short.
    pub(super) fn withdraw_from_vault(
        &mut self,
        key: &MarketKey,
        receiver: &Address,
        amount: Decimal,
    ) -> Result<(), EngineError> {
        if amount <= Decimal::ZERO {
            return Ok(());
        }
        let collateral = self.collateral_denom();
        let vault_balance = self
            .ledger
            .bank
            .balance(&Holder::Module(ModuleAccount::Vault), &collateral);

        if vault_balance < amount {
            let shortage = amount - vault_balance;
            self.increment_prepaid_bad_debt(key, shortage)?;
            self.ledger.bank.send_from_module_to_module(
                ModuleAccount::EcosystemFund,
                ModuleAccount::Vault,
                &Coin::new(collateral.clone(), shortage),
            )?;
        }

        self.ledger.bank.send_from_module_to_account(
            ModuleAccount::Vault,
            receiver,
            &Coin::new(collateral, amount),
        )?;
        Ok(())
    }

    pub(super) fn increment_prepaid_bad_debt(&mut self, key: &MarketKey, amount: Decimal) -> Result<(), EngineError> {
        let mut market = self.market_by_key(key)?;
        market.prepaid_bad_debt.amount += amount;
        self.save_market(market);
        Ok(())
    }

    /// Covers `bad_debt` with prepaid credit first, then with the ecosystem fund.
    pub(super) fn realize_bad_debt(&mut self, key: &MarketKey, bad_debt: Decimal) -> Result<(), EngineError> {
        if bad_debt <= Decimal::ZERO {
            return Ok(());
        }
        let mut market = self.market_by_key(key)?;
        let prepaid = market.prepaid_bad_debt.amount;

        if prepaid >= bad_debt {
            market.prepaid_bad_debt.amount = prepaid - bad_debt;
            self.save_market(market);
            return Ok(());
        }

        let excess = Coin::new(self.collateral_denom(), bad_debt - prepaid);
        market.prepaid_bad_debt.amount = Decimal::ZERO;
        self.save_market(market);
        self.ledger
            .bank
            .send_from_module_to_module(ModuleAccount::EcosystemFund, ModuleAccount::Vault, &excess)?;
        Ok(())
    }

    /// Settles a peg/depth shift: positive cost is paid by the ecosystem fund
    /// into the vault, negative cost flows back. Returns the coin that moved.
    pub(super) fn handle_market_update_cost(&mut self, cost: Decimal) -> Result<Coin, EngineError> {
        let collateral = self.collateral_denom();
        let coin = Coin::new(collateral.clone(), cost.abs());

        if cost > Decimal::ZERO {
            let available = self
                .ledger
                .bank
                .balance(&Holder::Module(ModuleAccount::EcosystemFund), &collateral);
            if available < cost {
                return Err(EngineError::NotEnoughFundToPayAction(coin));
            }
            self.ledger
                .bank
                .send_from_module_to_module(ModuleAccount::EcosystemFund, ModuleAccount::Vault, &coin)?;
        } else if cost < Decimal::ZERO {
            self.ledger
                .bank
                .send_from_module_to_module(ModuleAccount::Vault, ModuleAccount::EcosystemFund, &coin)?;
        }
        Ok(coin)
    }

    /// Anyone may top up the ecosystem fund.
    pub fn donate_to_ecosystem_fund(&mut self, sender: &Address, donation: Coin) -> Result<(), EngineError> {
        self.transact(|engine| {
            if !donation.is_positive() {
                return Err(EngineError::NonPositiveAmount(donation.amount));
            }
            ensure_whole(donation.amount)?;
            engine
                .ledger
                .bank
                .send_from_account_to_module(sender, ModuleAccount::EcosystemFund, &donation)?;
            engine.emit_event(EventPayload::DonateToEcosystemFund(DonateToEcosystemFundEvent {
                sender: sender.clone(),
                funds: donation,
            }));
            Ok(())
        })
    }
}
