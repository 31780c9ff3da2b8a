//! Token transfer collaborator.
//!
//! The core never owns balances. It asks a [`Bank`] to move coins between user
//! accounts and the module accounts (vault, ecosystem fund, fee pool), and to
//! mint rebates. [`BankLedger`] is the in-memory implementation used by the
//! simulator and tests.

use crate::types::{Address, Coin};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Pools owned by the perp core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModuleAccount {
    /// Holds every trader's margin.
    Vault,
    /// Receives liquidation and ecosystem fees; backstops bad debt.
    EcosystemFund,
    /// Receives exchange fees.
    FeePool,
}

impl fmt::Display for ModuleAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleAccount::Vault => "vault",
            ModuleAccount::EcosystemFund => "perp_ef",
            ModuleAccount::FeePool => "fee_pool",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Holder {
    Module(ModuleAccount),
    Account(Address),
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holder::Module(module) => write!(f, "module:{module}"),
            Holder::Account(address) => write!(f, "{address}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BankError {
    #[error("insufficient funds: {holder} has {available}{denom}, needs {requested}{denom}")]
    InsufficientFunds {
        holder: String,
        denom: String,
        available: Decimal,
        requested: Decimal,
    },

    #[error("invalid coin amount {0}")]
    InvalidAmount(Coin),
}

pub trait Bank: Clone + fmt::Debug {
    fn balance(&self, holder: &Holder, denom: &str) -> Decimal;

    /// Moves `coin` from `from` to `to`. Fails without side effects if `from` is short.
    fn transfer(&mut self, from: &Holder, to: &Holder, coin: &Coin) -> Result<(), BankError>;

    fn mint(&mut self, to: &Holder, coin: &Coin) -> Result<(), BankError>;

    fn send_from_account_to_module(&mut self, from: &Address, to: ModuleAccount, coin: &Coin) -> Result<(), BankError> {
        self.transfer(&Holder::Account(from.clone()), &Holder::Module(to), coin)
    }

    fn send_from_module_to_account(&mut self, from: ModuleAccount, to: &Address, coin: &Coin) -> Result<(), BankError> {
        self.transfer(&Holder::Module(from), &Holder::Account(to.clone()), coin)
    }

    fn send_from_module_to_module(&mut self, from: ModuleAccount, to: ModuleAccount, coin: &Coin) -> Result<(), BankError> {
        self.transfer(&Holder::Module(from), &Holder::Module(to), coin)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BankLedger {
    balances: BTreeMap<(Holder, String), Decimal>,
}

impl BankLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `coin` out of thin air. Genesis and test setup only.
    pub fn fund(&mut self, holder: Holder, coin: Coin) {
        *self.balances.entry((holder, coin.denom)).or_insert(Decimal::ZERO) += coin.amount;
    }

    pub fn total_supply(&self, denom: &str) -> Decimal {
        self.balances
            .iter()
            .filter(|((_, d), _)| d == denom)
            .map(|(_, amount)| *amount)
            .sum()
    }
}

impl Bank for BankLedger {
    fn balance(&self, holder: &Holder, denom: &str) -> Decimal {
        self.balances
            .get(&(holder.clone(), denom.to_string()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn transfer(&mut self, from: &Holder, to: &Holder, coin: &Coin) -> Result<(), BankError> {
        if coin.amount < Decimal::ZERO {
            return Err(BankError::InvalidAmount(coin.clone()));
        }
        if coin.amount.is_zero() {
            return Ok(());
        }

        let available = self.balance(from, &coin.denom);
        if available < coin.amount {
            return Err(BankError::InsufficientFunds {
                holder: from.to_string(),
                denom: coin.denom.clone(),
                available,
                requested: coin.amount,
            });
        }

        self.balances
            .insert((from.clone(), coin.denom.clone()), available - coin.amount);
        *self
            .balances
            .entry((to.clone(), coin.denom.clone()))
            .or_insert(Decimal::ZERO) += coin.amount;
        Ok(())
    }

    fn mint(&mut self, to: &Holder, coin: &Coin) -> Result<(), BankError> {
        if coin.amount < Decimal::ZERO {
            return Err(BankError::InvalidAmount(coin.clone()));
        }
        self.fund(to.clone(), coin.clone());
        Ok(())
    }
}
