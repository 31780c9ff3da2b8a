// 8.0.2: result types and errors for engine operations.

use crate::amm::AmmError;
use crate::bank::BankError;
use crate::market::MarketError;
use crate::oracle::OracleError;
use crate::position::Position;
use crate::twap::TwapError;
use crate::types::{Address, Coin, Pair, TypesError};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarginResult {
    pub funding_payment: Decimal,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationResult {
    pub fee_to_liquidator: Coin,
    pub fee_to_ecosystem_fund: Coin,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("pair {0} not found")]
    PairNotFound(Pair),

    #[error("market {0} is not enabled")]
    MarketNotEnabled(Pair),

    #[error("market {0} is still enabled")]
    MarketEnabled(Pair),

    #[error("market {0} already exists and is enabled")]
    MarketAlreadyExists(Pair),

    #[error("amm for {pair} version {version} not found")]
    AmmNotFound { pair: Pair, version: u64 },

    #[error("no position for {trader} in {pair}")]
    PositionNotFound { pair: Pair, trader: Address },

    #[error("position is healthy")]
    PositionHealthy,

    #[error("quote amount must be positive, got {0}")]
    NonPositiveQuoteAmount(Decimal),

    #[error("leverage must be positive, got {0}")]
    NonPositiveLeverage(Decimal),

    #[error("leverage {leverage} exceeds market max {max}")]
    LeverageTooHigh { leverage: Decimal, max: Decimal },

    #[error("size must be positive, got {0}")]
    NonPositiveSize(Decimal),

    #[error("cannot close {requested} of a position sized {available}")]
    SizeExceedsPosition { requested: Decimal, available: Decimal },

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("amount must be a whole number of coins, got {0}")]
    FractionalAmount(Decimal),

    #[error("notional overflows fixed-point range")]
    NotionalOverflow,

    #[error("denom {got} does not match collateral {expected}")]
    DenomMismatch { expected: String, got: String },

    #[error("ratio must be within [0, 1], got {0}")]
    InvalidRatio(Decimal),

    #[error("position has bad debt of {0}")]
    BadDebt(Decimal),

    #[error("underwater position cannot be reversed, bad debt {0}")]
    UnderwaterPosition(Decimal),

    #[error("margin ratio {ratio} is below maintenance {maintenance}")]
    MarginRatioTooLow { ratio: Decimal, maintenance: Decimal },

    #[error("requested {requested} exceeds free collateral {free}")]
    FreeCollateralExceeded { requested: Decimal, free: Decimal },

    #[error("asset amount {amount} violates user limit {limit}")]
    AssetFailsUserLimit { amount: Decimal, limit: Decimal },

    #[error("open notional would become negative: {0}")]
    NegativeOpenNotional(Decimal),

    #[error("base amount limit {limit} is smaller than the closed size {closed}")]
    BaseLimitBelowClosedSize { limit: Decimal, closed: Decimal },

    #[error("not enough in the ecosystem fund to pay {0}")]
    NotEnoughFundToPayAction(Coin),

    #[error("sender {0} is not authorized")]
    Unauthorized(Address),

    #[error("all liquidations failed: {0}")]
    AllLiquidationsFailed(String),

    #[error("no liquidation requests")]
    EmptyLiquidationBatch,

    #[error("amm error: {0}")]
    Amm(#[from] AmmError),

    #[error("market error: {0}")]
    Market(#[from] MarketError),

    #[error("twap error: {0}")]
    Twap(#[from] TwapError),

    #[error("bank error: {0}")]
    Bank(#[from] BankError),

    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("invalid input: {0}")]
    Types(#[from] TypesError),
}

/// Collateral only moves in whole coins.
pub(super) fn ensure_whole(amount: Decimal) -> Result<(), EngineError> {
    if !amount.fract().is_zero() {
        return Err(EngineError::FractionalAmount(amount));
    }
    Ok(())
}
