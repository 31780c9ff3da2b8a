// 8.6 engine/swaps.rs: pool swaps as the clearing house sees them.
// user limits are enforced here and every successful swap is persisted with a snapshot.

use super::core::Engine;
use super::results::EngineError;
use crate::amm::Amm;
use crate::bank::Bank;
use crate::types::Direction;
use rust_decimal::Decimal;

/// Longs want at least `limit` base out, shorts at most `limit` base in. Zero disables.
fn check_base_limit(base_amt: Decimal, limit: Decimal, direction: Direction) -> Result<(), EngineError> {
    if limit <= Decimal::ZERO {
        return Ok(());
    }
    let violated = match direction {
        Direction::Long => base_amt < limit,
        Direction::Short => base_amt > limit,
    };
    if violated {
        return Err(EngineError::AssetFailsUserLimit {
            amount: base_amt,
            limit,
        });
    }
    Ok(())
}

/// Longs pay at most `limit` quote, shorts receive at least `limit`. Zero disables.
fn check_quote_limit(quote_amt: Decimal, limit: Decimal, direction: Direction) -> Result<(), EngineError> {
    if limit <= Decimal::ZERO {
        return Ok(());
    }
    let violated = match direction {
        Direction::Long => quote_amt > limit,
        Direction::Short => quote_amt < limit,
    };
    if violated {
        return Err(EngineError::AssetFailsUserLimit {
            amount: quote_amt,
            limit,
        });
    }
    Ok(())
}

impl<B: Bank> Engine<B> {
    /// Returns the updated pool and the base amount moved.
    pub(super) fn swap_quote_asset(
        &mut self,
        mut amm: Amm,
        direction: Direction,
        quote_asset_amt: Decimal,
        base_amt_limit: Decimal,
    ) -> Result<(Amm, Decimal), EngineError> {
        let base_amt = amm.swap_quote_asset(quote_asset_amt, direction)?;
        check_base_limit(base_amt, base_amt_limit, direction)?;
        self.save_amm(&amm);
        Ok((amm, base_amt))
    }

    /// Returns the updated pool and the quote asset moved.
    pub(super) fn swap_base_asset(
        &mut self,
        mut amm: Amm,
        direction: Direction,
        base_amt: Decimal,
        quote_asset_limit: Decimal,
    ) -> Result<(Amm, Decimal), EngineError> {
        let quote_amt = amm.swap_base_asset(base_amt, direction)?;
        check_quote_limit(quote_amt, quote_asset_limit, direction)?;
        self.save_amm(&amm);
        Ok((amm, quote_amt))
    }
}
