// 4.0: open position tracking. pnl is measured against open notional, not an entry price.
// 4.1 has the notional/pnl/margin-ratio math, 4.2 the response every clearing house step returns.

use crate::amm::{Amm, AmmError};
use crate::math::{mul, quo};
use crate::types::{Address, Pair, SignedSize};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub pair: Pair,
    pub trader: Address,
    pub size: SignedSize,
    pub margin: Decimal,
    /// Quote paid to open the current size.
    pub open_notional: Decimal,
    pub latest_cumulative_premium_fraction: Decimal,
    pub last_updated_block_number: i64,
}

impl Position {
    /// Empty position already caught up with the market's funding.
    pub fn zero(pair: Pair, trader: Address, cumulative_premium_fraction: Decimal, block_height: i64) -> Self {
        Self {
            pair,
            trader,
            size: SignedSize::zero(),
            margin: Decimal::ZERO,
            open_notional: Decimal::ZERO,
            latest_cumulative_premium_fraction: cumulative_premium_fraction,
            last_updated_block_number: block_height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_zero()
    }

    // 4.1: funding owed since last touch. positive = trader pays. `None` on overflow.
    pub fn funding_payment(&self, market_cumulative_premium_fraction: Decimal) -> Option<Decimal> {
        market_cumulative_premium_fraction
            .checked_sub(self.latest_cumulative_premium_fraction)
            .and_then(|delta| mul(delta, self.size.value()))
    }

    pub fn unrealized_pnl(&self, position_notional: Decimal) -> Decimal {
        if self.size.is_long() {
            position_notional - self.open_notional
        } else if self.size.is_short() {
            self.open_notional - position_notional
        } else {
            Decimal::ZERO
        }
    }

    /// `(margin + unrealized pnl - funding) / notional`. Zero when flat.
    pub fn margin_ratio(&self, position_notional: Decimal, market_cumulative_premium_fraction: Decimal) -> Option<Decimal> {
        if self.size.is_zero() || position_notional.is_zero() {
            return Some(Decimal::ZERO);
        }
        let remaining = self
            .margin
            .checked_add(self.unrealized_pnl(position_notional))?
            .checked_sub(self.funding_payment(market_cumulative_premium_fraction)?)?;
        quo(remaining, position_notional)
    }
}

/// Quote received for closing `position` against the pool right now.
pub fn position_notional_spot(amm: &Amm, position: &Position) -> Result<Decimal, AmmError> {
    if position.size.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let quote_reserve = amm.quote_reserve_delta(position.size.abs(), position.size.closing_direction())?;
    amm.quote_reserve_to_asset(quote_reserve)
}

/// Larger of spot/twap notional for longs, smaller for shorts.
pub fn preferred_position_notional(size: SignedSize, spot_notional: Decimal, twap_notional: Decimal) -> Decimal {
    if size.is_long() {
        spot_notional.max(twap_notional)
    } else {
        spot_notional.min(twap_notional)
    }
}

// 4.2: what every increase/decrease/close step hands back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionResp {
    pub position: Position,
    pub exchanged_notional_value: Decimal,
    pub exchanged_position_size: Decimal,
    pub bad_debt: Decimal,
    pub funding_payment: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl_after: Decimal,
    /// Positive = trader pays into the vault, negative = vault pays the trader.
    pub margin_to_vault: Decimal,
    pub position_notional: Decimal,
}

impl PositionResp {
    pub fn empty(position: Position) -> Self {
        Self {
            position,
            exchanged_notional_value: Decimal::ZERO,
            exchanged_position_size: Decimal::ZERO,
            bad_debt: Decimal::ZERO,
            funding_payment: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl_after: Decimal::ZERO,
            margin_to_vault: Decimal::ZERO,
            position_notional: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeReason {
    MarketOrder,
    ClosePosition,
    PartialClose,
    AddMargin,
    RemoveMargin,
    Settlement,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use rust_decimal_macros::dec;

    fn position(size: Decimal, margin: Decimal, open_notional: Decimal) -> Position {
        Position {
            size: SignedSize::new(size),
            margin,
            open_notional,
            ..Position::zero(
                "ubtc:unusd".parse().unwrap(),
                Address::new("trader").unwrap(),
                Decimal::ZERO,
                1,
            )
        }
    }

    #[test]
    fn pnl_sign_follows_direction() {
        let long = position(dec!(10), dec!(100), dec!(1000));
        assert_eq!(long.unrealized_pnl(dec!(1100)), dec!(100));
        assert_eq!(long.unrealized_pnl(dec!(900)), dec!(-100));

        let short = position(dec!(-10), dec!(100), dec!(1000));
        assert_eq!(short.unrealized_pnl(dec!(1100)), dec!(-100));
        assert_eq!(short.unrealized_pnl(dec!(900)), dec!(100));
    }

    #[test]
    fn funding_payment_is_signed() {
        let long = position(dec!(10), dec!(100), dec!(1000));
        assert_eq!(long.funding_payment(dec!(0.5)), Some(dec!(5)));
        assert_eq!(long.funding_payment(dec!(-0.5)), Some(dec!(-5)));

        let short = position(dec!(-10), dec!(100), dec!(1000));
        assert_eq!(short.funding_payment(dec!(0.5)), Some(dec!(-5)));
        assert_eq!(short.funding_payment(Decimal::MAX), None);
    }

    #[test]
    fn margin_ratio_includes_pnl_and_funding() {
        let long = position(dec!(10), dec!(100), dec!(1000));
        // (100 + 0 - 0) / 1000
        assert_eq!(long.margin_ratio(dec!(1000), Decimal::ZERO), Some(dec!(0.1)));
        // (100 - 50 - 5) / 950
        let ratio = long.margin_ratio(dec!(950), dec!(0.5));
        assert_eq!(ratio, quo(dec!(45), dec!(950)));
        assert_eq!(long.margin_ratio(Decimal::ZERO, Decimal::ZERO), Some(Decimal::ZERO));
    }

    #[test]
    fn spot_notional_closes_against_pool() {
        let mut amm = Amm::new("ubtc:unusd".parse().unwrap(), 1, dec!(100), dec!(1));
        amm.swap_quote_asset(dec!(25), Direction::Long).unwrap();
        // pool now 80 base / 125 quote
        let long = position(dec!(20), dec!(5), dec!(25));
        assert_eq!(position_notional_spot(&amm, &long).unwrap(), dec!(25));

        let flat = position(Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
        assert_eq!(position_notional_spot(&amm, &flat).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn preferred_notional_per_direction() {
        let long = SignedSize::new(dec!(1));
        let short = SignedSize::new(dec!(-1));
        assert_eq!(preferred_position_notional(long, dec!(10), dec!(12)), dec!(12));
        assert_eq!(preferred_position_notional(short, dec!(10), dec!(12)), dec!(10));
    }
}
