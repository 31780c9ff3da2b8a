// 7.0: discounts and rebates (DNR). fee tiers keyed by the trader's notional volume
// over the previous epoch. lookups pick the greatest threshold at or below the volume.

use crate::store::{Table, TierKey};
use crate::types::Address;
use rust_decimal::Decimal;

/// Blocks between garbage collections of a trader's old volume entries.
pub const DNR_GC_FREQUENCY: i64 = 1000;

/// Nearest-left inclusive lookup over a global tier table.
pub fn global_tier(tiers: &Table<Decimal, Decimal>, volume: Decimal) -> Option<Decimal> {
    tiers.range(..=volume).next_back().map(|(_, ratio)| *ratio)
}

/// Same lookup restricted to one trader's custom tiers.
pub fn trader_tier(tiers: &Table<TierKey, Decimal>, trader: &Address, volume: Decimal) -> Option<Decimal> {
    let start = TierKey {
        trader: trader.clone(),
        threshold: Decimal::MIN,
    };
    let end = TierKey {
        trader: trader.clone(),
        threshold: volume,
    };
    tiers.range(start..=end).next_back().map(|(_, ratio)| *ratio)
}

/// Trader tiers win over global tiers.
pub fn resolve_tier(
    global: &Table<Decimal, Decimal>,
    custom: &Table<TierKey, Decimal>,
    trader: &Address,
    volume: Decimal,
) -> Option<Decimal> {
    trader_tier(custom, trader, volume).or_else(|| global_tier(global, volume))
}

pub fn is_gc_block(block_height: i64, frequency: i64) -> bool {
    frequency > 0 && block_height % frequency == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Namespace;
    use rust_decimal_macros::dec;

    fn tiers() -> (Table<Decimal, Decimal>, Table<TierKey, Decimal>) {
        let mut global = Table::new(Namespace::GlobalDiscounts);
        global.insert(dec!(50_000), dec!(0.0008));
        global.insert(dec!(100_000), dec!(0.0005));

        let mut custom = Table::new(Namespace::TraderDiscounts);
        let vip = Address::new("vip").unwrap();
        custom.insert(TierKey { trader: vip, threshold: dec!(100_000) }, dec!(0.0001));
        (global, custom)
    }

    #[test]
    fn global_lookup_is_nearest_left_inclusive() {
        let (global, _) = tiers();
        assert_eq!(global_tier(&global, dec!(49_999)), None);
        assert_eq!(global_tier(&global, dec!(50_000)), Some(dec!(0.0008)));
        assert_eq!(global_tier(&global, dec!(99_999)), Some(dec!(0.0008)));
        assert_eq!(global_tier(&global, dec!(100_001)), Some(dec!(0.0005)));
    }

    #[test]
    fn custom_tiers_take_precedence() {
        let (global, custom) = tiers();
        let vip = Address::new("vip").unwrap();
        let regular = Address::new("regular").unwrap();

        assert_eq!(resolve_tier(&global, &custom, &vip, dec!(100_001)), Some(dec!(0.0001)));
        // below the custom threshold the global table still applies
        assert_eq!(resolve_tier(&global, &custom, &vip, dec!(60_000)), Some(dec!(0.0008)));
        assert_eq!(resolve_tier(&global, &custom, &regular, dec!(100_001)), Some(dec!(0.0005)));
    }

    #[test]
    fn gc_cadence() {
        assert!(is_gc_block(1000, DNR_GC_FREQUENCY));
        assert!(is_gc_block(2000, DNR_GC_FREQUENCY));
        assert!(!is_gc_block(999, DNR_GC_FREQUENCY));
        assert!(!is_gc_block(1000, 0));
    }
}
