//! Typed tables backing the perp core.
//!
//! Every entity lives in its own ordered table with a fixed numeric namespace.
//! Composite keys derive `Ord` field by field, so all entries sharing a key
//! prefix (one pair's snapshots, one trader's volumes) are contiguous and can
//! be range-scanned in either direction.

use crate::amm::Amm;
use crate::market::Market;
use crate::position::Position;
use crate::twap::ReserveSnapshot;
use crate::types::{Address, Pair, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::ops::RangeBounds;

/// Storage prefix of each table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Namespace {
    Markets = 11,
    Amms = 12,
    Positions = 13,
    ReserveSnapshots = 14,
    DnrEpoch = 15,
    TraderVolumes = 16,
    GlobalDiscounts = 17,
    TraderDiscounts = 18,
    GlobalRebates = 19,
    TraderRebates = 20,
    MarketLastVersion = 21,
    Collateral = 22,
    DnrEpochName = 23,
}

impl Namespace {
    pub fn prefix(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarketKey {
    pub pair: Pair,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub pair: Pair,
    pub version: u64,
    pub trader: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub pair: Pair,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VolumeKey {
    pub trader: Address,
    pub epoch: u64,
}

/// Per-trader discount or rebate tier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TierKey {
    pub trader: Address,
    pub threshold: Decimal,
}

#[derive(Debug, Clone)]
pub struct Table<K, V> {
    namespace: Namespace,
    entries: BTreeMap<K, V>,
}

impl<K: Ord + Clone, V: Clone> Table<K, V> {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            entries: BTreeMap::new(),
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key)
    }

    pub fn range<R: RangeBounds<K>>(&self, range: R) -> btree_map::Range<'_, K, V> {
        self.entries.range(range)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, K, V> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Single-value table.
#[derive(Debug, Clone)]
pub struct Item<V> {
    namespace: Namespace,
    value: Option<V>,
}

impl<V: Clone> Item<V> {
    pub fn new(namespace: Namespace) -> Self {
        Self { namespace, value: None }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn get(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub fn set(&mut self, value: V) {
        self.value = Some(value);
    }
}

/// Every table the perp core persists.
#[derive(Debug, Clone)]
pub struct PerpState {
    pub markets: Table<MarketKey, Market>,
    pub amms: Table<MarketKey, Amm>,
    pub positions: Table<PositionKey, Position>,
    pub reserve_snapshots: Table<SnapshotKey, ReserveSnapshot>,
    pub dnr_epoch: Item<u64>,
    pub trader_volumes: Table<VolumeKey, Decimal>,
    pub global_discounts: Table<Decimal, Decimal>,
    pub trader_discounts: Table<TierKey, Decimal>,
    pub global_rebates: Table<Decimal, Decimal>,
    pub trader_rebates: Table<TierKey, Decimal>,
    pub market_last_version: Table<Pair, u64>,
    pub collateral: Item<String>,
    pub dnr_epoch_name: Item<String>,
}

impl Default for PerpState {
    fn default() -> Self {
        Self {
            markets: Table::new(Namespace::Markets),
            amms: Table::new(Namespace::Amms),
            positions: Table::new(Namespace::Positions),
            reserve_snapshots: Table::new(Namespace::ReserveSnapshots),
            dnr_epoch: Item::new(Namespace::DnrEpoch),
            trader_volumes: Table::new(Namespace::TraderVolumes),
            global_discounts: Table::new(Namespace::GlobalDiscounts),
            trader_discounts: Table::new(Namespace::TraderDiscounts),
            global_rebates: Table::new(Namespace::GlobalRebates),
            trader_rebates: Table::new(Namespace::TraderRebates),
            market_last_version: Table::new(Namespace::MarketLastVersion),
            collateral: Item::new(Namespace::Collateral),
            dnr_epoch_name: Item::new(Namespace::DnrEpochName),
        }
    }
}

impl PerpState {
    /// Snapshots of `pair` taken at or before `now`, newest first.
    pub fn snapshots_until<'a>(
        &'a self,
        pair: &Pair,
        now: Timestamp,
    ) -> impl Iterator<Item = &'a ReserveSnapshot> + 'a {
        let start = SnapshotKey {
            pair: pair.clone(),
            timestamp: Timestamp::from_millis(i64::MIN),
        };
        let end = SnapshotKey {
            pair: pair.clone(),
            timestamp: now,
        };
        self.reserve_snapshots.range(start..=end).rev().map(|(_, snapshot)| snapshot)
    }

    /// Volume keys of `trader` for epochs strictly below `before_epoch`, newest first.
    pub fn trader_volume_keys_before(&self, trader: &Address, before_epoch: u64) -> Vec<VolumeKey> {
        let start = VolumeKey {
            trader: trader.clone(),
            epoch: 0,
        };
        let end = VolumeKey {
            trader: trader.clone(),
            epoch: before_epoch,
        };
        self.trader_volumes
            .range(start..end)
            .rev()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn namespaces(&self) -> [Namespace; 13] {
        [
            self.markets.namespace(),
            self.amms.namespace(),
            self.positions.namespace(),
            self.reserve_snapshots.namespace(),
            self.dnr_epoch.namespace(),
            self.trader_volumes.namespace(),
            self.global_discounts.namespace(),
            self.trader_discounts.namespace(),
            self.global_rebates.namespace(),
            self.trader_rebates.namespace(),
            self.market_last_version.namespace(),
            self.collateral.namespace(),
            self.dnr_epoch_name.namespace(),
        ]
    }
}
