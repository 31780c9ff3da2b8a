// 8.0 engine/core.rs: main engine. holds the ledger (tables, bank, events) and the
// read-only collaborators (oracle, epochs, authority).

use super::config::EngineConfig;
use super::results::EngineError;
use crate::amm::Amm;
use crate::bank::{Bank, BankLedger};
use crate::events::{Event, EventEmitter, EventId, EventPayload};
use crate::funding::EpochSource;
use crate::market::Market;
use crate::oracle::Oracle;
use crate::position::Position;
use crate::store::{MarketKey, PerpState, PositionKey, SnapshotKey};
use crate::sudo::Authority;
use crate::twap::ReserveSnapshot;
use crate::types::{Address, BlockInfo, Pair, Timestamp};
use rust_decimal::Decimal;

/** 8.1: everything a failed operation must roll back */
#[derive(Debug, Clone)]
pub(super) struct Ledger<B> {
    pub(super) state: PerpState,
    pub(super) bank: B,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
}

/** 8.2: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine<B: Bank = BankLedger> {
    pub(super) config: EngineConfig,
    pub(super) ledger: Ledger<B>,
    pub(super) oracle: Box<dyn Oracle>,
    pub(super) epochs: Box<dyn EpochSource>,
    pub(super) authority: Box<dyn Authority>,
    pub(super) block: BlockInfo,
}

impl<B: Bank> Engine<B> {
    pub fn new(
        config: EngineConfig,
        bank: B,
        oracle: Box<dyn Oracle>,
        epochs: Box<dyn EpochSource>,
        authority: Box<dyn Authority>,
    ) -> Self {
        Self {
            config,
            ledger: Ledger {
                state: PerpState::default(),
                bank,
                events: Vec::new(),
                next_event_id: 1,
            },
            oracle,
            epochs,
            authority,
            block: BlockInfo::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_block(&mut self, height: i64, time: Timestamp) {
        self.block = BlockInfo { height, time };
    }

    pub fn block(&self) -> BlockInfo {
        self.block
    }

    /// Moves to the next block, `millis` later.
    pub fn advance_block(&mut self, millis: i64) {
        self.block = BlockInfo {
            height: self.block.height + 1,
            time: Timestamp::from_millis(self.block.time.as_millis() + millis),
        };
    }

    pub fn set_oracle(&mut self, oracle: Box<dyn Oracle>) {
        self.oracle = oracle;
    }

    pub fn state(&self) -> &PerpState {
        &self.ledger.state
    }

    pub fn bank(&self) -> &B {
        &self.ledger.bank
    }

    /// Direct bank access for genesis funding.
    pub fn bank_mut(&mut self) -> &mut B {
        &mut self.ledger.bank
    }

    pub fn collateral_denom(&self) -> String {
        self.ledger
            .state
            .collateral
            .get()
            .cloned()
            .unwrap_or_else(|| self.config.default_collateral_denom.clone())
    }

    // 8.3: lookups. the latest version of a pair is the live market.

    pub fn market(&self, pair: &Pair) -> Result<Market, EngineError> {
        let version = self
            .ledger
            .state
            .market_last_version
            .get(pair)
            .copied()
            .ok_or_else(|| EngineError::PairNotFound(pair.clone()))?;
        self.market_by_version(pair, version)
    }

    pub fn market_by_version(&self, pair: &Pair, version: u64) -> Result<Market, EngineError> {
        self.market_by_key(&MarketKey {
            pair: pair.clone(),
            version,
        })
    }

    pub(super) fn market_by_key(&self, key: &MarketKey) -> Result<Market, EngineError> {
        self.ledger
            .state
            .markets
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::PairNotFound(key.pair.clone()))
    }

    pub fn amm(&self, pair: &Pair) -> Result<Amm, EngineError> {
        let market = self.market(pair)?;
        self.amm_for(&market)
    }

    pub fn amm_by_version(&self, pair: &Pair, version: u64) -> Result<Amm, EngineError> {
        self.ledger
            .state
            .amms
            .get(&MarketKey {
                pair: pair.clone(),
                version,
            })
            .cloned()
            .ok_or_else(|| EngineError::AmmNotFound {
                pair: pair.clone(),
                version,
            })
    }

    pub(super) fn amm_for(&self, market: &Market) -> Result<Amm, EngineError> {
        self.amm_by_version(&market.pair, market.version)
    }

    pub fn position(&self, pair: &Pair, trader: &Address) -> Result<Position, EngineError> {
        let market = self.market(pair)?;
        self.position_in(&market, trader)
            .ok_or_else(|| EngineError::PositionNotFound {
                pair: pair.clone(),
                trader: trader.clone(),
            })
    }

    pub(super) fn position_key(market: &Market, trader: &Address) -> PositionKey {
        PositionKey {
            pair: market.pair.clone(),
            version: market.version,
            trader: trader.clone(),
        }
    }

    pub(super) fn position_in(&self, market: &Market, trader: &Address) -> Option<Position> {
        self.ledger
            .state
            .positions
            .get(&Self::position_key(market, trader))
            .cloned()
    }

    pub(super) fn position_or_zero(&self, market: &Market, trader: &Address) -> Position {
        self.position_in(market, trader).unwrap_or_else(|| {
            Position::zero(
                market.pair.clone(),
                trader.clone(),
                market.latest_cumulative_premium_fraction,
                self.block.height,
            )
        })
    }

    pub fn mark_price(&self, pair: &Pair) -> Result<Decimal, EngineError> {
        Ok(self.amm(pair)?.mark_price())
    }

    // 8.4: writes

    pub(super) fn save_market(&mut self, market: Market) {
        let key = MarketKey {
            pair: market.pair.clone(),
            version: market.version,
        };
        self.ledger.state.markets.insert(key, market);
    }

    /// Persists the pool and records a reserve snapshot at the current block time.
    pub(super) fn save_amm(&mut self, amm: &Amm) {
        let timestamp = self.block.time;
        self.ledger.state.amms.insert(
            MarketKey {
                pair: amm.pair.clone(),
                version: amm.version,
            },
            amm.clone(),
        );
        self.ledger.state.reserve_snapshots.insert(
            SnapshotKey {
                pair: amm.pair.clone(),
                timestamp,
            },
            ReserveSnapshot {
                amm: amm.clone(),
                timestamp,
            },
        );
    }

    pub(super) fn save_position(&mut self, market: &Market, position: Position) {
        let key = Self::position_key(market, &position.trader);
        if position.is_empty() {
            self.ledger.state.positions.remove(&key);
        } else {
            self.ledger.state.positions.insert(key, position);
        }
    }

    pub(super) fn delete_position(&mut self, key: &PositionKey) {
        self.ledger.state.positions.remove(key);
    }

    pub(super) fn ensure_authorized(&self, sender: &Address) -> Result<(), EngineError> {
        if self.authority.is_authorized(sender) {
            Ok(())
        } else {
            Err(EngineError::Unauthorized(sender.clone()))
        }
    }

    /// Runs `op` against the ledger; on error every write it made is discarded.
    pub(super) fn transact<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let checkpoint = self.ledger.clone();
        let outcome = op(self);
        if outcome.is_err() {
            self.ledger = checkpoint;
        }
        outcome
    }

    // 8.5: events

    pub fn events(&self) -> &[Event] {
        &self.ledger.events
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.ledger.events.len().saturating_sub(count);
        &self.ledger.events[start..]
    }

    /// Hands every retained event to `sink` and clears the buffer.
    pub fn drain_events_into(&mut self, sink: &mut dyn EventEmitter) {
        for event in self.ledger.events.drain(..) {
            sink.emit(event);
        }
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(
            EventId(self.ledger.next_event_id),
            self.block.height,
            self.block.time,
            payload,
        );
        self.ledger.next_event_id += 1;

        if self.config.verbose {
            log::debug!("[event {}] {:?}", event.id.0, event.payload);
        }

        self.ledger.events.push(event);

        if self.ledger.events.len() > self.config.max_events {
            let drain_count = self.ledger.events.len() - self.config.max_events;
            self.ledger.events.drain(0..drain_count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::bank::{Holder, ModuleAccount};
    use crate::types::Coin;
    use rust_decimal_macros::dec;

    #[test]
    fn market_lookup_follows_last_version() {
        let engine = setup_engine();
        let market = engine.market(&btc()).unwrap();
        assert_eq!(market.version, 1);
        assert!(market.enabled);
        assert_eq!(engine.amm(&btc()).unwrap().sqrt_depth, dec!(1_000_000_000_000));

        let missing: Pair = "ueth:unusd".parse().unwrap();
        assert_eq!(engine.market(&missing), Err(EngineError::PairNotFound(missing.clone())));
    }

    #[test]
    fn transact_rolls_back_on_error() {
        let mut engine = setup_engine();
        let before = engine.bank().balance(&Holder::Account(alice()), COLLATERAL);

        let result: Result<(), EngineError> = engine.transact(|e| {
            e.ledger
                .bank
                .send_from_account_to_module(&alice(), ModuleAccount::Vault, &Coin::new(COLLATERAL, dec!(5)))?;
            Err(EngineError::PositionHealthy)
        });

        assert!(result.is_err());
        assert_eq!(engine.bank().balance(&Holder::Account(alice()), COLLATERAL), before);
    }

    #[test]
    fn events_trimmed_to_max() {
        let mut engine = setup_engine();
        engine.config.max_events = 2;
        for _ in 0..5 {
            engine.emit_event(EventPayload::DonateToEcosystemFund(crate::events::DonateToEcosystemFundEvent {
                sender: alice(),
                funds: Coin::new(COLLATERAL, dec!(1)),
            }));
        }
        assert_eq!(engine.events().len(), 2);
        assert_eq!(engine.recent_events(1).len(), 1);
    }

    #[test]
    fn advance_block_moves_height_and_time() {
        let mut engine = setup_engine();
        let start = engine.block();
        engine.advance_block(5_000);
        assert_eq!(engine.block().height, start.height + 1);
        assert_eq!(engine.block().time.as_millis(), start.time.as_millis() + 5_000);
    }
}
