//! Persistent store interfaces and in-memory implementations.
//!
//! One trait per entity family, keyed as the data model requires:
//! (symbol, timeframe) for states, signal id for signals, item id for
//! pipeline items. In-memory backends are used by tests and development;
//! the SQLite backend in `crate::sqlite` implements the same traits.

use crate::analysis::{ConsensusRecord, MultiTimeframeState};
use crate::market::Timeframe;
use crate::pipeline::{ItemStatus, PipelineItem};
use crate::signal::{SignalStatus, TradingSignal};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Storage for multi-timeframe states and their derived consensus.
#[async_trait]
pub trait AnalysisStateStore: Send + Sync {
    /// Insert or overwrite the state row for (symbol, timeframe).
    async fn upsert_state(&self, state: &MultiTimeframeState) -> Result<()>;

    async fn get_state(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<MultiTimeframeState>>;

    /// All currently-known states for a symbol, shortest timeframe first.
    async fn states_for_symbol(&self, symbol: &str) -> Result<Vec<MultiTimeframeState>>;

    async fn upsert_consensus(&self, consensus: &ConsensusRecord) -> Result<()>;

    async fn get_consensus(&self, symbol: &str) -> Result<Option<ConsensusRecord>>;
}

/// Storage for derived trading signals.
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Insert a signal; overwrites an existing row with the same id
    /// (ids are content-addressed per narrative snapshot).
    async fn upsert_signal(&self, signal: &TradingSignal) -> Result<()>;

    async fn get_signal(&self, id: Uuid) -> Result<Option<TradingSignal>>;

    /// ACTIVE signals for a symbol, optionally restricted to a timeframe.
    async fn active_signals(
        &self,
        symbol: &str,
        timeframe: Option<Timeframe>,
    ) -> Result<Vec<TradingSignal>>;

    /// Transition a signal's status. Level fields stay immutable.
    async fn update_signal_status(&self, id: Uuid, status: SignalStatus) -> Result<bool>;
}

/// Storage for pipeline items.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn insert_item(&self, item: &PipelineItem) -> Result<()>;

    async fn get_item(&self, id: &str) -> Result<Option<PipelineItem>>;

    /// Items whose status exactly matches `status`.
    async fn items_with_status(&self, status: ItemStatus) -> Result<Vec<PipelineItem>>;

    /// Write payload, status and failure fields in one atomic operation.
    /// A reader sees either the item before or after the call, never a
    /// half-advanced mix.
    async fn update_item(&self, item: &PipelineItem) -> Result<()>;
}

/// In-memory analysis state store.
#[derive(Default)]
pub struct MemoryStateStore {
    states: RwLock<HashMap<(String, Timeframe), MultiTimeframeState>>,
    consensus: RwLock<HashMap<String, ConsensusRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnalysisStateStore for MemoryStateStore {
    async fn upsert_state(&self, state: &MultiTimeframeState) -> Result<()> {
        let mut states = self.states.write().await;
        states.insert((state.symbol.clone(), state.timeframe), state.clone());
        Ok(())
    }

    async fn get_state(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<MultiTimeframeState>> {
        let states = self.states.read().await;
        Ok(states.get(&(symbol.to_string(), timeframe)).cloned())
    }

    async fn states_for_symbol(&self, symbol: &str) -> Result<Vec<MultiTimeframeState>> {
        let states = self.states.read().await;
        let mut rows: Vec<_> = states
            .values()
            .filter(|s| s.symbol == symbol)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.timeframe);
        Ok(rows)
    }

    async fn upsert_consensus(&self, consensus: &ConsensusRecord) -> Result<()> {
        let mut records = self.consensus.write().await;
        records.insert(consensus.symbol.clone(), consensus.clone());
        Ok(())
    }

    async fn get_consensus(&self, symbol: &str) -> Result<Option<ConsensusRecord>> {
        let records = self.consensus.read().await;
        Ok(records.get(symbol).cloned())
    }
}

/// In-memory signal store.
#[derive(Default)]
pub struct MemorySignalStore {
    signals: RwLock<HashMap<Uuid, TradingSignal>>,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalStore for MemorySignalStore {
    async fn upsert_signal(&self, signal: &TradingSignal) -> Result<()> {
        let mut signals = self.signals.write().await;
        signals.insert(signal.id, signal.clone());
        Ok(())
    }

    async fn get_signal(&self, id: Uuid) -> Result<Option<TradingSignal>> {
        let signals = self.signals.read().await;
        Ok(signals.get(&id).cloned())
    }

    async fn active_signals(
        &self,
        symbol: &str,
        timeframe: Option<Timeframe>,
    ) -> Result<Vec<TradingSignal>> {
        let signals = self.signals.read().await;
        let mut rows: Vec<_> = signals
            .values()
            .filter(|s| s.status == SignalStatus::Active && s.symbol == symbol)
            .filter(|s| timeframe.map_or(true, |tf| s.timeframe == tf))
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.created_at);
        Ok(rows)
    }

    async fn update_signal_status(&self, id: Uuid, status: SignalStatus) -> Result<bool> {
        let mut signals = self.signals.write().await;
        match signals.get_mut(&id) {
            Some(signal) => {
                signal.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// In-memory pipeline item store. Updates hold the write lock for the
/// whole payload+status write, matching the atomicity contract.
#[derive(Default)]
pub struct MemoryPipelineStore {
    items: RwLock<HashMap<String, PipelineItem>>,
}

impl MemoryPipelineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineStore for MemoryPipelineStore {
    async fn insert_item(&self, item: &PipelineItem) -> Result<()> {
        let mut items = self.items.write().await;
        if items.contains_key(&item.id) {
            anyhow::bail!("pipeline item '{}' already exists", item.id);
        }
        items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get_item(&self, id: &str) -> Result<Option<PipelineItem>> {
        let items = self.items.read().await;
        Ok(items.get(id).cloned())
    }

    async fn items_with_status(&self, status: ItemStatus) -> Result<Vec<PipelineItem>> {
        let items = self.items.read().await;
        let mut rows: Vec<_> = items
            .values()
            .filter(|i| i.status == status)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn update_item(&self, item: &PipelineItem) -> Result<()> {
        let mut items = self.items.write().await;
        if !items.contains_key(&item.id) {
            anyhow::bail!("pipeline item '{}' not found", item.id);
        }
        items.insert(item.id.clone(), item.clone());
        Ok(())
    }
}
