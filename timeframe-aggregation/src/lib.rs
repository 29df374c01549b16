//! Multi-Timeframe Aggregator
//!
//! Merges normalized per-timeframe analyses into the persisted
//! multi-timeframe state for a symbol and recomputes the cross-timeframe
//! consensus after every successful upsert. Writers serialize per
//! (symbol, timeframe); readers are lock-free and may observe a slightly
//! stale consensus, which is acceptable because the consensus is a
//! recomputable cache, never authoritative.

mod consensus;

pub use consensus::{compute_consensus, ConsensusConfig};

use anyhow::{Context, Result};
use chrono::Utc;
use common::{
    AnalysisStateStore, ConsensusRecord, MultiTimeframeState, PerTimeframeAnalysis, Timeframe,
};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Aggregates per-timeframe analyses into persisted state + consensus.
pub struct TimeframeAggregator<S: AnalysisStateStore> {
    store: Arc<S>,
    config: ConsensusConfig,
    // One async mutex per (symbol, timeframe); upsert ordering is
    // wall-clock arrival, so concurrent writers for the same key must
    // not interleave.
    write_locks: DashMap<(String, Timeframe), Arc<Mutex<()>>>,
}

impl<S: AnalysisStateStore> TimeframeAggregator<S> {
    pub fn new(store: Arc<S>, config: ConsensusConfig) -> Self {
        Self {
            store,
            config,
            write_locks: DashMap::new(),
        }
    }

    /// Upsert the state row for the analysis' (symbol, timeframe) and
    /// synchronously recompute the symbol's consensus over whatever
    /// timeframes are currently known. A failed normalization elsewhere
    /// never reaches this method, so partial consensus is the norm.
    pub async fn aggregate(
        &self,
        analysis: PerTimeframeAnalysis,
    ) -> Result<(MultiTimeframeState, ConsensusRecord)> {
        let key = (analysis.symbol.clone(), analysis.timeframe);
        let lock = self
            .write_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let state = MultiTimeframeState {
            symbol: analysis.symbol.clone(),
            timeframe: analysis.timeframe,
            analysis,
            // Arrival time, not the model's self-reported timestamp: the
            // model is not trusted for ordering.
            updated_at: Utc::now(),
        };
        self.store
            .upsert_state(&state)
            .await
            .context("failed to upsert multi-timeframe state")?;
        debug!(symbol = %state.symbol, timeframe = %state.timeframe, "state upserted");

        let consensus = self.recompute_consensus(&state.symbol).await?;
        Ok((state, consensus))
    }

    /// Recompute and persist the consensus for a symbol from the current
    /// state rows. Exposed for callers that mutate state out of band.
    pub async fn recompute_consensus(&self, symbol: &str) -> Result<ConsensusRecord> {
        let states = self.store.states_for_symbol(symbol).await?;
        let consensus = compute_consensus(symbol, &states, &self.config)
            .context("consensus requested for a symbol with no states")?;
        self.store.upsert_consensus(&consensus).await?;
        info!(
            symbol,
            score = consensus.score,
            dominant = ?consensus.dominant_cycle,
            timeframes = consensus.timeframes.len(),
            "consensus recomputed"
        );
        Ok(consensus)
    }
}
