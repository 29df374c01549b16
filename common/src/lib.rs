//! Shared domain types, failure taxonomy, collaborator interfaces and
//! store backends for the AI price-action analysis pipeline.
//!
//! Everything downstream components persist or exchange lives here:
//! per-timeframe analyses, multi-timeframe states, consensus records,
//! trading signals and pipeline items, each with its store trait and
//! an in-memory plus a SQLite implementation.

pub mod analysis;
pub mod error;
pub mod market;
pub mod pipeline;
pub mod providers;
pub mod signal;
pub mod sqlite;
pub mod store;

pub use analysis::{
    ActionPlan, ConsensusRecord, Direction, KeyLevels, MarketCycle, MultiTimeframeState,
    Narrative, PerTimeframeAnalysis, Sourced,
};
pub use error::{
    ParseFailure, ParseFailureReason, SignalRejectReason, SignalRejected, StageFailure,
    UpstreamUnavailable,
};
pub use market::{Candle, Timeframe};
pub use pipeline::{ItemStatus, PipelineItem};
pub use providers::{LlmProvider, MarketDataFetcher};
pub use signal::{
    ProbabilityBucket, SignalCheck, SignalStatus, SignalType, TradingSignal,
};
pub use sqlite::SqliteStore;
pub use store::{
    AnalysisStateStore, MemoryPipelineStore, MemorySignalStore, MemoryStateStore, PipelineStore,
    SignalStore,
};
