//! Trading signal records derived from aggregated analyses.

use crate::analysis::Direction;
use crate::market::Timeframe;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Probability bucket derived from the model's signal confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbabilityBucket {
    Low,
    Medium,
    High,
}

impl ProbabilityBucket {
    /// Fixed thresholds; absent confidence defaults to Low.
    pub fn from_confidence(confidence: Option<f64>) -> Self {
        match confidence {
            Some(c) if c >= 70.0 => ProbabilityBucket::High,
            Some(c) if c >= 40.0 => ProbabilityBucket::Medium,
            _ => ProbabilityBucket::Low,
        }
    }
}

/// Lifecycle status of a persisted signal. Price/level fields are
/// immutable after creation; only the status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStatus {
    Active,
    Invalidated,
    Expired,
    Filled,
}

/// Signal classification by the timeframe level it was derived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    Breakout,
    Reversal,
    TrendContinuation,
    RangePlay,
}

/// One entry of the ordered validation checklist a signal went through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalCheck {
    pub name: String,
    pub passed: bool,
    /// Critical failures reject the signal; non-critical ones are
    /// persisted as warnings alongside an ACTIVE signal.
    pub critical: bool,
    pub detail: String,
}

/// A derived trading signal with entry/stop/target levels and the full
/// check breakdown, identified by a content-addressed id so the same
/// narrative snapshot never produces two distinct signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub id: Uuid,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub signal_type: SignalType,
    pub pattern: String,
    pub direction: Direction,
    pub probability: ProbabilityBucket,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub target_price: Decimal,
    /// |target - entry| / |entry - stop|.
    pub risk_reward: Decimal,
    pub status: SignalStatus,
    pub checks: Vec<SignalCheck>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TradingSignal {
    /// Deterministic id over the narrative snapshot: same symbol,
    /// timeframe, pattern and levels always map to the same signal.
    pub fn snapshot_id(
        symbol: &str,
        timeframe: Timeframe,
        pattern: &str,
        entry: Decimal,
        stop: Decimal,
        target: Decimal,
    ) -> Uuid {
        let name = format!(
            "{}|{}|{}|{}|{}|{}",
            symbol,
            timeframe.as_str(),
            pattern,
            entry,
            stop,
            target
        );
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &SignalCheck> {
        self.checks.iter().filter(|c| !c.passed && !c.critical)
    }
}
