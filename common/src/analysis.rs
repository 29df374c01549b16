//! Per-timeframe analysis records produced by the response normalizer
//! and the aggregated multi-timeframe state derived from them.

use crate::market::Timeframe;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market cycle classification for one timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketCycle {
    TradingRange,
    TrendingUp,
    TrendingDown,
    Transitional,
}

impl MarketCycle {
    /// Directional bias: +1 bullish, -1 bearish, 0 neutral.
    pub fn bias(&self) -> i8 {
        match self {
            MarketCycle::TrendingUp => 1,
            MarketCycle::TrendingDown => -1,
            MarketCycle::TradingRange | MarketCycle::Transitional => 0,
        }
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn bias(&self) -> i8 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
        }
    }
}

/// A value together with its provenance: declared directly by the model
/// or filled in by deterministic text inference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sourced<T> {
    pub value: T,
    pub inferred: bool,
}

impl<T> Sourced<T> {
    pub fn declared(value: T) -> Self {
        Self {
            value,
            inferred: false,
        }
    }

    pub fn inferred(value: T) -> Self {
        Self {
            value,
            inferred: true,
        }
    }
}

/// Key price levels attached to a narrative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyLevels {
    pub entry_trigger: Option<Sourced<Decimal>>,
    pub invalidation_level: Option<Sourced<Decimal>>,
    pub profit_target: Option<Sourced<Decimal>>,
}

/// A named price-pattern hypothesis with its key levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub pattern: String,
    pub status: String,
    pub key_levels: KeyLevels,
}

/// Executable trade plan extracted from the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub direction: Direction,
    pub entry_price: Sourced<Decimal>,
    pub stop_loss: Sourced<Decimal>,
    pub target_price: Sourced<Decimal>,
}

impl ActionPlan {
    /// Levels must be ordered consistently with the direction:
    /// long: stop < entry < target; short: target < entry < stop.
    pub fn levels_consistent(&self) -> bool {
        let entry = self.entry_price.value;
        let stop = self.stop_loss.value;
        let target = self.target_price.value;
        match self.direction {
            Direction::Long => stop < entry && entry < target,
            Direction::Short => target < entry && entry < stop,
        }
    }

    /// True when any of the three levels was filled by text inference.
    pub fn any_inferred(&self) -> bool {
        self.entry_price.inferred || self.stop_loss.inferred || self.target_price.inferred
    }
}

/// One normalized analysis for one (symbol, timeframe). Immutable once
/// created; a newer model call supersedes it via the aggregator upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerTimeframeAnalysis {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub market_cycle: Sourced<MarketCycle>,
    pub active_narrative: Narrative,
    pub alternative_narrative: Option<Narrative>,
    pub action_plan: Option<ActionPlan>,
    /// False when an action plan is present but its levels violate the
    /// direction ordering. Such records are kept, visibly invalid.
    pub plan_valid: bool,
    /// Model-declared signal confidence, 0-100.
    pub confidence: Option<f64>,
    pub rationale: String,
    pub created_at: DateTime<Utc>,
}

impl PerTimeframeAnalysis {
    /// Directional bias for consensus: trend cycles dominate; in a range
    /// the action-plan direction (if any) breaks the tie.
    pub fn bias(&self) -> i8 {
        let cycle_bias = self.market_cycle.value.bias();
        if cycle_bias != 0 {
            return cycle_bias;
        }
        self.action_plan.as_ref().map_or(0, |p| p.direction.bias())
    }
}

/// Latest analysis persisted per (symbol, timeframe). Owned by the
/// aggregator; overwritten on every new analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTimeframeState {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub analysis: PerTimeframeAnalysis,
    pub updated_at: DateTime<Utc>,
}

/// Derived cross-timeframe agreement for one symbol. Always re-derivable
/// from the current MultiTimeframeState rows; never the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusRecord {
    pub symbol: String,
    /// Weighted directional agreement, -1.0 (bearish) to 1.0 (bullish).
    pub score: f64,
    pub dominant_cycle: MarketCycle,
    pub timeframes: Vec<Timeframe>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn plan(direction: Direction, entry: i64, stop: i64, target: i64) -> ActionPlan {
        ActionPlan {
            direction,
            entry_price: Sourced::declared(Decimal::from(entry)),
            stop_loss: Sourced::declared(Decimal::from(stop)),
            target_price: Sourced::declared(Decimal::from(target)),
        }
    }

    #[test]
    fn test_long_level_ordering() {
        assert!(plan(Direction::Long, 100, 95, 110).levels_consistent());
        assert!(!plan(Direction::Long, 100, 105, 110).levels_consistent());
        assert!(!plan(Direction::Long, 100, 95, 98).levels_consistent());
    }

    #[test]
    fn test_short_level_ordering() {
        assert!(plan(Direction::Short, 100, 105, 90).levels_consistent());
        assert!(!plan(Direction::Short, 100, 95, 90).levels_consistent());
    }

    #[test]
    fn test_cycle_bias() {
        assert_eq!(MarketCycle::TrendingUp.bias(), 1);
        assert_eq!(MarketCycle::TrendingDown.bias(), -1);
        assert_eq!(MarketCycle::TradingRange.bias(), 0);
        assert_eq!(MarketCycle::Transitional.bias(), 0);
    }
}
