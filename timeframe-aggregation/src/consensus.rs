//! Cross-timeframe consensus scoring.

use chrono::Utc;
use common::{ConsensusRecord, MarketCycle, MultiTimeframeState, Timeframe};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Consensus weighting. The weights are a fixed policy choice, exposed
/// here so operators can tune them without touching the scoring code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Weight per timeframe; longer timeframes weigh more.
    pub timeframe_weights: HashMap<Timeframe, f64>,
    /// Confidence scale used when the model declared none.
    pub default_confidence: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        let mut timeframe_weights = HashMap::new();
        timeframe_weights.insert(Timeframe::M15, 1.0);
        timeframe_weights.insert(Timeframe::H1, 2.0);
        timeframe_weights.insert(Timeframe::H4, 3.0);
        timeframe_weights.insert(Timeframe::D1, 4.0);
        Self {
            timeframe_weights,
            default_confidence: 0.5,
        }
    }
}

impl ConsensusConfig {
    fn weight(&self, timeframe: Timeframe) -> f64 {
        self.timeframe_weights
            .get(&timeframe)
            .copied()
            .unwrap_or(1.0)
    }
}

/// Compute the consensus over the currently-known states of one symbol.
///
/// Each timeframe contributes its directional bias (+1/0/-1) scaled by
/// its weight and confidence; the score is normalized into -1.0..1.0.
/// The dominant cycle is the cycle holding the largest cumulative
/// weighted confidence, ties resolved toward the longer timeframe.
pub fn compute_consensus(
    symbol: &str,
    states: &[MultiTimeframeState],
    config: &ConsensusConfig,
) -> Option<ConsensusRecord> {
    if states.is_empty() {
        return None;
    }

    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    let mut cycle_weights: HashMap<MarketCycle, f64> = HashMap::new();
    let mut cycle_longest: HashMap<MarketCycle, Timeframe> = HashMap::new();
    let mut timeframes: Vec<Timeframe> = Vec::with_capacity(states.len());

    for state in states {
        let analysis = &state.analysis;
        let confidence = analysis
            .confidence
            .map(|c| c / 100.0)
            .unwrap_or(config.default_confidence);
        let weight = config.weight(state.timeframe) * confidence;

        weighted_sum += weight * f64::from(analysis.bias());
        total_weight += weight;

        *cycle_weights.entry(analysis.market_cycle.value).or_insert(0.0) += weight;
        cycle_longest
            .entry(analysis.market_cycle.value)
            .and_modify(|tf| *tf = (*tf).max(state.timeframe))
            .or_insert(state.timeframe);
        timeframes.push(state.timeframe);
    }

    let score = if total_weight > 0.0 {
        (weighted_sum / total_weight).clamp(-1.0, 1.0)
    } else {
        0.0
    };

    let dominant_cycle = cycle_weights
        .iter()
        .max_by(|(cycle_a, weight_a), (cycle_b, weight_b)| {
            weight_a
                .partial_cmp(weight_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| cycle_longest[cycle_a].cmp(&cycle_longest[cycle_b]))
        })
        .map(|(cycle, _)| *cycle)?;

    timeframes.sort();
    Some(ConsensusRecord {
        symbol: symbol.to_string(),
        score,
        dominant_cycle,
        timeframes,
        updated_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{KeyLevels, Narrative, PerTimeframeAnalysis, Sourced};

    fn state(
        symbol: &str,
        timeframe: Timeframe,
        cycle: MarketCycle,
        confidence: Option<f64>,
    ) -> MultiTimeframeState {
        MultiTimeframeState {
            symbol: symbol.to_string(),
            timeframe,
            analysis: PerTimeframeAnalysis {
                symbol: symbol.to_string(),
                timeframe,
                market_cycle: Sourced::declared(cycle),
                active_narrative: Narrative {
                    pattern: "pattern".to_string(),
                    status: String::new(),
                    key_levels: KeyLevels::default(),
                },
                alternative_narrative: None,
                action_plan: None,
                plan_valid: true,
                confidence,
                rationale: String::new(),
                created_at: Utc::now(),
            },
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_daily_weight_dominates_consensus() {
        // 15m bearish (60), 1h neutral, 1d bullish (90): the daily view
        // must set both the dominant cycle and the score's sign.
        let states = vec![
            state("BTC/USDT", Timeframe::M15, MarketCycle::TrendingDown, Some(60.0)),
            state("BTC/USDT", Timeframe::H1, MarketCycle::TradingRange, None),
            state("BTC/USDT", Timeframe::D1, MarketCycle::TrendingUp, Some(90.0)),
        ];

        let consensus =
            compute_consensus("BTC/USDT", &states, &ConsensusConfig::default()).unwrap();
        assert_eq!(consensus.dominant_cycle, MarketCycle::TrendingUp);
        assert!(consensus.score > 0.0);
        assert!(consensus.score <= 1.0);
        assert_eq!(
            consensus.timeframes,
            vec![Timeframe::M15, Timeframe::H1, Timeframe::D1]
        );
    }

    #[test]
    fn test_unanimous_bullish_scores_one() {
        let states = vec![
            state("BTC/USDT", Timeframe::H1, MarketCycle::TrendingUp, Some(80.0)),
            state("BTC/USDT", Timeframe::D1, MarketCycle::TrendingUp, Some(80.0)),
        ];
        let consensus =
            compute_consensus("BTC/USDT", &states, &ConsensusConfig::default()).unwrap();
        assert!((consensus.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_neutral_scores_zero() {
        let states = vec![
            state("BTC/USDT", Timeframe::H1, MarketCycle::TradingRange, Some(50.0)),
            state("BTC/USDT", Timeframe::D1, MarketCycle::Transitional, None),
        ];
        let consensus =
            compute_consensus("BTC/USDT", &states, &ConsensusConfig::default()).unwrap();
        assert_eq!(consensus.score, 0.0);
    }

    #[test]
    fn test_empty_states_yield_no_consensus() {
        assert!(compute_consensus("BTC/USDT", &[], &ConsensusConfig::default()).is_none());
    }

    #[test]
    fn test_cycle_tie_resolves_to_longer_timeframe() {
        let states = vec![
            state("BTC/USDT", Timeframe::H4, MarketCycle::TrendingDown, Some(40.0)),
            state("BTC/USDT", Timeframe::D1, MarketCycle::TrendingUp, Some(30.0)),
        ];
        // 3.0 * 0.4 == 4.0 * 0.3: equal cumulative weight, daily wins.
        let consensus =
            compute_consensus("BTC/USDT", &states, &ConsensusConfig::default()).unwrap();
        assert_eq!(consensus.dominant_cycle, MarketCycle::TrendingUp);
    }
}
