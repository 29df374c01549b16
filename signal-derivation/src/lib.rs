//! Signal Derivation Engine
//!
//! Converts an aggregated per-timeframe analysis (plus externally fetched
//! OHLCV volatility data) into a trading-signal record, and derives the
//! nullable risk metrics bundle for manual trade review. Both paths are
//! pure functions over their inputs; no I/O happens here.

mod risk;

pub use risk::{
    derive_risk_metrics, RiskMetricsBundle, RiskParameters, ScaleOutLevel, VolatilityContext,
    KELLY_CONSERVATIVE_MULTIPLIER,
};

use chrono::{DateTime, Duration, Utc};
use common::{
    Direction, MarketCycle, PerTimeframeAnalysis, ProbabilityBucket, SignalCheck, SignalRejectReason,
    SignalRejected, SignalStatus, SignalType, TradingSignal,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Engine knobs. The risk-reward floor is a warning threshold, not a
/// rejection criterion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub min_risk_reward: Decimal,
    /// Signal lifetime in bars of its own timeframe.
    pub ttl_bars: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // 1.5
            min_risk_reward: Decimal::new(15, 1),
            ttl_bars: 96,
        }
    }
}

pub struct SignalEngine {
    config: EngineConfig,
}

impl SignalEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Derive a signal from one analysis, or reject it with a reason.
    ///
    /// Rejection order: no plan, degenerate levels (stop or target equal
    /// to entry), then the ordered checklist. Critical check failures
    /// reject; non-critical ones are recorded on an ACTIVE signal as
    /// warnings.
    pub fn derive_signal(
        &self,
        analysis: &PerTimeframeAnalysis,
        context: &VolatilityContext,
    ) -> Result<TradingSignal, SignalRejected> {
        let plan = analysis.action_plan.as_ref().ok_or_else(|| {
            SignalRejected::new(
                SignalRejectReason::NoActionPlan,
                format!(
                    "analysis for {} {} carries no action plan",
                    analysis.symbol, analysis.timeframe
                ),
            )
        })?;

        let entry = plan.entry_price.value;
        let stop = plan.stop_loss.value;
        let target = plan.target_price.value;
        if stop == entry || target == entry {
            return Err(SignalRejected::new(
                SignalRejectReason::DegenerateLevels,
                format!("entry {entry}, stop {stop}, target {target}"),
            ));
        }

        let risk_reward = (target - entry).abs() / (entry - stop).abs();

        let checks = vec![
            SignalCheck {
                name: "pattern_recognized".to_string(),
                passed: !analysis.active_narrative.pattern.trim().is_empty(),
                critical: false,
                detail: analysis.active_narrative.pattern.clone(),
            },
            SignalCheck {
                name: "levels_monotonic".to_string(),
                passed: plan.levels_consistent(),
                critical: true,
                detail: format!("entry {entry}, stop {stop}, target {target}"),
            },
            SignalCheck {
                name: "direction_present".to_string(),
                passed: true,
                critical: true,
                detail: format!("{:?}", plan.direction),
            },
            SignalCheck {
                name: "risk_reward_floor".to_string(),
                passed: risk_reward >= self.config.min_risk_reward,
                critical: false,
                detail: format!("{risk_reward} vs floor {}", self.config.min_risk_reward),
            },
            SignalCheck {
                name: "volatility_available".to_string(),
                passed: !context.is_empty(),
                critical: false,
                detail: String::new(),
            },
        ];

        if let Some(failed) = checks.iter().find(|c| c.critical && !c.passed) {
            return Err(SignalRejected::new(
                SignalRejectReason::InvalidLevels,
                format!("critical check '{}' failed: {}", failed.name, failed.detail),
            ));
        }
        for check in checks.iter().filter(|c| !c.passed) {
            warn!(
                symbol = %analysis.symbol,
                timeframe = %analysis.timeframe,
                check = %check.name,
                "signal check failed, persisting as warning"
            );
        }

        let created_at = Utc::now();
        let ttl = Duration::minutes(i64::from(analysis.timeframe.minutes()) * self.config.ttl_bars);
        let signal = TradingSignal {
            id: TradingSignal::snapshot_id(
                &analysis.symbol,
                analysis.timeframe,
                &analysis.active_narrative.pattern,
                entry,
                stop,
                target,
            ),
            symbol: analysis.symbol.clone(),
            timeframe: analysis.timeframe,
            signal_type: classify(analysis.market_cycle.value, plan.direction),
            pattern: analysis.active_narrative.pattern.clone(),
            direction: plan.direction,
            probability: ProbabilityBucket::from_confidence(analysis.confidence),
            entry_price: entry,
            stop_loss: stop,
            target_price: target,
            risk_reward,
            status: SignalStatus::Active,
            checks,
            created_at,
            expires_at: Some(created_at + ttl),
        };
        debug!(symbol = %signal.symbol, id = %signal.id, "signal derived");
        Ok(signal)
    }

    /// Derive the nullable risk metrics bundle for the same analysis.
    pub fn derive_risk_metrics(
        &self,
        analysis: &PerTimeframeAnalysis,
        params: &RiskParameters,
        context: &VolatilityContext,
    ) -> RiskMetricsBundle {
        risk::derive_risk_metrics(analysis.action_plan.as_ref(), params, context)
    }
}

/// Classify the signal by the relation between cycle and plan direction.
fn classify(cycle: MarketCycle, direction: Direction) -> SignalType {
    match cycle {
        MarketCycle::TradingRange => SignalType::RangePlay,
        MarketCycle::Transitional => SignalType::Breakout,
        MarketCycle::TrendingUp | MarketCycle::TrendingDown => {
            if cycle.bias() == direction.bias() {
                SignalType::TrendContinuation
            } else {
                SignalType::Reversal
            }
        }
    }
}

/// Compute the status transition an observed price implies for an ACTIVE
/// signal. Returns `None` when nothing changes. Stop breach is checked
/// before target so a bar spanning both invalidates.
pub fn evaluate_transition(
    signal: &TradingSignal,
    last_price: Decimal,
    now: DateTime<Utc>,
) -> Option<SignalStatus> {
    if signal.status != SignalStatus::Active {
        return None;
    }
    if let Some(expires_at) = signal.expires_at {
        if now >= expires_at {
            return Some(SignalStatus::Expired);
        }
    }
    match signal.direction {
        Direction::Long => {
            if last_price <= signal.stop_loss {
                Some(SignalStatus::Invalidated)
            } else if last_price >= signal.target_price {
                Some(SignalStatus::Filled)
            } else {
                None
            }
        }
        Direction::Short => {
            if last_price >= signal.stop_loss {
                Some(SignalStatus::Invalidated)
            } else if last_price <= signal.target_price {
                Some(SignalStatus::Filled)
            } else {
                None
            }
        }
    }
}
