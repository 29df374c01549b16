//! Risk metrics derivation.
//!
//! Every metric is computed independently from whatever inputs are
//! present: a metric whose input is missing becomes `None`, it is never
//! fabricated, and it never blocks the remaining metrics. When the whole
//! volatility context is absent the bundle is flagged unavailable while
//! the price-level metrics still compute.

use common::{ActionPlan, Candle, Direction, Timeframe};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

/// ATR lookback.
const ATR_PERIOD: usize = 14;

/// Fraction of the raw Kelly fraction actually recommended.
pub const KELLY_CONSERVATIVE_MULTIPLIER: f64 = 0.8;

/// OHLCV series supplied by the market-data fetcher, per timeframe the
/// volatility snapshot covers. Any series may be missing.
#[derive(Debug, Clone, Default)]
pub struct VolatilityContext {
    pub candles_15m: Option<Vec<Candle>>,
    pub candles_1h: Option<Vec<Candle>>,
    pub candles_1d: Option<Vec<Candle>>,
}

impl VolatilityContext {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.candles_15m.is_none() && self.candles_1h.is_none() && self.candles_1d.is_none()
    }

    fn candles(&self, timeframe: Timeframe) -> Option<&[Candle]> {
        match timeframe {
            Timeframe::M15 => self.candles_15m.as_deref(),
            Timeframe::H1 => self.candles_1h.as_deref(),
            Timeframe::D1 => self.candles_1d.as_deref(),
            Timeframe::H4 => None,
        }
    }
}

/// Account-level sizing inputs for manual trade review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParameters {
    pub account_balance: f64,
    /// Fraction of the account risked per trade.
    pub risk_per_trade: f64,
    /// Assumed historical win rate for expectancy and Kelly.
    pub win_rate: f64,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            account_balance: 10_000.0,
            risk_per_trade: 0.02,
            win_rate: 0.5,
        }
    }
}

/// One take-profit level of the R-multiple scale-out plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleOutLevel {
    pub label: String,
    pub price: Decimal,
    /// Fraction of the position closed at this level.
    pub fraction: f64,
}

/// Nullable risk metrics for one trade plan. `available` reflects
/// whether any volatility data backed the volatility-derived fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetricsBundle {
    pub available: bool,
    pub position_size: Option<f64>,
    pub max_loss: Option<f64>,
    pub expected_value: Option<f64>,
    pub risk_reward: Option<f64>,
    pub stop_distance_percent: Option<f64>,
    pub kelly_fraction: Option<f64>,
    pub kelly_fraction_adjusted: Option<f64>,
    pub atr_15m: Option<f64>,
    pub atr_1h: Option<f64>,
    pub atr_1d: Option<f64>,
    pub sharpe_estimate: Option<f64>,
    pub max_drawdown_estimate: Option<f64>,
    pub scale_out_plan: Vec<ScaleOutLevel>,
}

/// Derive the full metrics bundle for an action plan.
///
/// `plan` may be absent (analysis without an executable plan): the
/// volatility-derived fields still compute, the price-derived ones stay
/// `None`.
pub fn derive_risk_metrics(
    plan: Option<&ActionPlan>,
    params: &RiskParameters,
    context: &VolatilityContext,
) -> RiskMetricsBundle {
    let mut bundle = RiskMetricsBundle {
        available: !context.is_empty(),
        ..RiskMetricsBundle::default()
    };
    if !bundle.available {
        debug!("volatility context empty, volatility metrics omitted");
    }

    if let Some(plan) = plan {
        fill_price_metrics(&mut bundle, plan, params);
    }

    bundle.atr_15m = context.candles(Timeframe::M15).and_then(average_true_range);
    bundle.atr_1h = context.candles(Timeframe::H1).and_then(average_true_range);
    bundle.atr_1d = context.candles(Timeframe::D1).and_then(average_true_range);

    if let Some(daily) = context.candles(Timeframe::D1) {
        let closes: Vec<f64> = daily.iter().map(|c| c.close).collect();
        bundle.sharpe_estimate = sharpe_estimate(&closes);
        bundle.max_drawdown_estimate = max_drawdown(&closes);
    }

    bundle
}

fn fill_price_metrics(bundle: &mut RiskMetricsBundle, plan: &ActionPlan, params: &RiskParameters) {
    let entry = plan.entry_price.value;
    let stop = plan.stop_loss.value;
    let target = plan.target_price.value;

    let risk_per_unit = (entry - stop).abs();
    let reward_per_unit = (target - entry).abs();
    if risk_per_unit.is_zero() || entry.is_zero() {
        return;
    }

    let (Some(risk_f), Some(reward_f), Some(entry_f)) = (
        risk_per_unit.to_f64(),
        reward_per_unit.to_f64(),
        entry.to_f64(),
    ) else {
        return;
    };

    let risk_reward = reward_f / risk_f;
    bundle.risk_reward = Some(risk_reward);
    bundle.stop_distance_percent = Some(risk_f / entry_f * 100.0);

    let risk_amount = params.account_balance * params.risk_per_trade;
    let position_size = risk_amount / risk_f;
    bundle.max_loss = Some(risk_amount);
    bundle.position_size = Some(position_size);
    bundle.expected_value = Some(
        params.win_rate * reward_f * position_size
            - (1.0 - params.win_rate) * risk_f * position_size,
    );

    if risk_reward > 0.0 {
        let kelly = params.win_rate - (1.0 - params.win_rate) / risk_reward;
        bundle.kelly_fraction = Some(kelly);
        bundle.kelly_fraction_adjusted = Some((kelly * KELLY_CONSERVATIVE_MULTIPLIER).max(0.0));
    }

    bundle.scale_out_plan = scale_out_plan(plan.direction, entry, risk_per_unit);
}

/// Fixed R-multiple scale-out ladder: 30% at +1R, 30% at +2R, the
/// remaining 40% at +3R.
fn scale_out_plan(direction: Direction, entry: Decimal, risk_per_unit: Decimal) -> Vec<ScaleOutLevel> {
    let signed_r = match direction {
        Direction::Long => risk_per_unit,
        Direction::Short => -risk_per_unit,
    };
    vec![
        ScaleOutLevel {
            label: "TP1".to_string(),
            price: entry + signed_r,
            fraction: 0.3,
        },
        ScaleOutLevel {
            label: "TP2".to_string(),
            price: entry + signed_r * Decimal::from(2),
            fraction: 0.3,
        },
        ScaleOutLevel {
            label: "TP3".to_string(),
            price: entry + signed_r * Decimal::from(3),
            fraction: 0.4,
        },
    ]
}

/// Simple-moving-average ATR over the last `ATR_PERIOD` true ranges.
/// Needs at least `ATR_PERIOD + 1` candles.
fn average_true_range(candles: &[Candle]) -> Option<f64> {
    if candles.len() < ATR_PERIOD + 1 {
        return None;
    }

    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close;
            let candle = &w[1];
            (candle.high - candle.low)
                .max((candle.high - prev_close).abs())
                .max((candle.low - prev_close).abs())
        })
        .collect();

    let recent = &true_ranges[true_ranges.len() - ATR_PERIOD..];
    Some(recent.iter().sum::<f64>() / ATR_PERIOD as f64)
}

/// Annualized Sharpe estimate from daily closes, 5% risk-free rate.
fn sharpe_estimate(closes: &[f64]) -> Option<f64> {
    let returns = daily_returns(closes)?;
    let mean = Statistics::mean(&returns);
    let std_dev = Statistics::std_dev(&returns);
    // No dispersion means no defensible estimate; report nothing.
    if std_dev == 0.0 || !std_dev.is_finite() {
        return None;
    }

    let annualized_mean = mean * 365.0;
    let annualized_std = std_dev * (365.0_f64).sqrt();
    let risk_free = 0.05;
    Some((annualized_mean - risk_free) / annualized_std)
}

/// Peak-to-trough drawdown over the daily closes, as a fraction.
fn max_drawdown(closes: &[f64]) -> Option<f64> {
    if closes.len() < 2 {
        return None;
    }

    let mut peak = f64::MIN;
    let mut max_drawdown = 0.0;
    for &close in closes {
        if close > peak {
            peak = close;
        }
        let drawdown = (peak - close) / peak.max(1.0);
        if drawdown > max_drawdown {
            max_drawdown = drawdown;
        }
    }
    Some(max_drawdown)
}

fn daily_returns(closes: &[f64]) -> Option<Vec<f64>> {
    if closes.len() < 2 {
        return None;
    }
    Some(
        closes
            .windows(2)
            .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use common::Sourced;
    use std::str::FromStr;

    fn plan(entry: &str, stop: &str, target: &str) -> ActionPlan {
        ActionPlan {
            direction: Direction::Long,
            entry_price: Sourced::declared(Decimal::from_str(entry).unwrap()),
            stop_loss: Sourced::declared(Decimal::from_str(stop).unwrap()),
            target_price: Sourced::declared(Decimal::from_str(target).unwrap()),
        }
    }

    fn candles(count: usize, base: f64, step: f64) -> Vec<Candle> {
        let start = Utc::now() - Duration::days(count as i64);
        (0..count)
            .map(|i| {
                let close = base + step * i as f64;
                Candle {
                    timestamp: start + Duration::days(i as i64),
                    open: close - 1.0,
                    high: close + 2.0,
                    low: close - 2.0,
                    close,
                    volume: 1_000.0,
                }
            })
            .collect()
    }

    #[test]
    fn test_price_metrics_from_plan() {
        let bundle = derive_risk_metrics(
            Some(&plan("100", "95", "115")),
            &RiskParameters::default(),
            &VolatilityContext::empty(),
        );

        assert_eq!(bundle.risk_reward, Some(3.0));
        assert_eq!(bundle.max_loss, Some(200.0));
        assert_eq!(bundle.position_size, Some(40.0));
        assert_eq!(bundle.stop_distance_percent, Some(5.0));
        // Kelly with p=0.5, RR=3: 0.5 - 0.5/3.
        let kelly = bundle.kelly_fraction.unwrap();
        assert!((kelly - (0.5 - 0.5 / 3.0)).abs() < 1e-12);
        assert!(
            (bundle.kelly_fraction_adjusted.unwrap() - kelly * KELLY_CONSERVATIVE_MULTIPLIER).abs()
                < 1e-12
        );
        assert!(!bundle.available);
    }

    #[test]
    fn test_one_missing_atr_input_nulls_only_that_field() {
        let context = VolatilityContext {
            candles_15m: Some(candles(30, 100.0, 0.1)),
            candles_1h: None,
            candles_1d: Some(candles(30, 100.0, 0.5)),
        };
        let bundle =
            derive_risk_metrics(Some(&plan("100", "95", "115")), &RiskParameters::default(), &context);

        assert!(bundle.available);
        assert!(bundle.atr_15m.is_some());
        assert!(bundle.atr_1h.is_none());
        assert!(bundle.atr_1d.is_some());
        assert!(bundle.sharpe_estimate.is_some());
        assert!(bundle.max_drawdown_estimate.is_some());
        assert!(bundle.risk_reward.is_some());
    }

    #[test]
    fn test_no_plan_still_computes_volatility_metrics() {
        let context = VolatilityContext {
            candles_15m: None,
            candles_1h: None,
            candles_1d: Some(candles(30, 100.0, -0.5)),
        };
        let bundle = derive_risk_metrics(None, &RiskParameters::default(), &context);

        assert!(bundle.risk_reward.is_none());
        assert!(bundle.position_size.is_none());
        assert!(bundle.atr_1d.is_some());
        assert!(bundle.max_drawdown_estimate.unwrap() > 0.0);
        assert!(bundle.scale_out_plan.is_empty());
    }

    #[test]
    fn test_flat_closes_yield_no_sharpe() {
        // Zero return dispersion: the estimate is omitted, not reported
        // as a neutral 0.0.
        let context = VolatilityContext {
            candles_15m: None,
            candles_1h: None,
            candles_1d: Some(candles(30, 100.0, 0.0)),
        };
        let bundle = derive_risk_metrics(None, &RiskParameters::default(), &context);
        assert!(bundle.sharpe_estimate.is_none());
        // Drawdown over a flat series is still a real (zero) observation.
        assert_eq!(bundle.max_drawdown_estimate, Some(0.0));
    }

    #[test]
    fn test_too_few_candles_yield_no_atr() {
        let context = VolatilityContext {
            candles_15m: Some(candles(10, 100.0, 0.1)),
            candles_1h: None,
            candles_1d: None,
        };
        let bundle = derive_risk_metrics(None, &RiskParameters::default(), &context);
        assert!(bundle.atr_15m.is_none());
    }

    #[test]
    fn test_scale_out_ladder_long() {
        let bundle = derive_risk_metrics(
            Some(&plan("100", "95", "115")),
            &RiskParameters::default(),
            &VolatilityContext::empty(),
        );
        let prices: Vec<Decimal> = bundle.scale_out_plan.iter().map(|l| l.price).collect();
        assert_eq!(
            prices,
            vec![Decimal::from(105), Decimal::from(110), Decimal::from(115)]
        );
        let total: f64 = bundle.scale_out_plan.iter().map(|l| l.fraction).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_plan_yields_no_price_metrics() {
        let bundle = derive_risk_metrics(
            Some(&plan("100", "100", "115")),
            &RiskParameters::default(),
            &VolatilityContext::empty(),
        );
        assert!(bundle.risk_reward.is_none());
        assert!(bundle.position_size.is_none());
    }
}
