//! Response Normalizer
//!
//! Parses a raw model response into typed per-timeframe analysis
//! records. Strict structured decoding runs first; missing price fields
//! are then repaired by deterministic text inference over the narrative
//! section, and every repaired field is tagged as inferred so downstream
//! consumers can discount it. A timeframe that cannot be normalized
//! yields an explicit `ParseFailure` instead of a fabricated record.

mod extract;
mod infer;

pub use extract::{split_response, SplitResponse};
pub use infer::{infer_price, PriceField};

use chrono::Utc;
use common::{
    ActionPlan, Direction, KeyLevels, MarketCycle, Narrative, ParseFailure, ParseFailureReason,
    PerTimeframeAnalysis, Sourced, Timeframe,
};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Outcome per expected timeframe: a typed record or an explicit failure.
pub type NormalizedResponse = BTreeMap<Timeframe, Result<PerTimeframeAnalysis, ParseFailure>>;

/// Normalizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Repair missing price fields from the narrative section.
    pub infer_missing_levels: bool,
    /// Cycle assumed when the payload omits or garbles `marketCycle`;
    /// always tagged inferred.
    pub default_cycle: MarketCycle,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            infer_missing_levels: true,
            default_cycle: MarketCycle::TradingRange,
        }
    }
}

/// Parses model responses into per-timeframe analysis records.
pub struct ResponseNormalizer {
    config: NormalizerConfig,
}

impl Default for ResponseNormalizer {
    fn default() -> Self {
        Self::new(NormalizerConfig::default())
    }
}

impl ResponseNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Normalize one raw response for `symbol` into records for every
    /// expected timeframe. Failures are per-timeframe: one bad section
    /// never poisons the others.
    pub fn normalize(
        &self,
        symbol: &str,
        raw_text: &str,
        expected: &[Timeframe],
    ) -> NormalizedResponse {
        let split = split_response(raw_text);

        let payload = split
            .json
            .as_deref()
            .and_then(|json| serde_json::from_str::<Value>(json).ok());

        let Some(Value::Object(payload)) = payload else {
            warn!(symbol, "no structured payload located in model response");
            return expected
                .iter()
                .map(|&tf| {
                    (
                        tf,
                        Err(ParseFailure::new(
                            tf,
                            ParseFailureReason::MalformedJson,
                            "no JSON payload located in response",
                        )),
                    )
                })
                .collect();
        };

        expected
            .iter()
            .map(|&tf| {
                let outcome = match payload.get(tf.as_str()) {
                    Some(section) => self.decode_timeframe(symbol, tf, section, &split.narrative),
                    None if split.narrative.contains(tf.as_str()) => Err(ParseFailure::new(
                        tf,
                        ParseFailureReason::MissingTimeframe,
                        "timeframe mentioned in narrative but absent from payload",
                    )),
                    None => Err(ParseFailure::new(
                        tf,
                        ParseFailureReason::MissingTimeframe,
                        "timeframe absent from payload and narrative",
                    )),
                };
                if let Err(failure) = &outcome {
                    debug!(symbol, timeframe = %tf, reason = ?failure.reason, "timeframe not normalized");
                }
                (tf, outcome)
            })
            .collect()
    }

    fn decode_timeframe(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        section: &Value,
        narrative_text: &str,
    ) -> Result<PerTimeframeAnalysis, ParseFailure> {
        let Some(section) = section.as_object() else {
            return Err(ParseFailure::new(
                timeframe,
                ParseFailureReason::MissingField,
                "timeframe entry is not an object",
            ));
        };

        let market_cycle = match section.get("marketCycle").and_then(Value::as_str) {
            Some(text) => match decode_cycle(text) {
                Some(cycle) => Sourced::declared(cycle),
                None => {
                    debug!(symbol, timeframe = %timeframe, cycle = text, "unrecognized market cycle, defaulting");
                    Sourced::inferred(self.config.default_cycle)
                }
            },
            None => Sourced::inferred(self.config.default_cycle),
        };

        let active_narrative = self
            .decode_narrative(timeframe, section.get("activeNarrative"), narrative_text, true)?
            .ok_or_else(|| {
                ParseFailure::new(
                    timeframe,
                    ParseFailureReason::MissingField,
                    "activeNarrative.pattern missing",
                )
            })?;

        let alternative_narrative = self.decode_narrative(
            timeframe,
            section.get("alternativeNarrative"),
            narrative_text,
            false,
        )?;

        let action_plan = self.decode_action_plan(
            symbol,
            timeframe,
            section.get("actionPlan"),
            narrative_text,
        )?;

        let plan_valid = action_plan
            .as_ref()
            .map_or(true, ActionPlan::levels_consistent);
        if !plan_valid {
            warn!(symbol, timeframe = %timeframe, "action plan levels inconsistent with direction");
        }

        let confidence = section
            .get("signalConfidence")
            .or_else(|| section.get("confidence"))
            .and_then(Value::as_f64)
            .filter(|c| (0.0..=100.0).contains(c));

        let rationale = section
            .get("rationale")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        Ok(PerTimeframeAnalysis {
            symbol: symbol.to_string(),
            timeframe,
            market_cycle,
            active_narrative,
            alternative_narrative,
            action_plan,
            plan_valid,
            confidence,
            rationale,
            created_at: Utc::now(),
        })
    }

    /// Decode a narrative block. Returns Ok(None) when the block or its
    /// pattern name is absent; the caller decides whether that is fatal.
    fn decode_narrative(
        &self,
        timeframe: Timeframe,
        block: Option<&Value>,
        narrative_text: &str,
        infer_levels: bool,
    ) -> Result<Option<Narrative>, ParseFailure> {
        let Some(block) = block.and_then(Value::as_object) else {
            return Ok(None);
        };

        let pattern = block
            .get("pattern")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|p| !p.is_empty());
        let Some(pattern) = pattern else {
            return Ok(None);
        };

        let status = block
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let levels = block.get("keyLevels").and_then(Value::as_object);
        let level = |key: &str, field: PriceField| -> Result<Option<Sourced<Decimal>>, ParseFailure> {
            let declared = parse_price(timeframe, levels.and_then(|l| l.get(key)))?;
            if let Some(value) = declared {
                return Ok(Some(Sourced::declared(value)));
            }
            if infer_levels && self.config.infer_missing_levels {
                if let Some(value) = infer_price(narrative_text, field) {
                    return Ok(Some(Sourced::inferred(value)));
                }
            }
            Ok(None)
        };

        Ok(Some(Narrative {
            pattern: pattern.to_string(),
            status,
            key_levels: KeyLevels {
                entry_trigger: level("entryTrigger", PriceField::Entry)?,
                invalidation_level: level("invalidationLevel", PriceField::Stop)?,
                profit_target: level("profitTarget", PriceField::Target)?,
            },
        }))
    }

    /// Decode the action plan. A plan needs a direction and all three
    /// levels; anything unobtainable (even after inference) drops the
    /// plan entirely rather than fabricating values.
    fn decode_action_plan(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        block: Option<&Value>,
        narrative_text: &str,
    ) -> Result<Option<ActionPlan>, ParseFailure> {
        let Some(block) = block.and_then(Value::as_object) else {
            return Ok(None);
        };

        let direction = block
            .get("direction")
            .and_then(Value::as_str)
            .and_then(decode_direction);
        let Some(direction) = direction else {
            debug!(symbol, timeframe = %timeframe, "action plan without a usable direction");
            return Ok(None);
        };

        let level = |key: &str, field: PriceField| -> Result<Option<Sourced<Decimal>>, ParseFailure> {
            let declared = parse_price(timeframe, block.get(key))?;
            if let Some(value) = declared {
                return Ok(Some(Sourced::declared(value)));
            }
            if self.config.infer_missing_levels {
                if let Some(value) = infer_price(narrative_text, field) {
                    debug!(symbol, timeframe = %timeframe, field = field.name(), %value, "level inferred from narrative");
                    return Ok(Some(Sourced::inferred(value)));
                }
            }
            Ok(None)
        };

        let entry = level("entryPrice", PriceField::Entry)?;
        let stop = level("stopLoss", PriceField::Stop)?;
        let target = level("targetPrice", PriceField::Target)?;

        match (entry, stop, target) {
            (Some(entry_price), Some(stop_loss), Some(target_price)) => Ok(Some(ActionPlan {
                direction,
                entry_price,
                stop_loss,
                target_price,
            })),
            _ => {
                debug!(symbol, timeframe = %timeframe, "action plan incomplete after inference, dropped");
                Ok(None)
            }
        }
    }
}

fn decode_cycle(text: &str) -> Option<MarketCycle> {
    match text.trim().to_ascii_uppercase().as_str() {
        "TRADING_RANGE" => Some(MarketCycle::TradingRange),
        "TRENDING_UP" => Some(MarketCycle::TrendingUp),
        "TRENDING_DOWN" => Some(MarketCycle::TrendingDown),
        "TRANSITIONAL" => Some(MarketCycle::Transitional),
        _ => None,
    }
}

fn decode_direction(text: &str) -> Option<Direction> {
    match text.trim().to_ascii_uppercase().as_str() {
        "LONG" => Some(Direction::Long),
        "SHORT" => Some(Direction::Short),
        _ => None,
    }
}

/// Monetary levels must be finite, positive decimals. Anything declared
/// but unusable is a hard ParseFailure, never coerced to a default.
fn parse_price(timeframe: Timeframe, value: Option<&Value>) -> Result<Option<Decimal>, ParseFailure> {
    let invalid = |detail: String| ParseFailure::new(timeframe, ParseFailureReason::InvalidNumber, detail);

    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => {
            let parsed = number.as_f64().and_then(Decimal::from_f64);
            match parsed {
                Some(price) if price > Decimal::ZERO => Ok(Some(price)),
                _ => Err(invalid(format!("price '{number}' is not a positive finite number"))),
            }
        }
        Some(Value::String(text)) => match Decimal::from_str(text.trim()) {
            Ok(price) if price > Decimal::ZERO => Ok(Some(price)),
            _ => Err(invalid(format!("price '{text}' is not a positive finite number"))),
        },
        Some(other) => Err(invalid(format!("price field has unexpected type: {other}"))),
    }
}
