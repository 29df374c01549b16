//! Failure taxonomy for the transformation pipeline.
//!
//! Every fallible operation returns one of these as an explicit outcome;
//! none of them is used as ordinary control flow, and numeric/schema
//! violations are never silently coerced.

use crate::market::Timeframe;
use crate::pipeline::ItemStatus;
use serde::{Deserialize, Serialize};

/// Why a timeframe could not be normalized from the model response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParseFailureReason {
    /// No JSON payload could be located in the response at all.
    MalformedJson,
    /// The timeframe has neither structured data nor a narrative mention.
    MissingTimeframe,
    /// A required field was absent and could not be unambiguously inferred.
    MissingField,
    /// A monetary level was non-finite, non-positive, or not a number.
    InvalidNumber,
}

/// Malformed or missing model output for one timeframe. Recoverable:
/// other timeframes in the same response still produce records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseFailure {
    pub timeframe: Timeframe,
    pub reason: ParseFailureReason,
    pub detail: String,
}

impl ParseFailure {
    pub fn new(timeframe: Timeframe, reason: ParseFailureReason, detail: impl Into<String>) -> Self {
        Self {
            timeframe,
            reason,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "analysis incomplete for timeframe {} ({:?}): {}",
            self.timeframe, self.reason, self.detail
        )
    }
}

impl std::error::Error for ParseFailure {}

/// Why signal derivation refused to produce a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalRejectReason {
    /// The analysis carries no action plan.
    NoActionPlan,
    /// The action plan's levels violate the direction ordering.
    InvalidLevels,
    /// stop == entry or target == entry.
    DegenerateLevels,
    MissingDirection,
}

/// A derivation precondition was violated. Reported, never persisted
/// as an ACTIVE signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRejected {
    pub reason: SignalRejectReason,
    pub detail: String,
}

impl SignalRejected {
    pub fn new(reason: SignalRejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for SignalRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "signal rejected ({:?}): {}", self.reason, self.detail)
    }
}

impl std::error::Error for SignalRejected {}

/// A pipeline stage transform failed. Recorded on the item, which is
/// parked at FAILED until an explicit retry resets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: String,
    pub reason: String,
    /// Status the item held when the stage ran.
    pub from_status: ItemStatus,
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "stage '{}' failed from {}: {}",
            self.stage, self.from_status, self.reason
        )
    }
}

impl std::error::Error for StageFailure {}

/// A collaborator did not respond. Propagated to the caller untouched;
/// no silent default is ever substituted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpstreamUnavailable {
    Timeout,
    RateLimited,
    Malformed(String),
    NotAvailable,
}

impl std::fmt::Display for UpstreamUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamUnavailable::Timeout => write!(f, "upstream timed out"),
            UpstreamUnavailable::RateLimited => write!(f, "upstream rate-limited the request"),
            UpstreamUnavailable::Malformed(detail) => {
                write!(f, "upstream returned malformed data: {detail}")
            }
            UpstreamUnavailable::NotAvailable => write!(f, "upstream data not available"),
        }
    }
}

impl std::error::Error for UpstreamUnavailable {}
