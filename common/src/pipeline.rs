//! Pipeline items tracked through ordered processing stages. News
//! ingestion (capture -> refine -> extract-signal) is the running example.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered item status. Items only advance forward or move to Failed;
/// Failed items keep their prior status for explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    New,
    Refined,
    Analyzed,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::New => "NEW",
            ItemStatus::Refined => "REFINED",
            ItemStatus::Analyzed => "ANALYZED",
            ItemStatus::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(ItemStatus::New),
            "REFINED" => Ok(ItemStatus::Refined),
            "ANALYZED" => Ok(ItemStatus::Analyzed),
            "FAILED" => Ok(ItemStatus::Failed),
            other => Err(format!("unknown item status '{other}'")),
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of pipeline work, e.g. a captured news document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineItem {
    /// Source-assigned identifier, unique per item.
    pub id: String,
    pub source: String,
    pub title: String,
    /// Stage-specific payload; each stage replaces it with its output.
    pub payload: serde_json::Value,
    pub status: ItemStatus,
    /// Status the item held before it failed; retry resets to it.
    pub failed_from: Option<ItemStatus>,
    pub failure_reason: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineItem {
    /// A freshly captured item, ready for the refine stage.
    pub fn captured(
        id: impl Into<String>,
        source: impl Into<String>,
        title: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            source: source.into(),
            title: title.into(),
            payload,
            status: ItemStatus::New,
            failed_from: None,
            failure_reason: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
