//! Built-in stages for the news ingestion pipeline.
//!
//! Refinement scores the captured text against a small sentiment lexicon
//! and records the vote counts; analysis turns the votes into a
//! directional bias for the signal layer.

use crate::Stage;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use common::{ItemStatus, PipelineItem};
use serde_json::{json, Value};

const NEGATIVE_WORDS: &[&str] = &[
    "crisis", "crash", "drop", "fall", "decline", "decrease", "loss", "fail", "bad", "negative",
    "worst", "downward", "bearish", "sell", "dump", "collapse", "risk", "danger", "threat",
    "hack", "exploit", "liquidation", "recession",
];

const POSITIVE_WORDS: &[&str] = &[
    "growth", "rise", "increase", "gain", "profit", "success", "good", "positive", "best",
    "upward", "bullish", "buy", "recovery", "boom", "breakthrough", "adoption", "approval",
    "upgrade", "partnership", "rally",
];

/// NEW -> REFINED: keyword sentiment votes over the captured text.
pub struct RefineStage;

#[async_trait]
impl Stage for RefineStage {
    fn name(&self) -> &str {
        "refine"
    }

    fn precondition(&self) -> ItemStatus {
        ItemStatus::New
    }

    fn target(&self) -> ItemStatus {
        ItemStatus::Refined
    }

    async fn apply(&self, item: &PipelineItem) -> Result<Value> {
        let body = item.payload["text"].as_str().unwrap_or("");
        let text = format!("{} {}", item.title, body).to_lowercase();
        if text.trim().is_empty() {
            bail!("item '{}' has neither title nor text", item.id);
        }

        let positive = POSITIVE_WORDS.iter().filter(|w| text.contains(*w)).count();
        let negative = NEGATIVE_WORDS.iter().filter(|w| text.contains(*w)).count();

        Ok(json!({
            "text": body,
            "sentiment": {
                "positive": positive,
                "negative": negative,
            },
        }))
    }
}

/// REFINED -> ANALYZED: vote counts into a directional bias and score.
pub struct AnalyzeStage;

#[async_trait]
impl Stage for AnalyzeStage {
    fn name(&self) -> &str {
        "analyze"
    }

    fn precondition(&self) -> ItemStatus {
        ItemStatus::Refined
    }

    fn target(&self) -> ItemStatus {
        ItemStatus::Analyzed
    }

    async fn apply(&self, item: &PipelineItem) -> Result<Value> {
        let sentiment = item
            .payload
            .get("sentiment")
            .context("refined payload has no sentiment votes")?;
        let positive = sentiment["positive"].as_u64().unwrap_or(0) as f64;
        let negative = sentiment["negative"].as_u64().unwrap_or(0) as f64;

        let total = positive + negative;
        let score = if total > 0.0 {
            ((positive - negative) / total).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let bias = if score > 0.2 {
            "BULLISH"
        } else if score < -0.2 {
            "BEARISH"
        } else {
            "NEUTRAL"
        };

        let mut payload = item.payload.clone();
        payload["analysis"] = json!({ "bias": bias, "score": score });
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AdvanceOutcome, PipelineController};
    use common::{MemoryPipelineStore, PipelineStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_full_news_flow() {
        let store = Arc::new(MemoryPipelineStore::new());
        let controller = PipelineController::new(store.clone());
        controller
            .capture(PipelineItem::captured(
                "n-1",
                "cryptopanic",
                "ETF approval sparks rally",
                json!({ "text": "Institutional adoption and a broad rally lift the market." }),
            ))
            .await
            .unwrap();

        let refined = controller.advance("n-1", &RefineStage).await.unwrap();
        assert!(matches!(refined, AdvanceOutcome::Advanced(_)));

        let analyzed = controller.advance("n-1", &AnalyzeStage).await.unwrap();
        let AdvanceOutcome::Advanced(item) = analyzed else {
            panic!("expected advance");
        };
        assert_eq!(item.status, ItemStatus::Analyzed);
        assert_eq!(item.payload["analysis"]["bias"], "BULLISH");
        assert!(item.payload["sentiment"]["positive"].as_u64().unwrap() >= 3);
    }

    #[tokio::test]
    async fn test_analyze_requires_refined_payload() {
        let store = Arc::new(MemoryPipelineStore::new());
        let controller = PipelineController::new(store.clone());
        let mut item = PipelineItem::captured("n-1", "feed", "headline", json!({}));
        // Simulate an item whose status was advanced without the refine
        // payload ever being written.
        item.status = ItemStatus::Refined;
        store.insert_item(&item).await.unwrap();

        let outcome = controller.advance("n-1", &AnalyzeStage).await.unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Failed { .. }));
        let item = store.get_item("n-1").await.unwrap().unwrap();
        assert_eq!(item.failed_from, Some(ItemStatus::Refined));
    }

    #[tokio::test]
    async fn test_empty_item_fails_refine() {
        let store = Arc::new(MemoryPipelineStore::new());
        let controller = PipelineController::new(store);
        controller
            .capture(PipelineItem::captured("n-1", "feed", "", json!({})))
            .await
            .unwrap();

        let outcome = controller.advance("n-1", &RefineStage).await.unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_bearish_headline() {
        let store = Arc::new(MemoryPipelineStore::new());
        let controller = PipelineController::new(store.clone());
        controller
            .capture(PipelineItem::captured(
                "n-2",
                "feed",
                "Exchange hack triggers liquidation cascade and crash",
                json!({ "text": "" }),
            ))
            .await
            .unwrap();

        controller.advance("n-2", &RefineStage).await.unwrap();
        controller.advance("n-2", &AnalyzeStage).await.unwrap();
        let item = store.get_item("n-2").await.unwrap().unwrap();
        assert_eq!(item.payload["analysis"]["bias"], "BEARISH");
    }
}
