//! End-to-end run of the news ingestion pipeline against the in-memory
//! store: capture two headlines, refine and analyze them in batches,
//! then print the final item states.

use common::{MemoryPipelineStore, PipelineItem, PipelineStore};
use news_pipeline::stages::{AnalyzeStage, RefineStage};
use news_pipeline::PipelineController;
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let store = Arc::new(MemoryPipelineStore::new());
    let controller = PipelineController::new(store.clone());

    controller
        .capture(PipelineItem::captured(
            "n-1",
            "cryptopanic",
            "ETF approval sparks broad crypto rally",
            json!({ "text": "Spot ETF approval drives institutional adoption and a market-wide rally." }),
        ))
        .await?;
    controller
        .capture(PipelineItem::captured(
            "n-2",
            "cryptopanic",
            "Exchange hack triggers liquidation cascade",
            json!({ "text": "A major exchange hack caused a crash and forced liquidations." }),
        ))
        .await?;

    let refined = controller.run_batch(&RefineStage).await?;
    println!("refine: {} advanced, {} failed", refined.advanced, refined.failed);

    let analyzed = controller.run_batch(&AnalyzeStage).await?;
    println!("analyze: {} advanced, {} failed", analyzed.advanced, analyzed.failed);

    for id in ["n-1", "n-2"] {
        if let Some(item) = store.get_item(id).await? {
            println!(
                "{}: {} bias={}",
                item.id,
                item.status,
                item.payload["analysis"]["bias"]
            );
        }
    }
    Ok(())
}
