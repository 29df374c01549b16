//! Staged Pipeline Controller
//!
//! Drives pipeline items through NEW -> REFINED -> ANALYZED, with FAILED
//! reachable from any state. A stage only ever selects items whose status
//! exactly matches its precondition, and an advance writes payload and
//! status in one atomic store operation, so an item is always either
//! fully advanced or untouched.

pub mod stages;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use common::{ItemStatus, PipelineItem, PipelineStore, StageFailure};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One processing stage. `apply` transforms the item's payload without
/// touching the store; the controller owns all status transitions.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// Status an item must hold for this stage to touch it.
    fn precondition(&self) -> ItemStatus;

    /// Status written alongside the new payload on success.
    fn target(&self) -> ItemStatus;

    async fn apply(&self, item: &PipelineItem) -> Result<Value>;
}

/// Outcome of one `advance` call.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    Advanced(PipelineItem),
    /// Precondition not met; nothing was written.
    Skipped { current: ItemStatus },
    /// Transform failed; the item is parked at FAILED.
    Failed { reason: String },
}

/// Summary of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub advanced: usize,
    pub failed: usize,
}

pub struct PipelineController<S: PipelineStore> {
    store: Arc<S>,
}

impl<S: PipelineStore> PipelineController<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Register a freshly captured item. Duplicate ids are rejected by
    /// the store.
    pub async fn capture(&self, item: PipelineItem) -> Result<()> {
        self.store
            .insert_item(&item)
            .await
            .context("failed to capture pipeline item")?;
        debug!(id = %item.id, source = %item.source, "item captured");
        Ok(())
    }

    /// Run `stage` against one item.
    ///
    /// A precondition mismatch is a no-op reported as `Skipped`, which
    /// makes repeated advance calls safe. Transform failure parks the
    /// item at FAILED with the prior status recorded for retry.
    pub async fn advance(&self, item_id: &str, stage: &dyn Stage) -> Result<AdvanceOutcome> {
        let Some(item) = self.store.get_item(item_id).await? else {
            bail!("pipeline item '{item_id}' not found");
        };
        if item.status != stage.precondition() {
            debug!(
                id = %item.id,
                stage = stage.name(),
                current = %item.status,
                required = %stage.precondition(),
                "precondition not met, skipping"
            );
            return Ok(AdvanceOutcome::Skipped {
                current: item.status,
            });
        }

        match stage.apply(&item).await {
            Ok(payload) => {
                let mut updated = item;
                updated.payload = payload;
                updated.status = stage.target();
                updated.failed_from = None;
                updated.failure_reason = None;
                updated.updated_at = Utc::now();
                self.store.update_item(&updated).await?;
                info!(id = %updated.id, stage = stage.name(), status = %updated.status, "item advanced");
                Ok(AdvanceOutcome::Advanced(updated))
            }
            Err(err) => {
                let failure = StageFailure {
                    stage: stage.name().to_string(),
                    reason: format!("{err:#}"),
                    from_status: item.status,
                };
                warn!(id = %item.id, %failure, "stage transform failed");

                let mut updated = item;
                updated.failed_from = Some(failure.from_status);
                updated.failure_reason = Some(failure.reason.clone());
                updated.status = ItemStatus::Failed;
                updated.updated_at = Utc::now();
                self.store.update_item(&updated).await?;
                Ok(AdvanceOutcome::Failed {
                    reason: failure.reason,
                })
            }
        }
    }

    /// Reset a FAILED item to the status it held when it failed. Retries
    /// are always explicit; nothing in the controller re-runs a failed
    /// item on its own.
    pub async fn retry(&self, item_id: &str) -> Result<bool> {
        let Some(item) = self.store.get_item(item_id).await? else {
            bail!("pipeline item '{item_id}' not found");
        };
        let (ItemStatus::Failed, Some(prior)) = (item.status, item.failed_from) else {
            return Ok(false);
        };

        let mut updated = item;
        updated.status = prior;
        updated.failed_from = None;
        updated.failure_reason = None;
        updated.updated_at = Utc::now();
        self.store.update_item(&updated).await?;
        info!(id = %updated.id, status = %updated.status, "failed item reset for retry");
        Ok(true)
    }

    /// Run `stage` over every item whose status exactly matches its
    /// precondition. Items are processed independently; one failure
    /// never aborts the batch.
    pub async fn run_batch(&self, stage: &dyn Stage) -> Result<BatchReport> {
        let eligible = self.store.items_with_status(stage.precondition()).await?;
        info!(stage = stage.name(), count = eligible.len(), "batch started");

        let mut report = BatchReport::default();
        for item in eligible {
            match self.advance(&item.id, stage).await {
                Ok(AdvanceOutcome::Advanced(_)) => report.advanced += 1,
                Ok(AdvanceOutcome::Failed { .. }) => report.failed += 1,
                // Another worker moved the item between select and advance.
                Ok(AdvanceOutcome::Skipped { .. }) => {}
                Err(err) => {
                    warn!(id = %item.id, stage = stage.name(), error = %err, "batch item errored");
                    report.failed += 1;
                }
            }
        }
        info!(
            stage = stage.name(),
            advanced = report.advanced,
            failed = report.failed,
            "batch finished"
        );
        Ok(report)
    }
}
