//! SQLite-backed store implementing every store trait.
//!
//! Rows carry the serialized record plus the columns the queries key on;
//! unique keys mirror the data model: (symbol, timeframe) for states,
//! signal id for signals, item id for pipeline items. Every mutating
//! write refreshes `updated_at`.

use crate::analysis::{ConsensusRecord, MultiTimeframeState};
use crate::market::Timeframe;
use crate::pipeline::{ItemStatus, PipelineItem};
use crate::signal::{SignalStatus, TradingSignal};
use crate::store::{AnalysisStateStore, PipelineStore, SignalStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS multi_timeframe_states (
        symbol     TEXT NOT NULL,
        timeframe  TEXT NOT NULL,
        record     TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (symbol, timeframe)
    )",
    "CREATE TABLE IF NOT EXISTS consensus_records (
        symbol     TEXT PRIMARY KEY,
        record     TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS trading_signals (
        id         TEXT PRIMARY KEY,
        symbol     TEXT NOT NULL,
        timeframe  TEXT NOT NULL,
        status     TEXT NOT NULL,
        record     TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS pipeline_items (
        id             TEXT PRIMARY KEY,
        source         TEXT NOT NULL,
        status         TEXT NOT NULL,
        failure_reason TEXT,
        record         TEXT NOT NULL,
        created_at     TEXT NOT NULL,
        updated_at     TEXT NOT NULL
    )",
];

/// SQLite store. One instance serves all entity families.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to a SQLite database url (e.g. `sqlite://data.db?mode=rwc`)
    /// and create the schema when missing.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(url)
            .await
            .with_context(|| format!("failed to open sqlite database at {url}"))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Private in-memory database, one connection so every handle sees
    /// the same data. Used by tests and development.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("failed to open in-memory sqlite database")?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn decode<T: serde::de::DeserializeOwned>(row: &sqlx::sqlite::SqliteRow) -> Result<T> {
        let record: String = row.try_get("record")?;
        serde_json::from_str(&record).context("corrupt record column")
    }
}

#[async_trait]
impl AnalysisStateStore for SqliteStore {
    async fn upsert_state(&self, state: &MultiTimeframeState) -> Result<()> {
        sqlx::query(
            "INSERT INTO multi_timeframe_states (symbol, timeframe, record, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (symbol, timeframe)
             DO UPDATE SET record = excluded.record, updated_at = excluded.updated_at",
        )
        .bind(&state.symbol)
        .bind(state.timeframe.as_str())
        .bind(serde_json::to_string(state)?)
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_state(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<MultiTimeframeState>> {
        let row = sqlx::query(
            "SELECT record FROM multi_timeframe_states WHERE symbol = ?1 AND timeframe = ?2",
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::decode(&r)).transpose()
    }

    async fn states_for_symbol(&self, symbol: &str) -> Result<Vec<MultiTimeframeState>> {
        let rows = sqlx::query("SELECT record FROM multi_timeframe_states WHERE symbol = ?1")
            .bind(symbol)
            .fetch_all(&self.pool)
            .await?;
        let mut states = rows
            .iter()
            .map(Self::decode)
            .collect::<Result<Vec<MultiTimeframeState>>>()?;
        states.sort_by_key(|s| s.timeframe);
        Ok(states)
    }

    async fn upsert_consensus(&self, consensus: &ConsensusRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO consensus_records (symbol, record, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (symbol)
             DO UPDATE SET record = excluded.record, updated_at = excluded.updated_at",
        )
        .bind(&consensus.symbol)
        .bind(serde_json::to_string(consensus)?)
        .bind(consensus.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_consensus(&self, symbol: &str) -> Result<Option<ConsensusRecord>> {
        let row = sqlx::query("SELECT record FROM consensus_records WHERE symbol = ?1")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::decode(&r)).transpose()
    }
}

#[async_trait]
impl SignalStore for SqliteStore {
    async fn upsert_signal(&self, signal: &TradingSignal) -> Result<()> {
        sqlx::query(
            "INSERT INTO trading_signals (id, symbol, timeframe, status, record, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (id)
             DO UPDATE SET status = excluded.status, record = excluded.record,
                           updated_at = excluded.updated_at",
        )
        .bind(signal.id.to_string())
        .bind(&signal.symbol)
        .bind(signal.timeframe.as_str())
        .bind(status_str(signal.status))
        .bind(serde_json::to_string(signal)?)
        .bind(signal.created_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_signal(&self, id: Uuid) -> Result<Option<TradingSignal>> {
        let row = sqlx::query("SELECT record FROM trading_signals WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::decode(&r)).transpose()
    }

    async fn active_signals(
        &self,
        symbol: &str,
        timeframe: Option<Timeframe>,
    ) -> Result<Vec<TradingSignal>> {
        let rows = match timeframe {
            Some(tf) => {
                sqlx::query(
                    "SELECT record FROM trading_signals
                     WHERE symbol = ?1 AND timeframe = ?2 AND status = 'ACTIVE'
                     ORDER BY created_at",
                )
                .bind(symbol)
                .bind(tf.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT record FROM trading_signals
                     WHERE symbol = ?1 AND status = 'ACTIVE'
                     ORDER BY created_at",
                )
                .bind(symbol)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(Self::decode).collect()
    }

    async fn update_signal_status(&self, id: Uuid, status: SignalStatus) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT record FROM trading_signals WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };
        let mut signal: TradingSignal = Self::decode(&row)?;
        signal.status = status;
        sqlx::query(
            "UPDATE trading_signals SET status = ?1, record = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(status_str(status))
        .bind(serde_json::to_string(&signal)?)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl PipelineStore for SqliteStore {
    async fn insert_item(&self, item: &PipelineItem) -> Result<()> {
        sqlx::query(
            "INSERT INTO pipeline_items (id, source, status, failure_reason, record, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&item.id)
        .bind(&item.source)
        .bind(item.status.as_str())
        .bind(&item.failure_reason)
        .bind(serde_json::to_string(item)?)
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert pipeline item '{}'", item.id))?;
        Ok(())
    }

    async fn get_item(&self, id: &str) -> Result<Option<PipelineItem>> {
        let row = sqlx::query("SELECT record FROM pipeline_items WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::decode(&r)).transpose()
    }

    async fn items_with_status(&self, status: ItemStatus) -> Result<Vec<PipelineItem>> {
        let rows = sqlx::query(
            "SELECT record FROM pipeline_items WHERE status = ?1 ORDER BY created_at",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::decode).collect()
    }

    async fn update_item(&self, item: &PipelineItem) -> Result<()> {
        // Single UPDATE: payload, status and failure fields land together.
        let result = sqlx::query(
            "UPDATE pipeline_items
             SET status = ?1, failure_reason = ?2, record = ?3, updated_at = ?4
             WHERE id = ?5",
        )
        .bind(item.status.as_str())
        .bind(&item.failure_reason)
        .bind(serde_json::to_string(item)?)
        .bind(item.updated_at.to_rfc3339())
        .bind(&item.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("pipeline item '{}' not found", item.id);
        }
        Ok(())
    }
}

fn status_str(status: SignalStatus) -> &'static str {
    match status {
        SignalStatus::Active => "ACTIVE",
        SignalStatus::Invalidated => "INVALIDATED",
        SignalStatus::Expired => "EXPIRED",
        SignalStatus::Filled => "FILLED",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        ActionPlan, Direction, KeyLevels, MarketCycle, Narrative, PerTimeframeAnalysis, Sourced,
    };
    use crate::signal::{ProbabilityBucket, SignalType};
    use rust_decimal::Decimal;

    fn sample_analysis(symbol: &str, timeframe: Timeframe) -> PerTimeframeAnalysis {
        PerTimeframeAnalysis {
            symbol: symbol.to_string(),
            timeframe,
            market_cycle: Sourced::declared(MarketCycle::TrendingUp),
            active_narrative: Narrative {
                pattern: "bull flag".to_string(),
                status: "confirmed".to_string(),
                key_levels: KeyLevels::default(),
            },
            alternative_narrative: None,
            action_plan: Some(ActionPlan {
                direction: Direction::Long,
                entry_price: Sourced::declared(Decimal::from(100)),
                stop_loss: Sourced::declared(Decimal::from(95)),
                target_price: Sourced::declared(Decimal::from(110)),
            }),
            plan_valid: true,
            confidence: Some(75.0),
            rationale: "test".to_string(),
            created_at: Utc::now(),
        }
    }

    fn sample_signal(symbol: &str) -> TradingSignal {
        let entry = Decimal::from(100);
        let stop = Decimal::from(95);
        let target = Decimal::from(110);
        TradingSignal {
            id: TradingSignal::snapshot_id(symbol, Timeframe::H1, "bull flag", entry, stop, target),
            symbol: symbol.to_string(),
            timeframe: Timeframe::H1,
            signal_type: SignalType::TrendContinuation,
            pattern: "bull flag".to_string(),
            direction: Direction::Long,
            probability: ProbabilityBucket::High,
            entry_price: entry,
            stop_loss: stop,
            target_price: target,
            risk_reward: Decimal::from(2),
            status: SignalStatus::Active,
            checks: Vec::new(),
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_state_upsert_keeps_one_row_per_key() {
        let store = SqliteStore::in_memory().await.unwrap();

        let mut state = MultiTimeframeState {
            symbol: "BTC/USDT".to_string(),
            timeframe: Timeframe::H1,
            analysis: sample_analysis("BTC/USDT", Timeframe::H1),
            updated_at: Utc::now(),
        };
        store.upsert_state(&state).await.unwrap();

        state.analysis.rationale = "newer".to_string();
        state.updated_at = Utc::now();
        store.upsert_state(&state).await.unwrap();

        let rows = store.states_for_symbol("BTC/USDT").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].analysis.rationale, "newer");
    }

    #[tokio::test]
    async fn test_signal_roundtrip_and_status_transition() {
        let store = SqliteStore::in_memory().await.unwrap();
        let signal = sample_signal("ETH/USDT");

        store.upsert_signal(&signal).await.unwrap();
        let active = store.active_signals("ETH/USDT", None).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, signal.id);

        let updated = store
            .update_signal_status(signal.id, SignalStatus::Invalidated)
            .await
            .unwrap();
        assert!(updated);

        let active = store.active_signals("ETH/USDT", None).await.unwrap();
        assert!(active.is_empty());
        let stored = store.get_signal(signal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SignalStatus::Invalidated);
        // Level fields untouched by the transition.
        assert_eq!(stored.entry_price, signal.entry_price);
    }

    #[tokio::test]
    async fn test_same_snapshot_upserts_once() {
        let store = SqliteStore::in_memory().await.unwrap();
        let signal = sample_signal("BTC/USDT");

        store.upsert_signal(&signal).await.unwrap();
        store.upsert_signal(&signal).await.unwrap();

        let active = store.active_signals("BTC/USDT", Some(Timeframe::H1)).await.unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn test_pipeline_item_roundtrip() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut item =
            PipelineItem::captured("n-9", "cryptopanic", "ETF inflows", serde_json::json!({"raw": "text"}));
        store.insert_item(&item).await.unwrap();
        assert!(store.insert_item(&item).await.is_err());

        item.status = ItemStatus::Refined;
        item.payload = serde_json::json!({"summary": "refined"});
        item.updated_at = Utc::now();
        store.update_item(&item).await.unwrap();

        let refined = store.items_with_status(ItemStatus::Refined).await.unwrap();
        assert_eq!(refined.len(), 1);
        assert_eq!(refined[0].payload["summary"], "refined");
        assert!(store.items_with_status(ItemStatus::New).await.unwrap().is_empty());
    }
}
