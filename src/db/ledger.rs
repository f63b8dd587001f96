use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db::models::LedgerEntry;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("search ledger unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// Popularity counter of identified plants. Cloning shares the pool.
#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    pub async fn init(database_url: &str, max_connections: u32) -> Result<Self, LedgerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS plant_searches (\
                plant_name TEXT PRIMARY KEY NOT NULL,\
                count INTEGER NOT NULL DEFAULT 1 CHECK (count > 0),\
                first_seen_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,\
                last_seen_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_plant_searches_count ON plant_searches(count DESC, plant_name ASC);",
        )
        .execute(&pool)
        .await?;

        info!("Search ledger ready");

        Ok(Ledger { pool })
    }

    /// Counts one sighting of `plant_name`. Blank names are skipped. The
    /// insert-or-increment is a single statement so concurrent sightings of
    /// the same plant are never lost.
    pub async fn record_sighting(&self, plant_name: &str) -> Result<(), LedgerError> {
        let plant_name = plant_name.trim();
        if plant_name.is_empty() {
            info!("Skipping sighting without a plant name");
            return Ok(());
        }

        sqlx::query(
            "INSERT INTO plant_searches (plant_name, count) VALUES (?, 1) \
             ON CONFLICT(plant_name) DO UPDATE SET \
             count = plant_searches.count + 1, \
             last_seen_at = CURRENT_TIMESTAMP",
        )
        .bind(plant_name)
        .execute(&self.pool)
        .await?;

        debug!(plant_name, "Recorded plant sighting");
        Ok(())
    }

    /// Highest counts first, ties by name ascending.
    pub async fn top_entries(&self, limit: i64) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = sqlx::query_as::<_, LedgerEntry>(
            "SELECT plant_name, count FROM plant_searches \
             ORDER BY count DESC, plant_name ASC LIMIT ?",
        )
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[allow(dead_code)]
    pub async fn count_for(&self, plant_name: &str) -> Result<Option<i64>, LedgerError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT count FROM plant_searches WHERE plant_name = ?",
        )
        .bind(plant_name.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn health_check(&self) -> Result<(), LedgerError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Search ledger closed");
    }
}
