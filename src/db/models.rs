use serde::Serialize;
use sqlx::FromRow;

/// One row of the popularity ranking as exposed on `GET /stats/top`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct LedgerEntry {
    pub plant_name: String,
    pub count: i64,
}
