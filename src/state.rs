use std::sync::Arc;

use crate::analysis::orchestrator::Orchestrator;
use crate::db::ledger::Ledger;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub ledger: Ledger,
    pub stats_top_limit: i64,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, ledger: Ledger, stats_top_limit: i64) -> Self {
        AppState {
            orchestrator: Arc::new(orchestrator),
            ledger,
            stats_top_limit,
        }
    }
}
