use std::sync::Arc;

use crate::config::Config;
use crate::store::LedgerStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Persistence gateway. `PgStore` when `DATABASE_URL` is set, `MemoryStore` otherwise.
    pub store: Arc<dyn LedgerStore>,
    pub config: Config,
}
