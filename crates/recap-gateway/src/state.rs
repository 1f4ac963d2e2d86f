use std::sync::Arc;

use recap_agents::SummaryRuntime;
use recap_common::Result;
use recap_config::AppConfig;
use recap_db::SqliteStore;

/// State shared by every request handler.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<SqliteStore>,
    pub runtime: Arc<SummaryRuntime>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: AppConfig, store: Arc<SqliteStore>, runtime: Arc<SummaryRuntime>) -> Self {
        Self {
            config,
            store,
            runtime,
        }
    }

    /// Open the configured database and build the summary pipeline on top.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(&config.storage.db_path)?);
        let runtime = Arc::new(SummaryRuntime::from_config(&config, store.clone())?);
        Ok(Self::new(config, store, runtime))
    }
}
