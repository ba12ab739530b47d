//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::config::Config;
use crate::services::provider::SmmProvider;
use crate::store::LedgerStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub provider: Arc<dyn SmmProvider>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        provider: Arc<dyn SmmProvider>,
        config: Config,
    ) -> Self {
        Self {
            store,
            provider,
            config: Arc::new(config),
        }
    }
}
