//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::upstream::UpstreamStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: Arc<dyn UpstreamStore>,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config, store: Arc<dyn UpstreamStore>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, store }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the upstream store
    pub fn store(&self) -> &dyn UpstreamStore {
        self.inner.store.as_ref()
    }
}
