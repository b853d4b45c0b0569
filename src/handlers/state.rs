//! Application state

use crate::config::Config;
use crate::restore::RestoreStore;
use crate::retrieval::Retriever;
use crate::watch::{RefreshTracker, TrackerOptions};
use anyhow::Result;
use std::sync::Arc;

pub struct AppState {
    pub config: Arc<Config>,
    pub retriever: Arc<Retriever>,
    pub tracker: Option<RefreshTracker>,
    pub restore: RestoreStore,
}

impl AppState {
    /// Builds every service from configuration. Must run inside a Tokio
    /// runtime when watch mode is on.
    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        let retriever = Arc::new(Retriever::from_config(Arc::clone(&config))?);
        let tracker = config.watch_mode.then(|| {
            RefreshTracker::start(
                config.repo_paths(),
                retriever.clone(),
                TrackerOptions::from_config(&config),
            )
        });
        Ok(Self::new(config, retriever, tracker))
    }

    pub fn new(
        config: Arc<Config>,
        retriever: Arc<Retriever>,
        tracker: Option<RefreshTracker>,
    ) -> Self {
        let restore = RestoreStore::new(
            config.repo_paths(),
            &config.cache_dir,
            config.restore_max_points,
        );
        Self {
            config,
            retriever,
            tracker,
            restore,
        }
    }
}
