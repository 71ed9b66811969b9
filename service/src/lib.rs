use config::Config;
use log::info;
use std::sync::Arc;
use store::{FileStore, KeyValueStore};

pub mod config;
pub mod logging;
pub mod store;

/// Opens the durable store configured by `data_dir`.
pub fn init_store(config: &Config) -> Result<FileStore, store::Error> {
    info!("Opening data store at {}", config.data_dir().display());
    FileStore::open(config.data_dir())
}

// Service-level state containing only infrastructure concerns
pub struct AppState<S: KeyValueStore> {
    pub store: Arc<S>,
    pub config: Config,
}

impl<S: KeyValueStore> AppState<S> {
    pub fn new(app_config: Config, store: &Arc<S>) -> Self {
        Self {
            store: Arc::clone(store),
            config: app_config,
        }
    }

    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }
}

impl<S: KeyValueStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self::new(self.config.clone(), &self.store)
    }
}
