use async_trait::async_trait;
use domain::gateway::connectivity::{spawn_probe, HttpProbe};
use domain::gateway::drive::DriveUploader;
use domain::settings::SettingsStore;
use domain::{
    spawn_reconnect_retry, Connectivity, DomainEvent, EventHandler, EventPublisher, KeyRegistry,
    RecordSyncQueue, RegistryOptions, SecretCipher, SyncOptions,
};
use log::{debug, error, info, warn};
use service::{config::Config, logging::Logger};
use std::sync::Arc;

struct LogEventHandler;

#[async_trait]
impl EventHandler for LogEventHandler {
    async fn handle(&self, event: &DomainEvent) {
        info!("[{}] {event:?}", event.event_type());
    }
}

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config as &Config);

    info!(
        "Starting sync agent [{}] with data in {}",
        config.runtime_env(),
        config.data_dir().display()
    );

    let store = match service::init_store(&config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open the data directory: {e}");
            std::process::exit(1);
        }
    };

    let app_state = service::AppState::new(config, &store);
    let config = &app_state.config;

    let publisher = EventPublisher::new().with_handler(Arc::new(LogEventHandler));

    let cipher = match config.credential_encryption_key() {
        Some(key) => match SecretCipher::from_hex(&key) {
            Ok(cipher) => Some(cipher),
            Err(e) => {
                error!("Invalid credential encryption key: {e}");
                std::process::exit(1);
            }
        },
        None => {
            warn!("No credential encryption key configured, secrets are stored in plain text");
            None
        }
    };

    let registry = match KeyRegistry::load(
        app_state.store(),
        RegistryOptions::from_config(config),
        cipher,
    ) {
        Ok(registry) => registry,
        Err(e) => {
            error!("Failed to load credentials: {e}");
            std::process::exit(1);
        }
    };
    match (registry.list_credentials(), registry.healthy_count()) {
        (Ok(credentials), Ok(healthy)) => {
            info!("{} credentials loaded, {healthy} healthy", credentials.len())
        }
        (Err(e), _) | (_, Err(e)) => warn!("Could not inspect credentials: {e}"),
    }

    match SettingsStore::load(app_state.store(), publisher.clone()) {
        Ok(settings) => debug!(
            "Settings loaded, {} vocabulary terms",
            settings.vocabulary().len()
        ),
        Err(e) => warn!("Failed to load settings: {e}"),
    }

    let uploader = match DriveUploader::from_config(config) {
        Ok(uploader) => Arc::new(uploader),
        Err(e) => {
            error!("Failed to configure the drive uploader: {e}");
            std::process::exit(1);
        }
    };

    let probe = match HttpProbe::from_config(config) {
        Ok(probe) => probe,
        Err(e) => {
            error!("Failed to configure the connectivity probe: {e}");
            std::process::exit(1);
        }
    };

    // Offline until the first probe answers; that transition drains the queue.
    let connectivity = Connectivity::new(false);

    let queue = match RecordSyncQueue::load(
        app_state.store(),
        uploader,
        connectivity.clone(),
        publisher,
        SyncOptions {
            upload_timeout: config.sync_timeout(),
        },
    ) {
        Ok(queue) => Arc::new(queue),
        Err(e) => {
            error!("Failed to load the record queue: {e}");
            std::process::exit(1);
        }
    };
    info!("{} records waiting to sync", queue.pending_count());

    let retry_task = spawn_reconnect_retry(queue.clone());
    let probe_task = spawn_probe(probe, connectivity, config.connectivity_probe_interval());

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }

    probe_task.abort();
    retry_task.abort();
    info!(
        "Shutting down with {} records waiting to sync",
        queue.pending_count()
    );
}
