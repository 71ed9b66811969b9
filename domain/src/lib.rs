//! Application layer of the second brain core.
//!
//! Re-exports the registry and sync queue so consumers of the `domain` crate do
//! not need to depend on `key-registry` or `record-sync` directly, and adds the
//! pieces that tie them to the outside world: settings, the transcript payload,
//! generation orchestration and the HTTP gateways.
pub use events::{DomainEvent, EventHandler, EventPublisher, Id};
pub use key_registry::{
    CredentialId, CredentialRecord, KeyRegistry, Options as RegistryOptions, SecretCipher,
    SelectionPolicy, Usage,
};
pub use record_sync::{
    spawn_reconnect_retry, Connectivity, Options as SyncOptions, Record, RecordId,
    RecordSyncQueue, SyncOutcome, SyncStatus, Uploader,
};

pub mod error;
pub mod generation;
pub mod settings;
pub mod transcript;

pub mod gateway;
