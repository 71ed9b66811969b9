//! # record-sync
//!
//! Offline-first synchronization of locally created records:
//! - [`Record`] with an explicit [`SyncStatus`] state machine
//! - [`RecordSyncQueue`], the sole writer of the persisted record collection
//! - [`Uploader`], the remote mirror collaborator
//! - [`Connectivity`] and the reconnect-driven retry task
//!
//! ## Usage
//!
//! ```rust,ignore
//! use record_sync::{Connectivity, Options, RecordSyncQueue, spawn_reconnect_retry};
//!
//! let connectivity = Connectivity::new(false);
//! let queue = Arc::new(RecordSyncQueue::load(store, uploader, connectivity.clone(), publisher, Options::default())?);
//! queue.enqueue(transcript.into_record()?).await?;
//! spawn_reconnect_retry(Arc::clone(&queue));
//! connectivity.set_online(true); // pending records are retried
//! ```

pub mod connectivity;
pub mod error;
pub mod queue;
pub mod record;
pub mod upload;

pub use connectivity::{spawn_reconnect_retry, Connectivity};
pub use error::Error;
pub use queue::{Options, RecordSyncQueue};
pub use record::{Record, RecordId, SyncOutcome, SyncStatus};
pub use upload::Uploader;
