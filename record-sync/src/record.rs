//! Records and their synchronization state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

pub type RecordId = Uuid;

/// Whether a record has been mirrored to the remote store.
///
/// `pending -> synced`, `pending -> failed`, `failed -> pending`. Nothing leaves `synced`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        }
    }

    /// Still waiting to be mirrored (never attempted or last attempt failed).
    pub fn is_unsynced(&self) -> bool {
        !matches!(self, SyncStatus::Synced)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single [`attempt_sync`](crate::RecordSyncQueue::attempt_sync) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The upload succeeded and the record is now `synced`.
    Synced,
    /// The record was already `synced`; no upload was made.
    AlreadySynced,
    /// The host is offline; the record is untouched and no upload was made.
    Offline,
    /// Another attempt for the same record is running; no upload was made.
    InFlight,
    NotFound,
    /// The upload was rejected or timed out; the record is now `failed`.
    Failed { reason: String },
}

/// A locally created user artifact subject to remote synchronization.
///
/// The payload is opaque to the queue. Status fields are private and only
/// move through the transitions below, which the queue drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: RecordId,
    title: String,
    created_at: DateTime<Utc>,
    payload: Value,
    #[serde(default)]
    sync_status: SyncStatus,
    #[serde(default)]
    attempts: u32,
    #[serde(default)]
    last_error: Option<String>,
    #[serde(default)]
    synced_at: Option<DateTime<Utc>>,
}

impl Record {
    /// A new pending record created now.
    pub fn new(title: impl Into<String>, payload: Value) -> Self {
        Self::with_id(Uuid::new_v4(), title, Utc::now(), payload)
    }

    pub fn with_id(
        id: RecordId,
        title: impl Into<String>,
        created_at: DateTime<Utc>,
        payload: Value,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            created_at,
            payload,
            sync_status: SyncStatus::Pending,
            attempts: 0,
            last_error: None,
            synced_at: None,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    /// Number of real upload attempts, offline skips excluded.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }

    /// Clears any sync state carried by a record handed to `enqueue`.
    pub(crate) fn reset_sync_state(&mut self) {
        self.sync_status = SyncStatus::Pending;
        self.attempts = 0;
        self.last_error = None;
        self.synced_at = None;
    }

    /// Enters an upload attempt. A failed record re-enters `pending`.
    /// Returns `false` for synced records, which must not be uploaded again.
    pub(crate) fn begin_attempt(&mut self) -> bool {
        match self.sync_status {
            SyncStatus::Synced => false,
            SyncStatus::Pending | SyncStatus::Failed => {
                self.sync_status = SyncStatus::Pending;
                self.attempts = self.attempts.saturating_add(1);
                true
            }
        }
    }

    pub(crate) fn mark_synced(&mut self, at: DateTime<Utc>) -> bool {
        if self.sync_status != SyncStatus::Pending {
            return false;
        }
        self.sync_status = SyncStatus::Synced;
        self.synced_at = Some(at);
        true
    }

    pub(crate) fn mark_failed(&mut self, reason: &str) -> bool {
        if self.sync_status != SyncStatus::Pending {
            return false;
        }
        self.sync_status = SyncStatus::Failed;
        self.last_error = Some(reason.to_string());
        true
    }
}
