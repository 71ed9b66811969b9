//! The sync queue: durable record collection plus its upload state machine.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use dashmap::DashSet;
use events::{DomainEvent, EventPublisher};
use log::*;
use service::store::{KeyValueStore, RECORDS_KEY};
use tokio::time::timeout;

use crate::connectivity::Connectivity;
use crate::error::Error;
use crate::record::{Record, RecordId, SyncOutcome, SyncStatus};
use crate::upload::Uploader;

/// Default bound on a single upload.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// An upload still running after this long counts as a failed attempt.
    pub upload_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }
}

/// Marks a record as having an upload in progress until dropped.
struct InFlightClaim<'a> {
    in_flight: &'a DashSet<RecordId>,
    id: RecordId,
}

impl<'a> InFlightClaim<'a> {
    fn acquire(in_flight: &'a DashSet<RecordId>, id: RecordId) -> Option<Self> {
        in_flight.insert(id).then(|| Self { in_flight, id })
    }
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

/// Sole owner of the persisted record collection.
///
/// Records are kept most-recent-first in enqueue order. Status changes never
/// move a record. Every mutation is persisted before it becomes visible, and
/// at most one upload per record runs at any time.
pub struct RecordSyncQueue<S: KeyValueStore> {
    store: Arc<S>,
    uploader: Arc<dyn Uploader>,
    connectivity: Connectivity,
    publisher: EventPublisher,
    options: Options,
    records: Mutex<Vec<Record>>,
    in_flight: DashSet<RecordId>,
}

impl<S: KeyValueStore> RecordSyncQueue<S> {
    /// Loads the persisted record collection from `store`.
    pub fn load(
        store: Arc<S>,
        uploader: Arc<dyn Uploader>,
        connectivity: Connectivity,
        publisher: EventPublisher,
        options: Options,
    ) -> Result<Self, Error> {
        let records: Vec<Record> = match store.get(RECORDS_KEY)? {
            Some(blob) => serde_json::from_str(&blob)?,
            None => Vec::new(),
        };

        debug!(
            "Loaded {} records ({} unsynced)",
            records.len(),
            records
                .iter()
                .filter(|r| r.sync_status().is_unsynced())
                .count()
        );

        Ok(Self {
            store,
            uploader,
            connectivity,
            publisher,
            options,
            records: Mutex::new(records),
            in_flight: DashSet::new(),
        })
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// All records, most recent first.
    pub fn records(&self) -> Vec<Record> {
        self.lock().clone()
    }

    pub fn get(&self, id: RecordId) -> Option<Record> {
        self.lock().iter().find(|r| r.id() == id).cloned()
    }

    /// Records grouped by UTC creation date, newest day first.
    pub fn records_by_day(&self) -> Vec<(NaiveDate, Vec<Record>)> {
        let mut days: BTreeMap<NaiveDate, Vec<Record>> = BTreeMap::new();
        for record in self.lock().iter() {
            days.entry(record.created_at().date_naive())
                .or_default()
                .push(record.clone());
        }
        days.into_iter().rev().collect()
    }

    /// Number of records not yet mirrored (`pending` or `failed`).
    pub fn pending_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|r| r.sync_status().is_unsynced())
            .count()
    }

    /// Adds `record` at the head of the collection in the `pending` state.
    ///
    /// Any sync state the record carries is cleared. Fails with
    /// [`Error::Validation`] if a record with the same id already exists.
    pub async fn enqueue(&self, mut record: Record) -> Result<Record, Error> {
        record.reset_sync_state();

        {
            let mut records = self.lock();
            if records.iter().any(|r| r.id() == record.id()) {
                return Err(Error::Validation(format!(
                    "record {} is already queued",
                    record.id()
                )));
            }
            let mut next = Vec::with_capacity(records.len() + 1);
            next.push(record.clone());
            next.extend(records.iter().cloned());
            self.persist(&next)?;
            *records = next;
        }

        info!("Enqueued record {} ({})", record.id(), record.title());
        self.publisher
            .publish(DomainEvent::RecordEnqueued {
                record_id: record.id(),
                title: record.title().to_string(),
            })
            .await;
        Ok(record)
    }

    /// Tries to mirror one record.
    ///
    /// Offline, in-flight, unknown and already synced records are reported
    /// without any upload and without touching the record. A rejected or timed
    /// out upload marks the record `failed`; this is an outcome, not an `Err`.
    /// Only storage faults are returned as errors.
    pub async fn attempt_sync(&self, id: RecordId) -> Result<SyncOutcome, Error> {
        let Some(current) = self.get(id) else {
            return Ok(SyncOutcome::NotFound);
        };
        if current.sync_status() == SyncStatus::Synced {
            return Ok(SyncOutcome::AlreadySynced);
        }
        if !self.connectivity.is_online() {
            debug!("Offline, skipping sync of record {id}");
            return Ok(SyncOutcome::Offline);
        }

        let Some(_claim) = InFlightClaim::acquire(&self.in_flight, id) else {
            debug!("Record {id} already has an upload in flight");
            return Ok(SyncOutcome::InFlight);
        };

        // Status may have changed between the snapshot and the claim.
        let mut previous = None;
        let Some(record) = self.update_record(id, |record| {
            previous = Some(record.sync_status());
            record.begin_attempt()
        })?
        else {
            return Ok(SyncOutcome::AlreadySynced);
        };
        if previous == Some(SyncStatus::Failed) {
            self.publish_status(&record).await;
        }

        debug!(
            "Uploading record {id} (attempt {})",
            record.attempts()
        );
        let upload_timeout = self.options.upload_timeout;
        let result = match timeout(upload_timeout, self.uploader.upload(&record)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "upload did not complete within {upload_timeout:?}"
            ))),
        };

        match result {
            Ok(()) => {
                let now = Utc::now();
                if let Some(record) = self.update_record(id, |record| record.mark_synced(now))? {
                    info!("Record {id} synced");
                    self.publish_status(&record).await;
                }
                Ok(SyncOutcome::Synced)
            }
            Err(e) => {
                let reason = e.to_string();
                if let Some(record) =
                    self.update_record(id, |record| record.mark_failed(&reason))?
                {
                    warn!("Sync of record {id} failed: {reason}");
                    self.publish_status(&record).await;
                }
                Ok(SyncOutcome::Failed { reason })
            }
        }
    }

    /// Attempts every `pending` or `failed` record, oldest first, one at a time.
    ///
    /// Returns the number of records that became `synced`. Makes no upload at
    /// all when offline or when nothing is unsynced.
    pub async fn retry_pending(&self) -> Result<usize, Error> {
        let unsynced: Vec<RecordId> = self
            .lock()
            .iter()
            .rev()
            .filter(|r| r.sync_status().is_unsynced())
            .map(|r| r.id())
            .collect();

        if unsynced.is_empty() {
            return Ok(0);
        }
        if !self.connectivity.is_online() {
            debug!("Offline, {} records stay queued", unsynced.len());
            return Ok(0);
        }

        let mut synced = 0;
        for id in unsynced {
            match self.attempt_sync(id).await? {
                SyncOutcome::Synced => synced += 1,
                SyncOutcome::Offline => {
                    debug!("Went offline during retry");
                    break;
                }
                _ => {}
            }
        }

        info!(
            "Retry synced {synced} records, {} still pending",
            self.pending_count()
        );
        Ok(synced)
    }

    // The cache is only ever replaced wholesale, so a poisoned guard still
    // holds a consistent snapshot.
    fn lock(&self) -> MutexGuard<'_, Vec<Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `change` to a copy of one record. When it reports a change the
    /// new collection is persisted and then committed.
    fn update_record(
        &self,
        id: RecordId,
        change: impl FnOnce(&mut Record) -> bool,
    ) -> Result<Option<Record>, Error> {
        let mut records = self.lock();
        let Some(index) = records.iter().position(|r| r.id() == id) else {
            return Ok(None);
        };

        let mut updated = records[index].clone();
        if !change(&mut updated) {
            return Ok(None);
        }

        let mut next = records.clone();
        next[index] = updated.clone();
        self.persist(&next)?;
        *records = next;
        Ok(Some(updated))
    }

    fn persist(&self, records: &[Record]) -> Result<(), Error> {
        let blob = serde_json::to_string(records)?;
        self.store.set(RECORDS_KEY, &blob)?;
        Ok(())
    }

    async fn publish_status(&self, record: &Record) {
        self.publisher
            .publish(DomainEvent::RecordSyncStatusChanged {
                record_id: record.id(),
                status: record.sync_status().to_string(),
                error: record.last_error().map(str::to_string),
            })
            .await;
    }
}
