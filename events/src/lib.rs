//! Change notification infrastructure.
//!
//! Stores and queues publish a [`DomainEvent`] after every committed change so
//! that dependents (UI bridges, loggers, the sync agent) react immediately
//! instead of polling persisted state.
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum of every change the core reports
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates. Entity data is carried
//! as serialized JSON values or plain strings.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Identifier type shared by credentials and records.
pub type Id = Uuid;

/// Changes emitted by the core after they have been persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// The application settings were updated or replaced.
    SettingsChanged {
        /// Complete settings after the change.
        settings: Value,
    },
    /// A record was added to the sync queue in the `pending` state.
    RecordEnqueued { record_id: Id, title: String },
    /// A record moved to a new sync status.
    RecordSyncStatusChanged {
        record_id: Id,
        /// `pending`, `synced` or `failed`.
        status: String,
        /// Reason of the latest failed attempt, if any.
        error: Option<String>,
    },
    /// A credential crossed the failure threshold and is excluded from selection.
    CredentialQuarantined {
        credential_id: Id,
        error_count: u32,
        last_error: Option<String>,
    },
    /// The host went online or offline.
    ConnectivityChanged { online: bool },
}

impl DomainEvent {
    /// Stable event name, suitable for log lines and UI dispatch.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::SettingsChanged { .. } => "settings_changed",
            DomainEvent::RecordEnqueued { .. } => "record_enqueued",
            DomainEvent::RecordSyncStatusChanged { .. } => "record_sync_status_changed",
            DomainEvent::CredentialQuarantined { .. } => "credential_quarantined",
            DomainEvent::ConnectivityChanged { .. } => "connectivity_changed",
        }
    }
}

/// Trait for handling domain events.
/// Implementations can perform side effects like surfacing a toast,
/// refreshing a badge, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Publish an event to all registered handlers.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
