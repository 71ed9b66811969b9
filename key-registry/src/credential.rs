//! Credential records and their usage metadata.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque credential identifier, assigned at creation time.
pub type CredentialId = Uuid;

const MASK: &str = "••••";
const VISIBLE_SUFFIX: usize = 4;

/// Aggregate usage counters of a credential.
///
/// `total_requests` and `total_tokens` never decrease; `cost` is derived from
/// `total_tokens` and is therefore monotonic as well.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub total_requests: u64,
    pub total_tokens: u64,
    /// Estimated cost in USD.
    pub cost: f64,
    pub last_used: Option<DateTime<Utc>>,
}

/// A stored secret for the generation API plus its health and usage metadata.
///
/// Health and usage fields are private: they change only through
/// [`KeyRegistry::log_success`](crate::KeyRegistry::log_success) and
/// [`KeyRegistry::log_failure`](crate::KeyRegistry::log_failure).
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    id: CredentialId,
    secret: SecretString,
    label: String,
    active: bool,
    error_count: u32,
    usage: Usage,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub(crate) fn new(secret: SecretString, label: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            secret,
            label,
            active: true,
            error_count: 0,
            usage: Usage::default(),
            last_error: None,
            created_at,
        }
    }

    pub fn id(&self) -> CredentialId {
        self.id
    }

    /// The raw secret. Never log or display this; use [`masked_secret`](Self::masked_secret).
    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    /// Display form of the secret showing only its last four characters.
    pub fn masked_secret(&self) -> String {
        let secret = self.secret.expose_secret();
        let count = secret.chars().count();
        let suffix: String = secret
            .chars()
            .skip(count.saturating_sub(VISIBLE_SUFFIX))
            .collect();
        format!("{MASK}{suffix}")
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn usage(&self) -> &Usage {
        &self.usage
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Eligible for selection: active and below the failure threshold.
    pub fn is_healthy(&self, failure_threshold: u32) -> bool {
        self.active && self.error_count < failure_threshold
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn record_success(
        &mut self,
        tokens: u64,
        cost_per_million_tokens: f64,
        at: DateTime<Utc>,
    ) {
        self.usage.total_requests = self.usage.total_requests.saturating_add(1);
        self.usage.total_tokens = self.usage.total_tokens.saturating_add(tokens);
        self.usage.cost = self.usage.total_tokens as f64 / 1_000_000.0 * cost_per_million_tokens;
        self.usage.last_used = Some(at);
        self.error_count = 0;
    }

    pub(crate) fn record_failure(&mut self, message: &str) {
        self.error_count = self.error_count.saturating_add(1);
        self.last_error = Some(message.to_string());
    }
}

/// Persisted form of a credential. `secret` holds ciphertext when `encrypted` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredCredential {
    pub id: CredentialId,
    pub secret: String,
    #[serde(default)]
    pub encrypted: bool,
    pub label: String,
    pub active: bool,
    pub error_count: u32,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredCredential {
    pub(crate) fn from_record(record: &CredentialRecord, secret: String, encrypted: bool) -> Self {
        Self {
            id: record.id,
            secret,
            encrypted,
            label: record.label.clone(),
            active: record.active,
            error_count: record.error_count,
            usage: record.usage.clone(),
            last_error: record.last_error.clone(),
            created_at: record.created_at,
        }
    }

    pub(crate) fn into_record(self, secret: SecretString) -> CredentialRecord {
        CredentialRecord {
            id: self.id,
            secret,
            label: self.label,
            active: self.active,
            error_count: self.error_count,
            usage: self.usage,
            last_error: self.last_error,
            created_at: self.created_at,
        }
    }
}
