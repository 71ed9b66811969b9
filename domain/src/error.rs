//! Error types for the `domain` layer.
use key_registry::{Error as KeyRegistryError, ErrorKind as KeyRegistryErrorKind};
use record_sync::Error as RecordSyncError;
use std::error::Error as StdError;
use std::fmt;

/// Top-level domain error type.
/// Errors in the Domain layer are modeled as a tree structure
/// with `domain::error::Error` as the root type holding a tree of `error_kind`
/// enums that represent the kinds of errors that can occur in the domain layer or
/// in lower layers. The `source` field holds the original error. Lower crates
/// (`key-registry`, `record-sync`, `service`) are translated here so callers of
/// `domain` never match on their error types directly.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: DomainErrorKind,
}

/// Enum representing the major categories of errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum DomainErrorKind {
    Internal(InternalErrorKind),
    External(ExternalErrorKind),
}

/// Errors raised locally, before or without any remote call.
#[derive(Debug, PartialEq)]
pub enum InternalErrorKind {
    /// Invalid caller input. The operation had no effect.
    Validation,
    NotFound,
    /// No healthy credential and no fallback configured. The user must add a credential.
    NoCredentialAvailable,
    /// The durable store is broken.
    Storage,
    Config,
    Other(String),
}

/// Errors reported by or on the way to a remote service.
#[derive(Debug, PartialEq)]
pub enum ExternalErrorKind {
    Network,
    Authentication,
    RateLimited,
    Timeout,
    Provider,
    Other(String),
}

impl Error {
    pub fn internal(kind: InternalErrorKind, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Error {
            source: Some(message.into()),
            error_kind: DomainErrorKind::Internal(kind),
        }
    }

    pub fn external(kind: ExternalErrorKind, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Error {
            source: Some(message.into()),
            error_kind: DomainErrorKind::External(kind),
        }
    }

    /// Whether the remote side was involved, i.e. trying another credential may help.
    pub fn is_external(&self) -> bool {
        matches!(self.error_kind, DomainErrorKind::External(_))
    }

    /// Short human readable message, without the error kind tree.
    pub fn message(&self) -> String {
        match &self.source {
            Some(source) => source.to_string(),
            None => format!("{:?}", self.error_kind),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Domain Error: {self:?}")
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<KeyRegistryError> for Error {
    fn from(err: KeyRegistryError) -> Self {
        let internal_kind = match err.error_kind {
            KeyRegistryErrorKind::Validation => InternalErrorKind::Validation,
            KeyRegistryErrorKind::NotFound => InternalErrorKind::NotFound,
            KeyRegistryErrorKind::Storage(_) => InternalErrorKind::Storage,
        };
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(internal_kind),
        }
    }
}

impl From<RecordSyncError> for Error {
    fn from(err: RecordSyncError) -> Self {
        let error_kind = match &err {
            RecordSyncError::Validation(_) => DomainErrorKind::Internal(InternalErrorKind::Validation),
            RecordSyncError::Storage(_) | RecordSyncError::Serialization(_) => {
                DomainErrorKind::Internal(InternalErrorKind::Storage)
            }
            RecordSyncError::Authentication(_) => {
                DomainErrorKind::External(ExternalErrorKind::Authentication)
            }
            RecordSyncError::Network(_) => DomainErrorKind::External(ExternalErrorKind::Network),
            RecordSyncError::Provider(_) => DomainErrorKind::External(ExternalErrorKind::Provider),
            RecordSyncError::Timeout(_) => DomainErrorKind::External(ExternalErrorKind::Timeout),
            RecordSyncError::RateLimited { .. } => {
                DomainErrorKind::External(ExternalErrorKind::RateLimited)
            }
            RecordSyncError::Other(_) => {
                DomainErrorKind::Internal(InternalErrorKind::Other(err.to_string()))
            }
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<service::store::Error> for Error {
    fn from(err: service::store::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Storage),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(
                "JSON encoding related error".to_string(),
            )),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // Errors that result from issues building the reqwest::Client instance. This
        // type of error will occur prior to any network calls being made.
        if err.is_builder() {
            Error {
                source: Some(Box::new(err)),
                error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(
                    "Failed to build reqwest client".to_string(),
                )),
            }
        } else if err.is_timeout() {
            Error {
                source: Some(Box::new(err)),
                error_kind: DomainErrorKind::External(ExternalErrorKind::Timeout),
            }
        // Errors that result from issues with the network call itself.
        } else {
            Error {
                source: Some(Box::new(err)),
                error_kind: DomainErrorKind::External(ExternalErrorKind::Network),
            }
        }
    }
}

/// Folds a domain error into the sync queue's upload error so the stored
/// `last_error` keeps the remote category.
impl From<Error> for RecordSyncError {
    fn from(err: Error) -> Self {
        let message = err.message();
        match err.error_kind {
            DomainErrorKind::External(ExternalErrorKind::Network) => RecordSyncError::Network(message),
            DomainErrorKind::External(ExternalErrorKind::Authentication) => {
                RecordSyncError::Authentication(message)
            }
            DomainErrorKind::External(ExternalErrorKind::RateLimited) => {
                RecordSyncError::RateLimited {
                    retry_after_seconds: 0,
                }
            }
            DomainErrorKind::External(ExternalErrorKind::Timeout) => RecordSyncError::Timeout(message),
            DomainErrorKind::External(_) => RecordSyncError::Provider(message),
            DomainErrorKind::Internal(InternalErrorKind::Storage) => RecordSyncError::Storage(message),
            DomainErrorKind::Internal(_) => RecordSyncError::Other(message.into()),
        }
    }
}
