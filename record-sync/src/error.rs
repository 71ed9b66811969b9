//! Error types for record synchronization.

use std::fmt;

/// Errors of the sync queue and its upload collaborators.
///
/// Upload failures never escape [`RecordSyncQueue::attempt_sync`](crate::RecordSyncQueue::attempt_sync)
/// as an `Err`; they are folded into the record's `failed` status. Only
/// validation and storage faults are returned to the caller.
#[derive(Debug)]
pub enum Error {
    /// Invalid record supplied by the caller. The operation had no effect.
    Validation(String),

    /// The remote rejected the upload credentials.
    Authentication(String),

    /// Network connectivity issues, DNS failures, or connection resets.
    Network(String),

    /// The remote accepted the request but refused or failed to store the record.
    Provider(String),

    /// The upload did not complete within the configured timeout.
    Timeout(String),

    /// Remote quota exceeded.
    RateLimited { retry_after_seconds: u64 },

    /// The durable store is broken. Surfaced loudly, the queue cannot work without it.
    Storage(String),

    /// Failed to encode or decode the persisted record collection.
    Serialization(String),

    /// Catch-all for errors that don't fit other categories.
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Whether this error indicates a broken local store rather than a remote problem.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Serialization(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(msg) => write!(f, "Invalid record: {}", msg),
            Error::Authentication(msg) => write!(f, "Authentication failed: {}", msg),
            Error::Network(msg) => write!(f, "Network error: {}", msg),
            Error::Provider(msg) => write!(f, "Remote error: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::RateLimited {
                retry_after_seconds,
            } => write!(f, "Rate limited: retry after {}s", retry_after_seconds),
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Other(err) => write!(f, "Other error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<service::store::Error> for Error {
    fn from(err: service::store::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service::store::StoreErrorKind;

    #[test]
    fn test_store_errors_are_storage_errors() {
        let err: Error = service::store::Error {
            source: Some("disk full".to_string().into()),
            error_kind: StoreErrorKind::Io,
        }
        .into();
        assert!(err.is_storage());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_remote_errors_are_not_storage_errors() {
        assert!(!Error::Network("connection reset".into()).is_storage());
        assert_eq!(
            Error::RateLimited {
                retry_after_seconds: 30
            }
            .to_string(),
            "Rate limited: retry after 30s"
        );
    }
}
