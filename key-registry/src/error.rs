//! Error types for the `key-registry` crate.
//!
//! Follows the same pattern as domain::error with a root Error struct and error kind enums.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for key-registry crate.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in key-registry.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// Caller supplied invalid input; the operation had no effect.
    Validation,
    /// The referenced credential does not exist.
    NotFound,
    /// The durable store or its encoding is broken.
    Storage(StorageErrorKind),
}

/// Errors from persisting or loading the credential collection.
#[derive(Debug, PartialEq)]
pub enum StorageErrorKind {
    Store,
    Serialization,
    EncryptionFailed,
    DecryptionFailed,
    Poisoned,
}

impl Error {
    pub fn is_storage(&self) -> bool {
        matches!(self.error_kind, ErrorKind::Storage(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let detail = self
            .source
            .as_ref()
            .map(|source| format!(": {source}"))
            .unwrap_or_default();
        match &self.error_kind {
            ErrorKind::Validation => write!(f, "Invalid credential input{detail}"),
            ErrorKind::NotFound => write!(f, "Credential not found{detail}"),
            ErrorKind::Storage(kind) => write!(f, "Credential storage error ({kind:?}){detail}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<service::store::Error> for Error {
    fn from(err: service::store::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Storage(StorageErrorKind::Store),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Storage(StorageErrorKind::Serialization),
        }
    }
}

/// Helper function to create validation errors.
pub fn validation_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Validation,
    }
}

/// Helper function to create not-found errors.
pub fn not_found_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::NotFound,
    }
}

/// Helper function to create storage errors.
pub fn storage_error(kind: StorageErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Storage(kind),
    }
}
