//! # key-registry
//!
//! Durable set of credentials for the metered generation API:
//! - Credential records with health and usage metadata
//! - Selection of a healthy credential per outgoing call
//! - Usage metering and the consecutive-failure circuit breaker
//! - Optional AES-256-GCM encryption of secrets at rest
//! - Applying a selected credential to an HTTP request
//!
//! ## Usage
//!
//! ```rust,ignore
//! use key_registry::{KeyRegistry, Options};
//!
//! let registry = KeyRegistry::load(store, Options::default(), None)?;
//! let primary = registry.add_credential("abc", "Primary")?;
//! if let Some(credential) = registry.select_credential()? {
//!     // call the API, then report the outcome
//!     registry.log_success(credential.id(), 500)?;
//! }
//! ```

pub mod auth;
pub mod credential;
pub mod encryption;
pub mod error;
pub mod registry;
pub mod selection;

// Re-export commonly used types
pub use credential::{CredentialId, CredentialRecord, Usage};
pub use encryption::SecretCipher;
pub use error::{Error, ErrorKind};
pub use registry::{KeyRegistry, Options};
pub use selection::SelectionPolicy;
