//! The remote mirror collaborator.

use async_trait::async_trait;

use crate::error::Error;
use crate::record::Record;

/// Uploads a record to the remote store.
///
/// Any `Err` is folded into the record's `failed` status by the queue; the
/// variant only shapes the stored message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, record: &Record) -> Result<(), Error>;
}
