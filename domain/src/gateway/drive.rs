//! Google Drive upload target for sync queue records.

use async_trait::async_trait;
use key_registry::auth::ApiKeyAuth;
use log::*;
use record_sync::{Error as RecordSyncError, Record, Uploader};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use service::config::Config;

use super::{error_message, status_error_kind};
use crate::error::{Error, InternalErrorKind};

const JSON_MIME_TYPE: &str = "application/json";

/// File metadata part of a multipart upload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
    name: String,
    mime_type: &'a str,
    parents: Vec<&'a str>,
}

/// Response from creating a file
#[derive(Debug, Deserialize)]
struct CreatedFile {
    #[serde(default)]
    id: Option<String>,
}

/// Uploads each record as a pretty printed JSON file into one Drive folder.
pub struct DriveUploader {
    client: reqwest::Client,
    base_url: String,
    folder_id: String,
    auth: ApiKeyAuth,
}

impl DriveUploader {
    pub fn new(base_url: &str, access_token: SecretString, folder_id: &str) -> Result<Self, Error> {
        let client = reqwest::Client::builder().use_rustls_tls().build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            folder_id: folder_id.to_string(),
            auth: ApiKeyAuth::bearer(access_token),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let access_token = config.drive_access_token().ok_or_else(|| {
            error!("Drive access token not configured");
            Error::internal(InternalErrorKind::Config, "DRIVE_ACCESS_TOKEN is not set")
        })?;
        Self::new(
            config.drive_base_url(),
            SecretString::new(access_token),
            config.drive_folder_id(),
        )
    }

    /// Sends one `multipart/related` request: JSON metadata, then the record payload.
    pub async fn upload_record(&self, record: &Record) -> Result<String, Error> {
        let url = format!("{}/upload/drive/v3/files?uploadType=multipart", self.base_url);
        let boundary = format!("second_brain_{}", record.id().simple());
        let body = multipart_body(&boundary, &self.metadata(record), record)?;

        debug!("Uploading record {} to Drive folder {}", record.id(), self.folder_id);

        let response = self
            .auth
            .authenticate(self.client.post(&url))
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to reach Drive: {:?}", e);
                Error::from(e)
            })?;

        let status = response.status();
        if status.is_success() {
            let file_id = response
                .json::<CreatedFile>()
                .await
                .ok()
                .and_then(|file| file.id)
                .unwrap_or_default();
            info!("Uploaded record {} as Drive file {:?}", record.id(), file_id);
            Ok(file_id)
        } else {
            let error_text = response.text().await.unwrap_or_default();
            let message = error_message(status, &error_text);
            error!("Drive API: {}", message);
            Err(Error::external(status_error_kind(status), message))
        }
    }

    fn metadata(&self, record: &Record) -> FileMetadata<'_> {
        FileMetadata {
            name: format!("{}.json", record.title()),
            mime_type: JSON_MIME_TYPE,
            parents: vec![self.folder_id.as_str()],
        }
    }
}

fn multipart_body(boundary: &str, metadata: &FileMetadata, record: &Record) -> Result<String, Error> {
    let metadata = serde_json::to_string(metadata)?;
    let content = serde_json::to_string_pretty(record.payload())?;
    Ok(format!(
        "--{boundary}\r\n\
         Content-Type: application/json; charset=UTF-8\r\n\r\n\
         {metadata}\r\n\
         --{boundary}\r\n\
         Content-Type: {JSON_MIME_TYPE}\r\n\r\n\
         {content}\r\n\
         --{boundary}--\r\n"
    ))
}

#[async_trait]
impl Uploader for DriveUploader {
    async fn upload(&self, record: &Record) -> Result<(), RecordSyncError> {
        self.upload_record(record).await?;
        Ok(())
    }
}
