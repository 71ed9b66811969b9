//! HTTP clients for the remote collaborators.

pub mod connectivity;
pub mod drive;
pub mod gemini;

use crate::error::ExternalErrorKind;
use reqwest::StatusCode;

/// Maps a non-success HTTP status to the error kind callers act on.
pub(crate) fn status_error_kind(status: StatusCode) -> ExternalErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ExternalErrorKind::Authentication,
        StatusCode::TOO_MANY_REQUESTS => ExternalErrorKind::RateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ExternalErrorKind::Timeout,
        _ => ExternalErrorKind::Provider,
    }
}

/// Google APIs wrap failures as `{"error": {"message": ...}}`; fall back to the raw body.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());
    if message.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {message}")
    }
}
