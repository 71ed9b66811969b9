//! Applying a credential to an outgoing HTTP request.

use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};

use crate::credential::CredentialRecord;

/// Header used by the generation API for key authentication.
pub const GOOGLE_API_KEY_HEADER: &str = "x-goog-api-key";

/// Authentication method for HTTP requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Custom header carrying the raw key (e.g., `x-goog-api-key: xxx`)
    ApiKeyHeader { header_name: String },
    /// Standard Bearer token
    BearerToken,
}

/// Authenticates requests with a single secret.
///
/// # Examples
///
/// ```rust,ignore
/// // Generation API: x-goog-api-key: xxx
/// let auth = ApiKeyAuth::google(credential.secret().clone());
///
/// // Drive: Authorization: Bearer xxx
/// let auth = ApiKeyAuth::bearer(SecretString::new(token));
/// ```
pub struct ApiKeyAuth {
    secret: SecretString,
    method: AuthMethod,
}

impl ApiKeyAuth {
    pub fn new(secret: SecretString, method: AuthMethod) -> Self {
        Self { secret, method }
    }

    /// Key sent in the `x-goog-api-key` header.
    pub fn google(secret: SecretString) -> Self {
        Self::new(
            secret,
            AuthMethod::ApiKeyHeader {
                header_name: GOOGLE_API_KEY_HEADER.to_string(),
            },
        )
    }

    pub fn bearer(secret: SecretString) -> Self {
        Self::new(secret, AuthMethod::BearerToken)
    }

    /// Header authentication using a registry credential.
    pub fn for_credential(credential: &CredentialRecord) -> Self {
        Self::google(credential.secret().clone())
    }

    pub fn auth_method(&self) -> &AuthMethod {
        &self.method
    }

    /// Apply authentication to a request builder.
    pub fn authenticate(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.method {
            AuthMethod::ApiKeyHeader { header_name } => {
                request.header(header_name.as_str(), self.secret.expose_secret().as_str())
            }
            AuthMethod::BearerToken => request.bearer_auth(self.secret.expose_secret()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(value: &str) -> SecretString {
        SecretString::new(value.to_string())
    }

    #[test]
    fn test_google_auth_sets_api_key_header() {
        let auth = ApiKeyAuth::google(secret("test_key"));
        let request = auth
            .authenticate(reqwest::Client::new().get("http://localhost/test"))
            .build()
            .unwrap();

        assert_eq!(
            request.headers().get(GOOGLE_API_KEY_HEADER).unwrap(),
            "test_key"
        );
        assert!(request.headers().get("authorization").is_none());
    }

    #[test]
    fn test_bearer_auth_sets_authorization_header() {
        let auth = ApiKeyAuth::bearer(secret("test_token"));
        assert_eq!(auth.auth_method(), &AuthMethod::BearerToken);

        let request = auth
            .authenticate(reqwest::Client::new().post("http://localhost/upload"))
            .build()
            .unwrap();
        assert_eq!(
            request.headers().get("authorization").unwrap(),
            "Bearer test_token"
        );
    }

    #[test]
    fn test_for_credential_uses_credential_secret() {
        let credential = CredentialRecord::new(
            secret("AIzaSy-from-registry"),
            "Primary".to_string(),
            chrono::Utc::now(),
        );
        let request = ApiKeyAuth::for_credential(&credential)
            .authenticate(reqwest::Client::new().get("http://localhost/models"))
            .build()
            .unwrap();
        assert_eq!(
            request.headers().get(GOOGLE_API_KEY_HEADER).unwrap(),
            "AIzaSy-from-registry"
        );
    }
}
