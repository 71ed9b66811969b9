//! Metered calls to the generation API with credential rotation.
//!
//! The registry is consulted right before each call and told about the
//! outcome right after it. Failed calls are reported and then returned to the
//! caller; a retry with another credential only happens within
//! `max_credential_attempts`.

use std::sync::Arc;

use async_trait::async_trait;
use events::{DomainEvent, EventPublisher};
use key_registry::{CredentialId, CredentialRecord, KeyRegistry};
use log::*;
use secrecy::SecretString;
use serde::Serialize;
use service::config::Config;
use service::store::KeyValueStore;

use crate::error::{Error, InternalErrorKind};

/// Media sent along with the prompt, base64 encoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub inline_data: Option<InlineData>,
    /// e.g. `application/json` to request structured output.
    pub response_mime_type: Option<String>,
    /// Overrides the generator's default model.
    pub model: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_media(mut self, mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        self.inline_data = Some(InlineData {
            mime_type: mime_type.into(),
            data: data.into(),
        });
        self
    }

    pub fn json_response(mut self) -> Self {
        self.response_mime_type = Some("application/json".to_string());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    /// Prompt plus completion tokens, as reported by the API.
    pub tokens_used: u64,
}

/// The generation API collaborator.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        credential: &SecretString,
        request: &GenerationRequest,
    ) -> Result<Generation, Error>;
}

#[derive(Debug, Clone)]
pub struct Options {
    /// Distinct registry credentials tried per call. Values below 1 count as 1.
    pub max_credential_attempts: u32,
    /// Environment-level credential used when no healthy credential exists. Not metered.
    pub fallback_credential: Option<SecretString>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_credential_attempts: 1,
            fallback_credential: None,
        }
    }
}

impl Options {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_credential_attempts: config.max_credential_attempts,
            fallback_credential: config
                .gemini_api_key()
                .filter(|key| !key.trim().is_empty())
                .map(SecretString::new),
        }
    }
}

pub struct GenerationService<S: KeyValueStore> {
    registry: Arc<KeyRegistry<S>>,
    generator: Arc<dyn Generator>,
    publisher: EventPublisher,
    options: Options,
}

impl<S: KeyValueStore> GenerationService<S> {
    pub fn new(
        registry: Arc<KeyRegistry<S>>,
        generator: Arc<dyn Generator>,
        publisher: EventPublisher,
        options: Options,
    ) -> Self {
        Self {
            registry,
            generator,
            publisher,
            options,
        }
    }

    pub fn registry(&self) -> &Arc<KeyRegistry<S>> {
        &self.registry
    }

    /// Runs `request` with a healthy credential.
    ///
    /// Fails with `NoCredentialAvailable` when no healthy credential exists
    /// and no fallback is configured.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Generation, Error> {
        let max_attempts = self.options.max_credential_attempts.max(1) as usize;
        let mut tried: Vec<CredentialId> = Vec::with_capacity(max_attempts);
        let mut last_error = None;

        while tried.len() < max_attempts {
            let Some(credential) = self.registry.select_credential_excluding(&tried)? else {
                break;
            };
            tried.push(credential.id());

            match self.call(&credential, request).await {
                Ok(generation) => return Ok(generation),
                // Local problems will not go away with another credential.
                Err(e) if !e.is_external() => return Err(e),
                Err(e) => {
                    if tried.len() < max_attempts {
                        info!(
                            "Credential {} failed, trying another: {}",
                            credential.id(),
                            e.message()
                        );
                    }
                    last_error = Some(e);
                }
            }
        }

        if let Some(e) = last_error {
            return Err(e);
        }

        match &self.options.fallback_credential {
            Some(fallback) => {
                warn!("No healthy credential, using the fallback credential");
                self.generator.generate(fallback, request).await
            }
            None => Err(Error::internal(
                InternalErrorKind::NoCredentialAvailable,
                "No valid API keys available. Please add a Gemini API key in settings.",
            )),
        }
    }

    /// Calls the API with one specific credential regardless of its health and
    /// records the outcome. A success brings a quarantined credential back.
    pub async fn verify_credential(&self, id: CredentialId) -> Result<Generation, Error> {
        let credential = self.registry.get_credential(id)?.ok_or_else(|| {
            Error::internal(
                InternalErrorKind::NotFound,
                format!("credential {id} does not exist"),
            )
        })?;
        info!(
            "Verifying credential {} ({})",
            credential.id(),
            credential.masked_secret()
        );
        self.call(&credential, &GenerationRequest::new("Reply with OK."))
            .await
    }

    async fn call(
        &self,
        credential: &CredentialRecord,
        request: &GenerationRequest,
    ) -> Result<Generation, Error> {
        debug!(
            "Calling generation API with credential {} ({})",
            credential.id(),
            credential.masked_secret()
        );

        match self.generator.generate(credential.secret(), request).await {
            Ok(generation) => {
                self.registry
                    .log_success(credential.id(), generation.tokens_used)?;
                Ok(generation)
            }
            Err(e) => {
                self.report_failure(credential, &e).await?;
                Err(e)
            }
        }
    }

    async fn report_failure(&self, credential: &CredentialRecord, error: &Error) -> Result<(), Error> {
        let message = error.message();
        self.registry.log_failure(credential.id(), &message)?;

        let threshold = self.registry.options().failure_threshold;
        if let Some(updated) = self.registry.get_credential(credential.id())? {
            if updated.error_count() == threshold {
                self.publisher
                    .publish(DomainEvent::CredentialQuarantined {
                        credential_id: updated.id(),
                        error_count: updated.error_count(),
                        last_error: updated.last_error().map(str::to_string),
                    })
                    .await;
            }
        }
        Ok(())
    }
}
