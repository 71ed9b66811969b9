//! Gemini `generateContent` client.

use async_trait::async_trait;
use key_registry::auth::ApiKeyAuth;
use log::*;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use service::config::Config;

use super::{error_message, status_error_kind};
use crate::error::{DomainErrorKind, Error, ExternalErrorKind};
use crate::generation::{Generation, GenerationRequest, Generator, InlineData};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Part<'a> {
    Text(&'a str),
    InlineData(InlineDataPart<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataPart<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

impl GenerateContentResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn tokens_used(&self) -> u64 {
        self.usage_metadata
            .as_ref()
            .map(|usage| {
                usage
                    .prompt_token_count
                    .saturating_add(usage.candidates_token_count)
            })
            .unwrap_or(0)
    }
}

fn request_body(request: &GenerationRequest) -> GenerateContentRequest<'_> {
    let mut parts = Vec::with_capacity(2);
    if let Some(InlineData { mime_type, data }) = &request.inline_data {
        parts.push(Part::InlineData(InlineDataPart { mime_type, data }));
    }
    parts.push(Part::Text(&request.prompt));

    GenerateContentRequest {
        contents: vec![Content { parts }],
        generation_config: request
            .response_mime_type
            .as_deref()
            .map(|response_mime_type| GenerationConfig { response_mime_type }),
    }
}

/// Gemini API client
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, model: &str) -> Result<Self, Error> {
        let client = reqwest::Client::builder().use_rustls_tls().build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::new(config.gemini_base_url(), config.gemini_model())
    }
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(
        &self,
        credential: &SecretString,
        request: &GenerationRequest,
    ) -> Result<Generation, Error> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);

        debug!("Requesting generation from model {model}");

        let response = ApiKeyAuth::google(credential.clone())
            .authenticate(self.client.post(&url))
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to reach Gemini: {:?}", e);
                Error::from(e)
            })?;

        let status = response.status();
        if status.is_success() {
            let body: GenerateContentResponse = response.json().await.map_err(|e| {
                warn!("Failed to parse Gemini response: {:?}", e);
                Error {
                    source: Some(Box::new(e)),
                    error_kind: DomainErrorKind::External(ExternalErrorKind::Other(
                        "Invalid response from Gemini".to_string(),
                    )),
                }
            })?;
            let generation = Generation {
                text: body.text(),
                tokens_used: body.tokens_used(),
            };
            debug!("Gemini generation used {} tokens", generation.tokens_used);
            Ok(generation)
        } else {
            let error_text = response.text().await.unwrap_or_default();
            let message = error_message(status, &error_text);
            error!("Gemini API: {}", message);
            Err(Error::external(status_error_kind(status), message))
        }
    }
}
