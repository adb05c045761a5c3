//! Gemini provider.
//!
//! POST {base}/models/{model}:generateContent?key={api_key}

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{
    check_status, http_client, send_error, DiagnosisError, DiagnosisProvider, DiagnosisRequest,
    DiagnosisResult, ProviderIdentity,
};
use crate::config::ProviderSettings;

pub(super) const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-05-20";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini back end.
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl GeminiProvider {
    pub fn new(api_key: String, settings: &ProviderSettings) -> Result<Self, DiagnosisError> {
        Ok(Self {
            client: http_client(settings)?,
            api_key,
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(settings.timeout_secs),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: Content<'a>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn to_request(request: &DiagnosisRequest) -> GenerateRequest<'_> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: &request.user,
            }],
        }],
        system_instruction: Content {
            parts: vec![Part {
                text: &request.system,
            }],
        },
        generation_config: GenerationConfig {
            max_output_tokens: request.max_output_tokens,
        },
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, DiagnosisError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(DiagnosisError::MalformedResponse(
            "Gemini response contained no text".to_string(),
        ));
    }
    Ok(text)
}

#[async_trait]
impl DiagnosisProvider for GeminiProvider {
    fn identity(&self) -> ProviderIdentity {
        ProviderIdentity::new("gemini", self.model.clone())
    }

    async fn diagnose(&self, request: &DiagnosisRequest) -> Result<DiagnosisResult, DiagnosisError> {
        debug!(model = %self.model, bytes = request.user.len(), "sending request to Gemini");

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&to_request(request))
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;

        let body: GenerateResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| DiagnosisError::MalformedResponse(e.to_string()))?;

        Ok(DiagnosisResult::from_text(&extract_text(body)?))
    }
}
