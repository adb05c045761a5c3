//! Anthropic provider (messages API).

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

pub(super) const DEFAULT_MODEL: &str = "claude-3-sonnet-20240229";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Anthropic back end.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl AnthropicProvider {
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

    fn messages_url(&self) -> String {
        format!("{}/messages", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

fn extract_text(response: MessagesResponse) -> Result<String, DiagnosisError> {
    let text: String = response
        .content
        .into_iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text)
        .collect();
    if text.trim().is_empty() {
        return Err(DiagnosisError::MalformedResponse(
            "Anthropic response contained no text block".to_string(),
        ));
    }
    Ok(text)
}

#[async_trait]
impl DiagnosisProvider for AnthropicProvider {
    fn identity(&self) -> ProviderIdentity {
        ProviderIdentity::new("anthropic", self.model.clone())
    }

    async fn diagnose(&self, request: &DiagnosisRequest) -> Result<DiagnosisResult, DiagnosisError> {
        debug!(model = %self.model, bytes = request.user.len(), "sending request to Anthropic");

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_output_tokens,
            system: &request.system,
            messages: vec![Message {
                role: "user",
                content: &request.user,
            }],
        };

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;

        let body: MessagesResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| DiagnosisError::MalformedResponse(e.to_string()))?;

        Ok(DiagnosisResult::from_text(&extract_text(body)?))
    }
}
