//! OpenAI provider (chat completions).

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

pub(super) const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI back end. Works with any OpenAI-compatible endpoint via `base_url`.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OpenAiProvider {
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

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn to_request<'a>(&'a self, request: &'a DiagnosisRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_output_tokens,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn extract_text(response: ChatResponse) -> Result<String, DiagnosisError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            DiagnosisError::MalformedResponse("OpenAI response contained no message".to_string())
        })
}

#[async_trait]
impl DiagnosisProvider for OpenAiProvider {
    fn identity(&self) -> ProviderIdentity {
        ProviderIdentity::new("openai", self.model.clone())
    }

    async fn diagnose(&self, request: &DiagnosisRequest) -> Result<DiagnosisResult, DiagnosisError> {
        debug!(model = %self.model, bytes = request.user.len(), "sending request to OpenAI");

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&self.to_request(request))
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;

        let body: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| DiagnosisError::MalformedResponse(e.to_string()))?;

        Ok(DiagnosisResult::from_text(&extract_text(body)?))
    }
}
