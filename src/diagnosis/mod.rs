//! Diagnosis providers.
//!
//! A provider turns the bounded project payload into a categorized
//! diagnosis. Three back ends are supported:
//! - Gemini (Google Generative Language API)
//! - OpenAI (chat completions)
//! - Anthropic (messages)
//!
//! `build_provider` is the only place that branches on which one is used.

mod anthropic;
mod gemini;
mod openai;
mod payload;
mod prompt;
mod response;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use payload::{build_payload, Payload};
pub use prompt::{build_request, user_prompt, SYSTEM_PROMPT};
pub use response::{parse_sections, DiagnosisResult};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::ProviderSettings;

/// Errors from a diagnosis call.
#[derive(Error, Debug)]
pub enum DiagnosisError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("rate limited by provider: {0}")]
    RateLimited(String),
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("missing API key: set the {0} environment variable")]
    MissingApiKey(&'static str),
    #[error("invalid provider configuration: {0}")]
    Config(String),
}

impl DiagnosisError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            DiagnosisError::Timeout(_)
            | DiagnosisError::Network(_)
            | DiagnosisError::RateLimited(_) => true,
            DiagnosisError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Which back end and model produced a diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    pub id: String,
    pub model: String,
}

impl ProviderIdentity {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
        }
    }
}

impl std::fmt::Display for ProviderIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.id, self.model)
    }
}

/// One diagnosis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisRequest {
    pub system: String,
    pub user: String,
    pub max_output_tokens: u32,
}

/// An AI back end that can diagnose a project.
#[async_trait]
pub trait DiagnosisProvider: Send + Sync {
    fn identity(&self) -> ProviderIdentity;

    async fn diagnose(&self, request: &DiagnosisRequest) -> Result<DiagnosisResult, DiagnosisError>;
}

/// Supported back ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Gemini,
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Gemini,
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    /// Environment variable holding the API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => gemini::DEFAULT_MODEL,
            ProviderKind::OpenAi => openai::DEFAULT_MODEL,
            ProviderKind::Anthropic => anthropic::DEFAULT_MODEL,
        }
    }

    /// Identity a provider of this kind would report under `settings`.
    pub fn identity(&self, settings: &ProviderSettings) -> ProviderIdentity {
        let model = settings
            .model
            .clone()
            .unwrap_or_else(|| self.default_model().to_string());
        ProviderIdentity::new(self.as_str(), model)
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = DiagnosisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            other => Err(DiagnosisError::Config(format!(
                "unknown provider {:?} (expected gemini, openai or anthropic)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Create the provider for `kind`, reading its API key from the environment.
pub fn build_provider(
    kind: ProviderKind,
    settings: &ProviderSettings,
) -> Result<Arc<dyn DiagnosisProvider>, DiagnosisError> {
    let var = kind.api_key_var();
    let api_key = std::env::var(var)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or(DiagnosisError::MissingApiKey(var))?;

    let provider: Arc<dyn DiagnosisProvider> = match kind {
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(api_key, settings)?),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(api_key, settings)?),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(api_key, settings)?),
    };
    Ok(provider)
}

/// HTTP client shared by the providers' constructors.
fn http_client(settings: &ProviderSettings) -> Result<reqwest::Client, DiagnosisError> {
    reqwest::Client::builder()
        .user_agent(concat!("sophidoc/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(settings.timeout_secs))
        .build()
        .map_err(|e| DiagnosisError::Config(format!("failed to create HTTP client: {}", e)))
}

/// Map a transport error, keeping timeouts distinct.
fn send_error(err: reqwest::Error, timeout: Duration) -> DiagnosisError {
    if err.is_timeout() {
        DiagnosisError::Timeout(timeout)
    } else {
        DiagnosisError::Network(err)
    }
}

/// Turn a non-success status into a typed error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DiagnosisError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > 500 {
        let mut cut = 500;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(match status.as_u16() {
        429 => DiagnosisError::RateLimited(body),
        401 | 403 => DiagnosisError::Auth(body),
        code => DiagnosisError::Http { status: code, body },
    })
}
