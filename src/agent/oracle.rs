use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};

use super::date_context::DateContext;
use super::intent::Domain;
use super::prompts;
use crate::config::{Config, OracleBackend};
use crate::error::ErrorKind;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// One oracle exchange: a system instruction and the user's text.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub system: String,
    pub user: String,
    /// Ask the backend to constrain output to JSON when it supports that.
    pub json: bool,
}

/// The language model behind intent extraction and summaries.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle request timed out")]
    Timeout,
    #[error("oracle request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("oracle credentials rejected: {0}")]
    Auth(String),
    #[error("oracle API error (status {status}): {message}")]
    Api { status: u16, message: String },
    /// The reply was empty or not shaped like a reply at all.
    #[error("oracle returned an invalid format: {0}")]
    InvalidFormat(String),
}

impl OracleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OracleError::Auth(_) => ErrorKind::RemoteUnavailable,
            OracleError::InvalidFormat(_) => ErrorKind::MalformedOutput,
            OracleError::Timeout | OracleError::Request(_) | OracleError::Api { .. } => {
                ErrorKind::RemoteRejected
            }
        }
    }
}

/// Build the oracle configured for this process.
pub fn from_config(config: &Config) -> Box<dyn Oracle> {
    let request_timeout = Duration::from_millis(config.oracle_timeout_ms);
    match config.oracle_backend {
        OracleBackend::OpenAi => Box::new(
            OpenAiOracle::new(config.openai_api_key.clone(), config.model.clone())
                .with_timeout(request_timeout),
        ),
        OracleBackend::Ollama => Box::new(
            OllamaOracle::new(config.ollama_url.clone(), Some(config.model.clone()))
                .with_timeout(request_timeout),
        ),
    }
}

// ============================================================================
// OpenAI chat completions
// ============================================================================

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiOracle {
    client: Client,
    api_key: Option<String>,
    model: String,
    api_url: String,
    request_timeout: Duration,
}

impl OpenAiOracle {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.into(),
            api_url: OPENAI_API_URL.to_string(),
            request_timeout: Duration::from_millis(15000),
        }
    }

    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Point at a different chat completions endpoint (compatible servers, tests).
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| OracleError::Auth("OPENAI_API_KEY is not set".to_string()))?;

        let payload = ChatCompletionRequest {
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
            temperature: 0.0,
            response_format: request.json.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let response = timeout(
            self.request_timeout,
            self.client
                .post(&self.api_url)
                .bearer_auth(api_key)
                .json(&payload)
                .send(),
        )
        .await
        .map_err(|_| OracleError::Timeout)??;

        let status = response.status();
        debug!(status = status.as_u16(), "Received OpenAI response");
        if !status.is_success() {
            return Err(error_for_status(status, response).await);
        }

        let body: ChatCompletionResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| OracleError::InvalidFormat("response contained no choices".to_string()))
    }
}

// ============================================================================
// Ollama
// ============================================================================

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

pub struct OllamaOracle {
    client: Client,
    base_url: String,
    model: String,
    request_timeout: Duration,
}

impl OllamaOracle {
    pub fn new(base_url: impl Into<String>, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.unwrap_or_else(|| "qwen2.5:7b".to_string()),
            request_timeout: Duration::from_millis(15000),
        }
    }

    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .is_ok()
    }
}

#[async_trait]
impl Oracle for OllamaOracle {
    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let payload = OllamaRequest {
            model: &self.model,
            system: &request.system,
            prompt: &request.user,
            stream: false,
            format: request.json.then_some("json"),
        };

        // Apply timeout to prevent hanging
        let response = timeout(
            self.request_timeout,
            self.client
                .post(format!("{}/api/generate", self.base_url))
                .json(&payload)
                .send(),
        )
        .await
        .map_err(|_| OracleError::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            return Err(error_for_status(status, response).await);
        }

        let body: OllamaResponse = response.json().await?;
        Ok(body.response)
    }
}

async fn error_for_status(status: StatusCode, response: reqwest::Response) -> OracleError {
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    match status.as_u16() {
        401 | 403 => OracleError::Auth(format!("status {}", status.as_u16())),
        code => OracleError::Api {
            status: code,
            message,
        },
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// Oracle reply with surrounding whitespace removed; never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOracleReply(String);

impl RawOracleReply {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Single-shot bridge between a user prompt and the oracle.
pub struct OracleGateway<'a> {
    oracle: &'a dyn Oracle,
}

impl<'a> OracleGateway<'a> {
    pub fn new(oracle: &'a dyn Oracle) -> Self {
        Self { oracle }
    }

    /// Ask the oracle for one intent. Exactly one request; retries belong to the caller.
    pub async fn interpret(
        &self,
        domain: Domain,
        user_text: &str,
        ctx: &DateContext,
    ) -> Result<RawOracleReply, OracleError> {
        let request = OracleRequest {
            system: prompts::system_prompt(domain, ctx),
            user: user_text.to_string(),
            json: true,
        };

        let start = Instant::now();
        let reply = self.oracle.complete(&request).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%domain, elapsed_ms, error = %e, "Oracle call failed");
                return Err(e);
            }
        };

        let trimmed = reply.trim();
        if trimmed.is_empty() {
            warn!(%domain, elapsed_ms, "Oracle returned an empty reply");
            return Err(OracleError::InvalidFormat("empty reply".to_string()));
        }

        debug!(%domain, elapsed_ms, reply = trimmed, "Oracle reply received");
        Ok(RawOracleReply(trimmed.to_string()))
    }
}
