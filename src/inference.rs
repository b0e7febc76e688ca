//! Local language-model backend
//!
//! The pipeline only needs a chat call that returns `message.content`; everything
//! behind [`InferenceBackend`] is replaceable. [`OllamaClient`] talks to an Ollama
//! server over plain HTTP. Calls are never retried; a failed attempt degrades to
//! the caller's fallback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::InferenceConfig;
use crate::error::{Result, TriageError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// The part of a chat reply the pipeline reads
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run one non-streaming chat completion
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<ChatResponse>;

    /// Names of the models installed on the backend
    async fn list_models(&self) -> Result<Vec<String>>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: String,
}

impl OllamaClient {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TriageError::InferenceError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TriageError::InferenceError(format!(
            "HTTP {}: {}",
            status.as_u16(),
            body.trim()
        )))
    }
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<ChatResponse> {
        let url = format!("{}/api/chat", self.endpoint);
        debug!("POST {} (model {})", url, model);

        let response = self
            .http
            .post(&url)
            .json(&ChatRequest {
                model,
                messages,
                stream: false,
            })
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        Ok(response.json::<ChatResponse>().await?)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.endpoint);
        debug!("GET {}", url);

        let response = self.http.get(&url).send().await?;
        let response = Self::check_status(response).await?;
        let tags = response.json::<TagsResponse>().await?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Whether the backend answers at all
pub async fn is_available(backend: &dyn InferenceBackend) -> bool {
    match backend.list_models().await {
        Ok(_) => true,
        Err(e) => {
            debug!("Inference backend unavailable: {}", e);
            false
        }
    }
}

/// Whether a model matching `model` is installed
///
/// Matches loosely in both directions so `mistral` finds `mistral:7b` and
/// `mistral:7b` finds `mistral:7b-instruct`.
pub async fn model_available(backend: &dyn InferenceBackend, model: &str) -> bool {
    match backend.list_models().await {
        Ok(models) => models
            .iter()
            .any(|name| name.contains(model) || model.contains(name.as_str())),
        Err(_) => false,
    }
}
