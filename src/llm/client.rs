//! OpenAI-compatible LLM client.
//!
//! Works with any OpenAI-compatible API endpoint. The assistant models
//! under evaluation and the judge models all sit behind one endpoint;
//! callers pick the model per request.

use crate::config::LlmConfig;
use crate::error::{EvalError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Backoff ceiling for retried requests.
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Message role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Request body for chat completion.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Response from chat completion.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    #[allow(dead_code)]
    error_type: Option<String>,
}

/// Response from an LLM call including metadata.
#[derive(Debug)]
pub struct LlmResponse {
    /// The generated content.
    pub content: String,
    /// Reason the model stopped generating.
    pub finish_reason: Option<String>,
    /// Token usage (if available).
    pub usage: Option<TokenUsage>,
}

#[derive(Debug)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// OpenAI-compatible LLM client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// The configured default model.
    pub fn default_model(&self) -> &str {
        &self.config.model
    }

    /// Get the API endpoint URL.
    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/chat/completions", base)
    }

    /// Send a chat completion request using the default model.
    pub async fn chat(&self, messages: Vec<Message>) -> Result<LlmResponse> {
        let model = self.config.model.clone();
        self.chat_as(
            &model,
            self.config.max_tokens,
            self.config.temperature,
            messages,
        )
        .await
    }

    /// Send a chat completion request with explicit model and sampling.
    ///
    /// Transient failures (429, 5xx, timeouts, connection errors) are
    /// retried with exponential backoff up to `max_retries` attempts.
    pub async fn chat_as(
        &self,
        model: &str,
        max_tokens: u32,
        temperature: f32,
        messages: Vec<Message>,
    ) -> Result<LlmResponse> {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages,
            max_tokens: Some(max_tokens),
            temperature: Some(temperature),
        };

        let mut delay = Duration::from_secs(1);
        let mut last_error = String::new();
        let attempts = self.config.max_retries + 1;

        for attempt in 0..attempts {
            if attempt > 0 {
                warn!(model, attempt, "retrying LLM request after {:?}", delay);
                sleep(delay).await;
                delay = std::cmp::min(delay * 2, MAX_BACKOFF);
            }

            let sent = self
                .client
                .post(self.endpoint())
                .timeout(Duration::from_secs(self.config.timeout_seconds))
                .header("Authorization", format!("Bearer {}", self.config.api_key))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await;

            let response = match sent {
                Ok(r) => r,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_error = e.to_string();
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            let body = response.text().await?;

            if status.as_u16() == 429 || status.is_server_error() {
                last_error = format!("HTTP {}: {}", status, body);
                continue;
            }

            if !status.is_success() {
                // Try to parse as API error
                if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
                    return Err(EvalError::LlmApi(format!(
                        "API error ({}): {}",
                        status, api_error.error.message
                    )));
                }
                return Err(EvalError::LlmApi(format!(
                    "Request failed ({}): {}",
                    status, body
                )));
            }

            let completion: ChatCompletionResponse = serde_json::from_str(&body)?;

            let choice = completion
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| EvalError::LlmApi("No choices in response".to_string()))?;

            debug!(model, "LLM request completed");
            return Ok(LlmResponse {
                content: choice.message.content,
                finish_reason: choice.finish_reason,
                usage: completion.usage.map(|u| TokenUsage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                }),
            });
        }

        Err(EvalError::RetriesExhausted {
            attempts,
            last_error,
        })
    }

    /// Convenience method: single user message with optional system prompt.
    pub async fn complete(&self, system: Option<&str>, user: &str) -> Result<String> {
        let mut messages = Vec::new();

        if let Some(sys) = system {
            messages.push(Message::system(sys));
        }
        messages.push(Message::user(user));

        let response = self.chat(messages).await?;
        Ok(response.content)
    }

    /// Convenience method: default sampling, explicit model.
    pub async fn complete_with_model(
        &self,
        model: &str,
        system: Option<&str>,
        user: &str,
    ) -> Result<String> {
        self.complete_as(
            model,
            self.config.max_tokens,
            self.config.temperature,
            system,
            user,
        )
        .await
    }

    /// Convenience method with explicit model and sampling (judge calls).
    pub async fn complete_as(
        &self,
        model: &str,
        max_tokens: u32,
        temperature: f32,
        system: Option<&str>,
        user: &str,
    ) -> Result<String> {
        let mut messages = Vec::new();

        if let Some(sys) = system {
            messages.push(Message::system(sys));
        }
        messages.push(Message::user(user));

        let response = self
            .chat_as(model, max_tokens, temperature, messages)
            .await?;
        Ok(response.content)
    }

    /// Test connectivity to the API.
    pub async fn test_connection(&self) -> Result<()> {
        let messages = vec![Message::user("Say 'hello' and nothing else.")];

        let response = self.chat(messages).await?;

        if response.content.to_lowercase().contains("hello") {
            Ok(())
        } else {
            Err(EvalError::LlmApi(format!(
                "Unexpected response: {}",
                response.content
            )))
        }
    }
}
