use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Error code the completion service uses when its own safety filter rejects a prompt.
pub const CONTENT_FILTER_CODE: &str = "content_filter";

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion refused by the service content filter")]
    ContentFiltered,
    #[error("completion service returned {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("completion service returned no content")]
    EmptyCompletion,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
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
}

/// Sampling knobs sent with every classification request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: 800,
            temperature: 0.3,
            top_p: 0.95,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// A chat-completion backend.
///
/// Implementations return the text of the first completion choice.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> Result<String, CompletionError>;
}

#[derive(Debug, Clone)]
pub struct AzureOpenAiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub deployment: String,
    /// `None` waits for the service indefinitely.
    pub timeout: Option<Duration>,
}

/// Azure OpenAI chat completions client.
pub struct AzureOpenAiClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    messages: &'a [ChatMessage],
    #[serde(flatten)]
    sampling: &'a SamplingParams,
    stop: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl AzureOpenAiClient {
    pub fn new(config: &AzureOpenAiConfig) -> Result<Self, CompletionError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            url: format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                config.endpoint.trim_end_matches('/'),
                config.deployment,
                config.api_version
            ),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl CompletionService for AzureOpenAiClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> Result<String, CompletionError> {
        let body = ChatCompletionRequest {
            messages,
            sampling,
            stop: None,
        };

        debug!(messages = messages.len(), "requesting chat completion");
        let resp = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        interpret_response(status, &text)
    }
}

/// Map a raw chat-completions HTTP response to the first choice's text.
fn interpret_response(status: StatusCode, body: &str) -> Result<String, CompletionError> {
    if !status.is_success() {
        let (code, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(env) => (
                env.error.code.unwrap_or_else(|| "unknown".to_string()),
                env.error.message.unwrap_or_default(),
            ),
            Err(_) => ("unknown".to_string(), body.to_string()),
        };
        if code == CONTENT_FILTER_CODE {
            return Err(CompletionError::ContentFiltered);
        }
        return Err(CompletionError::Api {
            status: status.as_u16(),
            code,
            message,
        });
    }

    let parsed: ChatCompletionResponse = serde_json::from_str(body)?;
    let Some(first) = parsed.choices.into_iter().next() else {
        return Err(CompletionError::EmptyCompletion);
    };

    match first.message.and_then(|m| m.content) {
        Some(content) if !content.is_empty() => Ok(content),
        _ if first.finish_reason.as_deref() == Some(CONTENT_FILTER_CODE) => {
            Err(CompletionError::ContentFiltered)
        }
        _ => Err(CompletionError::EmptyCompletion),
    }
}
