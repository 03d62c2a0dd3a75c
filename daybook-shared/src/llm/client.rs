//! Chat-completion client
//!
//! The assistant talks to the model through the [`LlmClient`] trait so the
//! HTTP provider can be swapped (or scripted in tests). [`HttpLlmClient`]
//! speaks the OpenAI-compatible `/chat/completions` protocol, which Gemini,
//! OpenAI and most local model servers expose.
//!
//! # Retries
//!
//! Transport errors, `429` and `5xx` responses are retried up to
//! `max_retries` times with a linear backoff. Any other non-success status
//! fails immediately.
//!
//! # Example
//!
//! ```no_run
//! use daybook_shared::llm::client::{ChatMessage, HttpLlmClient, LlmClient, LlmConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpLlmClient::new(LlmConfig {
//!     api_key: "key".to_string(),
//!     ..LlmConfig::default()
//! })?;
//!
//! let reply = client
//!     .complete("gemini-2.5-flash", vec![ChatMessage::user("Say hi")])
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default OpenAI-compatible endpoint (Gemini)
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Default model for both text and image requests
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Base delay between retries; attempt `n` waits `n * RETRY_BACKOFF`
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Low temperature keeps the JSON output stable
const TEMPERATURE: f32 = 0.2;

/// Error type for model calls
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Could not reach the provider
    #[error("LLM transport error: {0}")]
    Transport(String),

    /// Provider answered with a non-success status
    #[error("LLM provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Provider answered without any message content
    #[error("LLM returned an empty reply")]
    EmptyReply,

    /// Reply text isn't the JSON we asked for
    #[error("Malformed LLM reply: {0}")]
    MalformedReply(String),

    /// Input can't be sent to the model
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for model calls
pub type LlmResult<T> = Result<T, LlmError>;

/// Connection settings for the model provider
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL; `/chat/completions` is appended
    pub api_base: String,

    /// Bearer key
    pub api_key: String,

    /// Model for text scheduling
    pub model: String,

    /// Model for image parsing
    pub vision_model: String,

    /// Retries after the first failed attempt
    pub max_retries: u32,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            vision_model: DEFAULT_MODEL.to_string(),
            max_retries: 2,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Message body: plain text or multimodal parts
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One part of a multimodal message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Image reference; a `data:` URL for inline images
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// User message carrying text plus an inline image
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }
}

/// Something that can turn a conversation into a reply
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Completes `messages` with `model` and returns the reply text
    async fn complete(&self, model: &str, messages: Vec<ChatMessage>) -> LlmResult<String>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// [`LlmClient`] over an OpenAI-compatible HTTP API
#[derive(Debug, Clone)]
pub struct HttpLlmClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    max_retries: u32,
}

impl HttpLlmClient {
    /// Builds the HTTP client with the configured timeout
    pub fn new(config: LlmConfig) -> LlmResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: completions_url(&config.api_base),
            api_key: config.api_key,
            max_retries: config.max_retries,
        })
    }

    /// Full URL requests are posted to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn attempt(&self, body: &CompletionRequest<'_>) -> Result<String, (LlmError, bool)> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| (LlmError::Transport(e.to_string()), true))?;

        let status = response.status();
        if !status.is_success() {
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err((
                LlmError::Status {
                    status: status.as_u16(),
                    body: truncate(&body, 500),
                },
                retryable,
            ));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| (LlmError::MalformedReply(e.to_string()), false))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or((LlmError::EmptyReply, false))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, model: &str, messages: Vec<ChatMessage>) -> LlmResult<String> {
        let body = CompletionRequest {
            model,
            messages: &messages,
            temperature: TEMPERATURE,
        };

        let mut attempt = 0;
        loop {
            match self.attempt(&body).await {
                Ok(reply) => {
                    debug!(model, attempt, chars = reply.len(), "LLM reply received");
                    return Ok(reply);
                }
                Err((err, true)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(model, attempt, error = %err, "LLM call failed, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err((err, _)) => return Err(err),
            }
        }
    }
}

fn completions_url(api_base: &str) -> String {
    format!("{}/chat/completions", api_base.trim_end_matches('/'))
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode as AxumStatus, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    /// Serves a fake `/chat/completions` that fails `failures` times first
    async fn fake_provider(failures: usize, fail_status: AxumStatus) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |Json(body): Json<Value>| {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < failures {
                        return (fail_status, Json(json!({"error": "nope"})));
                    }
                    let echoed = body["model"].as_str().unwrap_or_default().to_string();
                    (
                        AxumStatus::OK,
                        Json(json!({
                            "choices": [{"message": {"role": "assistant", "content": echoed}}]
                        })),
                    )
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/v1", addr), calls)
    }

    fn client_for(api_base: String, max_retries: u32) -> HttpLlmClient {
        HttpLlmClient::new(LlmConfig {
            api_base,
            api_key: "test-key".to_string(),
            max_retries,
            timeout: Duration::from_secs(5),
            ..LlmConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_completions_url() {
        assert_eq!(
            completions_url("https://api.example.com/v1/"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            completions_url("https://api.example.com/v1"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_message_serialization() {
        let text = serde_json::to_value(ChatMessage::system("be brief")).unwrap();
        assert_eq!(text, json!({"role": "system", "content": "be brief"}));

        let image = serde_json::to_value(ChatMessage::user_with_image(
            "what is this",
            "data:image/png;base64,AAAA",
        ))
        .unwrap();
        assert_eq!(
            image,
            json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "what is this"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
                ]
            })
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }

    #[tokio::test]
    async fn test_complete_returns_reply() {
        let (base, calls) = fake_provider(0, AxumStatus::INTERNAL_SERVER_ERROR).await;
        let client = client_for(base, 0);

        let reply = client
            .complete("echo-model", vec![ChatMessage::user("hi")])
            .await
            .unwrap();

        assert_eq!(reply, "echo-model");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_complete_retries_server_errors() {
        let (base, calls) = fake_provider(2, AxumStatus::BAD_GATEWAY).await;
        let client = client_for(base, 2);

        let reply = client
            .complete("m", vec![ChatMessage::user("hi")])
            .await
            .unwrap();

        assert_eq!(reply, "m");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_complete_gives_up_after_max_retries() {
        let (base, calls) = fake_provider(10, AxumStatus::SERVICE_UNAVAILABLE).await;
        let client = client_for(base, 1);

        let err = client
            .complete("m", vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::Status { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_complete_does_not_retry_client_errors() {
        let (base, calls) = fake_provider(10, AxumStatus::UNAUTHORIZED).await;
        let client = client_for(base, 3);

        let err = client
            .complete("m", vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::Status { status: 401, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
