//! Common test utilities for integration tests
//!
//! This module provides shared infrastructure for integration tests:
//! - A router over a throwaway data directory
//! - A scripted model client with canned replies
//! - Register/login helpers and JSON request helpers

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use daybook_api::app::{build_router, AppState};
use daybook_api::config::{ApiConfig, ChatConfig, Config, JwtConfig, LlmSettings, StorageConfig};
use daybook_shared::llm::client::{ChatMessage, LlmClient, LlmError, LlmResult};
use daybook_shared::store::FileStore;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "integration-test-secret-key-32-bytes!";

/// Model client that replays queued replies
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<LlmResult<String>>>,
    calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl ScriptedLlm {
    pub fn reply(&self, text: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(text.into()));
    }

    pub fn fail(&self, err: LlmError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> Option<(String, Vec<ChatMessage>)> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, model: &str, messages: Vec<ChatMessage>) -> LlmResult<String> {
        self.calls.lock().unwrap().push((model.to_string(), messages));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyReply))
    }
}

/// Test context containing all necessary resources
pub struct TestContext {
    pub dir: TempDir,
    pub app: Router,
    pub store: FileStore,
    pub llm: Arc<ScriptedLlm>,
}

pub fn test_config(dir: &TempDir, chat_rate_limit: u32) -> Config {
    Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            production: false,
        },
        storage: StorageConfig {
            data_dir: dir.path().join("data"),
            uploads_dir: dir.path().join("uploads"),
            max_upload_bytes: 64 * 1024,
        },
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
            expiry_hours: 1,
        },
        llm: LlmSettings {
            api_base: "http://127.0.0.1:9".to_string(),
            api_key: "unused".to_string(),
            model: "text-model".to_string(),
            vision_model: "vision-model".to_string(),
            max_retries: 0,
            timeout_secs: 1,
        },
        chat: ChatConfig {
            rate_limit_per_minute: chat_rate_limit,
        },
    }
}

impl TestContext {
    /// Creates a new context with a fresh data directory
    pub async fn new() -> Self {
        Self::with_chat_rate_limit(100).await
    }

    pub async fn with_chat_rate_limit(per_minute: u32) -> Self {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, per_minute);
        let store = FileStore::open(&config.storage.data_dir, &config.storage.uploads_dir)
            .await
            .unwrap();
        let llm = Arc::new(ScriptedLlm::default());

        let state = AppState::new(store.clone(), config, llm.clone());
        let app = build_router(state);

        TestContext {
            dir,
            app,
            store,
            llm,
        }
    }

    /// Sends a request and returns the raw response
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Sends a JSON request (or an empty body) and parses the JSON reply
    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.send(request).await;
        let status = response.status();
        (status, json_body(response).await)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.json(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.json(Method::POST, uri, Some(token), Some(body)).await
    }

    /// Posts a multipart form and parses the JSON reply
    pub async fn post_multipart(
        &self,
        uri: &str,
        token: &str,
        parts: &[(&str, Option<&str>, &[u8])],
    ) -> (StatusCode, Value) {
        let (content_type, body) = multipart_body(parts);
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();

        let response = self.send(request).await;
        let status = response.status();
        (status, json_body(response).await)
    }

    /// Fetches a path without credentials and returns status and raw body
    pub async fn fetch(&self, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.send(request).await;
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    /// Registers `username` and returns the response
    pub async fn register(&self, username: &str, password: &str) -> (StatusCode, Value) {
        self.json(
            Method::POST,
            "/api/register",
            None,
            Some(json!({"username": username, "password": password})),
        )
        .await
    }

    pub async fn login(&self, username: &str, password: &str) -> (StatusCode, Value) {
        self.json(
            Method::POST,
            "/api/login",
            None,
            Some(json!({"username": username, "password": password})),
        )
        .await
    }

    /// Registers and logs in, returning `(user_id, access_token)`
    pub async fn signed_in_user(&self, username: &str) -> (String, String) {
        let (status, body) = self.register(username, "correct horse").await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);

        let (status, body) = self.login(username, "correct horse").await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);

        (
            body["userId"].as_str().unwrap().to_string(),
            body["access_token"].as_str().unwrap().to_string(),
        )
    }
}

/// Helper for parsing JSON response body; non-JSON bodies become `Null`
pub async fn json_body(response: Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

/// Builds a `multipart/form-data` body from `(name, filename, content)` parts
pub fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> (String, Vec<u8>) {
    let boundary = "daybook-test-boundary".to_string();
    let mut body = Vec::new();

    for (name, filename, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        match filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
            }
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    (format!("multipart/form-data; boundary={}", boundary), body)
}
