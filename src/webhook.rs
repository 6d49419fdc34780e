//! Client for the workflow engine's chat webhook.
//!
//! One POST per chat turn. The engine answers with at least `{ "reply": "..." }`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::WebhookConfig;

pub const SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestMetadata {
    pub timestamp: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookRequest {
    pub app: String,
    pub user_id: String,
    pub session_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RequestMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookReply {
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook URL is not configured")]
    NotConfigured,
    #[error("webhook request timeout")]
    Timeout,
    #[error("webhook error: {status} {reason} - {body}")]
    Status {
        status: u16,
        reason: String,
        body: String,
    },
    #[error("invalid response from webhook: {0}")]
    InvalidResponse(String),
    #[error("invalid response from webhook: missing \"reply\" field")]
    MissingReply,
    #[error("webhook network error: {0}")]
    Network(#[source] reqwest::Error),
}

impl From<reqwest::Error> for WebhookError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            WebhookError::Timeout
        } else {
            WebhookError::Network(e)
        }
    }
}

pub struct WebhookClient {
    http: reqwest::Client,
    url: Option<String>,
    secret: Option<String>,
}

impl WebhookClient {
    pub fn new(url: Option<String>, secret: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build webhook HTTP client: {e}"))?;
        Ok(Self {
            http,
            url: url.filter(|u| !u.trim().is_empty()),
            secret: secret.filter(|s| !s.is_empty()),
        })
    }

    pub fn from_config(cfg: &WebhookConfig) -> anyhow::Result<Self> {
        Self::new(
            cfg.url.clone(),
            cfg.secret.clone(),
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    pub async fn call(&self, payload: &WebhookRequest) -> Result<WebhookReply, WebhookError> {
        let url = self.url.as_deref().ok_or(WebhookError::NotConfigured)?;

        let mut request = self.http.post(url).json(payload);
        if let Some(secret) = &self.secret {
            request = request.header(SECRET_HEADER, secret);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WebhookError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        parse_reply(&bytes)
    }
}

/// Enforce the minimal contract: a JSON object with a non-empty string `reply`.
fn parse_reply(bytes: &[u8]) -> Result<WebhookReply, WebhookError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| WebhookError::InvalidResponse(format!("body is not JSON: {e}")))?;

    match value.get("reply") {
        Some(serde_json::Value::String(s)) if !s.is_empty() => {}
        _ => return Err(WebhookError::MissingReply),
    }

    serde_json::from_value(value).map_err(|e| WebhookError::InvalidResponse(e.to_string()))
}
