//! HTTP client for the chat API and the state controller built on it.

pub mod controller;
pub mod poll;

pub use controller::{AutoRefresh, ChatController, ChatState, SendOutcome};
pub use poll::{reply_arrived, PollPolicy};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CACHE_CONTROL, PRAGMA};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::models::{ChatMessage, ChatSession, Profile};
use crate::routes::auth_routes::{OtpRequest, OtpResponse, OtpVerify, TokenResponse};
use crate::routes::chat_routes::{ChatRequest, ChatResponse};
use crate::routes::session_routes::{NewSession, UpdateTitle};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{status}: {error}{}", detail_suffix(.details))]
    Api {
        status: u16,
        error: String,
        details: Option<String>,
    },
    #[error("not signed in")]
    NoToken,
    #[error("token is not a valid header value")]
    InvalidToken,
    #[error("message is empty or a reply is still pending")]
    NotReady,
}

fn detail_suffix(details: &Option<String>) -> String {
    details
        .as_deref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    details: Option<String>,
}

/// Thin typed wrapper over the `/api` routes.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn auth_headers(&self) -> Result<HeaderMap, ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::NoToken)?;
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ClientError::InvalidToken)?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }
        let text = resp.text().await.unwrap_or_default();
        let (error, details) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.error, body.details),
            Err(_) => (text, None),
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            error,
            details,
        })
    }

    // ── Auth ────────────────────────────────────────────────────────────

    pub async fn request_code(&self, email: &str) -> Result<OtpResponse, ClientError> {
        let resp = self
            .http
            .post(self.url("/auth/otp/request"))
            .json(&OtpRequest {
                email: email.to_string(),
            })
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn verify_code(&self, email: &str, code: &str) -> Result<TokenResponse, ClientError> {
        let resp = self
            .http
            .post(self.url("/auth/otp/verify"))
            .json(&OtpVerify {
                email: email.to_string(),
                code: code.to_string(),
            })
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn me(&self) -> Result<Profile, ClientError> {
        let resp = self
            .http
            .get(self.url("/auth/me"))
            .headers(self.auth_headers()?)
            .send()
            .await?;
        Self::decode(resp).await
    }

    // ── Sessions ────────────────────────────────────────────────────────

    pub async fn list_sessions(&self) -> Result<Vec<ChatSession>, ClientError> {
        let resp = self
            .http
            .get(self.url("/sessions"))
            .headers(self.auth_headers()?)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn create_session(&self, title: Option<&str>) -> Result<ChatSession, ClientError> {
        let resp = self
            .http
            .post(self.url("/sessions"))
            .headers(self.auth_headers()?)
            .json(&NewSession {
                title: title.map(str::to_string),
            })
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn rename_session(&self, session_id: &str, title: &str) -> Result<(), ClientError> {
        let resp = self
            .http
            .patch(self.url(&format!("/sessions/{session_id}")))
            .headers(self.auth_headers()?)
            .json(&UpdateTitle {
                title: Some(title.to_string()),
            })
            .send()
            .await?;
        Self::decode::<serde_json::Value>(resp).await.map(|_| ())
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), ClientError> {
        let resp = self
            .http
            .delete(self.url(&format!("/sessions/{session_id}")))
            .headers(self.auth_headers()?)
            .send()
            .await?;
        Self::decode::<serde_json::Value>(resp).await.map(|_| ())
    }

    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, ClientError> {
        let resp = self
            .http
            .get(self.url(&format!("/sessions/{session_id}/messages")))
            .headers(self.auth_headers()?)
            .header(CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;
        Self::decode(resp).await
    }

    // ── Chat ────────────────────────────────────────────────────────────

    pub async fn send_chat(&self, session_id: &str, message: &str) -> Result<ChatResponse, ClientError> {
        let resp = self
            .http
            .post(self.url("/chat"))
            .headers(self.auth_headers()?)
            .json(&ChatRequest {
                session_id: Some(session_id.to_string()),
                message: Some(message.to_string()),
            })
            .send()
            .await?;
        Self::decode(resp).await
    }
}
