use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("rate limited")]
    RateLimited,
    /// A step of a request failed; `error` names the step, `details` the cause.
    #[error("{error}: {details}")]
    Failed { error: String, details: String },
    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn failed(error: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        AppError::Failed {
            error: error.into(),
            details: cause.to_string(),
        }
    }

    pub fn session_not_found() -> Self {
        AppError::NotFound("Session not found or unauthorized".into())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".into(), None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate limited".into(), None),
            AppError::Failed { error, details } => {
                tracing::error!("{}: {}", error, details);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error.clone(),
                    Some(details.clone()),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                    None,
                )
            }
        };
        let body = match details {
            Some(details) => serde_json::json!({ "error": message, "details": details }),
            None => serde_json::json!({ "error": message }),
        };
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn not_found_returns_404() {
        let resp = AppError::session_not_found().into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "Session not found or unauthorized");
        assert!(json.get("details").is_none());
    }

    #[tokio::test]
    async fn unauthorized_returns_401() {
        let resp = AppError::Unauthorized.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rate_limited_returns_429() {
        let resp = AppError::RateLimited.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn failed_carries_details() {
        let err = AppError::failed("Failed to get AI response", "webhook request timeout");
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "Failed to get AI response");
        assert_eq!(json["details"], "webhook request timeout");
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let err = AppError::Internal(anyhow::anyhow!("db connection pool exhausted"));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        // must not leak internal detail
        assert_eq!(json["error"], "Internal server error");
        assert!(json.get("details").is_none());
    }
}
