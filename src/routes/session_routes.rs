use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::http::header;
use axum::response::IntoResponse;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::middleware::AuthUser;
use crate::error::AppError;
use crate::models::{ChatMessage, ChatSession};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NewSession {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UpdateTitle {
    #[serde(default)]
    pub title: Option<String>,
}

/// Responses that polling clients must never see stale.
const NO_STORE_HEADERS: [(header::HeaderName, &str); 3] = [
    (
        header::CACHE_CONTROL,
        "no-store, no-cache, must-revalidate, proxy-revalidate",
    ),
    (header::PRAGMA, "no-cache"),
    (header::EXPIRES, "0"),
];

fn require_owned_session(
    state: &AppState,
    session_id: &str,
    user: &AuthUser,
) -> Result<ChatSession, AppError> {
    crate::store::get_session(&state.db, session_id, &user.user_id)
        .map_err(|e| AppError::failed("Failed to fetch session", e))?
        .ok_or_else(AppError::session_not_found)
}

fn owned_messages(
    state: &AppState,
    session_id: &str,
    user: &AuthUser,
) -> Result<Vec<ChatMessage>, AppError> {
    require_owned_session(state, session_id, user)?;
    crate::store::list_messages(&state.db, session_id, &user.user_id)
        .map_err(|e| AppError::failed("Failed to fetch messages", e))
}

/// GET /sessions
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<ChatSession>>, AppError> {
    let sessions = crate::store::list_sessions(&state.db, &user.user_id)
        .map_err(|e| AppError::failed("Failed to fetch sessions", e))?;
    Ok(Json(sessions))
}

/// POST /sessions: body is optional; `{ "title": ... }` presets the title.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Bytes,
) -> Result<Json<ChatSession>, AppError> {
    let new: NewSession = if body.iter().all(u8::is_ascii_whitespace) {
        NewSession::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {e}")))?
    };

    let session = crate::store::create_session(&state.db, &user.user_id, new.title.as_deref())
        .map_err(|e| AppError::failed("Failed to create session", e))?;
    tracing::debug!("User {} created session {}", user.user_id, session.id);
    Ok(Json(session))
}

/// GET /sessions/{id}: the session's messages.
pub async fn get_session_messages(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    Ok(Json(owned_messages(&state, &session_id, &user)?))
}

/// GET /sessions/{id}/messages: same rows as above, marked uncacheable for pollers.
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let messages = owned_messages(&state, &session_id, &user)?;
    Ok((NO_STORE_HEADERS, Json(messages)))
}

/// PATCH /sessions/{id}
pub async fn update_session(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(session_id): Path<String>,
    body: Result<Json<UpdateTitle>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(body) = body?;
    let title = body
        .title
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest("Title is required".into()))?;

    let updated =
        crate::store::update_session_title(&state.db, &session_id, &user.user_id, &title)
            .map_err(|e| AppError::failed("Failed to update session", e))?;
    if !updated {
        return Err(AppError::session_not_found());
    }

    Ok(Json(serde_json::json!({ "success": true })))
}

/// DELETE /sessions/{id}
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = crate::store::delete_session(&state.db, &session_id, &user.user_id)
        .map_err(|e| AppError::failed("Failed to delete session", e))?;
    if !deleted {
        return Err(AppError::session_not_found());
    }

    tracing::debug!("User {} deleted session {}", user.user_id, session_id);
    Ok(Json(serde_json::json!({ "success": true })))
}
