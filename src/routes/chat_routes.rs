use axum::extract::rejection::JsonRejection;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::middleware::AuthUser;
use crate::error::AppError;
use crate::models::{now_timestamp, title_from, ChatMessage, MessageRole};
use crate::state::AppState;
use crate::webhook::{HistoryEntry, RequestMetadata, WebhookRequest};

/// Characters of the first message used as an automatic session title.
pub const AUTO_TITLE_CHARS: usize = 40;

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// The last `limit` messages as webhook history.
fn history_tail(messages: &[ChatMessage], limit: usize) -> Vec<HistoryEntry> {
    let start = messages.len().saturating_sub(limit);
    messages[start..]
        .iter()
        .map(|m| HistoryEntry {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        })
        .collect()
}

/// POST /chat: store the user turn, relay it to the workflow webhook, store the reply.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(body) = body?;
    let (Some(session_id), Some(message)) = (
        body.session_id.filter(|s| !s.is_empty()),
        body.message.filter(|m| !m.is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "sessionId and message are required".into(),
        ));
    };

    let session = crate::store::get_session(&state.db, &session_id, &user.user_id)
        .map_err(|e| AppError::failed("Failed to fetch session", e))?
        .ok_or_else(AppError::session_not_found)?;

    crate::store::create_message(
        &state.db,
        &session_id,
        &user.user_id,
        MessageRole::User,
        &message,
    )
    .map_err(|e| AppError::failed("Failed to save user message", e))?;

    let recent = crate::store::list_messages(&state.db, &session_id, &user.user_id)
        .map_err(|e| AppError::failed("Failed to fetch messages", e))?;

    let hook_cfg = &state.config.webhook;
    let payload = WebhookRequest {
        app: hook_cfg.app_name.clone(),
        user_id: user.user_id.clone(),
        session_id: session_id.clone(),
        message: message.clone(),
        history: Some(history_tail(&recent, hook_cfg.history_limit)),
        metadata: Some(RequestMetadata {
            timestamp: now_timestamp(),
            source: "webapp".into(),
            model: Some(hook_cfg.model.clone()),
        }),
    };

    let reply = state.webhook.call(&payload).await.map_err(|e| {
        tracing::error!("Webhook call for session {} failed: {}", session_id, e);
        AppError::failed("Failed to get AI response", e)
    })?;

    crate::store::create_message(
        &state.db,
        &session_id,
        &user.user_id,
        MessageRole::Assistant,
        &reply.reply,
    )
    .map_err(|e| AppError::failed("Failed to save assistant message", e))?;

    if session.title.is_none() && recent.len() == 1 {
        let title = title_from(&message, AUTO_TITLE_CHARS);
        if let Err(e) =
            crate::store::update_session_title(&state.db, &session_id, &user.user_id, &title)
        {
            tracing::warn!("Failed to auto-title session {}: {}", session_id, e);
        }
    }

    Ok(Json(ChatResponse {
        reply: reply.reply,
        sources: reply.sources,
        metadata: reply.metadata,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: MessageRole, content: &str) -> ChatMessage {
        ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: "s".into(),
            user_id: "u".into(),
            role,
            content: content.into(),
            created_at: now_timestamp(),
        }
    }

    #[test]
    fn history_keeps_only_the_tail() {
        let messages: Vec<ChatMessage> = (0..15)
            .map(|i| msg(MessageRole::User, &format!("m{i}")))
            .collect();
        let history = history_tail(&messages, 10);
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].content, "m5");
        assert_eq!(history[9].content, "m14");
    }

    #[test]
    fn short_history_is_kept_whole() {
        let messages = vec![
            msg(MessageRole::System, "be brief"),
            msg(MessageRole::User, "hi"),
        ];
        let history = history_tail(&messages, 10);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "system");
    }

    #[test]
    fn request_uses_camel_case_session_id() {
        let req: ChatRequest =
            serde_json::from_value(serde_json::json!({ "sessionId": "s1", "message": "hi" }))
                .unwrap();
        assert_eq!(req.session_id.as_deref(), Some("s1"));
        assert_eq!(req.message.as_deref(), Some("hi"));
    }
}
