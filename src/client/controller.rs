use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::poll::{reply_arrived, PollPolicy, OPTIMISTIC_ID_PREFIX};
use super::{ApiClient, ClientError};
use crate::models::{now_timestamp, title_from, ChatMessage, ChatSession, MessageRole};
use crate::routes::chat_routes::AUTO_TITLE_CHARS;

/// Local view of the signed-in user's chats.
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    pub sessions: Vec<ChatSession>,
    pub messages: Vec<ChatMessage>,
    pub active_session_id: Option<String>,
    pub is_loading: bool,
}

/// How a send ended once the chat POST itself succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Polling saw the assistant's answer.
    Replied,
    /// Tries ran out; the message list was reloaded once instead.
    TimedOut,
}

/// Periodic refresh of the active session. Stops when dropped.
pub struct AutoRefresh {
    handle: JoinHandle<()>,
}

impl AutoRefresh {
    pub fn stop(self) {}
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Drives the API on behalf of an interactive front end and keeps [`ChatState`]
/// consistent with the server. Cloning shares the same state.
#[derive(Clone)]
pub struct ChatController {
    api: Arc<ApiClient>,
    state: Arc<Mutex<ChatState>>,
    policy: PollPolicy,
}

impl ChatController {
    pub fn new(api: ApiClient, policy: PollPolicy) -> Self {
        Self {
            api: Arc::new(api),
            state: Arc::new(Mutex::new(ChatState::default())),
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> ChatState {
        self.lock().clone()
    }

    pub fn active_session_id(&self) -> Option<String> {
        self.lock().active_session_id.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().is_loading
    }

    pub async fn load_sessions(&self) -> Result<(), ClientError> {
        let sessions = self.api.list_sessions().await?;
        self.lock().sessions = sessions;
        Ok(())
    }

    /// Replace local messages with the server's, unless the user has since
    /// switched to another session.
    pub async fn load_messages(&self, session_id: &str) -> Result<(), ClientError> {
        let messages = self.api.list_messages(session_id).await?;
        self.apply_messages(session_id, messages);
        Ok(())
    }

    fn apply_messages(&self, session_id: &str, messages: Vec<ChatMessage>) {
        let mut state = self.lock();
        if state.active_session_id.as_deref() == Some(session_id) {
            state.messages = messages;
        }
    }

    /// One poll: fetch, apply, and hand the list back. Failures are logged and
    /// yield `None`.
    pub async fn fetch_latest_messages(&self, session_id: &str) -> Option<Vec<ChatMessage>> {
        match self.api.list_messages(session_id).await {
            Ok(messages) => {
                self.apply_messages(session_id, messages.clone());
                Some(messages)
            }
            Err(e) => {
                debug!("poll of session {} failed: {}", session_id, e);
                None
            }
        }
    }

    /// Create an empty session, put it first and make it active.
    pub async fn new_chat(&self) -> Result<ChatSession, ClientError> {
        let session = self.api.create_session(None).await?;
        let mut state = self.lock();
        state.sessions.insert(0, session.clone());
        state.active_session_id = Some(session.id.clone());
        state.messages.clear();
        Ok(session)
    }

    pub async fn select_session(&self, session_id: &str) -> Result<(), ClientError> {
        {
            let mut state = self.lock();
            state.active_session_id = Some(session_id.to_string());
            state.messages.clear();
        }
        self.load_messages(session_id).await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), ClientError> {
        self.api.delete_session(session_id).await?;
        let mut state = self.lock();
        state.sessions.retain(|s| s.id != session_id);
        if state.active_session_id.as_deref() == Some(session_id) {
            state.active_session_id = None;
            state.messages.clear();
        }
        Ok(())
    }

    /// Send one user message and wait, by polling, for the assistant's reply.
    ///
    /// Without an active session a new one is created first. The message shows
    /// up locally right away under a `temp-` id and is replaced by the server's
    /// copy on the first successful poll. On failure the optimistic message is
    /// discarded by reloading the session.
    pub async fn send_message(&self, content: &str) -> Result<SendOutcome, ClientError> {
        let content = content.trim();
        let active = {
            let mut state = self.lock();
            if content.is_empty() || state.is_loading {
                return Err(ClientError::NotReady);
            }
            state.is_loading = true;
            state.active_session_id.clone()
        };

        let session_id = match active {
            Some(id) => id,
            None => match self.new_chat().await {
                Ok(session) => session.id,
                Err(e) => {
                    self.lock().is_loading = false;
                    return Err(e);
                }
            },
        };

        self.lock()
            .messages
            .push(optimistic_message(&session_id, content));

        let result = self.deliver(&session_id, content).await;
        if let Err(e) = &result {
            warn!("sending to session {} failed: {}", session_id, e);
            if let Err(e) = self.load_messages(&session_id).await {
                warn!("reload of session {} failed: {}", session_id, e);
            }
        }

        self.lock().is_loading = false;
        result
    }

    async fn deliver(&self, session_id: &str, content: &str) -> Result<SendOutcome, ClientError> {
        self.api.send_chat(session_id, content).await?;

        sleep(self.policy.settle_delay).await;

        let mut outcome = SendOutcome::TimedOut;
        for attempt in 1..=self.policy.max_tries {
            if let Some(latest) = self.fetch_latest_messages(session_id).await {
                if reply_arrived(&latest) {
                    debug!("reply for session {} seen on poll {}", session_id, attempt);
                    outcome = SendOutcome::Replied;
                    break;
                }
            }
            sleep(self.policy.retry_delay).await;
        }

        if outcome == SendOutcome::TimedOut {
            info!(
                "no reply for session {} after {} polls, reloading",
                session_id, self.policy.max_tries
            );
            if let Err(e) = self.load_messages(session_id).await {
                warn!("reload of session {} failed: {}", session_id, e);
            }
        } else {
            self.fetch_latest_messages(session_id).await;
        }

        // Title and session-list failures only log.
        let first_turn = self.fetch_latest_messages(session_id).await.is_some_and(|m| {
            m.iter().filter(|m| m.role == MessageRole::User).count() == 1
        });
        if first_turn {
            let title = title_from(content, AUTO_TITLE_CHARS);
            if let Err(e) = self.api.rename_session(session_id, &title).await {
                warn!("titling session {} failed: {}", session_id, e);
            }
            self.refresh_sessions().await;
        }

        Ok(outcome)
    }

    async fn refresh_sessions(&self) {
        if let Err(e) = self.load_sessions().await {
            warn!("session list reload failed: {}", e);
        }
    }

    /// Reload the active session's messages every `refresh_interval` until the
    /// returned handle is dropped.
    pub fn start_auto_refresh(&self) -> AutoRefresh {
        let controller = self.clone();
        let every = self.policy.refresh_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(session_id) = controller.active_session_id() else {
                    continue;
                };
                if let Err(e) = controller.load_messages(&session_id).await {
                    debug!("auto-refresh of session {} failed: {}", session_id, e);
                }
            }
        });
        AutoRefresh { handle }
    }
}

fn optimistic_message(session_id: &str, content: &str) -> ChatMessage {
    ChatMessage {
        id: format!(
            "{}{}",
            OPTIMISTIC_ID_PREFIX,
            chrono::Utc::now().timestamp_millis()
        ),
        session_id: session_id.to_string(),
        user_id: String::new(),
        role: MessageRole::User,
        content: content.to_string(),
        created_at: now_timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::poll::is_optimistic;

    #[test]
    fn optimistic_message_is_marked() {
        let m = optimistic_message("s1", "hello");
        assert!(is_optimistic(&m));
        assert_eq!(m.role, MessageRole::User);
        assert_eq!(m.session_id, "s1");
    }

    #[tokio::test]
    async fn stale_session_messages_are_not_applied() {
        let api = ApiClient::new("http://127.0.0.1:9").unwrap();
        let controller = ChatController::new(api, PollPolicy::default());
        controller.lock().active_session_id = Some("current".into());

        controller.apply_messages("previous", vec![optimistic_message("previous", "x")]);
        assert!(controller.snapshot().messages.is_empty());

        controller.apply_messages("current", vec![optimistic_message("current", "y")]);
        assert_eq!(controller.snapshot().messages.len(), 1);
    }

    #[tokio::test]
    async fn sending_blank_text_is_rejected_locally() {
        let api = ApiClient::new("http://127.0.0.1:9").unwrap();
        let controller = ChatController::new(api, PollPolicy::default());
        assert!(controller.send_message("   ").await.is_err());
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn send_while_busy_is_refused_before_any_request() {
        let api = ApiClient::new("http://127.0.0.1:9").unwrap().with_token("t");
        let controller = ChatController::new(api, PollPolicy::default());
        controller.lock().is_loading = true;

        let err = controller.send_message("hello").await.unwrap_err();
        assert!(matches!(err, ClientError::NotReady));
        assert!(controller.snapshot().messages.is_empty());
    }

    #[tokio::test]
    async fn failed_session_creation_clears_the_busy_flag() {
        let api = ApiClient::new("http://127.0.0.1:9").unwrap().with_token("t");
        let controller = ChatController::new(api, PollPolicy::default());

        assert!(controller.send_message("hello").await.is_err());
        assert!(!controller.is_loading());
        assert!(controller.snapshot().messages.is_empty());
    }
}
