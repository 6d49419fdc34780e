use std::time::Duration;

use chrono::{DateTime, FixedOffset};

use crate::models::{ChatMessage, MessageRole};

/// Id prefix of messages that exist only locally, before the server confirms them.
pub const OPTIMISTIC_ID_PREFIX: &str = "temp-";

/// Timings of the send-then-poll cycle and of the background refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause between the chat POST returning and the first poll.
    pub settle_delay: Duration,
    pub max_tries: u32,
    pub retry_delay: Duration,
    /// Period of the active-session refresh.
    pub refresh_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            max_tries: 20,
            retry_delay: Duration::from_millis(600),
            refresh_interval: Duration::from_secs(2),
        }
    }
}

pub fn is_optimistic(message: &ChatMessage) -> bool {
    message.id.starts_with(OPTIMISTIC_ID_PREFIX)
}

fn parse_ts(ts: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(ts).ok()
}

/// Whether `messages` (as fetched from the server) already hold the assistant's
/// answer to the latest saved user message.
///
/// The answer counts as arrived when an assistant message is stamped at or after
/// the last non-optimistic user message. With no saved user message at all, any
/// assistant message counts. Unparseable timestamps never match.
pub fn reply_arrived(messages: &[ChatMessage]) -> bool {
    let last_user = messages
        .iter()
        .filter(|m| m.role == MessageRole::User && !is_optimistic(m))
        .next_back();

    let Some(last_user) = last_user else {
        return messages.iter().any(|m| m.role == MessageRole::Assistant);
    };

    let Some(asked_at) = parse_ts(&last_user.created_at) else {
        return false;
    };

    messages.iter().any(|m| {
        m.role == MessageRole::Assistant
            && parse_ts(&m.created_at).is_some_and(|answered_at| answered_at >= asked_at)
    })
}
