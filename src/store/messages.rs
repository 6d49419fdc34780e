use rusqlite::Row;

use crate::db::pool::DbPool;
use crate::models::{now_timestamp, ChatMessage, MessageRole};

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    let role: String = row.get(3)?;
    let role = MessageRole::parse_role(&role).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown message role {role:?}").into(),
        )
    })?;
    Ok(ChatMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        user_id: row.get(2)?,
        role,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Messages of one session in chronological order; insertion order breaks ties.
pub fn list_messages(
    db: &DbPool,
    session_id: &str,
    user_id: &str,
) -> anyhow::Result<Vec<ChatMessage>> {
    db.read(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, session_id, user_id, role, content, created_at
             FROM chat_messages
             WHERE session_id = ?1 AND user_id = ?2
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map([session_id, user_id], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Insert a message and bump the owning session's `updated_at` in one transaction.
pub fn create_message(
    db: &DbPool,
    session_id: &str,
    user_id: &str,
    role: MessageRole,
    content: &str,
) -> anyhow::Result<ChatMessage> {
    let message = ChatMessage {
        id: uuid::Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        user_id: user_id.to_string(),
        role,
        content: content.to_string(),
        created_at: now_timestamp(),
    };

    db.write_tx(|tx| {
        tx.execute(
            "INSERT INTO chat_messages (id, session_id, user_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                message.id,
                message.session_id,
                message.user_id,
                message.role.as_str(),
                message.content,
                message.created_at
            ],
        )?;
        tx.execute(
            "UPDATE chat_sessions SET updated_at = ?1 WHERE id = ?2 AND user_id = ?3",
            rusqlite::params![message.created_at, session_id, user_id],
        )?;
        Ok(())
    })?;

    Ok(message)
}
