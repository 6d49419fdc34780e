use rusqlite::{OptionalExtension, Row};

use crate::db::pool::DbPool;
use crate::models::{now_timestamp, ChatSession};

const SESSION_COLUMNS: &str = "id, user_id, title, created_at, updated_at";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ChatSession> {
    Ok(ChatSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

/// All sessions owned by `user_id`, most recently active first.
pub fn list_sessions(db: &DbPool, user_id: &str) -> anyhow::Result<Vec<ChatSession>> {
    db.read(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions
             WHERE user_id = ?1
             ORDER BY updated_at DESC, rowid DESC"
        ))?;
        let rows = stmt
            .query_map([user_id], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn get_session(
    db: &DbPool,
    session_id: &str,
    user_id: &str,
) -> anyhow::Result<Option<ChatSession>> {
    db.read(|conn| {
        let session = conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = ?1 AND user_id = ?2"
                ),
                [session_id, user_id],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    })
}

pub fn create_session(
    db: &DbPool,
    user_id: &str,
    title: Option<&str>,
) -> anyhow::Result<ChatSession> {
    let now = now_timestamp();
    let session = ChatSession {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        title: title.filter(|t| !t.is_empty()).map(str::to_string),
        created_at: now.clone(),
        updated_at: now,
    };
    db.write(|conn| {
        conn.execute(
            "INSERT INTO chat_sessions (id, user_id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                session.id,
                session.user_id,
                session.title,
                session.created_at,
                session.updated_at
            ],
        )?;
        Ok(())
    })?;
    Ok(session)
}

/// Returns `false` when no session with this id belongs to `user_id`.
pub fn update_session_title(
    db: &DbPool,
    session_id: &str,
    user_id: &str,
    title: &str,
) -> anyhow::Result<bool> {
    db.write(|conn| {
        let count = conn.execute(
            "UPDATE chat_sessions SET title = ?1 WHERE id = ?2 AND user_id = ?3",
            rusqlite::params![title, session_id, user_id],
        )?;
        Ok(count > 0)
    })
}

/// Deletes the session and, by cascade, its messages.
/// Returns `false` when no session with this id belongs to `user_id`.
pub fn delete_session(db: &DbPool, session_id: &str, user_id: &str) -> anyhow::Result<bool> {
    db.write(|conn| {
        let count = conn.execute(
            "DELETE FROM chat_sessions WHERE id = ?1 AND user_id = ?2",
            [session_id, user_id],
        )?;
        Ok(count > 0)
    })
}
