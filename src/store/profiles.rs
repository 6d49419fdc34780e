use rusqlite::{OptionalExtension, Row};

use crate::db::pool::DbPool;
use crate::models::{now_timestamp, Profile};

const PROFILE_COLUMNS: &str = "id, email, full_name, avatar_url, created_at";

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        avatar_url: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn get_profile(db: &DbPool, user_id: &str) -> anyhow::Result<Option<Profile>> {
    db.read(|conn| {
        let profile = conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
                [user_id],
                profile_from_row,
            )
            .optional()?;
        Ok(profile)
    })
}

pub fn find_profile_by_email(db: &DbPool, email: &str) -> anyhow::Result<Option<Profile>> {
    db.read(|conn| {
        let profile = conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE email = ?1"),
                [email],
                profile_from_row,
            )
            .optional()?;
        Ok(profile)
    })
}

/// Return the profile for `email`, creating it on first sight.
/// The boolean is `true` when a new row was inserted.
pub fn ensure_profile(db: &DbPool, email: &str) -> anyhow::Result<(Profile, bool)> {
    db.write(|conn| {
        let existing = conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE email = ?1"),
                [email],
                profile_from_row,
            )
            .optional()?;
        if let Some(profile) = existing {
            return Ok((profile, false));
        }

        let profile = Profile {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            full_name: None,
            avatar_url: None,
            created_at: now_timestamp(),
        };
        conn.execute(
            "INSERT INTO profiles (id, email, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![profile.id, profile.email, profile.created_at],
        )?;
        Ok((profile, true))
    })
}

/// Update the fields that are `Some`. Returns the refreshed profile, or `None`
/// when no profile has this id.
pub fn update_profile(
    db: &DbPool,
    user_id: &str,
    full_name: Option<&str>,
    avatar_url: Option<&str>,
) -> anyhow::Result<Option<Profile>> {
    db.write(|conn| {
        let updated = conn.execute(
            "UPDATE profiles
             SET full_name = COALESCE(?1, full_name),
                 avatar_url = COALESCE(?2, avatar_url)
             WHERE id = ?3",
            rusqlite::params![full_name, avatar_url, user_id],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        let profile = conn.query_row(
            &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
            [user_id],
            profile_from_row,
        )?;
        Ok(Some(profile))
    })
}
