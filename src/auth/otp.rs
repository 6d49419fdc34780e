//! Email one-time codes: generation, salted hashing, and the stored
//! challenge lifecycle in `otp_tokens`.

use rand::RngExt;
use rusqlite::OptionalExtension;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::db::pool::DbPool;
use crate::models::{now_timestamp, TIMESTAMP_FORMAT};

pub const OTP_TTL_MINUTES: i64 = 10;
pub const MAX_ATTEMPTS: u32 = 5;

/// Generate a 6-digit OTP code.
pub fn generate_otp() -> String {
    let code = rand::rng().random_range(100_000u32..1_000_000u32);
    code.to_string()
}

/// 16 random bytes, hex-encoded.
pub fn generate_salt() -> String {
    let mut buf = [0u8; 16];
    rand::rng().fill(&mut buf);
    hex::encode(buf)
}

/// SHA-256(salt || otp) as hex.
pub fn hash_otp(salt: &str, otp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(otp.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison against a stored hash.
pub fn verify_otp(salt: &str, candidate: &str, stored_hash: &str) -> bool {
    let candidate_hash = hash_otp(salt, candidate);
    candidate_hash.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

/// Store a fresh code for `user_id`, invalidating any outstanding ones.
/// Returns the plaintext code for delivery.
pub fn issue_challenge(db: &DbPool, user_id: &str) -> anyhow::Result<String> {
    let code = generate_otp();
    let salt = generate_salt();
    let hash = hash_otp(&salt, &code);
    let id = uuid::Uuid::new_v4().to_string();
    let expires_at = (chrono::Utc::now() + chrono::Duration::minutes(OTP_TTL_MINUTES))
        .format(TIMESTAMP_FORMAT)
        .to_string();

    db.write_tx(|tx| {
        tx.execute(
            "UPDATE otp_tokens SET used = 1 WHERE user_id = ?1 AND used = 0",
            [user_id],
        )?;
        tx.execute(
            "INSERT INTO otp_tokens (id, user_id, hash, salt, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![id, user_id, hash, salt, expires_at, now_timestamp()],
        )?;
        Ok(())
    })?;
    Ok(code)
}

/// Check `code` against the latest live challenge. A match consumes the
/// challenge; a miss counts against its attempt budget. Lookup and update run
/// in one write transaction, so a code redeems at most once.
pub fn redeem_challenge(db: &DbPool, user_id: &str, code: &str) -> anyhow::Result<bool> {
    let now = now_timestamp();
    db.write_tx(|tx| {
        let row: Option<(String, String, String)> = tx
            .query_row(
                "SELECT id, hash, salt FROM otp_tokens
                 WHERE user_id = ?1 AND used = 0 AND expires_at > ?2 AND attempts < ?3
                 ORDER BY created_at DESC LIMIT 1",
                rusqlite::params![user_id, now, MAX_ATTEMPTS],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((otp_id, hash, salt)) = row else {
            return Ok(false);
        };

        if !verify_otp(&salt, code, &hash) {
            tx.execute(
                "UPDATE otp_tokens SET attempts = attempts + 1 WHERE id = ?1",
                [&otp_id],
            )?;
            return Ok(false);
        }

        tx.execute("UPDATE otp_tokens SET used = 1 WHERE id = ?1", [&otp_id])?;
        Ok(true)
    })
}

/// Delete used and expired challenges. Returns the number of rows removed.
pub fn purge_stale(db: &DbPool) -> anyhow::Result<usize> {
    let now = now_timestamp();
    db.write(|conn| {
        let removed = conn.execute(
            "DELETE FROM otp_tokens WHERE used = 1 OR expires_at <= ?1",
            [&now],
        )?;
        Ok(removed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ensure_profile;
    use crate::store::test_support::migrated_pool;

    #[test]
    fn test_otp_is_6_digits() {
        for _ in 0..20 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_verify_wrong_code_fails() {
        let salt = generate_salt();
        let otp = generate_otp();
        let hash = hash_otp(&salt, &otp);
        assert!(verify_otp(&salt, &otp, &hash));
        let wrong = if otp == "123456" { "654321" } else { "123456" };
        assert!(!verify_otp(&salt, wrong, &hash));
    }

    #[test]
    fn challenge_is_single_use() {
        let (_dir, db) = migrated_pool();
        let (user, _) = ensure_profile(&db, "a@example.com").unwrap();
        let code = issue_challenge(&db, &user.id).unwrap();

        assert!(redeem_challenge(&db, &user.id, &code).unwrap());
        assert!(!redeem_challenge(&db, &user.id, &code).unwrap());
    }

    #[test]
    fn concurrent_redeems_accept_the_code_once() {
        let (_dir, db) = migrated_pool();
        let (user, _) = ensure_profile(&db, "a@example.com").unwrap();
        let code = issue_challenge(&db, &user.id).unwrap();

        let accepted = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| redeem_challenge(&db, &user.id, &code).unwrap()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });
        assert_eq!(accepted, 1);
    }

    #[test]
    fn new_challenge_invalidates_previous() {
        let (_dir, db) = migrated_pool();
        let (user, _) = ensure_profile(&db, "a@example.com").unwrap();
        let first = issue_challenge(&db, &user.id).unwrap();
        let second = issue_challenge(&db, &user.id).unwrap();

        if first != second {
            assert!(!redeem_challenge(&db, &user.id, &first).unwrap());
        }
        assert!(redeem_challenge(&db, &user.id, &second).unwrap());
    }

    #[test]
    fn attempts_are_capped() {
        let (_dir, db) = migrated_pool();
        let (user, _) = ensure_profile(&db, "a@example.com").unwrap();
        let code = issue_challenge(&db, &user.id).unwrap();
        let wrong = if code == "123456" { "654321" } else { "123456" };

        for _ in 0..MAX_ATTEMPTS {
            assert!(!redeem_challenge(&db, &user.id, wrong).unwrap());
        }
        // Budget exhausted: even the right code is refused now.
        assert!(!redeem_challenge(&db, &user.id, &code).unwrap());
    }

    #[test]
    fn purge_removes_used_challenges() {
        let (_dir, db) = migrated_pool();
        let (user, _) = ensure_profile(&db, "a@example.com").unwrap();
        issue_challenge(&db, &user.id).unwrap();
        let live = issue_challenge(&db, &user.id).unwrap();

        assert_eq!(purge_stale(&db).unwrap(), 1);
        assert!(redeem_challenge(&db, &user.id, &live).unwrap());
    }
}
