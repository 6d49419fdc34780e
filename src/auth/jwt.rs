use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;

/// Token lifetime in seconds (24h).
pub const TOKEN_TTL_SECS: i64 = 86_400;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Profile id.
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    /// Raw bearer strings revoked by logout. Cleared on restart.
    revoked: Mutex<HashSet<String>>,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            revoked: Mutex::new(HashSet::new()),
        }
    }

    pub fn revoke(&self, token: &str) {
        if let Ok(mut set) = self.revoked.lock() {
            set.insert(token.to_string());
        }
    }

    pub fn is_revoked(&self, token: &str) -> bool {
        self.revoked
            .lock()
            .map(|set| set.contains(token))
            .unwrap_or(false)
    }

    pub fn issue(&self, user_id: &str, email: &str) -> anyhow::Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("jwt encode error: {e}"))
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("jwt verify error: {e}"))?;
        Ok(data.claims)
    }
}
