use crate::error::AppError;
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use std::sync::Arc;

/// The caller behind a valid, unrevoked bearer token whose profile still exists.
/// Handlers take this as an argument to require a signed-in user.
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    /// Raw bearer string, kept for logout.
    pub token: String,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized)?;

        if state.jwt.is_revoked(token) {
            return Err(AppError::Unauthorized);
        }

        let claims = state
            .jwt
            .verify(token)
            .map_err(|_| AppError::Unauthorized)?;

        // A token outliving its profile is not a session.
        let profile = crate::store::get_profile(&state.db, &claims.sub)?;
        if profile.is_none() {
            return Err(AppError::Unauthorized);
        }

        Ok(AuthUser {
            user_id: claims.sub,
            email: claims.email,
            token: token.to_string(),
        })
    }
}
