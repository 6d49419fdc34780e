use axum::extract::rejection::JsonRejection;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::jwt::TOKEN_TTL_SECS;
use crate::auth::middleware::AuthUser;
use crate::auth::otp;
use crate::error::AppError;
use crate::models::Profile;
use crate::state::AppState;

#[derive(Debug, Deserialize, Serialize)]
pub struct OtpRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OtpResponse {
    pub message: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OtpVerify {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: i64,
}

fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_ascii_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(AppError::BadRequest("a valid email is required".into()));
    }
    Ok(email)
}

/// POST /auth/otp/request: first contact with an email creates its profile.
pub async fn request_otp(
    State(state): State<Arc<AppState>>,
    body: Result<Json<OtpRequest>, JsonRejection>,
) -> Result<Json<OtpResponse>, AppError> {
    let Json(body) = body?;
    let email = normalize_email(&body.email)?;

    if !state.otp_limiter.check_and_record(&email) {
        return Err(AppError::RateLimited);
    }

    let (profile, created) = crate::store::ensure_profile(&state.db, &email)?;
    if created {
        tracing::info!("New profile {} for {}", profile.id, email);
    }

    let code = otp::issue_challenge(&state.db, &profile.id)?;

    match &state.email {
        Some(email_svc) => {
            if let Err(e) = email_svc.send_login_code(&email, &code).await {
                tracing::error!("Failed to send sign-in code to {}: {}", email, e);
            }
        }
        None => tracing::info!("Sign-in code for {}: {} (SMTP not configured)", email, code),
    }

    Ok(Json(OtpResponse {
        message: "sign-in code sent".into(),
    }))
}

/// POST /auth/otp/verify
pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    body: Result<Json<OtpVerify>, JsonRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let Json(body) = body?;
    let email = normalize_email(&body.email)?;

    let profile = crate::store::find_profile_by_email(&state.db, &email)?
        .ok_or(AppError::Unauthorized)?;

    if !otp::redeem_challenge(&state.db, &profile.id, body.code.trim())? {
        return Err(AppError::Unauthorized);
    }

    let token = state.jwt.issue(&profile.id, &profile.email)?;
    tracing::info!("User {} signed in", profile.id);

    Ok(Json(TokenResponse {
        token,
        expires_in: TOKEN_TTL_SECS,
    }))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    state.jwt.revoke(&user.token);
    tracing::info!("User {} signed out", user.user_id);
    Ok(Json(serde_json::json!({ "success": true })))
}

/// GET /auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Profile>, AppError> {
    let profile = crate::store::get_profile(&state.db, &user.user_id)?
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(profile))
}
