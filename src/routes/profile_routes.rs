use axum::extract::rejection::JsonRejection;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::middleware::AuthUser;
use crate::error::AppError;
use crate::models::Profile;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UpdateProfile {
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// PATCH /profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Result<Json<UpdateProfile>, JsonRejection>,
) -> Result<Json<Profile>, AppError> {
    let Json(body) = body?;
    if body.full_name.is_none() && body.avatar_url.is_none() {
        return Err(AppError::BadRequest("no fields to update".into()));
    }

    let profile = crate::store::update_profile(
        &state.db,
        &user.user_id,
        body.full_name.as_deref(),
        body.avatar_url.as_deref(),
    )
    .map_err(|e| AppError::failed("Failed to update profile", e))?
    .ok_or(AppError::Unauthorized)?;

    Ok(Json(profile))
}
