pub mod auth_routes;
pub mod chat_routes;
pub mod profile_routes;
pub mod session_routes;

use crate::state::SharedState;
use axum::{
    http::{header, Method},
    routing::{get, patch, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

pub fn app(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::CACHE_CONTROL,
            header::PRAGMA,
        ])
        .max_age(std::time::Duration::from_secs(3600));

    let static_dir = state.config.static_dir.clone();

    let api = Router::new()
        // Auth
        .route("/auth/otp/request", post(auth_routes::request_otp))
        .route("/auth/otp/verify", post(auth_routes::verify_otp))
        .route("/auth/me", get(auth_routes::me))
        .route("/auth/logout", post(auth_routes::logout))
        .route("/profile", patch(profile_routes::update_profile))
        // Sessions
        .route(
            "/sessions",
            get(session_routes::list_sessions).post(session_routes::create_session),
        )
        .route(
            "/sessions/{id}",
            get(session_routes::get_session_messages)
                .patch(session_routes::update_session)
                .delete(session_routes::delete_session),
        )
        .route(
            "/sessions/{id}/messages",
            get(session_routes::list_messages),
        )
        // Chat
        .route("/chat", post(chat_routes::chat))
        .with_state(state);

    // Health at root, API under /api, static front end for everything else
    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .fallback_service(
            ServeDir::new(&static_dir)
                .not_found_service(ServeFile::new(static_dir.join("index.html"))),
        )
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "relaychat"
    }))
}
