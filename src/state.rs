use crate::auth::jwt::JwtService;
use crate::auth::rate_limit::RateLimiter;
use crate::config::ServiceConfig;
use crate::db::pool::DbPool;
use crate::email::EmailService;
use crate::webhook::WebhookClient;
use std::sync::Arc;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: ServiceConfig,
    pub db: DbPool,
    pub jwt: JwtService,
    pub otp_limiter: RateLimiter,
    pub webhook: WebhookClient,
    pub email: Option<EmailService>,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        db: DbPool,
        jwt: JwtService,
        otp_limiter: RateLimiter,
        webhook: WebhookClient,
        email: Option<EmailService>,
    ) -> SharedState {
        Arc::new(Self {
            config,
            db,
            jwt,
            otp_limiter,
            webhook,
            email,
        })
    }
}
