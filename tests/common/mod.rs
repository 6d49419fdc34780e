//! Shared harness: a real server on an ephemeral port, a temp database and a
//! mock workflow webhook.

#![allow(dead_code)]

use std::time::Duration;

use relaychat::auth::jwt::JwtService;
use relaychat::auth::rate_limit::RateLimiter;
use relaychat::config::ServiceConfig;
use relaychat::db::{self, pool::DbPool};
use relaychat::state::{AppState, SharedState};
use relaychat::webhook::WebhookClient;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const WEBHOOK_PATH: &str = "/webhook/chat";
pub const WEBHOOK_SECRET: &str = "test-hook-secret";

pub struct TestServer {
    pub base_url: String,
    pub state: SharedState,
    pub webhook: MockServer,
    pub http: reqwest::Client,
    _dir: tempfile::TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with_webhook_timeout(Duration::from_secs(30)).await
    }

    pub async fn start_with_webhook_timeout(timeout: Duration) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let webhook = MockServer::start().await;

        let mut cfg: ServiceConfig = toml::from_str("").expect("default config");
        cfg.database_path = dir.path().join("relaychat.db");
        cfg.data_dir = dir.path().to_path_buf();
        cfg.static_dir = dir.path().join("static");
        cfg.webhook.url = Some(format!("{}{}", webhook.uri(), WEBHOOK_PATH));
        cfg.webhook.secret = Some(WEBHOOK_SECRET.into());

        let pool = DbPool::open(&cfg.database_path, 2).expect("open pool");
        db::run_migrations(&pool).expect("migrations");

        let hook = WebhookClient::new(cfg.webhook.url.clone(), cfg.webhook.secret.clone(), timeout)
            .expect("webhook client");
        let state = AppState::new(
            cfg,
            pool,
            JwtService::new("integration-test-secret"),
            RateLimiter::new(Duration::from_secs(900), 5),
            hook,
            None,
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let app = relaychat::routes::app(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server");
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            webhook,
            http: reqwest::Client::new(),
            _dir: dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Profile plus bearer token, skipping the emailed-code round trip.
    pub fn sign_in(&self, email: &str) -> (String, String) {
        let (profile, _) =
            relaychat::store::ensure_profile(&self.state.db, email).expect("profile");
        let token = self
            .state
            .jwt
            .issue(&profile.id, &profile.email)
            .expect("token");
        (profile.id, token)
    }

    /// Every webhook call answers with `reply`.
    pub async fn webhook_replies(&self, reply: &str) {
        Mock::given(method("POST"))
            .and(path(WEBHOOK_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "reply": reply })),
            )
            .mount(&self.webhook)
            .await;
    }

    pub async fn webhook_responds(&self, template: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(WEBHOOK_PATH))
            .respond_with(template)
            .mount(&self.webhook)
            .await;
    }

    pub async fn create_session(&self, token: &str) -> serde_json::Value {
        let resp = self
            .http
            .post(self.url("/api/sessions"))
            .bearer_auth(token)
            .send()
            .await
            .expect("create session");
        assert_eq!(resp.status(), 200);
        resp.json().await.expect("session json")
    }
}
