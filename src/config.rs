use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    pub jwt_secret: Option<String>,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub secret: Option<String>,
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Number of most recent messages forwarded as history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            secret: None,
            timeout_secs: default_webhook_timeout(),
            app_name: default_app_name(),
            model: default_model(),
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    #[serde(default = "default_app_name")]
    pub from_name: String,
}

// Default functions
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/relaychat.db")
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}
fn default_webhook_timeout() -> u64 {
    30
}
fn default_app_name() -> String {
    "AI Chat".into()
}
fn default_model() -> String {
    "gpt-4".into()
}
fn default_history_limit() -> usize {
    10
}

/// Load config from TOML file with env var overrides.
pub fn load(path: &str) -> anyhow::Result<ServiceConfig> {
    let content = if std::path::Path::new(path).exists() {
        std::fs::read_to_string(path)?
    } else {
        tracing::warn!("Config file not found at {}, using defaults", path);
        String::new()
    };

    let mut config: ServiceConfig = toml::from_str(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

fn apply_env_overrides<F>(config: &mut ServiceConfig, var: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = var("RELAYCHAT_HOST") {
        config.host = v;
    }
    if let Some(v) = var("RELAYCHAT_PORT") {
        config.port = v.parse()?;
    }
    if let Some(v) = var("RELAYCHAT_DB_PATH") {
        config.database_path = PathBuf::from(v);
    }
    if let Some(v) = var("RELAYCHAT_JWT_SECRET") {
        config.jwt_secret = Some(v);
    }
    if let Some(v) = var("RELAYCHAT_WEBHOOK_URL") {
        config.webhook.url = Some(v);
    }
    if let Some(v) = var("RELAYCHAT_WEBHOOK_SECRET") {
        config.webhook.secret = Some(v);
    }
    if let Some(v) = var("RELAYCHAT_APP_NAME") {
        config.webhook.app_name = v;
    }
    if let Some(v) = var("RELAYCHAT_MODEL") {
        config.webhook.model = v;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_applied_on_empty_toml() {
        let cfg: ServiceConfig = toml::from_str("").expect("empty toml should parse");
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.webhook.timeout_secs, 30);
        assert_eq!(cfg.webhook.app_name, "AI Chat");
        assert_eq!(cfg.webhook.model, "gpt-4");
        assert_eq!(cfg.webhook.history_limit, 10);
        assert!(cfg.webhook.url.is_none());
        assert!(cfg.jwt_secret.is_none());
        assert!(cfg.smtp.is_none());
    }

    #[test]
    fn partial_toml_overrides_only_set_fields() {
        let toml_str = r#"
port = 9090

[webhook]
url = "https://n8n.example.com/webhook/chat"
timeout_secs = 5
"#;
        let cfg: ServiceConfig = toml::from_str(toml_str).expect("valid toml");
        assert_eq!(cfg.port, 9090);
        assert_eq!(
            cfg.webhook.url.as_deref(),
            Some("https://n8n.example.com/webhook/chat")
        );
        assert_eq!(cfg.webhook.timeout_secs, 5);
        // defaults preserved for unset fields
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.webhook.history_limit, 10);
    }

    #[test]
    fn env_overrides_win_over_file() {
        let mut cfg: ServiceConfig = toml::from_str("port = 9090").unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("RELAYCHAT_PORT", "7070"),
            ("RELAYCHAT_WEBHOOK_SECRET", "s3cret"),
            ("RELAYCHAT_MODEL", "gpt-4o-mini"),
        ]);
        apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.port, 7070);
        assert_eq!(cfg.webhook.secret.as_deref(), Some("s3cret"));
        assert_eq!(cfg.webhook.model, "gpt-4o-mini");
    }

    #[test]
    fn invalid_port_override_is_an_error() {
        let mut cfg: ServiceConfig = toml::from_str("").unwrap();
        let result = apply_env_overrides(&mut cfg, |k| {
            (k == "RELAYCHAT_PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }
}
