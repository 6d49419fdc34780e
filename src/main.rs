use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use relaychat::{
    auth::{jwt::JwtService, rate_limit::RateLimiter},
    background::{self, BackgroundCoordinator},
    client::{poll::is_optimistic, ApiClient, ChatController, PollPolicy, SendOutcome},
    config,
    db::{self, pool::DbPool},
    state::AppState,
    webhook::WebhookClient,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "relaychat", about = "Chat service backed by a workflow webhook", version)]
struct Cli {
    /// Path to TOML config file
    #[arg(short, long, default_value = "relaychat.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve,
    /// Create the database and apply pending migrations
    Migrate,
    /// Sign in with an emailed code and print the bearer token
    Login {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        base_url: String,
        #[arg(long)]
        email: String,
    },
    /// Interactive chat against a running server
    Chat {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        base_url: String,
        /// Bearer token from `login`
        #[arg(long, env = "RELAYCHAT_TOKEN")]
        token: String,
    },
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging from RUST_LOG (default: info)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relaychat=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => serve(config::load(&cli.config)?).await,
        Commands::Migrate => migrate(config::load(&cli.config)?),
        Commands::Login { base_url, email } => login(&base_url, &email).await,
        Commands::Chat { base_url, token } => chat(&base_url, &token).await,
    }
}

// ── Migrate ────────────────────────────────────────────────────────────────

fn open_database(cfg: &config::ServiceConfig, readers: usize) -> anyhow::Result<DbPool> {
    if let Some(parent) = cfg.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create db dir: {}", parent.display()))?;
        }
    }
    let db = DbPool::open(&cfg.database_path, readers).context("failed to open database")?;
    db::run_migrations(&db).context("failed to run database migrations")?;
    Ok(db)
}

fn migrate(cfg: config::ServiceConfig) -> anyhow::Result<()> {
    open_database(&cfg, 1)?;
    info!("Database ready at {}", cfg.database_path.display());
    Ok(())
}

// ── Serve ──────────────────────────────────────────────────────────────────

fn load_or_create_jwt_secret(cfg: &config::ServiceConfig) -> anyhow::Result<String> {
    if let Some(ref secret) = cfg.jwt_secret {
        return Ok(secret.clone());
    }

    let secret_path = cfg.data_dir.join("jwt_secret.key");
    if secret_path.exists() {
        return Ok(std::fs::read_to_string(&secret_path)
            .context("failed to read jwt_secret.key")?
            .trim()
            .to_string());
    }

    info!("Generating new JWT secret (persisting to {:?})", secret_path);
    let mut secret_bytes = [0u8; 32];
    rand::RngExt::fill(&mut rand::rng(), &mut secret_bytes);
    let secret = hex::encode(secret_bytes);
    std::fs::create_dir_all(&cfg.data_dir).context("failed to create data directory")?;
    std::fs::write(&secret_path, &secret).context("failed to write jwt_secret.key")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&secret_path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(secret)
}

async fn serve(cfg: config::ServiceConfig) -> anyhow::Result<()> {
    info!("Opening database (4 reader connections)...");
    let db = open_database(&cfg, 4)?;

    let jwt = JwtService::new(&load_or_create_jwt_secret(&cfg)?);

    // Sign-in codes: 5 requests per email per 15 minutes
    let otp_limiter = RateLimiter::new(Duration::from_secs(900), 5);

    let webhook = WebhookClient::from_config(&cfg.webhook).context("failed to build webhook client")?;
    if !webhook.is_configured() {
        tracing::warn!("No webhook URL configured; chat requests will fail until one is set");
    }

    // Email service (only if SMTP is configured)
    let email = cfg.smtp.as_ref().and_then(|smtp_cfg| {
        match relaychat::email::EmailService::new(smtp_cfg) {
            Ok(svc) => {
                info!(
                    "Email service ready (SMTP: {}:{})",
                    smtp_cfg.host, smtp_cfg.port
                );
                Some(svc)
            }
            Err(e) => {
                tracing::warn!(
                    "SMTP not available: {}; sign-in codes will be logged to console",
                    e
                );
                None
            }
        }
    });

    let state = AppState::new(cfg.clone(), db, jwt, otp_limiter, webhook, email);

    let coordinator = BackgroundCoordinator::new();
    let sweep_state = state.clone();
    let sweep_shutdown = coordinator.subscribe_shutdown();
    tokio::spawn(async move {
        background::sweeper::run(
            sweep_state,
            Duration::from_secs(background::sweeper::SWEEP_INTERVAL_SECS),
            sweep_shutdown,
        )
        .await;
    });
    info!(
        "Background: sweeper started ({}s interval)",
        background::sweeper::SWEEP_INTERVAL_SECS
    );

    let app = relaychat::routes::app(state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid bind address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind TCP listener")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    coordinator.shutdown();
    info!("Server stopped.");
    Ok(())
}

// ── Graceful shutdown ──────────────────────────────────────────────────────

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping server...");
}

// ── Client commands ────────────────────────────────────────────────────────

async fn prompt(
    lines: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>,
    label: &str,
) -> anyhow::Result<Option<String>> {
    // Prompts go to stderr so `login` output can be captured.
    let mut stderr = tokio::io::stderr();
    stderr.write_all(label.as_bytes()).await?;
    stderr.flush().await?;
    Ok(lines.next_line().await?)
}

async fn login(base_url: &str, email: &str) -> anyhow::Result<()> {
    let api = ApiClient::new(base_url)?;
    api.request_code(email).await.context("failed to request sign-in code")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let code = prompt(&mut lines, "Code: ")
        .await?
        .context("no code entered")?;

    let token = api
        .verify_code(email, code.trim())
        .await
        .context("sign-in failed")?;
    println!("{}", token.token);
    Ok(())
}

fn print_messages(controller: &ChatController) {
    for m in controller.snapshot().messages {
        let marker = if is_optimistic(&m) { " (sending)" } else { "" };
        println!("[{}{}] {}", m.role, marker, m.content);
    }
}

fn print_sessions(controller: &ChatController) {
    let state = controller.snapshot();
    for (i, s) in state.sessions.iter().enumerate() {
        let active = if state.active_session_id.as_deref() == Some(s.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{active} {:>2}. {} ({})",
            i + 1,
            s.title.as_deref().unwrap_or("New chat"),
            s.updated_at
        );
    }
}

/// Resolve a 1-based list position or a literal id against the loaded sessions.
fn session_arg(controller: &ChatController, arg: &str) -> Option<String> {
    let sessions = controller.snapshot().sessions;
    match arg.parse::<usize>() {
        Ok(n) if n >= 1 => sessions.get(n - 1).map(|s| s.id.clone()),
        _ => sessions.iter().find(|s| s.id == arg).map(|s| s.id.clone()),
    }
}

async fn chat(base_url: &str, token: &str) -> anyhow::Result<()> {
    let api = ApiClient::new(base_url)?.with_token(token);
    let profile = api.me().await.context("token rejected")?;
    let controller = ChatController::new(api, PollPolicy::default());
    if let Err(e) = controller.load_sessions().await {
        println!("Error: {e}");
    }
    let _refresh = controller.start_auto_refresh();

    println!("Signed in as {}. Commands: /new /sessions /switch N /delete N /show /quit", profile.email);
    print_sessions(&controller);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = prompt(&mut lines, "> ").await? {
        if !handle_line(&controller, line.trim()).await {
            break;
        }
    }

    Ok(())
}

/// Run one REPL line. Failures are printed and the session goes on; returns
/// `false` once the user asks to leave.
async fn handle_line(controller: &ChatController, line: &str) -> bool {
    let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
    let result = match cmd {
        "" => Ok(()),
        "/quit" | "/exit" => return false,
        "/new" => controller.new_chat().await.map(|session| {
            println!("Started session {}", session.id);
        }),
        "/sessions" => controller
            .load_sessions()
            .await
            .map(|()| print_sessions(controller)),
        "/switch" => match session_arg(controller, arg.trim()) {
            Some(id) => controller
                .select_session(&id)
                .await
                .map(|()| print_messages(controller)),
            None => {
                println!("No such session: {arg}");
                Ok(())
            }
        },
        "/delete" => match session_arg(controller, arg.trim()) {
            Some(id) => controller.delete_session(&id).await.map(|()| {
                println!("Deleted {id}");
            }),
            None => {
                println!("No such session: {arg}");
                Ok(())
            }
        },
        "/show" => {
            print_messages(controller);
            Ok(())
        }
        _ if cmd.starts_with('/') => {
            println!("Unknown command: {cmd}");
            Ok(())
        }
        _ => controller.send_message(line).await.map(|outcome| {
            if outcome == SendOutcome::TimedOut {
                println!("(no reply yet, it will appear on /show once it arrives)");
            }
            print_messages(controller);
        }),
    };
    if let Err(e) = result {
        println!("Error: {e}");
    }
    true
}
