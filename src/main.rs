use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use task_reminder::channels::{
    ChatChannel, ChatGateway, ChatGatewayConfig, DisabledEmail, EmailConfig, EmailSender,
    OfflineChat, SmtpEmailSender, webhook_secret_from_env,
};
use task_reminder::config::AppConfig;
use task_reminder::identity::{HeaderIdentityProvider, IdentityConfig};
use task_reminder::notify::spawn_notification_ticker;
use task_reminder::settings::ResolverConfig;
use task_reminder::store::{Database, LibSqlBackend};
use task_reminder::web::{AppState, build_router};

/// Stdout logging plus an optional daily rolling file. The guard must live
/// as long as the process so buffered lines get flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "task-reminder.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = AppConfig::from_env().context("invalid configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("Task Reminder v{}", env!("CARGO_PKG_VERSION"));

    // ── Database ────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Channels ────────────────────────────────────────────────────────
    let chat: Arc<dyn ChatChannel> = match ChatGatewayConfig::from_env() {
        Some(gateway) => {
            eprintln!("   Chat: gateway at {}", gateway.base_url);
            Arc::new(ChatGateway::new(gateway))
        }
        None => {
            eprintln!("   Chat: disabled (set CHAT_GATEWAY_URL to enable)");
            Arc::new(OfflineChat)
        }
    };
    let webhook_secret = webhook_secret_from_env();
    if webhook_secret.is_some() {
        eprintln!("   Chat webhook: bearer token required");
    } else {
        eprintln!("   Chat webhook: closed (set CHAT_WEBHOOK_SECRET to accept messages)");
    }
    let email: Arc<dyn EmailSender> = match EmailConfig::from_env() {
        Some(smtp) => {
            eprintln!("   Email: {}:{} as {}", smtp.smtp_host, smtp.smtp_port, smtp.from_address);
            Arc::new(SmtpEmailSender::new(smtp))
        }
        None => {
            eprintln!("   Email: disabled (set EMAIL_SMTP_HOST to enable)");
            Arc::new(DisabledEmail)
        }
    };

    // ── Services ────────────────────────────────────────────────────────
    let identity = Arc::new(HeaderIdentityProvider::new(IdentityConfig::from_env()));
    let state = AppState::new(db, identity, chat, email, ResolverConfig::from_env())
        .context("failed to build application state")?
        .with_webhook_secret(webhook_secret);

    match config.notify_interval {
        Some(interval) => {
            spawn_notification_ticker(Arc::clone(&state.dispatcher), interval);
            eprintln!("   Notifications: every {}s", interval.as_secs());
        }
        None => eprintln!("   Notifications: external trigger only (POST /tasks/notify)"),
    }

    // ── HTTP ────────────────────────────────────────────────────────────
    let app = build_router(state);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    eprintln!("   Listening: http://{addr}\n");
    tracing::info!(%addr, "Task reminder started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await
        .context("server error")?;
    Ok(())
}
