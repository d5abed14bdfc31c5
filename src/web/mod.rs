//! JSON web API.

pub mod chat;
pub mod settings;
pub mod tasks;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::http::Method;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use secrecy::SecretString;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use crate::channels::{ChatChannel, EmailSender};
use crate::chat::{CommandInterpreter, CommandRegistry};
use crate::error::ConfigError;
use crate::identity::{HasIdentityProvider, IdentityProvider};
use crate::notify::NotificationDispatcher;
use crate::settings::{ResolverConfig, SettingsResolver};
use crate::store::Database;
use crate::tasks::TaskService;

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn IdentityProvider>,
    pub tasks: TaskService,
    pub settings: Arc<SettingsResolver>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub interpreter: Arc<CommandInterpreter>,
    pub chat: Arc<dyn ChatChannel>,
    /// Bearer token required on the inbound chat webhook. Without one the
    /// webhook rejects every post.
    pub webhook_secret: Option<SecretString>,
}

impl AppState {
    /// Wire services on top of a store and the external channels.
    ///
    /// Fails if the chat command registry is inconsistent.
    pub fn new(
        db: Arc<dyn Database>,
        identity: Arc<dyn IdentityProvider>,
        chat: Arc<dyn ChatChannel>,
        email: Arc<dyn EmailSender>,
        resolver: ResolverConfig,
    ) -> Result<Self, ConfigError> {
        let settings = Arc::new(SettingsResolver::new(Arc::clone(&db), resolver));
        let registry = CommandRegistry::builtin(Arc::clone(&db), Arc::clone(&settings))?;
        let dispatcher = NotificationDispatcher::new(
            Arc::clone(&db),
            Arc::clone(&settings),
            Arc::clone(&chat),
            email,
        );

        Ok(Self {
            identity,
            tasks: TaskService::new(db, Arc::clone(&settings)),
            interpreter: Arc::new(CommandInterpreter::new(registry, Arc::clone(&settings))),
            dispatcher: Arc::new(dispatcher),
            settings,
            chat,
            webhook_secret: None,
        })
    }

    /// Set the secret the chat gateway authenticates webhook posts with.
    pub fn with_webhook_secret(mut self, secret: Option<SecretString>) -> Self {
        self.webhook_secret = secret;
        self
    }
}

impl HasIdentityProvider for AppState {
    fn identity_provider(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(req).await;
    tracing::debug!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request handled"
    );
    response
}

/// Build the full API router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .merge(tasks::task_routes())
        .merge(settings::settings_routes())
        .merge(chat::chat_routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(log_requests))
                .layer(cors),
        )
}
