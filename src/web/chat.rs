//! Machine-facing routes: the notification trigger and the inbound chat webhook.

use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::AppState;
use crate::error::{Error, Result};
use crate::identity::secrets_match;
use crate::notify::PassReport;

/// Inbound chat message as posted by the gateway.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub body: String,
}

/// Webhook acknowledgement. Replies travel over chat, never in this body.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub ok: bool,
}

/// A webhook post that carried the configured bearer token.
pub struct WebhookAuth;

impl FromRequestParts<AppState> for WebhookAuth {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let Some(secret) = &state.webhook_secret else {
            warn!("Chat webhook post rejected: no webhook secret configured");
            return Err(Error::Unauthorized("chat webhook is not configured"));
        };
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match token {
            Some(token) if secrets_match(secret.expose_secret(), token.trim()) => Ok(WebhookAuth),
            _ => {
                warn!("Chat webhook post rejected: missing or wrong bearer token");
                Err(Error::Unauthorized("invalid webhook token"))
            }
        }
    }
}

/// GET|POST /tasks/notify
///
/// Runs one notification pass. Meant for an external scheduler.
async fn notify(State(state): State<AppState>) -> Result<Json<PassReport>> {
    Ok(Json(state.dispatcher.run_pass(Utc::now()).await?))
}

/// POST /chat/message
///
/// Only the chat gateway may post here. The reply goes back to the sender
/// over chat; unregistered senders get nothing.
async fn chat_message(
    _auth: WebhookAuth,
    State(state): State<AppState>,
    Json(message): Json<InboundMessage>,
) -> Json<Ack> {
    if let Some(reply) = state.interpreter.handle(&message.from, &message.body).await
        && let Err(e) = state.chat.send_message(&message.from, &reply).await
    {
        warn!(channel = state.chat.name(), to = %message.from, error = %e, "Failed to deliver chat reply");
    }
    Json(Ack { ok: true })
}

pub fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks/notify", get(notify).post(notify))
        .route("/chat/message", post(chat_message))
}
