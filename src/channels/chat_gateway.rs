//! Chat channel backed by an HTTP chat gateway.
//!
//! The gateway bridges to the actual chat network and exposes two calls:
//! `GET {base}/presence?address=..` returning `{"present": bool}` and
//! `POST {base}/messages` taking `{"to": .., "body": ..}`. Inbound chat
//! messages arrive separately on the `/chat/message` webhook.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::channels::ChatChannel;
use crate::error::ChannelError;

/// Maximum message length accepted by the gateway.
const MAX_MESSAGE_LENGTH: usize = 4096;

/// Gateway configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct ChatGatewayConfig {
    pub base_url: String,
    pub token: Option<SecretString>,
}

impl ChatGatewayConfig {
    /// Returns `None` if `CHAT_GATEWAY_URL` is not set (chat disabled).
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("CHAT_GATEWAY_URL").ok()?;
        let token = std::env::var("CHAT_GATEWAY_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .map(SecretString::from);
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }
}

/// Shared secret the gateway must present as a bearer token when posting
/// to `/chat/message`, from `CHAT_WEBHOOK_SECRET`.
pub fn webhook_secret_from_env() -> Option<SecretString> {
    std::env::var("CHAT_WEBHOOK_SECRET")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(SecretString::from)
}

#[derive(Deserialize)]
struct PresenceResponse {
    present: bool,
}

/// HTTP chat gateway client.
pub struct ChatGateway {
    config: ChatGatewayConfig,
    client: reqwest::Client,
}

impl ChatGateway {
    pub fn new(config: ChatGatewayConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => req.bearer_auth(token.expose_secret()),
            None => req,
        }
    }

    /// Send a single message chunk (≤ MAX_MESSAGE_LENGTH chars).
    async fn send_chunk(&self, address: &str, text: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({ "to": address, "body": text });
        let resp = self
            .authorized(self.client.post(self.url("messages")))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "chat".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "chat".into(),
                reason: format!("gateway returned {status}: {err}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChatChannel for ChatGateway {
    fn name(&self) -> &str {
        "chat"
    }

    async fn is_present(&self, address: &str) -> Result<bool, ChannelError> {
        let resp = self
            .authorized(self.client.get(self.url("presence")))
            .query(&[("address", address)])
            .send()
            .await
            .map_err(|e| ChannelError::PresenceFailed {
                name: "chat".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ChannelError::PresenceFailed {
                name: "chat".into(),
                reason: format!("gateway returned {}", resp.status()),
            });
        }

        let presence: PresenceResponse = resp
            .json()
            .await
            .map_err(|e| ChannelError::Http(format!("invalid presence response: {e}")))?;
        Ok(presence.present)
    }

    async fn send_message(&self, address: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, MAX_MESSAGE_LENGTH) {
            self.send_chunk(address, &chunk).await?;
        }
        tracing::debug!(to = %address, "Chat message sent");
        Ok(())
    }
}

/// Split text into chunks of at most `max` chars, preferring newline breaks.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    if text.chars().count() <= max {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max {
            // Hard-split lines longer than the limit.
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
