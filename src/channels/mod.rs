//! Delivery channels: presence-aware chat and the email fallback.

pub mod chat_gateway;
pub mod email;

use async_trait::async_trait;

use crate::error::ChannelError;

pub use chat_gateway::{ChatGateway, ChatGatewayConfig, webhook_secret_from_env};
pub use email::{EmailConfig, SmtpEmailSender};

/// A real-time chat channel that can report whether an address is online.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Channel name for logs.
    fn name(&self) -> &str;

    /// Whether `address` currently appears online.
    async fn is_present(&self, address: &str) -> Result<bool, ChannelError>;

    /// Send a text message to `address`.
    async fn send_message(&self, address: &str, text: &str) -> Result<(), ChannelError>;
}

/// Outbound email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Address reminders are sent from.
    fn from_address(&self) -> &str;

    async fn send_email(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), ChannelError>;
}

/// Chat channel used when no gateway is configured: nobody is ever present,
/// so every reminder goes to email.
pub struct OfflineChat;

#[async_trait]
impl ChatChannel for OfflineChat {
    fn name(&self) -> &str {
        "offline"
    }

    async fn is_present(&self, _address: &str) -> Result<bool, ChannelError> {
        Ok(false)
    }

    async fn send_message(&self, _address: &str, _text: &str) -> Result<(), ChannelError> {
        Err(ChannelError::Disabled {
            name: "chat".into(),
        })
    }
}

/// Email sender used when SMTP is not configured. Every send fails, which the
/// notification pass logs and moves past.
pub struct DisabledEmail;

#[async_trait]
impl EmailSender for DisabledEmail {
    fn from_address(&self) -> &str {
        ""
    }

    async fn send_email(
        &self,
        _from: &str,
        _to: &str,
        _subject: &str,
        _body: &str,
    ) -> Result<(), ChannelError> {
        Err(ChannelError::Disabled {
            name: "email".into(),
        })
    }
}
