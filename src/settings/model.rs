//! Per-user notification settings.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::timezone;

/// Zone assigned to new users.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Notification settings for one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Identity key. Unique.
    pub owner: String,
    /// Identity email, used for the email fallback.
    pub email: String,
    /// Random token proving a chat address belongs to this user.
    pub api_key: String,
    /// Whether the chat address has been verified with `/verify`.
    pub verified: bool,
    /// Chat address reminders are sent to.
    pub chat_address: String,
    /// IANA zone name used for display and input.
    pub timezone: String,
    /// Deliver reminders over chat when the address is present.
    pub chat_enabled: bool,
    /// Fall back to email when chat is unavailable.
    pub email_enabled: bool,
}

impl UserSettings {
    /// Defaults for a first-time user.
    pub fn for_identity(identity: &Identity) -> Self {
        Self {
            owner: identity.key.clone(),
            email: identity.email.clone(),
            api_key: generate_api_key(),
            verified: false,
            chat_address: identity.email.to_lowercase(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            chat_enabled: true,
            email_enabled: true,
        }
    }

    /// Apply a validated update.
    pub fn apply(&mut self, update: &SettingsUpdate) -> Result<()> {
        if let Some(zone) = &update.timezone {
            timezone::parse_zone(zone)?;
        }
        if let Some(address) = &update.chat_address
            && normalize_address(address).is_empty()
        {
            return Err(Error::validation("chat_address", "must not be empty"));
        }

        if let Some(zone) = &update.timezone {
            self.timezone = zone.trim().to_string();
        }
        if let Some(address) = &update.chat_address {
            let address = normalize_address(address);
            if address != self.chat_address {
                // A new address has to be proven again.
                self.verified = false;
            }
            self.chat_address = address;
        }
        if let Some(enabled) = update.chat_enabled {
            self.chat_enabled = enabled;
        }
        if let Some(enabled) = update.email_enabled {
            self.email_enabled = enabled;
        }
        Ok(())
    }
}

/// Settings fields a user may change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub chat_address: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub chat_enabled: Option<bool>,
    #[serde(default)]
    pub email_enabled: Option<bool>,
}

/// Settings as shown to their owner. The API key is included so the user can
/// send `/verify <key>` from their chat client.
#[derive(Debug, Clone, Serialize)]
pub struct SettingsView {
    pub email: String,
    pub api_key: String,
    pub verified: bool,
    pub chat_address: String,
    pub timezone: String,
    pub chat_enabled: bool,
    pub email_enabled: bool,
}

impl From<&UserSettings> for SettingsView {
    fn from(s: &UserSettings) -> Self {
        Self {
            email: s.email.clone(),
            api_key: s.api_key.clone(),
            verified: s.verified,
            chat_address: s.chat_address.clone(),
            timezone: s.timezone.clone(),
            chat_enabled: s.chat_enabled,
            email_enabled: s.email_enabled,
        }
    }
}

/// 128 random bits as 32 lowercase hex characters.
pub fn generate_api_key() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Bare, lowercase chat address: `Alice@Example.com/phone` -> `alice@example.com`.
pub fn normalize_address(address: &str) -> String {
    let bare = address.trim().split('/').next().unwrap_or_default();
    bare.trim().to_lowercase()
}
