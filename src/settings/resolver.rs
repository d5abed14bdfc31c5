//! Read-through settings resolver: cache, then store, then create defaults.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, info, warn};

use super::model::{SettingsUpdate, UserSettings, normalize_address};
use crate::error::{DatabaseError, Error, Result};
use crate::identity::{Identity, secrets_match};
use crate::store::Database;

/// Cache lifetime and size for resolved settings.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// How long a cached record may be served without re-reading the store.
    pub cache_ttl: Duration,
    /// Maximum number of cached records.
    pub cache_capacity: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 10_000,
        }
    }
}

impl ResolverConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_ttl: std::env::var("REMINDER_SETTINGS_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            cache_capacity: std::env::var("REMINDER_SETTINGS_CACHE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cache_capacity),
        }
    }
}

/// Resolves per-user settings, creating defaults on first access.
///
/// Writes go through [`SettingsResolver::update`], [`SettingsResolver::verify`]
/// and [`SettingsResolver::verify_chat_address`], which invalidate the cached
/// entry. Writes that bypass the resolver are picked up once the TTL expires.
pub struct SettingsResolver {
    db: Arc<dyn Database>,
    cache: Cache<String, UserSettings>,
}

impl SettingsResolver {
    pub fn new(db: Arc<dyn Database>, config: ResolverConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(config.cache_ttl)
            .build();
        Self { db, cache }
    }

    /// Settings for `identity`, created with defaults if none exist yet.
    pub async fn get_or_create(&self, identity: &Identity) -> Result<UserSettings> {
        if let Some(settings) = self.cache.get(&identity.key).await {
            return Ok(settings);
        }

        let settings = match self.db.get_settings(&identity.key).await? {
            Some(settings) => settings,
            None => self.create(identity).await?,
        };

        self.cache
            .insert(identity.key.clone(), settings.clone())
            .await;
        Ok(settings)
    }

    async fn create(&self, identity: &Identity) -> Result<UserSettings> {
        let settings = UserSettings::for_identity(identity);
        match self.db.insert_settings(&settings).await {
            Ok(()) => {
                info!(owner = %identity.key, "Created default settings");
                Ok(settings)
            }
            // Another request created the record first.
            Err(DatabaseError::Constraint(_)) => self
                .db
                .get_settings(&identity.key)
                .await?
                .ok_or_else(|| Error::not_found("settings", &identity.key)),
            Err(e) => Err(e.into()),
        }
    }

    /// Settings for an owner key. Unlike [`Self::get_or_create`] this never
    /// creates a record, since no email is known.
    pub async fn get_by_owner(&self, owner: &str) -> Result<UserSettings> {
        if let Some(settings) = self.cache.get(owner).await {
            return Ok(settings);
        }
        let settings = self
            .db
            .get_settings(owner)
            .await?
            .ok_or_else(|| Error::not_found("settings", owner))?;
        self.cache.insert(owner.to_string(), settings.clone()).await;
        Ok(settings)
    }

    /// Settings registered for a chat address (resource suffix ignored).
    ///
    /// Several users may claim the same address; a verified claim wins.
    pub async fn find_by_chat_address(&self, address: &str) -> Result<Option<UserSettings>> {
        let address = normalize_address(address);
        if address.is_empty() {
            return Ok(None);
        }
        let claims = self.db.list_settings_by_chat_address(&address).await?;
        Ok(claims.into_iter().next())
    }

    /// Apply a user update and persist it.
    pub async fn update(&self, identity: &Identity, update: &SettingsUpdate) -> Result<UserSettings> {
        let mut settings = self.get_or_create(identity).await?;
        settings.apply(update)?;
        self.db.update_settings(&settings).await?;
        self.cache.invalidate(&identity.key).await;
        debug!(owner = %identity.key, "Settings updated");
        Ok(settings)
    }

    /// Mark `owner`'s chat address verified if `api_key` matches exactly.
    /// Returns whether verification succeeded.
    pub async fn verify(&self, owner: &str, api_key: &str) -> Result<bool> {
        let settings = self
            .db
            .get_settings(owner)
            .await?
            .ok_or_else(|| Error::not_found("settings", owner))?;

        if !secrets_match(&settings.api_key, api_key) {
            warn!(owner = %owner, "Chat verification failed: api key mismatch");
            return Ok(false);
        }
        self.mark_verified(settings).await?;
        Ok(true)
    }

    /// Verify whichever claim on `address` holds `api_key`.
    ///
    /// The key is checked against every user claiming the address, so a user
    /// who set someone else's address cannot block the real owner. Returns the
    /// verified settings, or `None` if no claim matches.
    pub async fn verify_chat_address(
        &self,
        address: &str,
        api_key: &str,
    ) -> Result<Option<UserSettings>> {
        let address = normalize_address(address);
        let claims = self.db.list_settings_by_chat_address(&address).await?;
        let claimants = claims.len();

        match claims
            .into_iter()
            .find(|s| secrets_match(&s.api_key, api_key))
        {
            Some(settings) => Ok(Some(self.mark_verified(settings).await?)),
            None => {
                warn!(chat_address = %address, claimants, "Chat verification failed: api key mismatch");
                Ok(None)
            }
        }
    }

    async fn mark_verified(&self, mut settings: UserSettings) -> Result<UserSettings> {
        settings.verified = true;
        self.db.update_settings(&settings).await?;
        self.cache.invalidate(&settings.owner).await;
        info!(owner = %settings.owner, chat_address = %settings.chat_address, "Chat address verified");
        Ok(settings)
    }

    /// Drop any cached entry for `owner`.
    pub async fn invalidate(&self, owner: &str) {
        self.cache.invalidate(owner).await;
    }
}
