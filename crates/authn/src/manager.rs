//! Application and key lifecycle management.
//!
//! [`KeyManager`] is the single authority over [`AppConfig`] records: the
//! verification pipeline resolves keys through it, rotation mutates keys
//! through it, and the TTL cache sits inside it. Every mutation writes to the
//! store first, then refreshes the cache with the value just written, so a
//! writer immediately observes its own writes while other replicas converge
//! within one cache TTL.
//!
//! The one-key invariant lives here and only here: an app always retains at
//! least one key pair, and [`KeyManager::remove_key_pair`] is the sole place
//! that enforces it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use signet_storage::{AccessControlConfig, AppConfig, ConfigStore, KeyPair, SignatureAlgorithm};

use crate::access::{self, AccessDecision};
use crate::cache::{CacheStats, ConfigCache};
use crate::error::AuthError;

/// Key ID assumed when a request carries none.
pub const DEFAULT_KEY_ID: &str = "default";

/// Tuning knobs for the manager's configuration cache.
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct KeyManagerConfig {
    /// How long a cached app config may be served.
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    #[builder(default = default_cache_ttl())]
    pub cache_ttl: Duration,

    /// Maximum number of cached app configs.
    #[serde(default = "default_cache_capacity")]
    #[builder(default = default_cache_capacity())]
    pub cache_capacity: u64,
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_cache_capacity() -> u64 {
    10_000
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self { cache_ttl: default_cache_ttl(), cache_capacity: default_cache_capacity() }
    }
}

/// A key selected for verification: the public half plus what the verifier
/// needs to use it.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedKey {
    /// The key that was selected.
    pub key_id: String,
    /// Algorithm the signature must use.
    pub algorithm: SignatureAlgorithm,
    /// PEM-encoded public key.
    pub public_key: String,
}

/// Partial update for mutable app-level fields.
///
/// `app_id`, `created_at` and the key list are deliberately absent: identity
/// is immutable and key mutations have dedicated operations with their own
/// invariants.
#[derive(Clone, Debug, Default, bon::Builder)]
pub struct AppConfigUpdate {
    /// New display name.
    pub name: Option<String>,
    /// Enable or disable the app.
    pub enabled: Option<bool>,
    /// Replacement permission list.
    pub permissions: Option<Vec<String>>,
    /// Replacement access control block.
    pub access_control: Option<AccessControlConfig>,
    /// When `true`, removes the access control block entirely.
    /// Takes precedence over `access_control`.
    #[builder(default)]
    pub clear_access_control: bool,
}

/// Cached, mutation-safe facade over a [`ConfigStore`].
pub struct KeyManager {
    store: Arc<dyn ConfigStore>,
    cache: ConfigCache,
}

impl KeyManager {
    /// Creates a manager over `store`.
    pub fn new(store: Arc<dyn ConfigStore>, config: KeyManagerConfig) -> Self {
        Self { store, cache: ConfigCache::new(config.cache_ttl, config.cache_capacity) }
    }

    /// Creates a manager with default cache settings.
    pub fn with_defaults(store: Arc<dyn ConfigStore>) -> Self {
        Self::new(store, KeyManagerConfig::default())
    }

    /// Loads an app's configuration, cache-first.
    ///
    /// Absent apps return `Ok(None)` and are not negatively cached; an app
    /// registered elsewhere becomes visible on the very next lookup.
    #[tracing::instrument(skip(self))]
    pub async fn get_app_config(&self, app_id: &str) -> Result<Option<Arc<AppConfig>>, AuthError> {
        if let Some(cached) = self.cache.get(app_id).await {
            return Ok(Some(cached));
        }
        match self.store.get_app_config(app_id).await? {
            Some(config) => {
                let config = Arc::new(config);
                self.cache.insert(config.clone()).await;
                Ok(Some(config))
            },
            None => Ok(None),
        }
    }

    /// Returns `true` if the app exists and is enabled.
    pub async fn validate_app(&self, app_id: &str) -> Result<bool, AuthError> {
        Ok(self.get_app_config(app_id).await?.is_some_and(|c| c.enabled))
    }

    /// Resolves the public key to verify a request with.
    ///
    /// Resolution is exact by key ID, defaulting to the literal ID
    /// `"default"` when the caller sent none. Failures name the key's state
    /// ([`AuthError::KeyNotFound`], [`AuthError::KeyDisabled`],
    /// [`AuthError::KeyExpired`]); the available key IDs go to the log, not
    /// the error, so an unauthenticated caller learns nothing from probing.
    #[tracing::instrument(skip(self))]
    pub async fn get_public_key(
        &self,
        app_id: &str,
        key_id: Option<&str>,
    ) -> Result<ResolvedKey, AuthError> {
        let config = self
            .get_app_config(app_id)
            .await?
            .ok_or_else(|| AuthError::AppInvalid { app_id: app_id.to_owned() })?;
        if !config.enabled {
            return Err(AuthError::AppInvalid { app_id: app_id.to_owned() });
        }

        let kid = key_id.unwrap_or(DEFAULT_KEY_ID);
        let Some(key) = config.find_key(kid) else {
            tracing::debug!(requested = %kid, available = ?config.key_ids(), "key not found");
            return Err(AuthError::KeyNotFound { kid: kid.to_owned() });
        };
        if !key.enabled {
            return Err(AuthError::KeyDisabled { kid: kid.to_owned() });
        }
        if key.is_expired(Utc::now()) {
            return Err(AuthError::KeyExpired { kid: kid.to_owned() });
        }

        Ok(ResolvedKey {
            key_id: key.key_id.clone(),
            algorithm: key.algorithm,
            public_key: key.public_key.clone(),
        })
    }

    /// All key pairs of an app that may verify signatures right now.
    pub async fn get_valid_key_pairs(&self, app_id: &str) -> Result<Vec<KeyPair>, AuthError> {
        let config = self
            .get_app_config(app_id)
            .await?
            .ok_or_else(|| AuthError::AppNotFound { app_id: app_id.to_owned() })?;
        let now = Utc::now();
        Ok(config.valid_keys(now).into_iter().cloned().collect())
    }

    /// Registers a new app.
    ///
    /// # Errors
    ///
    /// [`AuthError::Validation`] if the app already exists, has no key pairs,
    /// or has duplicate key IDs.
    #[tracing::instrument(skip(self, config), fields(app_id = %config.app_id))]
    pub async fn add_app(&self, config: AppConfig) -> Result<(), AuthError> {
        validate_key_set(&config.key_pairs)?;
        if config.app_id.is_empty() {
            return Err(AuthError::Validation("app_id must not be empty".to_owned()));
        }
        if self.store.app_exists(&config.app_id).await? {
            return Err(AuthError::Validation(format!(
                "app '{}' is already registered",
                config.app_id
            )));
        }
        self.store.save_app_config(&config).await?;
        let config = Arc::new(config);
        tracing::info!(
            audit.action = "app_add",
            audit.resource = %config.app_id,
            audit.result = "success",
            keys = config.key_pairs.len(),
            "app registered",
        );
        self.cache.insert(config).await;
        Ok(())
    }

    /// Applies a partial update to app-level fields.
    ///
    /// Returns the updated record. Fails with [`AuthError::AppNotFound`] for
    /// unregistered apps.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_app(
        &self,
        app_id: &str,
        update: AppConfigUpdate,
    ) -> Result<Arc<AppConfig>, AuthError> {
        self.mutate(app_id, |config| {
            if let Some(name) = update.name {
                config.name = name;
            }
            if let Some(enabled) = update.enabled {
                config.enabled = enabled;
            }
            if let Some(permissions) = update.permissions {
                config.permissions = permissions;
            }
            if update.clear_access_control {
                config.access_control = None;
            } else if let Some(access_control) = update.access_control {
                config.access_control = Some(access_control);
            }
            Ok(())
        })
        .await
    }

    /// Unregisters an app and drops its cache entry.
    ///
    /// Idempotent, mirroring the store contract.
    #[tracing::instrument(skip(self))]
    pub async fn remove_app(&self, app_id: &str) -> Result<(), AuthError> {
        self.store.delete_app_config(app_id).await?;
        self.cache.invalidate(app_id).await;
        tracing::info!(
            audit.action = "app_remove",
            audit.resource = %app_id,
            audit.result = "success",
            "app unregistered",
        );
        Ok(())
    }

    /// Enables or disables an app.
    pub async fn set_app_enabled(&self, app_id: &str, enabled: bool) -> Result<(), AuthError> {
        self.mutate(app_id, |config| {
            config.enabled = enabled;
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Adds a key pair to an existing app.
    ///
    /// # Errors
    ///
    /// [`AuthError::Validation`] if the key ID is already taken.
    #[tracing::instrument(skip(self, key), fields(key_id = %key.key_id))]
    pub async fn add_key_pair(&self, app_id: &str, key: KeyPair) -> Result<(), AuthError> {
        self.mutate(app_id, |config| {
            if config.find_key(&key.key_id).is_some() {
                return Err(AuthError::Validation(format!(
                    "key '{}' already exists for app '{app_id}'",
                    key.key_id
                )));
            }
            config.key_pairs.push(key);
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Replaces an existing key pair wholesale, matched by `key.key_id`.
    pub async fn update_key_pair(&self, app_id: &str, key: KeyPair) -> Result<(), AuthError> {
        self.mutate(app_id, |config| {
            let existing = config
                .find_key_mut(&key.key_id)
                .ok_or_else(|| AuthError::KeyNotFound { kid: key.key_id.clone() })?;
            *existing = key;
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Removes a key pair.
    ///
    /// # Errors
    ///
    /// [`AuthError::KeyNotFound`] for an unknown key ID, and
    /// [`AuthError::Validation`] when the key is the app's last one: an app
    /// with zero keys could never authenticate again, so that state is
    /// unrepresentable through this API.
    #[tracing::instrument(skip(self))]
    pub async fn remove_key_pair(&self, app_id: &str, key_id: &str) -> Result<(), AuthError> {
        self.mutate(app_id, |config| {
            if config.find_key(key_id).is_none() {
                return Err(AuthError::KeyNotFound { kid: key_id.to_owned() });
            }
            if config.key_pairs.len() == 1 {
                return Err(AuthError::Validation(format!(
                    "cannot remove the last key pair of app '{app_id}'"
                )));
            }
            config.key_pairs.retain(|k| k.key_id != key_id);
            Ok(())
        })
        .await?;
        tracing::info!(
            audit.action = "key_remove",
            audit.resource = %format!("{app_id}/{key_id}"),
            audit.result = "success",
            "key pair removed",
        );
        Ok(())
    }

    /// Enables or disables a single key pair.
    pub async fn set_key_pair_enabled(
        &self,
        app_id: &str,
        key_id: &str,
        enabled: bool,
    ) -> Result<(), AuthError> {
        self.mutate(app_id, |config| {
            let key = config
                .find_key_mut(key_id)
                .ok_or_else(|| AuthError::KeyNotFound { kid: key_id.to_owned() })?;
            key.enabled = enabled;
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Evaluates access rules for an authenticated request.
    pub async fn validate_access(
        &self,
        app_id: &str,
        path: &str,
        method: &str,
        client_ip: Option<&str>,
    ) -> Result<AccessDecision, AuthError> {
        let config = self
            .get_app_config(app_id)
            .await?
            .ok_or_else(|| AuthError::AppInvalid { app_id: app_id.to_owned() })?;
        Ok(access::evaluate(config.access_control.as_ref(), path, method, client_ip))
    }

    /// Lists all registered app IDs straight from the store.
    pub async fn list_apps(&self) -> Result<Vec<String>, AuthError> {
        Ok(self.store.list_app_ids().await?)
    }

    /// Bulk-loads several apps, priming the cache with each.
    ///
    /// Missing IDs are absent from the result, matching the store contract.
    pub async fn get_app_configs(
        &self,
        app_ids: &[String],
    ) -> Result<HashMap<String, Arc<AppConfig>>, AuthError> {
        let loaded = self.store.get_multiple(app_ids).await?;
        let mut result = HashMap::with_capacity(loaded.len());
        for (app_id, config) in loaded {
            let config = Arc::new(config);
            self.cache.insert(config.clone()).await;
            result.insert(app_id, config);
        }
        Ok(result)
    }

    /// Drops one app's cache entry, forcing the next read to hit the store.
    pub async fn invalidate(&self, app_id: &str) {
        self.cache.invalidate(app_id).await;
    }

    /// Drops the whole cache.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Cache statistics snapshot.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Loads, mutates, persists, and re-caches one app record.
    async fn mutate<F>(&self, app_id: &str, op: F) -> Result<Arc<AppConfig>, AuthError>
    where
        F: FnOnce(&mut AppConfig) -> Result<(), AuthError>,
    {
        let mut config = self
            .store
            .get_app_config(app_id)
            .await?
            .ok_or_else(|| AuthError::AppNotFound { app_id: app_id.to_owned() })?;
        op(&mut config)?;
        config.touch();
        self.store.save_app_config(&config).await?;
        let config = Arc::new(config);
        self.cache.insert(config.clone()).await;
        Ok(config)
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager").field("cache", &self.cache).finish()
    }
}

fn validate_key_set(keys: &[KeyPair]) -> Result<(), AuthError> {
    if keys.is_empty() {
        return Err(AuthError::Validation("an app needs at least one key pair".to_owned()));
    }
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key.key_id.as_str()) {
            return Err(AuthError::Validation(format!("duplicate key id '{}'", key.key_id)));
        }
    }
    Ok(())
}
