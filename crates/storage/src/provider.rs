//! Storage trait for application configuration records.
//!
//! This module provides the [`ConfigStore`] trait that abstracts persistence
//! of [`AppConfig`] records. Implementations can use different backends:
//! in-memory for testing, environment variables for static deployments, and
//! a remote key-value service for production.
//!
//! # Usage
//!
//! ```no_run
//! // Demonstrates the trait interface; requires a concrete store implementation.
//! use signet_storage::{AppConfig, ConfigStore, StorageResult};
//!
//! async fn lookup<S: ConfigStore>(store: &S, app_id: &str) -> StorageResult<bool> {
//!     Ok(store.get_app_config(app_id).await?.is_some())
//! }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;

use crate::{error::StorageResult, types::AppConfig};

/// Persistence layer for application configuration records.
///
/// # Identity
///
/// Records are keyed by `AppConfig::app_id`. How that maps onto the backend's
/// own key space is an implementation detail (the remote provider prefixes
/// IDs, the memory provider uses them directly).
///
/// # Error Handling
///
/// Operations return [`StorageResult`]. A missing record is `Ok(None)`, never
/// an error: absence is an answer, not a failure. Implementations should
/// provide retry logic for transient failures where appropriate.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Retrieves the configuration for one application.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(config))` if the app is registered
    /// - `Ok(None)` if it is not
    /// - `Err(...)` on storage errors
    async fn get_app_config(&self, app_id: &str) -> StorageResult<Option<AppConfig>>;

    /// Creates or replaces the configuration for `config.app_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadOnly`](crate::StorageError::ReadOnly) from
    /// snapshot providers, or a transport error from remote ones.
    async fn save_app_config(&self, config: &AppConfig) -> StorageResult<()>;

    /// Deletes the configuration for one application.
    ///
    /// Deleting an unregistered app is a no-op, mirroring the `Ok(None)`
    /// convention on reads.
    async fn delete_app_config(&self, app_id: &str) -> StorageResult<()>;

    /// Lists every registered application ID.
    ///
    /// Order is unspecified; callers that need determinism sort.
    async fn list_app_ids(&self) -> StorageResult<Vec<String>>;

    /// Retrieves several configurations in one call.
    ///
    /// Missing IDs are absent from the result map rather than errors, and so
    /// are IDs whose individual lookup failed: one bad record must not sink
    /// the whole batch. Per-id failures are logged. The default
    /// implementation loops over [`get_app_config`]; backends with a native
    /// bulk read should override it.
    ///
    /// [`get_app_config`]: ConfigStore::get_app_config
    async fn get_multiple(&self, app_ids: &[String]) -> StorageResult<HashMap<String, AppConfig>> {
        let mut found = HashMap::with_capacity(app_ids.len());
        for app_id in app_ids {
            match self.get_app_config(app_id).await {
                Ok(Some(config)) => {
                    found.insert(app_id.clone(), config);
                },
                Ok(None) => {},
                Err(err) => {
                    tracing::warn!(app_id, error = %err, "skipping app in bulk read");
                },
            }
        }
        Ok(found)
    }

    /// Returns `true` if the app is registered.
    ///
    /// The default implementation fetches the full record; backends with a
    /// cheaper existence probe should override it.
    async fn app_exists(&self, app_id: &str) -> StorageResult<bool> {
        Ok(self.get_app_config(app_id).await?.is_some())
    }
}
