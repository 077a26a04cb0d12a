//! In-memory configuration store.
//!
//! Intended for tests and local development. All records live in a
//! process-local map guarded by a [`parking_lot::RwLock`]; nothing survives
//! restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    error::StorageResult,
    provider::ConfigStore,
    types::AppConfig,
};

/// In-memory [`ConfigStore`] implementation.
///
/// Cloning is cheap and all clones share the same underlying map, so a store
/// can be handed to several components in a test.
///
/// # Example
///
/// ```
/// use signet_storage::{AppConfig, ConfigStore, KeyPair, MemoryStore, SignatureAlgorithm};
///
/// # async fn demo() -> signet_storage::StorageResult<()> {
/// let store = MemoryStore::new();
/// let app = AppConfig::builder()
///     .app_id("acme")
///     .name("Acme")
///     .key_pairs(vec![KeyPair::builder()
///         .key_id("k1")
///         .public_key("-----BEGIN PUBLIC KEY-----\n".to_owned())
///         .algorithm(SignatureAlgorithm::Rs256)
///         .build()])
///     .build();
/// store.save_app_config(&app).await?;
/// assert!(store.app_exists("acme").await?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    // BTreeMap keeps list_app_ids deterministic, which test assertions rely on.
    apps: Arc<RwLock<BTreeMap<String, AppConfig>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered apps. Test helper, but harmless in production.
    #[must_use]
    pub fn len(&self) -> usize {
        self.apps.read().len()
    }

    /// Returns `true` if no apps are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apps.read().is_empty()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get_app_config(&self, app_id: &str) -> StorageResult<Option<AppConfig>> {
        Ok(self.apps.read().get(app_id).cloned())
    }

    async fn save_app_config(&self, config: &AppConfig) -> StorageResult<()> {
        self.apps.write().insert(config.app_id.clone(), config.clone());
        Ok(())
    }

    async fn delete_app_config(&self, app_id: &str) -> StorageResult<()> {
        self.apps.write().remove(app_id);
        Ok(())
    }

    async fn list_app_ids(&self) -> StorageResult<Vec<String>> {
        Ok(self.apps.read().keys().cloned().collect())
    }

    async fn get_multiple(&self, app_ids: &[String]) -> StorageResult<HashMap<String, AppConfig>> {
        let apps = self.apps.read();
        Ok(app_ids
            .iter()
            .filter_map(|id| apps.get(id).map(|c| (id.clone(), c.clone())))
            .collect())
    }

    async fn app_exists(&self, app_id: &str) -> StorageResult<bool> {
        Ok(self.apps.read().contains_key(app_id))
    }
}
