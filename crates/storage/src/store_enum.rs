//! Concrete store selection.
//!
//! [`Store`] wraps the three provider implementations in one enum so callers
//! can hold a store without generics or trait objects, and [`StoreKind`]
//! gives configuration files a serializable selector.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    env::EnvStore,
    error::StorageResult,
    memory::MemoryStore,
    provider::ConfigStore,
    remote::{KvClient, RemoteKvStore},
    retry::RetryPolicy,
    types::AppConfig,
};

/// Which provider a deployment uses. Serialized in lowercase
/// (`"memory"`, `"env"`, `"remote"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Process-local map; nothing persists.
    Memory,
    /// Read-only snapshot of environment variables.
    Env,
    /// Remote key-value service.
    Remote,
}

/// A concrete [`ConfigStore`], one of the built-in providers.
pub enum Store {
    /// See [`MemoryStore`].
    Memory(MemoryStore),
    /// See [`EnvStore`].
    Env(EnvStore),
    /// See [`RemoteKvStore`].
    Remote(RemoteKvStore),
}

impl Store {
    /// An empty in-memory store.
    #[must_use]
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    /// A snapshot of the current process environment.
    #[must_use]
    pub fn env() -> Self {
        Self::Env(EnvStore::from_env())
    }

    /// A remote store over the given transport client.
    #[must_use]
    pub fn remote(client: Arc<dyn KvClient>, retry: RetryPolicy) -> Self {
        Self::Remote(RemoteKvStore::new(client, retry))
    }

    /// The selector for this store's provider.
    #[must_use]
    pub fn kind(&self) -> StoreKind {
        match self {
            Self::Memory(_) => StoreKind::Memory,
            Self::Env(_) => StoreKind::Env,
            Self::Remote(_) => StoreKind::Remote,
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Store").field(&self.kind()).finish()
    }
}

#[async_trait]
impl ConfigStore for Store {
    async fn get_app_config(&self, app_id: &str) -> StorageResult<Option<AppConfig>> {
        match self {
            Self::Memory(s) => s.get_app_config(app_id).await,
            Self::Env(s) => s.get_app_config(app_id).await,
            Self::Remote(s) => s.get_app_config(app_id).await,
        }
    }

    async fn save_app_config(&self, config: &AppConfig) -> StorageResult<()> {
        match self {
            Self::Memory(s) => s.save_app_config(config).await,
            Self::Env(s) => s.save_app_config(config).await,
            Self::Remote(s) => s.save_app_config(config).await,
        }
    }

    async fn delete_app_config(&self, app_id: &str) -> StorageResult<()> {
        match self {
            Self::Memory(s) => s.delete_app_config(app_id).await,
            Self::Env(s) => s.delete_app_config(app_id).await,
            Self::Remote(s) => s.delete_app_config(app_id).await,
        }
    }

    async fn list_app_ids(&self) -> StorageResult<Vec<String>> {
        match self {
            Self::Memory(s) => s.list_app_ids().await,
            Self::Env(s) => s.list_app_ids().await,
            Self::Remote(s) => s.list_app_ids().await,
        }
    }

    async fn get_multiple(&self, app_ids: &[String]) -> StorageResult<HashMap<String, AppConfig>> {
        match self {
            Self::Memory(s) => s.get_multiple(app_ids).await,
            Self::Env(s) => s.get_multiple(app_ids).await,
            Self::Remote(s) => s.get_multiple(app_ids).await,
        }
    }

    async fn app_exists(&self, app_id: &str) -> StorageResult<bool> {
        match self {
            Self::Memory(s) => s.app_exists(app_id).await,
            Self::Env(s) => s.app_exists(app_id).await,
            Self::Remote(s) => s.app_exists(app_id).await,
        }
    }
}
