//! Remote key-value configuration store.
//!
//! Persists [`AppConfig`] records as JSON documents in an external key-value
//! service reached through the [`KvClient`] trait. Every client call is
//! wrapped in the shared retry policy, so transient transport failures are
//! absorbed here rather than surfacing to the verification path.
//!
//! # Key layout
//!
//! ```text
//! signet/app/<appId>   one JSON AppConfig record
//! signet/apps          JSON array of registered app IDs
//! ```
//!
//! The explicit index exists because plain KV services cannot be assumed to
//! support prefix scans. It is maintained with read-modify-write, which is
//! safe under the deployment assumption that provisioning runs through a
//! single management process; concurrent provisioners would need a
//! conditional-write client.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::{StorageError, StorageResult},
    provider::ConfigStore,
    retry::{RetryPolicy, with_retry},
    types::AppConfig,
};

/// Storage key prefix for app records.
pub const APP_KEY_PREFIX: &str = "signet/app/";

/// Storage key of the app-ID index.
pub const APP_INDEX_KEY: &str = "signet/apps";

/// Minimal transport boundary to the external key-value service.
///
/// Implementations adapt a concrete SDK (consul, etcd, a REST service) and
/// map its failures onto [`StorageError`]; network-ish failures should map to
/// [`StorageError::Connection`] or [`StorageError::Timeout`] so the retry
/// layer can classify them.
#[async_trait]
pub trait KvClient: Send + Sync {
    /// Reads the value at `key`, or `None` if the key does not exist.
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Writes `value` at `key`, creating or replacing it.
    async fn put(&self, key: &str, value: Bytes) -> StorageResult<()>;

    /// Deletes `key`. Deleting a missing key is a no-op.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// [`ConfigStore`] backed by a remote key-value service.
pub struct RemoteKvStore {
    client: Arc<dyn KvClient>,
    retry: RetryPolicy,
}

impl RemoteKvStore {
    /// Creates a store over `client` with the given retry policy.
    pub fn new(client: Arc<dyn KvClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    fn app_key(app_id: &str) -> String {
        format!("{APP_KEY_PREFIX}{app_id}")
    }

    async fn read_index(&self) -> StorageResult<Vec<String>> {
        let raw = with_retry(&self.retry, "kv_get_index", || self.client.get(APP_INDEX_KEY)).await?;
        match raw {
            None => Ok(Vec::new()),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                StorageError::serialization_with_source("app index is not a JSON string array", err)
            }),
        }
    }

    async fn write_index(&self, ids: &[String]) -> StorageResult<()> {
        let encoded = serde_json::to_vec(ids).map_err(|err| {
            StorageError::serialization_with_source("failed to encode app index", err)
        })?;
        let payload = Bytes::from(encoded);
        with_retry(&self.retry, "kv_put_index", || {
            self.client.put(APP_INDEX_KEY, payload.clone())
        })
        .await
    }
}

#[async_trait]
impl ConfigStore for RemoteKvStore {
    #[tracing::instrument(skip(self))]
    async fn get_app_config(&self, app_id: &str) -> StorageResult<Option<AppConfig>> {
        let key = Self::app_key(app_id);
        let raw = with_retry(&self.retry, "kv_get_app", || self.client.get(&key)).await?;
        match raw {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|err| {
                StorageError::serialization_with_source(
                    format!("stored record for app '{app_id}' is not a valid AppConfig"),
                    err,
                )
            }),
        }
    }

    #[tracing::instrument(skip(self, config), fields(app_id = %config.app_id))]
    async fn save_app_config(&self, config: &AppConfig) -> StorageResult<()> {
        let encoded = serde_json::to_vec(config).map_err(|err| {
            StorageError::serialization_with_source(
                format!("failed to encode app '{}'", config.app_id),
                err,
            )
        })?;
        let key = Self::app_key(&config.app_id);
        let payload = Bytes::from(encoded);
        with_retry(&self.retry, "kv_put_app", || self.client.put(&key, payload.clone())).await?;

        let mut index = self.read_index().await?;
        if !index.contains(&config.app_id) {
            index.push(config.app_id.clone());
            self.write_index(&index).await?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_app_config(&self, app_id: &str) -> StorageResult<()> {
        let key = Self::app_key(app_id);
        with_retry(&self.retry, "kv_delete_app", || self.client.delete(&key)).await?;

        let mut index = self.read_index().await?;
        if let Some(pos) = index.iter().position(|id| id == app_id) {
            index.remove(pos);
            self.write_index(&index).await?;
        }
        Ok(())
    }

    async fn list_app_ids(&self) -> StorageResult<Vec<String>> {
        self.read_index().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::types::{KeyPair, SignatureAlgorithm};

    /// Map-backed fake client that can fail the first N calls transiently.
    #[derive(Default)]
    struct FakeKv {
        data: Mutex<BTreeMap<String, Bytes>>,
        failures_remaining: AtomicU32,
        calls: AtomicU32,
    }

    impl FakeKv {
        fn failing(n: u32) -> Self {
            let kv = Self::default();
            kv.failures_remaining.store(n, Ordering::SeqCst);
            kv
        }

        fn maybe_fail(&self) -> StorageResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(StorageError::connection("kv unavailable"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl KvClient for FakeKv {
        async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
            self.maybe_fail()?;
            Ok(self.data.lock().get(key).cloned())
        }

        async fn put(&self, key: &str, value: Bytes) -> StorageResult<()> {
            self.maybe_fail()?;
            self.data.lock().insert(key.to_owned(), value);
            Ok(())
        }

        async fn delete(&self, key: &str) -> StorageResult<()> {
            self.maybe_fail()?;
            self.data.lock().remove(key);
            Ok(())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(3)
            .initial_backoff(std::time::Duration::from_millis(1))
            .max_backoff(std::time::Duration::from_millis(2))
            .build()
    }

    fn app(app_id: &str) -> AppConfig {
        AppConfig::builder()
            .app_id(app_id)
            .name(format!("App {app_id}"))
            .key_pairs(vec![KeyPair::builder()
                .key_id("k1")
                .public_key("-----BEGIN PUBLIC KEY-----\n".to_owned())
                .algorithm(SignatureAlgorithm::Rs256)
                .build()])
            .build()
    }

    #[tokio::test]
    async fn test_save_get_roundtrip_and_index() {
        let client = Arc::new(FakeKv::default());
        let store = RemoteKvStore::new(client.clone(), fast_retry());

        store.save_app_config(&app("acme")).await.unwrap();
        store.save_app_config(&app("beta")).await.unwrap();

        let loaded = store.get_app_config("acme").await.unwrap().unwrap();
        assert_eq!(loaded.app_id, "acme");
        assert_eq!(store.list_app_ids().await.unwrap(), vec!["acme", "beta"]);

        // Records land under the documented key layout.
        let data = client.data.lock();
        assert!(data.contains_key("signet/app/acme"));
        assert!(data.contains_key("signet/apps"));
    }

    #[tokio::test]
    async fn test_resave_does_not_duplicate_index_entry() {
        let store = RemoteKvStore::new(Arc::new(FakeKv::default()), fast_retry());
        store.save_app_config(&app("acme")).await.unwrap();
        store.save_app_config(&app("acme")).await.unwrap();
        assert_eq!(store.list_app_ids().await.unwrap(), vec!["acme"]);
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_index_entry() {
        let store = RemoteKvStore::new(Arc::new(FakeKv::default()), fast_retry());
        store.save_app_config(&app("acme")).await.unwrap();
        store.save_app_config(&app("beta")).await.unwrap();

        store.delete_app_config("acme").await.unwrap();
        assert!(store.get_app_config("acme").await.unwrap().is_none());
        assert_eq!(store.list_app_ids().await.unwrap(), vec!["beta"]);

        // Deleting again is a no-op.
        store.delete_app_config("acme").await.unwrap();
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let client = Arc::new(FakeKv::failing(2));
        let store = RemoteKvStore::new(client.clone(), fast_retry());

        // First two calls fail with a connection error, third succeeds.
        assert!(store.get_app_config("acme").await.unwrap().is_none());
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_surface_transport_error() {
        let client = Arc::new(FakeKv::failing(10));
        let store = RemoteKvStore::new(client, fast_retry());

        let result = store.get_app_config("acme").await;
        assert!(matches!(result, Err(StorageError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_serialization_error() {
        let client = Arc::new(FakeKv::default());
        client.data.lock().insert("signet/app/acme".to_owned(), Bytes::from_static(b"not json"));
        let store = RemoteKvStore::new(client, fast_retry());

        let result = store.get_app_config("acme").await;
        assert!(matches!(result, Err(StorageError::Serialization { .. })));
    }

    #[tokio::test]
    async fn test_missing_index_reads_as_empty() {
        let store = RemoteKvStore::new(Arc::new(FakeKv::default()), fast_retry());
        assert!(store.list_app_ids().await.unwrap().is_empty());
    }
}
