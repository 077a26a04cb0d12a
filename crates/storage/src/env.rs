//! Environment-variable configuration store.
//!
//! A read-only provider that parses application records out of process
//! environment variables once, at construction. Useful for container
//! deployments where configuration is injected by the orchestrator and never
//! changes at runtime.
//!
//! # Variable convention
//!
//! App-level variables (`<ID>` is the app ID, uppercased):
//!
//! ```text
//! APP_<ID>_NAME          display name (required)
//! APP_<ID>_ENABLED       "true"/"false", default true
//! APP_<ID>_PERMISSIONS   comma-separated permission strings
//! ```
//!
//! Key-level variables (`<KID>` is the key ID, uppercased):
//!
//! ```text
//! APP_<ID>_KEY_<KID>_PUBLIC_KEY   PEM, literal "\n" unescaped (required)
//! APP_<ID>_KEY_<KID>_ALGORITHM    RS256 | RS512 | ES256 | ES512 (required)
//! APP_<ID>_KEY_<KID>_ENABLED      "true"/"false", default true
//! APP_<ID>_KEY_<KID>_EXPIRES_AT   RFC 3339 timestamp
//! ```
//!
//! App and key IDs are lowercased when records are built, so `APP_ACME_...`
//! yields app ID `acme`. IDs therefore must not contain the substring `_KEY_`
//! and cannot distinguish case. Malformed entries are skipped with a warning
//! rather than failing the whole snapshot; an app whose keys all fail to
//! parse is dropped because a record with no keys can never verify anything.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::{StorageError, StorageResult},
    provider::ConfigStore,
    types::{AppConfig, KeyPair, SignatureAlgorithm},
};

const VAR_PREFIX: &str = "APP_";
const KEY_MARKER: &str = "_KEY_";

/// Read-only [`ConfigStore`] backed by an environment snapshot.
///
/// All mutation methods return [`StorageError::ReadOnly`].
#[derive(Debug, Clone)]
pub struct EnvStore {
    apps: BTreeMap<String, AppConfig>,
}

/// Intermediate per-key fields collected during the variable scan.
#[derive(Debug, Default)]
struct RawKey {
    public_key: Option<String>,
    algorithm: Option<String>,
    enabled: Option<String>,
    expires_at: Option<String>,
}

/// Intermediate per-app fields collected during the variable scan.
#[derive(Debug, Default)]
struct RawApp {
    name: Option<String>,
    enabled: Option<String>,
    permissions: Option<String>,
    keys: BTreeMap<String, RawKey>,
}

impl EnvStore {
    /// Builds a snapshot from the current process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Builds a snapshot from an explicit variable list.
    ///
    /// Exists so tests can exercise the parser without mutating the process
    /// environment, which is unsafe under a multi-threaded test runner.
    #[must_use]
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let created_at = Utc::now();
        let mut raw: BTreeMap<String, RawApp> = BTreeMap::new();

        for (name, value) in vars {
            let Some(rest) = name.strip_prefix(VAR_PREFIX) else {
                continue;
            };
            if let Some((app_part, key_rest)) = rest.split_once(KEY_MARKER) {
                let entry = raw.entry(app_part.to_lowercase()).or_default();
                let Some((kid, field)) = split_key_field(key_rest) else {
                    tracing::warn!(var = %name, "unrecognized key-level variable, skipping");
                    continue;
                };
                let key = entry.keys.entry(kid.to_lowercase()).or_default();
                match field {
                    KeyField::PublicKey => key.public_key = Some(value),
                    KeyField::Algorithm => key.algorithm = Some(value),
                    KeyField::Enabled => key.enabled = Some(value),
                    KeyField::ExpiresAt => key.expires_at = Some(value),
                }
            } else if let Some(app_part) = rest.strip_suffix("_NAME") {
                raw.entry(app_part.to_lowercase()).or_default().name = Some(value);
            } else if let Some(app_part) = rest.strip_suffix("_ENABLED") {
                raw.entry(app_part.to_lowercase()).or_default().enabled = Some(value);
            } else if let Some(app_part) = rest.strip_suffix("_PERMISSIONS") {
                raw.entry(app_part.to_lowercase()).or_default().permissions = Some(value);
            }
            // Anything else under APP_ is not ours (e.g. APP_VERSION); ignore.
        }

        let mut apps = BTreeMap::new();
        for (app_id, raw_app) in raw {
            match build_app(&app_id, raw_app, created_at) {
                Some(config) => {
                    apps.insert(app_id, config);
                },
                None => {
                    tracing::warn!(app_id = %app_id, "incomplete app definition in environment, skipping");
                },
            }
        }

        tracing::debug!(apps = apps.len(), "environment configuration snapshot loaded");
        Self { apps }
    }

    /// Number of apps in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Returns `true` if the snapshot holds no apps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

enum KeyField {
    PublicKey,
    Algorithm,
    Enabled,
    ExpiresAt,
}

/// Splits `<KID>_<FIELD>` into the key ID and a recognized field name.
///
/// Matched longest-suffix-first so `..._PUBLIC_KEY` is not misread as a key
/// named `..._PUBLIC` with field `KEY`.
fn split_key_field(rest: &str) -> Option<(&str, KeyField)> {
    if let Some(kid) = rest.strip_suffix("_PUBLIC_KEY") {
        return Some((kid, KeyField::PublicKey));
    }
    if let Some(kid) = rest.strip_suffix("_EXPIRES_AT") {
        return Some((kid, KeyField::ExpiresAt));
    }
    if let Some(kid) = rest.strip_suffix("_ALGORITHM") {
        return Some((kid, KeyField::Algorithm));
    }
    if let Some(kid) = rest.strip_suffix("_ENABLED") {
        return Some((kid, KeyField::Enabled));
    }
    None
}

fn parse_enabled(app_id: &str, raw: Option<&str>) -> bool {
    match raw {
        None => true,
        Some(v) => match v.trim().to_ascii_lowercase().parse::<bool>() {
            Ok(b) => b,
            Err(_) => {
                tracing::warn!(app_id = %app_id, value = %v, "unparseable ENABLED flag, defaulting to true");
                true
            },
        },
    }
}

fn build_key(app_id: &str, kid: &str, raw: RawKey, created_at: DateTime<Utc>) -> Option<KeyPair> {
    let (Some(public_key), Some(algorithm)) = (raw.public_key, raw.algorithm) else {
        tracing::warn!(app_id = %app_id, key_id = %kid, "key missing PUBLIC_KEY or ALGORITHM, skipping");
        return None;
    };
    let algorithm: SignatureAlgorithm = match algorithm.trim().parse() {
        Ok(alg) => alg,
        Err(err) => {
            tracing::warn!(app_id = %app_id, key_id = %kid, error = %err, "skipping key");
            return None;
        },
    };
    let expires_at = match raw.expires_at {
        None => None,
        Some(v) => match DateTime::parse_from_rfc3339(v.trim()) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(err) => {
                // A bad expiry must not widen the validity window.
                tracing::warn!(app_id = %app_id, key_id = %kid, error = %err, "unparseable EXPIRES_AT, skipping key");
                return None;
            },
        },
    };

    Some(
        KeyPair::builder()
            .key_id(kid)
            // Orchestrators often only allow literal "\n" in PEM values.
            .public_key(public_key.replace("\\n", "\n"))
            .algorithm(algorithm)
            .created_at(created_at)
            .maybe_expires_at(expires_at)
            .enabled(parse_enabled(app_id, raw.enabled.as_deref()))
            .build(),
    )
}

fn build_app(app_id: &str, raw: RawApp, created_at: DateTime<Utc>) -> Option<AppConfig> {
    let name = raw.name?;
    let enabled = parse_enabled(app_id, raw.enabled.as_deref());
    let permissions = raw
        .permissions
        .map(|p| {
            p.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned).collect()
        })
        .unwrap_or_default();

    let key_pairs: Vec<KeyPair> = raw
        .keys
        .into_iter()
        .filter_map(|(kid, raw_key)| build_key(app_id, &kid, raw_key, created_at))
        .collect();
    if key_pairs.is_empty() {
        return None;
    }

    Some(
        AppConfig::builder()
            .app_id(app_id)
            .name(name)
            .key_pairs(key_pairs)
            .enabled(enabled)
            .permissions(permissions)
            .created_at(created_at)
            .updated_at(created_at)
            .build(),
    )
}

#[async_trait]
impl ConfigStore for EnvStore {
    async fn get_app_config(&self, app_id: &str) -> StorageResult<Option<AppConfig>> {
        Ok(self.apps.get(app_id).cloned())
    }

    async fn save_app_config(&self, _config: &AppConfig) -> StorageResult<()> {
        Err(StorageError::read_only("save_app_config"))
    }

    async fn delete_app_config(&self, _app_id: &str) -> StorageResult<()> {
        Err(StorageError::read_only("delete_app_config"))
    }

    async fn list_app_ids(&self) -> StorageResult<Vec<String>> {
        Ok(self.apps.keys().cloned().collect())
    }

    async fn get_multiple(&self, app_ids: &[String]) -> StorageResult<HashMap<String, AppConfig>> {
        Ok(app_ids
            .iter()
            .filter_map(|id| self.apps.get(id).map(|c| (id.clone(), c.clone())))
            .collect())
    }

    async fn app_exists(&self, app_id: &str) -> StorageResult<bool> {
        Ok(self.apps.contains_key(app_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    fn acme_vars() -> Vec<(String, String)> {
        vars(&[
            ("APP_ACME_NAME", "Acme Integration"),
            ("APP_ACME_PERMISSIONS", "read, write"),
            ("APP_ACME_KEY_K1_PUBLIC_KEY", "-----BEGIN PUBLIC KEY-----\\nAAAA\\n-----END PUBLIC KEY-----"),
            ("APP_ACME_KEY_K1_ALGORITHM", "RS256"),
        ])
    }

    #[tokio::test]
    async fn test_parses_complete_app() {
        let store = EnvStore::from_vars(acme_vars());
        let app = store.get_app_config("acme").await.unwrap().unwrap();

        assert_eq!(app.app_id, "acme");
        assert_eq!(app.name, "Acme Integration");
        assert!(app.enabled);
        assert_eq!(app.permissions, vec!["read", "write"]);
        assert_eq!(app.key_pairs.len(), 1);

        let key = &app.key_pairs[0];
        assert_eq!(key.key_id, "k1");
        assert_eq!(key.algorithm, SignatureAlgorithm::Rs256);
        // Literal "\n" sequences become real newlines.
        assert!(key.public_key.contains("-----BEGIN PUBLIC KEY-----\nAAAA\n"));
    }

    #[tokio::test]
    async fn test_multiple_apps_and_keys() {
        let mut v = acme_vars();
        v.extend(vars(&[
            ("APP_ACME_KEY_K2_PUBLIC_KEY", "pem2"),
            ("APP_ACME_KEY_K2_ALGORITHM", "ES256"),
            ("APP_ACME_KEY_K2_ENABLED", "false"),
            ("APP_BETA_NAME", "Beta"),
            ("APP_BETA_ENABLED", "false"),
            ("APP_BETA_KEY_MAIN_PUBLIC_KEY", "pem3"),
            ("APP_BETA_KEY_MAIN_ALGORITHM", "ES512"),
        ]));
        let store = EnvStore::from_vars(v);

        assert_eq!(store.list_app_ids().await.unwrap(), vec!["acme", "beta"]);
        let acme = store.get_app_config("acme").await.unwrap().unwrap();
        assert_eq!(acme.key_ids(), vec!["k1", "k2"]);
        assert!(!acme.find_key("k2").unwrap().enabled);

        let beta = store.get_app_config("beta").await.unwrap().unwrap();
        assert!(!beta.enabled);
        assert_eq!(beta.key_pairs[0].algorithm, SignatureAlgorithm::Es512);
    }

    #[tokio::test]
    async fn test_expiry_parsed_as_rfc3339() {
        let mut v = acme_vars();
        v.push(("APP_ACME_KEY_K1_EXPIRES_AT".to_owned(), "2027-06-01T00:00:00Z".to_owned()));
        let store = EnvStore::from_vars(v);
        let app = store.get_app_config("acme").await.unwrap().unwrap();
        let exp = app.key_pairs[0].expires_at.unwrap();
        assert_eq!(exp.to_rfc3339(), "2027-06-01T00:00:00+00:00");
    }

    #[tokio::test]
    async fn test_key_with_bad_expiry_skipped() {
        let mut v = acme_vars();
        v.push(("APP_ACME_KEY_K1_EXPIRES_AT".to_owned(), "next tuesday".to_owned()));
        let store = EnvStore::from_vars(v);
        // The only key failed to parse, so the whole app is dropped.
        assert!(store.get_app_config("acme").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_app_without_name_or_keys_skipped() {
        let store = EnvStore::from_vars(vars(&[
            // Name but no keys.
            ("APP_NOKEYS_NAME", "No Keys"),
            // Keys but no name.
            ("APP_NONAME_KEY_K1_PUBLIC_KEY", "pem"),
            ("APP_NONAME_KEY_K1_ALGORITHM", "RS256"),
        ]));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_key_with_unknown_algorithm_skipped() {
        let mut v = acme_vars();
        v.extend(vars(&[
            ("APP_ACME_KEY_BAD_PUBLIC_KEY", "pem"),
            ("APP_ACME_KEY_BAD_ALGORITHM", "HS256"),
        ]));
        let store = EnvStore::from_vars(v);
        let app = store.get_app_config("acme").await.unwrap().unwrap();
        assert_eq!(app.key_ids(), vec!["k1"]);
    }

    #[tokio::test]
    async fn test_unrelated_variables_ignored() {
        let mut v = acme_vars();
        v.extend(vars(&[("PATH", "/usr/bin"), ("APP_VERSION", "1.2.3"), ("APPETIZER", "yes")]));
        let store = EnvStore::from_vars(v);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_writes_rejected_as_read_only() {
        let store = EnvStore::from_vars(acme_vars());
        let app = store.get_app_config("acme").await.unwrap().unwrap();

        let save = store.save_app_config(&app).await;
        assert!(matches!(save, Err(StorageError::ReadOnly { .. })));
        let delete = store.delete_app_config("acme").await;
        assert!(matches!(delete, Err(StorageError::ReadOnly { .. })));
        // The snapshot is untouched.
        assert!(store.app_exists("acme").await.unwrap());
    }
}
