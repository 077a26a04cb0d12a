//! Configuration storage layer for Signet.
//!
//! This crate provides the [`ConfigStore`] trait and the data model for
//! request-signing authentication: per-application [`AppConfig`] records,
//! each owning one or more [`KeyPair`]s. The verification layer
//! (`signet-authn`) and the rotation layer (`signet-rotation`) both sit on
//! top of this abstraction.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │            signet-authn / signet-rotation            │
//! │        (key manager, verification, rotation)         │
//! ├──────────────────────────────────────────────────────┤
//! │                    signet-storage                    │
//! │                  ConfigStore trait                   │
//! │      (get, save, delete, list, bulk get, exists)     │
//! ├────────────────┬──────────────────┬──────────────────┤
//! │  MemoryStore   │     EnvStore     │   RemoteKvStore  │
//! │   (testing)    │ (static deploys) │   (production)   │
//! └────────────────┴──────────────────┴──────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use signet_storage::{AppConfig, ConfigStore, KeyPair, MemoryStore, SignatureAlgorithm};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::new();
//!
//!     let app = AppConfig::builder()
//!         .app_id("acme")
//!         .name("Acme Integration")
//!         .key_pairs(vec![KeyPair::builder()
//!             .key_id("key-2026-001")
//!             .public_key("-----BEGIN PUBLIC KEY-----\n...".to_owned())
//!             .algorithm(SignatureAlgorithm::Rs256)
//!             .build()])
//!         .build();
//!
//!     store.save_app_config(&app).await?;
//!     assert!(store.app_exists("acme").await?);
//!     Ok(())
//! }
//! ```
//!
//! # Available Providers
//!
//! | Provider | Use Case | Writable |
//! |----------|----------|----------|
//! | [`MemoryStore`] | Testing, development | Yes |
//! | [`EnvStore`] | Static container deployments | No |
//! | [`RemoteKvStore`] | Production | Yes |
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`], which wraps potential
//! [`StorageError`] variants. Providers map their internal errors to these
//! standardized error types; transient ones ([`StorageError::is_transient`])
//! are eligible for the [`retry`] layer.

#![deny(unsafe_code)]

pub mod env;
pub mod error;
pub mod memory;
pub mod provider;
pub mod remote;
pub mod retry;
pub mod store_enum;
pub mod types;

// Re-export primary types at crate root for convenience
pub use env::EnvStore;
pub use error::{BoxError, StorageError, StorageResult};
pub use memory::MemoryStore;
pub use provider::ConfigStore;
pub use remote::{APP_INDEX_KEY, APP_KEY_PREFIX, KvClient, RemoteKvStore};
pub use retry::{RetryPolicy, with_retry};
pub use store_enum::{Store, StoreKind};
pub use types::{
    AccessControlConfig, AppConfig, KeyPair, RateLimit, SignatureAlgorithm, UnknownAlgorithm,
};
pub use zeroize::Zeroizing;
