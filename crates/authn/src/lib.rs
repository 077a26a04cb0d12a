//! Request-signature verification for Signet.
//!
//! Server-to-server callers sign each HTTP request with a registered private
//! key; this crate verifies those signatures on the receiving side. It
//! provides the signature codec, a cached key manager over
//! [`signet_storage`], access control evaluation, and the ordered
//! verification pipeline that hosting services embed.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use signet_authn::{KeyManager, Outcome, PipelineConfig, VerificationPipeline, VerifyRequest};
//! use signet_storage::MemoryStore;
//!
//! # async fn demo() {
//! let manager = Arc::new(KeyManager::with_defaults(Arc::new(MemoryStore::new())));
//! let pipeline = VerificationPipeline::new(manager, PipelineConfig::default());
//!
//! let request = VerifyRequest::builder()
//!     .method("GET")
//!     .path("/v1/resource")
//!     .headers(vec![/* signature headers */])
//!     .build();
//!
//! match pipeline.verify(&request).await {
//!     Outcome::Verified(ctx) => println!("authenticated as {}", ctx.app_id),
//!     Outcome::Skipped => println!("path exempt from verification"),
//!     Outcome::Denied(err) => println!("rejected: {} ({})", err.code(), err.status()),
//! }
//! # }
//! ```
//!
//! # Verification order
//!
//! See [`pipeline`] for the exact step order and [`error::AuthError`] for the
//! full failure taxonomy with HTTP status mapping.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with shared test helpers (key generation,
//!   fixture builders, request signing). Enable this in `[dev-dependencies]` for integration
//!   tests.

#![deny(unsafe_code)]

pub mod access;
pub mod cache;
pub mod codec;
pub mod error;
pub mod manager;
pub mod pipeline;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;

// Re-export primary types at crate root for convenience
pub use access::{AccessDecision, PathPattern};
pub use cache::{CacheStats, ConfigCache};
pub use codec::{canonical_string, sign, validate_timestamp, verify};
pub use error::AuthError;
pub use manager::{AppConfigUpdate, DEFAULT_KEY_ID, KeyManager, KeyManagerConfig, ResolvedKey};
pub use pipeline::{AuthContext, Outcome, PipelineConfig, VerificationPipeline, VerifyRequest};
