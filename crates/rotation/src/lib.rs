//! Key lifecycle management for Signet.
//!
//! Builds on [`signet_authn`]'s key manager: generates fresh key material,
//! swaps keys in and out under three rotation strategies, reports key
//! health, and sweeps expired keys.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use signet_authn::KeyManager;
//! use signet_rotation::{LocalKeyGenerator, RotationManager, RotationPlan, RotationStrategy};
//! use signet_storage::MemoryStore;
//!
//! # async fn demo() -> Result<(), signet_rotation::RotationError> {
//! let keys = Arc::new(KeyManager::with_defaults(Arc::new(MemoryStore::new())));
//! let rotation = RotationManager::new(keys, Arc::new(LocalKeyGenerator::new()));
//!
//! let plan = RotationPlan::builder()
//!     .app_id("acme")
//!     .old_key_id("key-2024")
//!     .strategy(RotationStrategy::Gradual)
//!     .build();
//! let outcome = rotation.rotate_now(plan).await?;
//! println!("new key: {:?}", outcome.new_key_id);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod error;
pub mod generator;
pub mod health;
pub mod manager;

// Re-export primary types at crate root for convenience
pub use error::{RotationError, RotationResult};
pub use generator::{GeneratedKey, KeyGenerator, LocalKeyGenerator};
pub use health::{CleanupSummary, KeyHealth, KeyReport, KeyStatus};
pub use manager::{
    FailureHook, RotationManager, RotationOutcome, RotationPlan, RotationState, RotationStrategy,
};
