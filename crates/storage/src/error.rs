//! Error taxonomy for the storage layer.
//!
//! Every provider maps its backend-specific failures onto [`StorageError`]
//! so that callers can react uniformly. The one distinction that matters
//! operationally is captured by [`StorageError::is_transient`]: connection
//! failures and timeouts are worth retrying, everything else is not.

use std::{error::Error, sync::Arc};

use thiserror::Error;

/// Shared boxed error used as an error source.
///
/// `Arc` rather than `Box` so errors stay cloneable when embedded in
/// clonable results and cached values.
pub type BoxError = Arc<dyn Error + Send + Sync + 'static>;

/// Convenience alias for storage operation results.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors produced by storage providers.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// A record that was required to exist does not.
    ///
    /// Providers only raise this for operations whose contract demands
    /// presence; plain lookups report absence as `Ok(None)` instead.
    #[error("record not found: {key}")]
    NotFound {
        /// Storage key of the missing record.
        key: String,
    },

    /// The backend could not be reached or dropped the connection.
    #[error("storage connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A record could not be encoded or decoded.
    #[error("serialization failed: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A write was attempted against a read-only provider.
    #[error("storage is read-only: {operation} is not supported")]
    ReadOnly {
        /// Name of the rejected operation.
        operation: String,
    },

    /// An invariant inside the storage layer itself was violated.
    #[error("internal storage error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The operation exceeded its deadline.
    #[error("storage operation timed out")]
    Timeout,
}

impl StorageError {
    /// Creates a [`StorageError::NotFound`] for `key`.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a [`StorageError::Connection`] without an underlying source.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a [`StorageError::Connection`] wrapping a backend error.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a [`StorageError::Serialization`] without an underlying source.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a [`StorageError::Serialization`] wrapping a codec error.
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a [`StorageError::ReadOnly`] for the named operation.
    pub fn read_only(operation: impl Into<String>) -> Self {
        Self::ReadOnly { operation: operation.into() }
    }

    /// Creates a [`StorageError::Internal`] without an underlying source.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a [`StorageError::Internal`] wrapping another error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a [`StorageError::Timeout`].
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Returns `true` if retrying the operation could reasonably succeed.
    ///
    /// Connection failures and timeouts are transient; everything else
    /// reflects a state that a retry cannot change.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout)
    }
}
