//! Authentication error types.
//!
//! This module defines errors that can occur during request-signature
//! verification and key management, together with their mapping onto HTTP
//! status codes and machine-readable error codes for the hosting service.

use serde_json::json;
use thiserror::Error;

use signet_storage::StorageError;

/// Authentication and authorization errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]` — new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// One or more required signature headers are absent.
    #[error("Missing required headers: {}", missing.join(", "))]
    MissingHeaders {
        /// Names of the absent headers, in documentation order.
        missing: Vec<String>,
    },

    /// The app is unknown or disabled.
    ///
    /// Unknown and disabled are deliberately indistinguishable on the wire so
    /// probing cannot enumerate registered app IDs.
    #[error("App not valid: {app_id}")]
    AppInvalid {
        /// The app ID from the request.
        app_id: String,
    },

    /// The app does not exist. Management-path only; the verification path
    /// reports [`AuthError::AppInvalid`] instead.
    #[error("App not found: {app_id}")]
    AppNotFound {
        /// The app ID that was looked up.
        app_id: String,
    },

    /// No usable signing key for the requested key ID.
    #[error("Signing key not found: {kid}")]
    KeyNotFound {
        /// Key ID that was not found.
        kid: String,
    },

    /// Signing key exists but is soft-disabled.
    #[error("Signing key is disabled: {kid}")]
    KeyDisabled {
        /// Key ID that is disabled.
        kid: String,
    },

    /// Signing key exists but is past its expiry.
    #[error("Signing key expired: {kid}")]
    KeyExpired {
        /// Key ID that expired.
        kid: String,
    },

    /// Request timestamp is malformed or outside the freshness window.
    #[error("Invalid timestamp: {reason}")]
    TimestampInvalid {
        /// What was wrong: unparseable, too old, or too far in the future.
        reason: String,
    },

    /// Signature verification failed.
    ///
    /// Carries no detail: which byte differed is exactly what a forger
    /// would want to know.
    #[error("Invalid signature")]
    SignatureInvalid,

    /// Post-verification access control denied the request.
    #[error("Access denied: {reason}")]
    AccessDenied {
        /// Which rule denied it (path rule, IP rule).
        reason: String,
    },

    /// Key material could not be parsed (bad PEM, wrong curve).
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// A management operation was given invalid input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage backend error during configuration lookup.
    ///
    /// Wraps the original [`StorageError`] to preserve the full error source
    /// chain for debugging and structured logging.
    #[error("Configuration storage error: {0}")]
    Storage(
        /// The underlying storage error that caused the lookup to fail.
        #[source]
        StorageError,
    ),

    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl AuthError {
    /// Machine-readable error code, stable across releases.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingHeaders { .. } => "missing_headers",
            Self::AppInvalid { .. } => "app_invalid",
            Self::AppNotFound { .. } => "app_not_found",
            Self::KeyNotFound { .. } => "key_not_found",
            Self::KeyDisabled { .. } => "key_disabled",
            Self::KeyExpired { .. } => "key_expired",
            Self::TimestampInvalid { .. } => "timestamp_invalid",
            Self::SignatureInvalid => "signature_invalid",
            Self::AccessDenied { .. } => "access_denied",
            Self::InvalidKeyMaterial(_) => "invalid_key_material",
            Self::Validation(_) => "validation_error",
            Self::Storage(_) => "storage_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// The HTTP status the hosting service should respond with.
    ///
    /// Missing input is 400, failed authentication is 401, authenticated but
    /// not allowed is 403, bad management input is 404/422, and operational
    /// failures are 5xx (503 when the storage error is transient, so clients
    /// know to retry).
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::MissingHeaders { .. } => 400,
            Self::TimestampInvalid { .. } | Self::SignatureInvalid => 401,
            Self::AppInvalid { .. }
            | Self::KeyNotFound { .. }
            | Self::KeyDisabled { .. }
            | Self::KeyExpired { .. }
            | Self::AccessDenied { .. } => 403,
            Self::AppNotFound { .. } => 404,
            Self::InvalidKeyMaterial(_) | Self::Validation(_) => 422,
            Self::Storage(err) if err.is_transient() => 503,
            Self::Storage(_) | Self::Internal(_) => 500,
        }
    }

    /// JSON body for the hosting service's error response.
    ///
    /// Storage and internal errors keep their detail out of the body; the
    /// message goes to logs, the client gets the code.
    #[must_use]
    pub fn to_body(&self) -> serde_json::Value {
        let message = match self {
            Self::Storage(_) | Self::Internal(_) => "internal error".to_owned(),
            other => other.to_string(),
        };
        json!({
            "code": self.code(),
            "message": message,
        })
    }
}

/// Asserts that an expression evaluates to the given [`AuthError`] variant.
///
/// ```
/// use signet_authn::{AuthError, assert_auth_error};
///
/// let result: Result<(), AuthError> = Err(AuthError::SignatureInvalid);
/// assert_auth_error!(result, SignatureInvalid);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {
        match $result {
            Err($crate::error::AuthError::$variant { .. }) => {},
            other => panic!(
                concat!("expected AuthError::", stringify!($variant), ", got {:?}"),
                other
            ),
        }
    };
}
