//! Error type for key rotation operations.

use thiserror::Error;

use signet_authn::AuthError;

/// Result alias for rotation operations.
pub type RotationResult<T> = Result<T, RotationError>;

/// Errors from planning or executing a key rotation.
///
/// # Non-exhaustive
///
/// New variants may be added in minor releases; match with a wildcard arm.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RotationError {
    /// A key management call failed underneath the rotation.
    #[error("Key management error: {0}")]
    Auth(#[from] AuthError),

    /// Key material generation failed.
    #[error("Key generation failed: {message}")]
    Generation {
        /// What went wrong.
        message: String,
    },

    /// The rotation plan is invalid or references unknown state.
    #[error("Invalid rotation plan: {message}")]
    InvalidPlan {
        /// What makes the plan unusable.
        message: String,
    },
}

impl RotationError {
    /// Creates a [`RotationError::Generation`].
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation { message: message.into() }
    }

    /// Creates a [`RotationError::InvalidPlan`].
    pub fn invalid_plan(message: impl Into<String>) -> Self {
        Self::InvalidPlan { message: message.into() }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            RotationError::generation("rng unavailable").to_string(),
            "Key generation failed: rng unavailable"
        );
        assert_eq!(
            RotationError::invalid_plan("unknown plan").to_string(),
            "Invalid rotation plan: unknown plan"
        );
    }

    #[test]
    fn test_auth_errors_convert() {
        let err: RotationError = AuthError::KeyNotFound { kid: "k1".into() }.into();
        assert!(matches!(err, RotationError::Auth(AuthError::KeyNotFound { .. })));
    }
}
