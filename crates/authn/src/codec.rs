//! Canonical request encoding, signing, and verification.
//!
//! The signed message is a newline-joined canonical string:
//!
//! ```text
//! <timestamp>\n<METHOD>\n<path>\n<appId>\n<body>
//! ```
//!
//! with the method uppercased and an empty string standing in for an absent
//! body. Signatures travel base64-encoded (standard alphabet, with padding);
//! ECDSA signatures use ASN.1 DER encoding inside the base64, fixed-size
//! `r||s` encodings are not accepted.
//!
//! Verification is deliberately information-free: any failure collapses to
//! `false` rather than explaining itself. Unusable stored key material also
//! verifies as `false`; it is logged at the site, because that is an operator
//! problem, not a caller problem.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use sha2::{Sha256, Sha512};

use signet_storage::SignatureAlgorithm;

use crate::error::AuthError;

/// Builds the canonical string covered by the signature.
///
/// The method is uppercased so `get` and `GET` sign identically; every other
/// component is byte-exact. `None` and `Some("")` bodies canonicalize the
/// same way.
#[must_use]
pub fn canonical_string(
    timestamp: &str,
    method: &str,
    path: &str,
    app_id: &str,
    body: Option<&str>,
) -> String {
    format!(
        "{timestamp}\n{}\n{path}\n{app_id}\n{}",
        method.to_uppercase(),
        body.unwrap_or_default(),
    )
}

/// Signs a canonical string, returning the base64 signature.
///
/// # Errors
///
/// Returns [`AuthError::InvalidKeyMaterial`] if the PEM cannot be parsed as a
/// private key for `algorithm`. PKCS#8 is accepted for every algorithm, plus
/// PKCS#1 for RSA and SEC1 for the ECDSA curves.
pub fn sign(
    canonical: &str,
    private_key_pem: &str,
    algorithm: SignatureAlgorithm,
) -> Result<String, AuthError> {
    let message = canonical.as_bytes();
    let raw = match algorithm {
        SignatureAlgorithm::Rs256 => {
            let key = parse_rsa_private(private_key_pem)?;
            let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(key);
            signing_key.sign(message).to_vec()
        },
        SignatureAlgorithm::Rs512 => {
            let key = parse_rsa_private(private_key_pem)?;
            let signing_key = rsa::pkcs1v15::SigningKey::<Sha512>::new(key);
            signing_key.sign(message).to_vec()
        },
        SignatureAlgorithm::Es256 => {
            let key = parse_p256_private(private_key_pem)?;
            let signing_key = p256::ecdsa::SigningKey::from(key);
            let sig: p256::ecdsa::Signature = signing_key.sign(message);
            sig.to_der().as_bytes().to_vec()
        },
        SignatureAlgorithm::Es512 => {
            let key = parse_p521_private(private_key_pem)?;
            let signing_key = p521::ecdsa::SigningKey::from_bytes(&key.to_bytes())
                .map_err(|err| AuthError::InvalidKeyMaterial(format!("P-521 scalar: {err}")))?;
            let sig: p521::ecdsa::Signature = signing_key.sign(message);
            sig.to_der().as_bytes().to_vec()
        },
    };
    Ok(BASE64.encode(raw))
}

/// Verifies a base64 signature over a canonical string.
///
/// Returns `false` for anything that does not verify: wrong signature,
/// malformed base64, malformed DER, or a stored public key that cannot be
/// parsed for `algorithm`. All of those are indistinguishable to the caller;
/// an unusable key is logged so the operator can fix the record.
#[must_use]
pub fn verify(
    canonical: &str,
    signature_b64: &str,
    public_key_pem: &str,
    algorithm: SignatureAlgorithm,
) -> bool {
    match try_verify(canonical, signature_b64, public_key_pem, algorithm) {
        Ok(verified) => verified,
        Err(err) => {
            tracing::warn!(%algorithm, error = %err, "stored public key is unusable");
            false
        },
    }
}

fn try_verify(
    canonical: &str,
    signature_b64: &str,
    public_key_pem: &str,
    algorithm: SignatureAlgorithm,
) -> Result<bool, AuthError> {
    let Ok(sig_bytes) = BASE64.decode(signature_b64) else {
        return Ok(false);
    };
    let message = canonical.as_bytes();

    let verified = match algorithm {
        SignatureAlgorithm::Rs256 => {
            let key = parse_rsa_public(public_key_pem)?;
            let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key);
            match rsa::pkcs1v15::Signature::try_from(sig_bytes.as_slice()) {
                Ok(sig) => verifying_key.verify(message, &sig).is_ok(),
                Err(_) => false,
            }
        },
        SignatureAlgorithm::Rs512 => {
            let key = parse_rsa_public(public_key_pem)?;
            let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha512>::new(key);
            match rsa::pkcs1v15::Signature::try_from(sig_bytes.as_slice()) {
                Ok(sig) => verifying_key.verify(message, &sig).is_ok(),
                Err(_) => false,
            }
        },
        SignatureAlgorithm::Es256 => {
            let key = parse_p256_public(public_key_pem)?;
            let verifying_key = p256::ecdsa::VerifyingKey::from(&key);
            match p256::ecdsa::Signature::from_der(&sig_bytes) {
                Ok(sig) => verifying_key.verify(message, &sig).is_ok(),
                Err(_) => false,
            }
        },
        SignatureAlgorithm::Es512 => {
            let key = parse_p521_public(public_key_pem)?;
            let verifying_key = p521::ecdsa::VerifyingKey::from_sec1_bytes(
                key.to_sec1_bytes().as_ref(),
            )
            .map_err(|err| AuthError::InvalidKeyMaterial(format!("P-521 point: {err}")))?;
            match p521::ecdsa::Signature::from_der(&sig_bytes) {
                Ok(sig) => verifying_key.verify(message, &sig).is_ok(),
                Err(_) => false,
            }
        },
    };
    Ok(verified)
}

/// Checks that an RFC 3339 timestamp is within `window_seconds` of now,
/// in either direction.
///
/// # Disabled check
///
/// A `window_seconds <= 0` accepts every timestamp without even parsing it.
/// That throws away replay protection for the app and exists only as an
/// explicit operator escape hatch for clock-skewed legacy callers.
///
/// # Errors
///
/// Returns [`AuthError::TimestampInvalid`] if the timestamp cannot be parsed
/// or falls outside the window.
pub fn validate_timestamp(timestamp: &str, window_seconds: i64) -> Result<(), AuthError> {
    if window_seconds <= 0 {
        return Ok(());
    }

    let parsed = DateTime::parse_from_rfc3339(timestamp)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| AuthError::TimestampInvalid {
            reason: format!("not an RFC 3339 timestamp: {err}"),
        })?;

    let skew = (Utc::now() - parsed).num_seconds();
    if skew > window_seconds {
        return Err(AuthError::TimestampInvalid {
            reason: format!("timestamp is {skew}s old, window is {window_seconds}s"),
        });
    }
    if -skew > window_seconds {
        return Err(AuthError::TimestampInvalid {
            reason: format!("timestamp is {}s in the future, window is {window_seconds}s", -skew),
        });
    }
    Ok(())
}

fn parse_rsa_private(pem: &str) -> Result<rsa::RsaPrivateKey, AuthError> {
    rsa::RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| rsa::RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|err| AuthError::InvalidKeyMaterial(format!("RSA private key: {err}")))
}

fn parse_rsa_public(pem: &str) -> Result<rsa::RsaPublicKey, AuthError> {
    rsa::RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| rsa::RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|err| AuthError::InvalidKeyMaterial(format!("RSA public key: {err}")))
}

fn parse_p256_private(pem: &str) -> Result<p256::SecretKey, AuthError> {
    p256::SecretKey::from_pkcs8_pem(pem)
        .or_else(|_| p256::SecretKey::from_sec1_pem(pem))
        .map_err(|err| AuthError::InvalidKeyMaterial(format!("P-256 private key: {err}")))
}

fn parse_p256_public(pem: &str) -> Result<p256::PublicKey, AuthError> {
    p256::PublicKey::from_public_key_pem(pem)
        .map_err(|err| AuthError::InvalidKeyMaterial(format!("P-256 public key: {err}")))
}

fn parse_p521_private(pem: &str) -> Result<p521::SecretKey, AuthError> {
    p521::SecretKey::from_pkcs8_pem(pem)
        .or_else(|_| p521::SecretKey::from_sec1_pem(pem))
        .map_err(|err| AuthError::InvalidKeyMaterial(format!("P-521 private key: {err}")))
}

fn parse_p521_public(pem: &str) -> Result<p521::PublicKey, AuthError> {
    p521::PublicKey::from_public_key_pem(pem)
        .map_err(|err| AuthError::InvalidKeyMaterial(format!("P-521 public key: {err}")))
}
