//! Shared test utilities for signature verification testing.
//!
//! This module provides common helpers for generating key pairs in every
//! supported algorithm, building [`AppConfig`] fixtures, and producing
//! correctly signed requests for the verification pipeline. It is
//! feature-gated behind `testutil` to prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! signet-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use signet_authn::testutil::{generate_key_pair, signed_headers};
//! ```

use chrono::Utc;
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

use signet_storage::{AppConfig, KeyPair, SignatureAlgorithm};

use crate::codec;
use crate::pipeline::PipelineConfig;

/// Generates a fresh key pair for `algorithm`.
///
/// Returns `(private_pem, public_pem)`: the private key in PKCS#8 PEM, the
/// public key in SPKI PEM. Each call generates new random key material; RSA
/// generation is slow, so tests that do not care about the algorithm should
/// prefer ES256.
///
/// # Panics
///
/// Panics if key generation or PEM encoding fails, which does not happen
/// with a working RNG.
pub fn generate_key_pair(algorithm: SignatureAlgorithm) -> (String, String) {
    match algorithm {
        SignatureAlgorithm::Rs256 | SignatureAlgorithm::Rs512 => {
            let private =
                rsa::RsaPrivateKey::new(&mut OsRng, 2048).expect("RSA key generation failed");
            let public = private.to_public_key();
            (
                private.to_pkcs8_pem(LineEnding::LF).expect("PKCS#8 encoding failed").to_string(),
                public.to_public_key_pem(LineEnding::LF).expect("SPKI encoding failed"),
            )
        },
        SignatureAlgorithm::Es256 => {
            let private = p256::SecretKey::random(&mut OsRng);
            let public = private.public_key();
            (
                private.to_pkcs8_pem(LineEnding::LF).expect("PKCS#8 encoding failed").to_string(),
                public.to_public_key_pem(LineEnding::LF).expect("SPKI encoding failed"),
            )
        },
        SignatureAlgorithm::Es512 => {
            let private = p521::SecretKey::random(&mut OsRng);
            let public = private.public_key();
            (
                private.to_pkcs8_pem(LineEnding::LF).expect("PKCS#8 encoding failed").to_string(),
                public.to_public_key_pem(LineEnding::LF).expect("SPKI encoding failed"),
            )
        },
    }
}

/// Builds a [`KeyPair`] with fresh key material, private half included.
pub fn test_key_pair(key_id: &str, algorithm: SignatureAlgorithm) -> KeyPair {
    let (private_pem, public_pem) = generate_key_pair(algorithm);
    KeyPair::builder()
        .key_id(key_id)
        .public_key(public_pem)
        .private_key(private_pem)
        .algorithm(algorithm)
        .build()
}

/// Builds an enabled [`AppConfig`] owning the given keys.
pub fn test_app_config(app_id: &str, key_pairs: Vec<KeyPair>) -> AppConfig {
    AppConfig::builder().app_id(app_id).name(format!("Test app {app_id}")).key_pairs(key_pairs).build()
}

/// Produces the signature headers for a request, signed with `key`.
///
/// The timestamp defaults to now; pass `timestamp` to test staleness.
/// Header names follow `config` so tests with renamed headers stay honest.
///
/// # Panics
///
/// Panics if `key` has no private half or the material does not parse.
pub fn signed_headers(
    config: &PipelineConfig,
    app_id: &str,
    key: &KeyPair,
    method: &str,
    path: &str,
    body: Option<&str>,
    timestamp: Option<&str>,
) -> Vec<(String, String)> {
    let timestamp = timestamp.map(str::to_owned).unwrap_or_else(|| Utc::now().to_rfc3339());
    let canonical = codec::canonical_string(&timestamp, method, path, app_id, body);
    let private_pem = key.private_key.as_ref().expect("test key has no private half");
    let signature =
        codec::sign(&canonical, private_pem, key.algorithm).expect("test signing failed");

    vec![
        (config.app_id_header.clone(), app_id.to_owned()),
        (config.key_id_header.clone(), key.key_id.clone()),
        (config.timestamp_header.clone(), timestamp),
        (config.signature_header.clone(), signature),
    ]
}
