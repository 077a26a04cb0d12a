//! Ordered request-verification pipeline.
//!
//! Ties the other modules together: header extraction, app validation,
//! timestamp freshness, key resolution, signature verification, and access
//! control, in a fixed order chosen so the cheapest and most common
//! rejections happen first. The pipeline is transport-agnostic: the hosting
//! service adapts its request type into a [`VerifyRequest`] and maps the
//! [`Outcome`] onto its response type, so the same pipeline serves any HTTP
//! framework, or none.
//!
//! # Step order
//!
//! 1. Skip-list check (health endpoints, etc.) — short-circuits to
//!    [`Outcome::Skipped`].
//! 2. Header extraction; all missing headers are reported together.
//! 3. App lookup and enabled check.
//! 4. Key resolution (state errors name the key's problem).
//! 5. Timestamp freshness, honoring the app's custom window.
//! 6. Canonical string construction and signature verification.
//! 7. Access control (paths, client IP).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use signet_storage::SignatureAlgorithm;

use crate::access::{AccessDecision, PathPattern};
use crate::codec;
use crate::error::AuthError;
use crate::manager::KeyManager;

fn default_signature_header() -> String {
    "x-signature".to_owned()
}

fn default_timestamp_header() -> String {
    "x-timestamp".to_owned()
}

fn default_app_id_header() -> String {
    "x-app-id".to_owned()
}

fn default_key_id_header() -> String {
    "x-key-id".to_owned()
}

fn default_forwarded_for_header() -> String {
    "x-forwarded-for".to_owned()
}

fn default_timestamp_window() -> i64 {
    300
}

/// Pipeline settings.
///
/// Header names are matched case-insensitively against incoming requests.
/// `timestamp_window <= 0` disables the freshness check globally; see
/// [`codec::validate_timestamp`] for why that is almost never what you want.
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Header carrying the base64 signature.
    #[serde(default = "default_signature_header")]
    #[builder(into, default = default_signature_header())]
    pub signature_header: String,

    /// Header carrying the RFC 3339 timestamp.
    #[serde(default = "default_timestamp_header")]
    #[builder(into, default = default_timestamp_header())]
    pub timestamp_header: String,

    /// Header carrying the app ID.
    #[serde(default = "default_app_id_header")]
    #[builder(into, default = default_app_id_header())]
    pub app_id_header: String,

    /// Header carrying the key ID. Optional on requests; without it the
    /// key ID `default` is assumed.
    #[serde(default = "default_key_id_header")]
    #[builder(into, default = default_key_id_header())]
    pub key_id_header: String,

    /// Header consulted for the client IP before falling back to the
    /// transport peer address. Only the first (client-most) entry is used.
    #[serde(default = "default_forwarded_for_header")]
    #[builder(into, default = default_forwarded_for_header())]
    pub forwarded_for_header: String,

    /// Default timestamp freshness window in seconds, overridable per app.
    #[serde(default = "default_timestamp_window")]
    #[builder(default = default_timestamp_window())]
    pub timestamp_window: i64,

    /// Path patterns that bypass verification entirely.
    #[serde(default)]
    #[builder(default)]
    pub skip_paths: Vec<String>,

    /// When `true`, storage and internal error detail is included in the
    /// error body built by [`VerificationPipeline::error_body`]. Leave off
    /// outside development.
    #[serde(default)]
    #[builder(default)]
    pub expose_internal_errors: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A request as seen by the pipeline, already lifted out of whatever HTTP
/// framework the host uses.
#[derive(Clone, Debug, bon::Builder)]
pub struct VerifyRequest {
    /// HTTP method; case does not matter, the canonical form uppercases.
    #[builder(into)]
    pub method: String,

    /// Request path, no query string.
    #[builder(into)]
    pub path: String,

    /// All request headers. Names are compared case-insensitively.
    #[builder(default)]
    pub headers: Vec<(String, String)>,

    /// Request body exactly as signed. `None` and empty are equivalent.
    #[builder(into)]
    pub body: Option<String>,

    /// Transport-level peer address, if known.
    #[builder(into)]
    pub remote_ip: Option<String>,
}

impl VerifyRequest {
    /// First header value whose name matches case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Identity attached to a request that passed every check.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthContext {
    /// The authenticated app.
    pub app_id: String,
    /// The key that verified the signature.
    pub key_id: String,
    /// The algorithm that was used.
    pub algorithm: SignatureAlgorithm,
    /// The request timestamp, as presented.
    pub timestamp: String,
}

/// Result of running the pipeline over one request.
#[derive(Debug)]
pub enum Outcome {
    /// The path is on the skip list; no verification was attempted.
    Skipped,
    /// Every check passed.
    Verified(AuthContext),
    /// A check failed; the host should respond with
    /// [`AuthError::status`] and [`VerificationPipeline::error_body`].
    Denied(AuthError),
}

impl Outcome {
    /// Returns `true` for [`Outcome::Verified`].
    #[must_use]
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }
}

/// The verification pipeline. Cheap to share behind an `Arc`; holds no
/// per-request state.
pub struct VerificationPipeline {
    manager: Arc<KeyManager>,
    config: PipelineConfig,
    skip: Vec<PathPattern>,
}

impl VerificationPipeline {
    /// Builds a pipeline over `manager`, compiling the skip patterns once.
    #[must_use]
    pub fn new(manager: Arc<KeyManager>, config: PipelineConfig) -> Self {
        let skip = config.skip_paths.iter().map(|p| PathPattern::parse(p)).collect();
        Self { manager, config, skip }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every check against one request.
    #[tracing::instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn verify(&self, request: &VerifyRequest) -> Outcome {
        if self.skip.iter().any(|p| p.matches(&request.path)) {
            tracing::debug!("path on skip list, bypassing verification");
            return Outcome::Skipped;
        }

        match self.run(request).await {
            Ok(context) => {
                tracing::debug!(
                    app_id = %context.app_id,
                    key_id = %context.key_id,
                    "request signature verified",
                );
                Outcome::Verified(context)
            },
            Err(err) => {
                tracing::info!(error = %err, code = err.code(), "request verification failed");
                Outcome::Denied(err)
            },
        }
    }

    /// JSON error body for a denial, honoring `expose_internal_errors`.
    #[must_use]
    pub fn error_body(&self, err: &AuthError) -> serde_json::Value {
        if self.config.expose_internal_errors
            && matches!(err, AuthError::Storage(_) | AuthError::Internal(_))
        {
            return serde_json::json!({
                "code": err.code(),
                "message": err.to_string(),
            });
        }
        err.to_body()
    }

    async fn run(&self, request: &VerifyRequest) -> Result<AuthContext, AuthError> {
        // Collect every missing required header before failing, so a caller
        // fixes their integration in one round trip.
        let mut missing = Vec::new();
        let signature = self.required(request, &self.config.signature_header, &mut missing);
        let timestamp = self.required(request, &self.config.timestamp_header, &mut missing);
        let app_id = self.required(request, &self.config.app_id_header, &mut missing);
        if !missing.is_empty() {
            return Err(AuthError::MissingHeaders { missing });
        }
        let (signature, timestamp, app_id) = (signature.unwrap_or_default(), timestamp.unwrap_or_default(), app_id.unwrap_or_default());
        let key_id = request.header(&self.config.key_id_header).filter(|v| !v.is_empty());

        let config = self
            .manager
            .get_app_config(app_id)
            .await?
            .ok_or_else(|| AuthError::AppInvalid { app_id: app_id.to_owned() })?;
        if !config.enabled {
            return Err(AuthError::AppInvalid { app_id: app_id.to_owned() });
        }

        let resolved = self.manager.get_public_key(app_id, key_id).await?;

        let window = config
            .access_control
            .as_ref()
            .and_then(|ac| ac.custom_time_window)
            .unwrap_or(self.config.timestamp_window);
        codec::validate_timestamp(timestamp, window)?;

        let canonical = codec::canonical_string(
            timestamp,
            &request.method,
            &request.path,
            app_id,
            request.body.as_deref(),
        );
        if !codec::verify(&canonical, signature, &resolved.public_key, resolved.algorithm) {
            return Err(AuthError::SignatureInvalid);
        }

        let client_ip = self.client_ip(request);
        let decision = crate::access::evaluate(
            config.access_control.as_ref(),
            &request.path,
            &request.method,
            client_ip.as_deref(),
        );
        if let AccessDecision::Denied { reason } = decision {
            return Err(AuthError::AccessDenied { reason });
        }

        Ok(AuthContext {
            app_id: app_id.to_owned(),
            key_id: resolved.key_id,
            algorithm: resolved.algorithm,
            timestamp: timestamp.to_owned(),
        })
    }

    fn required<'r>(
        &self,
        request: &'r VerifyRequest,
        name: &str,
        missing: &mut Vec<String>,
    ) -> Option<&'r str> {
        let value = request.header(name).filter(|v| !v.is_empty());
        if value.is_none() {
            missing.push(name.to_owned());
        }
        value
    }

    /// Client IP: first entry of the forwarded-for header, else the peer.
    fn client_ip(&self, request: &VerifyRequest) -> Option<String> {
        if let Some(forwarded) = request.header(&self.config.forwarded_for_header) {
            let first = forwarded.split(',').next().map(str::trim).unwrap_or_default();
            if !first.is_empty() {
                return Some(first.to_owned());
            }
        }
        request.remote_ip.clone()
    }
}
