//! Key health reporting and expired-key cleanup.
//!
//! Operators run these on a schedule: the report feeds dashboards and
//! alerting, the cleanup sweep keeps app records from accumulating dead
//! keys.

use chrono::{Duration, Utc};
use serde::Serialize;

use signet_authn::AuthError;

use crate::error::RotationResult;
use crate::manager::RotationManager;

/// Keys expiring within this window are critical.
const CRITICAL_WINDOW_DAYS: i64 = 7;
/// Keys expiring within this window (but outside the critical one) warn.
const WARNING_WINDOW_DAYS: i64 = 30;

/// Severity of a key's condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyHealth {
    /// Nothing to do.
    Healthy,
    /// Rotation should be planned soon.
    Warning,
    /// The key is unusable or about to become so.
    Critical,
}

/// Lifecycle status of a key, as reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyStatus {
    /// Enabled and unexpired.
    Active,
    /// Administratively disabled.
    Disabled,
    /// Past its expiry.
    Expired,
    /// A rotation plan for this key is in flight.
    PendingRotation,
}

/// One key's condition.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyReport {
    /// The app owning the key.
    pub app_id: String,
    /// The key.
    pub key_id: String,
    /// Lifecycle status.
    pub status: KeyStatus,
    /// Severity.
    pub health: KeyHealth,
    /// Human-readable condition.
    pub reason: String,
    /// When the key expires, if an expiry is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<chrono::DateTime<Utc>>,
}

/// What a cleanup sweep did.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    /// Expired keys removed from their apps.
    pub removed: Vec<String>,
    /// Expired keys that could not be removed (an app keeps at least one
    /// key) and were disabled instead.
    pub disabled: Vec<String>,
}

impl RotationManager {
    /// Reports the condition of every key of one app.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AppNotFound`] (wrapped) for an unknown app, and
    /// propagates storage failures.
    pub async fn report_app(&self, app_id: &str) -> RotationResult<Vec<KeyReport>> {
        let config = self
            .keys()
            .get_app_config(app_id)
            .await?
            .ok_or_else(|| AuthError::AppNotFound { app_id: app_id.to_owned() })?;

        let now = Utc::now();
        Ok(config
            .key_pairs
            .iter()
            .map(|key| {
                let (status, health, reason) = classify(key, now);
                // An in-flight plan overrides the status and floors the
                // health at warning: the key is on its way out either way.
                let (status, health, reason) = if self.has_active_plan(app_id, &key.key_id) {
                    (
                        KeyStatus::PendingRotation,
                        health.max(KeyHealth::Warning),
                        format!("{reason}; rotation in progress"),
                    )
                } else {
                    (status, health, reason)
                };
                KeyReport {
                    app_id: app_id.to_owned(),
                    key_id: key.key_id.clone(),
                    status,
                    health,
                    reason,
                    expires_at: key.expires_at,
                }
            })
            .collect())
    }

    /// Reports every key of every app.
    ///
    /// # Errors
    ///
    /// Propagates storage failures from listing or loading apps.
    pub async fn report_all(&self) -> RotationResult<Vec<KeyReport>> {
        let mut reports = Vec::new();
        for app_id in self.keys().list_apps().await? {
            reports.extend(self.report_app(&app_id).await?);
        }
        Ok(reports)
    }

    /// Removes every expired key of `app_id`.
    ///
    /// An app always keeps at least one key, so when the last remaining key
    /// is expired it is disabled rather than removed and shows up in
    /// [`CleanupSummary::disabled`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AppNotFound`] (wrapped) for an unknown app, and
    /// propagates storage failures.
    pub async fn cleanup_expired_keys(&self, app_id: &str) -> RotationResult<CleanupSummary> {
        let config = self
            .keys()
            .get_app_config(app_id)
            .await?
            .ok_or_else(|| AuthError::AppNotFound { app_id: app_id.to_owned() })?;

        let now = Utc::now();
        let expired: Vec<String> = config
            .key_pairs
            .iter()
            .filter(|k| k.is_expired(now))
            .map(|k| k.key_id.clone())
            .collect();

        let mut summary = CleanupSummary::default();
        for key_id in expired {
            match self.keys().remove_key_pair(app_id, &key_id).await {
                Ok(()) => summary.removed.push(key_id),
                Err(AuthError::Validation(_)) => {
                    self.keys().set_key_pair_enabled(app_id, &key_id, false).await?;
                    summary.disabled.push(key_id);
                },
                Err(err) => return Err(err.into()),
            }
        }
        if !summary.removed.is_empty() || !summary.disabled.is_empty() {
            tracing::info!(
                audit.action = "key_cleanup",
                audit.resource = %app_id,
                audit.result = "success",
                removed = summary.removed.len(),
                disabled = summary.disabled.len(),
                "expired keys cleaned up",
            );
        }
        Ok(summary)
    }
}

fn classify(
    key: &signet_storage::KeyPair,
    now: chrono::DateTime<Utc>,
) -> (KeyStatus, KeyHealth, String) {
    if !key.enabled {
        return (KeyStatus::Disabled, KeyHealth::Critical, "key is disabled".to_owned());
    }
    if key.is_expired(now) {
        return (KeyStatus::Expired, KeyHealth::Critical, "key has expired".to_owned());
    }
    if let Some(expires_at) = key.expires_at {
        let remaining = expires_at - now;
        if remaining <= Duration::days(CRITICAL_WINDOW_DAYS) {
            return (
                KeyStatus::Active,
                KeyHealth::Critical,
                format!("key expires in {} day(s)", remaining.num_days()),
            );
        }
        if remaining <= Duration::days(WARNING_WINDOW_DAYS) {
            return (
                KeyStatus::Active,
                KeyHealth::Warning,
                format!("key expires in {} day(s)", remaining.num_days()),
            );
        }
    }
    (KeyStatus::Active, KeyHealth::Healthy, "key is valid".to_owned())
}
