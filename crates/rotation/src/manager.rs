//! Rotation planning and execution.
//!
//! A rotation swaps one of an app's signing keys for freshly generated
//! material. What happens to each key depends on the [`RotationStrategy`]:
//!
//! - [`Immediate`](RotationStrategy::Immediate): disable the old key, then
//!   add the new one enabled. Requests still signed with the old key start
//!   failing at once. Use after a suspected compromise.
//! - [`Gradual`](RotationStrategy::Gradual): add the new key enabled, then
//!   give the old key an expiry of now plus the plan's grace period. Both
//!   keys verify during the overlap, so callers can pick up the new key at
//!   their own pace.
//! - [`Scheduled`](RotationStrategy::Scheduled): add the new key
//!   **disabled** and leave the old key untouched. An operator enables the
//!   new key (and retires the old one) at the cutover they choose.
//!
//! Plans move `Planned -> Executing -> Completed | Failed`. A failed
//! execution is recorded, reported through the failure hook, and then
//! returned to the caller as an error; the old key always survives a
//! failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use signet_authn::{AuthError, KeyManager};
use signet_storage::{KeyPair, SignatureAlgorithm};

use crate::error::{RotationError, RotationResult};
use crate::generator::KeyGenerator;

fn default_grace_period() -> Duration {
    // One day of overlap.
    Duration::from_secs(24 * 60 * 60)
}

/// How the new key activates and the old key retires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RotationStrategy {
    /// Disable the old key, then add the new one. No grace window.
    Immediate,
    /// Add the new key, then let the old one expire after the plan's grace
    /// period. Both verify during the overlap.
    Gradual,
    /// Add the new key disabled; the old key is untouched until an operator
    /// enables the new one and retires the old.
    Scheduled,
}

/// Lifecycle state of a rotation plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RotationState {
    /// Submitted, not yet executed.
    Planned,
    /// Execution in progress.
    Executing,
    /// The new key is live and the old key retired per the strategy.
    Completed,
    /// Execution failed; see the outcome's error.
    Failed,
}

/// One planned key swap.
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RotationPlan {
    /// Plan identifier, generated when omitted.
    #[serde(default = "new_plan_id")]
    #[builder(into, default = new_plan_id())]
    pub plan_id: String,

    /// The app whose key rotates.
    #[builder(into)]
    pub app_id: String,

    /// The key being retired.
    #[builder(into)]
    pub old_key_id: String,

    /// Algorithm for the new key. Defaults to the old key's algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<SignatureAlgorithm>,

    /// How the old key is retired.
    #[builder(default = RotationStrategy::Immediate)]
    pub strategy: RotationStrategy,

    /// Overlap window for [`RotationStrategy::Gradual`]; ignored otherwise.
    #[serde(default = "default_grace_period", with = "humantime_serde")]
    #[builder(default = default_grace_period())]
    pub grace_period: Duration,
}

fn new_plan_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// What a rotation did, or failed to do.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationOutcome {
    /// The plan this outcome belongs to.
    pub plan_id: String,
    /// The app that was rotated.
    pub app_id: String,
    /// Final (or current) plan state.
    pub state: RotationState,
    /// ID of the newly added key, once generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_key_id: Option<String>,
    /// Failure description when `state` is [`RotationState::Failed`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Called with the outcome of every failed execution.
pub type FailureHook = dyn Fn(&RotationOutcome) + Send + Sync;

struct PlanRecord {
    plan: RotationPlan,
    state: RotationState,
    new_key_id: Option<String>,
    error: Option<String>,
}

impl PlanRecord {
    fn outcome(&self) -> RotationOutcome {
        RotationOutcome {
            plan_id: self.plan.plan_id.clone(),
            app_id: self.plan.app_id.clone(),
            state: self.state,
            new_key_id: self.new_key_id.clone(),
            error: self.error.clone(),
        }
    }
}

/// Plans and executes key rotations over a [`KeyManager`].
pub struct RotationManager {
    keys: Arc<KeyManager>,
    generator: Arc<dyn KeyGenerator>,
    plans: RwLock<HashMap<String, PlanRecord>>,
    failure_hook: Option<Arc<FailureHook>>,
}

impl RotationManager {
    /// Creates a manager rotating keys held by `keys`, generating new
    /// material with `generator`.
    pub fn new(keys: Arc<KeyManager>, generator: Arc<dyn KeyGenerator>) -> Self {
        Self { keys, generator, plans: RwLock::new(HashMap::new()), failure_hook: None }
    }

    /// Installs a hook invoked with the outcome of every failed execution.
    ///
    /// Operators typically page or open a ticket from here; execution itself
    /// never blocks on the hook.
    #[must_use]
    pub fn with_failure_hook(
        mut self,
        hook: impl Fn(&RotationOutcome) + Send + Sync + 'static,
    ) -> Self {
        self.failure_hook = Some(Arc::new(hook));
        self
    }

    /// The key manager this rotates against.
    #[must_use]
    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Validates and registers a plan, returning its ID.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::InvalidPlan`] when the plan is internally
    /// inconsistent, reuses a plan ID, or references an unknown app or key.
    pub async fn submit(&self, plan: RotationPlan) -> RotationResult<String> {
        if plan.strategy == RotationStrategy::Gradual {
            if plan.grace_period.is_zero() {
                return Err(RotationError::invalid_plan(
                    "gradual rotation needs a non-zero grace period",
                ));
            }
            // chrono must be able to represent the expiry offset.
            chrono::Duration::from_std(plan.grace_period)
                .map_err(|_| RotationError::invalid_plan("grace period out of range"))?;
        }

        let config = self
            .keys
            .get_app_config(&plan.app_id)
            .await?
            .ok_or_else(|| {
                RotationError::invalid_plan(format!("unknown app '{}'", plan.app_id))
            })?;
        if config.find_key(&plan.old_key_id).is_none() {
            return Err(RotationError::invalid_plan(format!(
                "app '{}' has no key '{}'",
                plan.app_id, plan.old_key_id
            )));
        }

        let plan_id = plan.plan_id.clone();
        let mut plans = self.plans.write();
        if plans.contains_key(&plan_id) {
            return Err(RotationError::invalid_plan(format!("plan '{plan_id}' already exists")));
        }
        plans.insert(
            plan_id.clone(),
            PlanRecord { plan, state: RotationState::Planned, new_key_id: None, error: None },
        );
        tracing::info!(
            audit.action = "rotation_plan",
            audit.resource = %plan_id,
            audit.result = "success",
            "rotation plan registered",
        );
        Ok(plan_id)
    }

    /// Executes a registered plan.
    ///
    /// On failure the plan moves to [`RotationState::Failed`], the failure
    /// hook fires with the recorded outcome, and the error is returned to
    /// the caller. The old key survives every failure path.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::InvalidPlan`] when `plan_id` is unknown or
    /// the plan is not in [`RotationState::Planned`], and propagates
    /// generation and key-management failures.
    #[tracing::instrument(skip(self))]
    pub async fn execute(&self, plan_id: &str) -> RotationResult<RotationOutcome> {
        let plan = {
            let mut plans = self.plans.write();
            let record = plans.get_mut(plan_id).ok_or_else(|| {
                RotationError::invalid_plan(format!("unknown plan '{plan_id}'"))
            })?;
            if record.state != RotationState::Planned {
                return Err(RotationError::invalid_plan(format!(
                    "plan '{plan_id}' already executed"
                )));
            }
            record.state = RotationState::Executing;
            record.plan.clone()
        };

        match self.rotate(&plan).await {
            Ok(new_key_id) => {
                tracing::info!(
                    audit.action = "key_rotate",
                    audit.resource = %plan.app_id,
                    audit.result = "success",
                    old_key_id = %plan.old_key_id,
                    new_key_id = %new_key_id,
                    "key rotated",
                );
                Ok(self.settle(plan_id, RotationState::Completed, Some(new_key_id), None))
            },
            Err(err) => {
                tracing::warn!(
                    audit.action = "key_rotate",
                    audit.resource = %plan.app_id,
                    audit.result = "failure",
                    error = %err,
                    "key rotation failed",
                );
                let outcome =
                    self.settle(plan_id, RotationState::Failed, None, Some(err.to_string()));
                if let Some(hook) = &self.failure_hook {
                    hook(&outcome);
                }
                Err(err)
            },
        }
    }

    /// Submits and executes in one call.
    ///
    /// # Errors
    ///
    /// As for [`submit`](Self::submit) and [`execute`](Self::execute).
    pub async fn rotate_now(&self, plan: RotationPlan) -> RotationResult<RotationOutcome> {
        let plan_id = self.submit(plan).await?;
        self.execute(&plan_id).await
    }

    /// Executes several plans concurrently, settling them all.
    ///
    /// Every plan gets an outcome even when siblings fail: errors from
    /// [`execute`](Self::execute) are folded into failed outcomes so one
    /// plan's failure never aborts the rest.
    pub async fn execute_batch(&self, plan_ids: &[String]) -> Vec<RotationOutcome> {
        let executions = plan_ids.iter().map(|plan_id| async move {
            match self.execute(plan_id).await {
                Ok(outcome) => outcome,
                Err(err) => RotationOutcome {
                    plan_id: plan_id.clone(),
                    app_id: String::new(),
                    state: RotationState::Failed,
                    new_key_id: None,
                    error: Some(err.to_string()),
                },
            }
        });
        futures::future::join_all(executions).await
    }

    /// Current outcome of a plan, if registered.
    #[must_use]
    pub fn status(&self, plan_id: &str) -> Option<RotationOutcome> {
        self.plans.read().get(plan_id).map(PlanRecord::outcome)
    }

    /// Whether `key_id` of `app_id` has a plan in flight.
    #[must_use]
    pub fn has_active_plan(&self, app_id: &str, key_id: &str) -> bool {
        self.plans.read().values().any(|r| {
            matches!(r.state, RotationState::Planned | RotationState::Executing)
                && r.plan.app_id == app_id
                && r.plan.old_key_id == key_id
        })
    }

    /// Drops finished plans, returning how many were removed.
    pub fn prune_finished(&self) -> usize {
        let mut plans = self.plans.write();
        let before = plans.len();
        plans.retain(|_, r| {
            matches!(r.state, RotationState::Planned | RotationState::Executing)
        });
        before - plans.len()
    }

    /// Applies one plan's strategy: generate, swap in, retire.
    async fn rotate(&self, plan: &RotationPlan) -> RotationResult<String> {
        let config = self
            .keys
            .get_app_config(&plan.app_id)
            .await?
            .ok_or_else(|| AuthError::AppNotFound { app_id: plan.app_id.clone() })?;
        let old = config
            .find_key(&plan.old_key_id)
            .ok_or_else(|| AuthError::KeyNotFound { kid: plan.old_key_id.clone() })?
            .clone();

        // Generate before touching the key set so a generation failure
        // leaves the app exactly as it was.
        let algorithm = plan.algorithm.unwrap_or(old.algorithm);
        let generated = self.generator.generate(algorithm).await?;
        let new_key = KeyPair::builder()
            .key_id(generated.key_id.clone())
            .public_key(generated.public_pem)
            .private_key(generated.private_pem.to_string())
            .algorithm(algorithm)
            .enabled(plan.strategy != RotationStrategy::Scheduled)
            .build();

        match plan.strategy {
            RotationStrategy::Immediate => {
                self.keys.set_key_pair_enabled(&plan.app_id, &plan.old_key_id, false).await?;
                self.keys.add_key_pair(&plan.app_id, new_key).await?;
            },
            RotationStrategy::Gradual => {
                self.keys.add_key_pair(&plan.app_id, new_key).await?;
                // Validated at submit time.
                let grace = chrono::Duration::from_std(plan.grace_period)
                    .map_err(|_| RotationError::invalid_plan("grace period out of range"))?;
                let mut retiring = old;
                retiring.expires_at = Some(Utc::now() + grace);
                self.keys.update_key_pair(&plan.app_id, retiring).await?;
            },
            RotationStrategy::Scheduled => {
                self.keys.add_key_pair(&plan.app_id, new_key).await?;
            },
        }

        Ok(generated.key_id)
    }

    fn settle(
        &self,
        plan_id: &str,
        state: RotationState,
        new_key_id: Option<String>,
        error: Option<String>,
    ) -> RotationOutcome {
        let mut plans = self.plans.write();
        match plans.get_mut(plan_id) {
            Some(record) => {
                record.state = state;
                record.new_key_id = new_key_id;
                record.error = error;
                record.outcome()
            },
            // Records are never removed while a plan is executing.
            None => RotationOutcome {
                plan_id: plan_id.to_owned(),
                app_id: String::new(),
                state,
                new_key_id,
                error,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_defaults() {
        let plan = RotationPlan::builder().app_id("acme").old_key_id("k1").build();
        assert!(!plan.plan_id.is_empty());
        assert_eq!(plan.strategy, RotationStrategy::Immediate);
        assert_eq!(plan.grace_period, Duration::from_secs(86_400));
        assert!(plan.algorithm.is_none());
    }

    #[test]
    fn test_plan_ids_are_unique() {
        let a = RotationPlan::builder().app_id("acme").old_key_id("k1").build();
        let b = RotationPlan::builder().app_id("acme").old_key_id("k1").build();
        assert_ne!(a.plan_id, b.plan_id);
    }

    #[test]
    fn test_plan_deserializes_with_humantime_grace() {
        let plan: RotationPlan = serde_json::from_str(
            r#"{
                "planId": "p1",
                "appId": "acme",
                "oldKeyId": "k1",
                "strategy": "gradual",
                "gracePeriod": "12h"
            }"#,
        )
        .unwrap();
        assert_eq!(plan.strategy, RotationStrategy::Gradual);
        assert_eq!(plan.grace_period, Duration::from_secs(12 * 3600));
    }

    #[test]
    fn test_strategies_serialize_camel_case() {
        assert_eq!(
            serde_json::to_value(RotationStrategy::Scheduled).unwrap(),
            serde_json::json!("scheduled")
        );
        assert_eq!(
            serde_json::to_value(RotationStrategy::Immediate).unwrap(),
            serde_json::json!("immediate")
        );
    }
}
