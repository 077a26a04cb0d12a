//! End-to-end rotation scenarios against an in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use signet_authn::testutil::{test_app_config, test_key_pair};
use signet_authn::{AuthError, KeyManager};
use signet_rotation::{
    GeneratedKey, KeyGenerator, KeyHealth, KeyStatus, LocalKeyGenerator, RotationError,
    RotationManager, RotationPlan, RotationResult, RotationState, RotationStrategy,
};
use signet_storage::{MemoryStore, SignatureAlgorithm};

async fn manager_with_app() -> RotationManager {
    let keys = Arc::new(KeyManager::with_defaults(Arc::new(MemoryStore::new())));
    let key = test_key_pair("key-old", SignatureAlgorithm::Es256);
    keys.add_app(test_app_config("acme", vec![key])).await.unwrap();
    RotationManager::new(keys, Arc::new(LocalKeyGenerator::new()))
}

fn plan(strategy: RotationStrategy) -> RotationPlan {
    RotationPlan::builder().app_id("acme").old_key_id("key-old").strategy(strategy).build()
}

#[tokio::test]
async fn immediate_rotation_disables_the_old_key() {
    let rotation = manager_with_app().await;
    let outcome = rotation.rotate_now(plan(RotationStrategy::Immediate)).await.unwrap();

    assert_eq!(outcome.state, RotationState::Completed);
    let new_key_id = outcome.new_key_id.unwrap();

    let config = rotation.keys().get_app_config("acme").await.unwrap().unwrap();
    let old_key = config.find_key("key-old").unwrap();
    assert!(!old_key.enabled);
    let new_key = config.find_key(&new_key_id).unwrap();
    assert_eq!(new_key.algorithm, SignatureAlgorithm::Es256);
    assert!(new_key.enabled);
    assert!(new_key.private_key.is_some());

    // Only the new key verifies now.
    assert_eq!(config.valid_keys(Utc::now()).len(), 1);
}

#[tokio::test]
async fn gradual_rotation_keeps_the_old_key_through_the_grace_period() {
    let rotation = manager_with_app().await;
    let plan = RotationPlan::builder()
        .app_id("acme")
        .old_key_id("key-old")
        .strategy(RotationStrategy::Gradual)
        .grace_period(Duration::from_secs(3600))
        .build();
    let outcome = rotation.rotate_now(plan).await.unwrap();
    assert_eq!(outcome.state, RotationState::Completed);

    let config = rotation.keys().get_app_config("acme").await.unwrap().unwrap();
    let old = config.find_key("key-old").unwrap();
    let expires_at = old.expires_at.unwrap();
    let remaining = expires_at - Utc::now();
    assert!(remaining > ChronoDuration::minutes(55) && remaining <= ChronoDuration::hours(1));

    // Both keys verify during the overlap.
    let now = Utc::now();
    assert!(old.is_valid(now));
    assert_eq!(config.valid_keys(now).len(), 2);
}

#[tokio::test]
async fn scheduled_rotation_stages_a_disabled_key() {
    let rotation = manager_with_app().await;
    let outcome = rotation.rotate_now(plan(RotationStrategy::Scheduled)).await.unwrap();
    assert_eq!(outcome.state, RotationState::Completed);
    let new_key_id = outcome.new_key_id.unwrap();

    let config = rotation.keys().get_app_config("acme").await.unwrap().unwrap();
    // The old key is untouched; the new one waits for an operator.
    let old_key = config.find_key("key-old").unwrap();
    assert!(old_key.enabled);
    assert!(old_key.expires_at.is_none());
    assert!(!config.find_key(&new_key_id).unwrap().enabled);

    rotation.keys().set_key_pair_enabled("acme", &new_key_id, true).await.unwrap();
    let config = rotation.keys().get_app_config("acme").await.unwrap().unwrap();
    assert_eq!(config.valid_keys(Utc::now()).len(), 2);
}

#[tokio::test]
async fn new_algorithm_can_differ_from_the_old_key() {
    let rotation = manager_with_app().await;
    let plan = RotationPlan::builder()
        .app_id("acme")
        .old_key_id("key-old")
        .algorithm(SignatureAlgorithm::Es512)
        .build();
    let outcome = rotation.rotate_now(plan).await.unwrap();

    let config = rotation.keys().get_app_config("acme").await.unwrap().unwrap();
    let new_key = config.find_key(&outcome.new_key_id.unwrap()).unwrap();
    assert_eq!(new_key.algorithm, SignatureAlgorithm::Es512);
}

#[tokio::test]
async fn submit_rejects_inconsistent_plans() {
    let rotation = manager_with_app().await;

    let unknown_app = RotationPlan::builder().app_id("ghost").old_key_id("key-old").build();
    assert!(matches!(
        rotation.submit(unknown_app).await,
        Err(RotationError::InvalidPlan { .. })
    ));

    let unknown_key = RotationPlan::builder().app_id("acme").old_key_id("ghost").build();
    assert!(matches!(
        rotation.submit(unknown_key).await,
        Err(RotationError::InvalidPlan { .. })
    ));

    let zero_grace = RotationPlan::builder()
        .app_id("acme")
        .old_key_id("key-old")
        .strategy(RotationStrategy::Gradual)
        .grace_period(Duration::ZERO)
        .build();
    assert!(matches!(
        rotation.submit(zero_grace).await,
        Err(RotationError::InvalidPlan { .. })
    ));
}

#[tokio::test]
async fn plans_execute_exactly_once() {
    let rotation = manager_with_app().await;
    let plan_id = rotation.submit(plan(RotationStrategy::Immediate)).await.unwrap();

    let duplicate = RotationPlan::builder()
        .plan_id(plan_id.clone())
        .app_id("acme")
        .old_key_id("key-old")
        .build();
    assert!(matches!(
        rotation.submit(duplicate).await,
        Err(RotationError::InvalidPlan { .. })
    ));

    rotation.execute(&plan_id).await.unwrap();
    assert!(matches!(
        rotation.execute(&plan_id).await,
        Err(RotationError::InvalidPlan { .. })
    ));
    assert!(matches!(
        rotation.execute("no-such-plan").await,
        Err(RotationError::InvalidPlan { .. })
    ));
}

struct BrokenGenerator;

#[async_trait]
impl KeyGenerator for BrokenGenerator {
    async fn generate(&self, _algorithm: SignatureAlgorithm) -> RotationResult<GeneratedKey> {
        Err(RotationError::generation("hsm offline"))
    }
}

#[tokio::test]
async fn failed_generation_keeps_the_old_key_and_fires_the_hook() {
    let keys = Arc::new(KeyManager::with_defaults(Arc::new(MemoryStore::new())));
    let key = test_key_pair("key-old", SignatureAlgorithm::Es256);
    keys.add_app(test_app_config("acme", vec![key])).await.unwrap();

    let hook_fired = Arc::new(AtomicUsize::new(0));
    let counter = hook_fired.clone();
    let rotation = RotationManager::new(keys.clone(), Arc::new(BrokenGenerator))
        .with_failure_hook(move |outcome| {
            assert_eq!(outcome.state, RotationState::Failed);
            counter.fetch_add(1, Ordering::SeqCst);
        });

    let plan_id = rotation.submit(plan(RotationStrategy::Immediate)).await.unwrap();
    let err = rotation.execute(&plan_id).await.unwrap_err();
    assert!(matches!(err, RotationError::Generation { .. }));
    assert_eq!(hook_fired.load(Ordering::SeqCst), 1);

    let status = rotation.status(&plan_id).unwrap();
    assert_eq!(status.state, RotationState::Failed);
    assert!(status.error.unwrap().contains("hsm offline"));

    // The app still holds its original key, untouched.
    let config = keys.get_app_config("acme").await.unwrap().unwrap();
    let old_key = config.find_key("key-old").unwrap();
    assert!(old_key.enabled);
    assert_eq!(config.key_pairs.len(), 1);
}

#[tokio::test]
async fn batch_execution_settles_every_plan() {
    let keys = Arc::new(KeyManager::with_defaults(Arc::new(MemoryStore::new())));
    for app in ["app-a", "app-b"] {
        let key = test_key_pair("key-old", SignatureAlgorithm::Es256);
        keys.add_app(test_app_config(app, vec![key])).await.unwrap();
    }
    let rotation = RotationManager::new(keys, Arc::new(LocalKeyGenerator::new()));

    let mut plan_ids = Vec::new();
    for app in ["app-a", "app-b"] {
        let plan = RotationPlan::builder().app_id(app).old_key_id("key-old").build();
        plan_ids.push(rotation.submit(plan).await.unwrap());
    }
    plan_ids.push("no-such-plan".to_owned());

    let outcomes = rotation.execute_batch(&plan_ids).await;
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].state, RotationState::Completed);
    assert_eq!(outcomes[1].state, RotationState::Completed);
    assert_eq!(outcomes[2].state, RotationState::Failed);
    assert!(outcomes[2].error.as_deref().unwrap().contains("unknown plan"));
}

#[tokio::test]
async fn status_tracks_the_plan_lifecycle_and_pruning() {
    let rotation = manager_with_app().await;
    let plan_id = rotation.submit(plan(RotationStrategy::Immediate)).await.unwrap();
    assert_eq!(rotation.status(&plan_id).unwrap().state, RotationState::Planned);
    assert!(rotation.has_active_plan("acme", "key-old"));

    rotation.execute(&plan_id).await.unwrap();
    assert_eq!(rotation.status(&plan_id).unwrap().state, RotationState::Completed);
    assert!(!rotation.has_active_plan("acme", "key-old"));

    assert_eq!(rotation.prune_finished(), 1);
    assert!(rotation.status(&plan_id).is_none());
}

#[tokio::test]
async fn health_report_flags_pending_rotation() {
    let rotation = manager_with_app().await;
    rotation.submit(plan(RotationStrategy::Immediate)).await.unwrap();

    let reports = rotation.report_app("acme").await.unwrap();
    assert_eq!(reports.len(), 1);
    // A plan in flight floors an otherwise healthy key at warning.
    assert_eq!(reports[0].status, KeyStatus::PendingRotation);
    assert_eq!(reports[0].health, KeyHealth::Warning);

    assert!(matches!(
        rotation.report_app("ghost").await,
        Err(RotationError::Auth(AuthError::AppNotFound { .. }))
    ));
}

#[tokio::test]
async fn report_all_covers_every_app() {
    let keys = Arc::new(KeyManager::with_defaults(Arc::new(MemoryStore::new())));
    for app in ["app-a", "app-b"] {
        let key = test_key_pair("key-old", SignatureAlgorithm::Es256);
        keys.add_app(test_app_config(app, vec![key])).await.unwrap();
    }
    let rotation = RotationManager::new(keys, Arc::new(LocalKeyGenerator::new()));

    let reports = rotation.report_all().await.unwrap();
    assert_eq!(reports.len(), 2);
}

#[tokio::test]
async fn cleanup_removes_expired_keys_but_never_the_last_one() {
    let keys = Arc::new(KeyManager::with_defaults(Arc::new(MemoryStore::new())));
    let mut expired = test_key_pair("key-expired", SignatureAlgorithm::Es256);
    expired.expires_at = Some(Utc::now() - ChronoDuration::days(1));
    let live = test_key_pair("key-live", SignatureAlgorithm::Es256);
    keys.add_app(test_app_config("acme", vec![expired, live])).await.unwrap();

    let rotation = RotationManager::new(keys.clone(), Arc::new(LocalKeyGenerator::new()));
    let summary = rotation.cleanup_expired_keys("acme").await.unwrap();
    assert_eq!(summary.removed, vec!["key-expired"]);
    assert!(summary.disabled.is_empty());

    // Now the only remaining key expires; cleanup must disable, not remove.
    let mut last = keys
        .get_app_config("acme")
        .await
        .unwrap()
        .unwrap()
        .find_key("key-live")
        .unwrap()
        .clone();
    last.expires_at = Some(Utc::now() - ChronoDuration::days(1));
    keys.update_key_pair("acme", last).await.unwrap();

    let summary = rotation.cleanup_expired_keys("acme").await.unwrap();
    assert!(summary.removed.is_empty());
    assert_eq!(summary.disabled, vec!["key-live"]);

    let config = keys.get_app_config("acme").await.unwrap().unwrap();
    let key = config.find_key("key-live").unwrap();
    assert!(!key.enabled);
}

#[tokio::test]
async fn rotated_key_signs_verifiable_requests() {
    let rotation = manager_with_app().await;
    let outcome = rotation.rotate_now(plan(RotationStrategy::Immediate)).await.unwrap();
    let new_key_id = outcome.new_key_id.unwrap();

    let config = rotation.keys().get_app_config("acme").await.unwrap().unwrap();
    let key = config.find_key(&new_key_id).unwrap();
    let private = key.private_key.as_ref().unwrap();

    let signature = signet_authn::sign("canonical", private, key.algorithm).unwrap();
    assert!(signet_authn::verify("canonical", &signature, &key.public_key, key.algorithm));
}
