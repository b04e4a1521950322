//! End-to-end tests of the open and forced-rebuild protocol.

use explore_core::{
    Collection, CoreError, DatasetIdentity, DatasetOrigin, HandleState, VersionConfig,
};
use explore_testkit::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const UPDATE_TIMESTAMP: i64 = 1_700_000_000_000;

/// A data directory that already serves `base_<ts>` with a few rows.
fn steady_state(timestamp: i64) -> ControllerHarness {
    let env = TestEnv::with_seed(5, 5);
    let identity = DatasetIdentity::from_timestamp(timestamp);
    env.write_dataset(&identity, 10, 3);

    let harness = ControllerHarness::new(env);
    harness.version.set_active_identity(identity).unwrap();
    harness
}

#[test]
fn first_run_promotes_seed_under_default_identity() {
    let harness = ControllerHarness::new(TestEnv::with_seed(8, 2));

    let handle = harness.controller.open().unwrap();

    assert_eq!(harness.source.preload_calls(), 1);
    assert!(harness.active_identity().is_seed());
    assert!(handle.identity().is_seed());
    assert_eq!(handle.origin(), DatasetOrigin::Seed);
    assert_eq!(handle.count(Collection::Merchant).unwrap(), 8);
    assert_eq!(handle.count(Collection::Atm).unwrap(), 2);
    assert!(harness.env.dataset_path("base").exists());
    assert!(!harness.env.staged_path().exists());
}

#[test]
fn first_run_materializes_before_validation() {
    let harness = ControllerHarness::new(TestEnv::with_seed(1, 1));
    harness.controller.open().unwrap();

    let base = harness.env.dataset_path("base");
    assert_eq!(
        harness.engine.events(),
        vec![
            EngineEvent::OpenFromStream(base.clone()),
            EngineEvent::Materialize(base),
            EngineEvent::Count(Collection::Merchant),
            EngineEvent::Count(Collection::Atm),
        ]
    );
}

#[test]
fn steady_state_touches_nothing() {
    let harness = steady_state(UPDATE_TIMESTAMP);

    let handle = harness.controller.open().unwrap();

    assert_eq!(handle.identity().as_str(), "base_1700000000000");
    assert_eq!(handle.origin(), DatasetOrigin::Existing);
    assert_eq!(harness.active_identity().as_str(), "base_1700000000000");
    assert_eq!(harness.source.preload_calls(), 0);
    assert!(harness.source.deleted_paths().is_empty());
    assert_eq!(harness.source.finalize_calls(), 0);
    assert!(!harness
        .engine
        .events()
        .iter()
        .any(|e| matches!(e, EngineEvent::Materialize(_))));
}

#[test]
fn successful_update_is_promoted_and_finalized() {
    let harness = steady_state(1_600_000_000_000);
    let old = harness.env.dataset_path("base_1600000000000");
    harness.env.stage(UPDATE_TIMESTAMP, 120, 34);

    let handle = harness.controller.open().unwrap();

    assert!(!old.exists());
    assert_eq!(harness.active_identity().as_str(), "base_1700000000000");
    assert_eq!(handle.identity().as_str(), "base_1700000000000");
    assert_eq!(handle.origin(), DatasetOrigin::StagedUpdate);
    assert!(harness
        .engine
        .events()
        .contains(&EngineEvent::OpenFromStream(
            harness.env.dataset_path("base_1700000000000")
        )));

    let validation = handle.validation().unwrap();
    assert_eq!(validation.merchant_count, 120);
    assert_eq!(validation.cash_point_count, 34);

    assert_eq!(harness.source.finalize_calls(), 1);
    assert!(!harness.env.pending_marker_path().exists());
    assert!(!harness.env.staged_path().exists());
    assert_eq!(
        harness.source.deleted_paths(),
        vec![old, harness.env.staged_path()]
    );
}

#[test]
fn empty_update_is_accepted_without_finalize() {
    let harness = steady_state(1_600_000_000_000);
    harness.env.stage(UPDATE_TIMESTAMP, 0, 0);

    let handle = harness.controller.open().unwrap();

    assert_eq!(handle.state(), HandleState::Active);
    assert_eq!(handle.count(Collection::Merchant).unwrap(), 0);
    assert_eq!(harness.source.finalize_calls(), 0);
    assert!(harness.env.pending_marker_path().exists());
    assert!(!harness.env.staged_path().exists());
    // No rollback to the previous dataset.
    assert_eq!(harness.active_identity().as_str(), "base_1700000000000");
    assert!(!harness.env.dataset_path("base_1600000000000").exists());
}

#[test]
fn half_empty_update_is_not_finalized() {
    let harness = steady_state(1_600_000_000_000);
    harness.env.stage(UPDATE_TIMESTAMP, 40, 0);

    let handle = harness.controller.open().unwrap();

    assert!(!handle.validation().unwrap().is_complete());
    assert_eq!(harness.source.finalize_calls(), 0);
    assert!(!harness.env.staged_path().exists());
}

#[test]
fn forced_rebuild_picks_up_new_update() {
    let harness = steady_state(1_600_000_000_000);
    let old = harness.controller.open().unwrap();

    harness.env.stage(UPDATE_TIMESTAMP, 12, 6);
    let new = harness.controller.force_update().unwrap();

    assert_eq!(old.state(), HandleState::Closed);
    assert!(!old.is_current());
    assert_eq!(new.identity().as_str(), "base_1700000000000");
    assert!(new.is_current());
    assert!(Arc::ptr_eq(&new, &harness.controller.active().unwrap()));
    assert_eq!(harness.source.finalize_calls(), 1);
    assert!(harness
        .engine
        .events()
        .contains(&EngineEvent::Close(harness.env.dataset_path("base_1600000000000"))));
}

#[test]
fn superseded_handle_queries_fail() {
    let harness = steady_state(1_600_000_000_000);
    let old = harness.controller.open().unwrap();
    harness.controller.force_update().unwrap();

    assert!(matches!(
        old.merchants(),
        Err(CoreError::DatasetClosed | CoreError::StaleHandle { .. })
    ));
    assert!(matches!(
        old.count(Collection::Atm),
        Err(CoreError::DatasetClosed | CoreError::StaleHandle { .. })
    ));
}

#[test]
fn concurrent_first_access_builds_one_handle() {
    let harness = ControllerHarness::with_source(TestEnv::with_seed(3, 3), |source| {
        source.with_preload_delay(Duration::from_millis(50))
    });

    let handles: Vec<_> = thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| harness.controller.open().unwrap()))
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(harness.source.preload_calls(), 1);
    for handle in &handles[1..] {
        assert!(Arc::ptr_eq(&handles[0], handle));
    }
}

#[test]
fn corrupt_staged_update_is_fatal_and_removed() {
    let harness = steady_state(1_600_000_000_000);
    let mut bytes = image_bytes(UPDATE_TIMESTAMP, 4, 4);
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0xa5;
    harness.env.stage_bytes(&bytes);

    let result = harness.controller.open();

    assert!(matches!(result, Err(CoreError::StagedCorrupt { .. })));
    assert!(result.unwrap_err().is_fatal());
    assert!(!harness.env.staged_path().exists());
    assert!(harness.controller.active().is_none());
    assert_eq!(harness.source.finalize_calls(), 0);
}

#[test]
fn unreadable_staged_header_is_fatal_and_removed() {
    let harness = steady_state(1_600_000_000_000);
    harness.env.stage_bytes(b"PK\x03\x04");

    let result = harness.controller.open();

    assert!(matches!(result, Err(CoreError::StagedCorrupt { .. })));
    assert!(!harness.env.staged_path().exists());
    // The header is checked before the active dataset is touched.
    assert!(harness.env.dataset_path("base_1600000000000").exists());
    assert_eq!(harness.active_identity().as_str(), "base_1600000000000");
}

#[test]
fn open_after_corrupt_update_falls_back_to_seed() {
    let harness = steady_state(1_600_000_000_000);
    let mut bytes = image_bytes(UPDATE_TIMESTAMP, 4, 4);
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    harness.env.stage_bytes(&bytes);
    assert!(harness.controller.open().is_err());

    let handle = harness.controller.open().unwrap();

    assert_eq!(handle.origin(), DatasetOrigin::Seed);
    assert!(harness.active_identity().is_seed());
    assert_eq!(handle.count(Collection::Merchant).unwrap(), 5);
}

#[test]
fn missing_seed_is_fatal() {
    let harness = ControllerHarness::new(TestEnv::without_seed());

    let result = harness.controller.open();

    assert!(matches!(result, Err(CoreError::SeedUnavailable { .. })));
    assert!(harness.controller.active().is_none());
    assert_eq!(harness.source.preload_calls(), 1);
}

#[test]
fn failed_deletes_do_not_fail_open() {
    let env = TestEnv::with_seed(5, 5);
    let identity = DatasetIdentity::from_timestamp(1_600_000_000_000);
    env.write_dataset(&identity, 10, 3);
    let harness = ControllerHarness::with_source(env, |source| source.with_failing_deletes());
    harness.version.set_active_identity(identity).unwrap();
    harness.env.stage(UPDATE_TIMESTAMP, 7, 7);

    let handle = harness.controller.open().unwrap();

    assert_eq!(handle.identity().as_str(), "base_1700000000000");
    assert_eq!(harness.source.deleted_paths().len(), 2);
    assert_eq!(harness.source.finalize_calls(), 1);
}

#[test]
fn open_is_idempotent() {
    let harness = steady_state(UPDATE_TIMESTAMP);
    let first = harness.controller.open().unwrap();
    harness.clear_recordings();

    let second = harness.controller.open().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(harness.source.calls().is_empty());
    assert!(harness.engine.events().is_empty());
}

#[tokio::test]
async fn open_async_runs_protocol() {
    let harness = ControllerHarness::new(TestEnv::with_seed(2, 2));

    let handle = Arc::clone(&harness.controller).open_async().await.unwrap();

    assert!(handle.identity().is_seed());
    assert_eq!(harness.source.preload_calls(), 1);
}
