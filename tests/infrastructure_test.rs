//! Test to verify test infrastructure works correctly

mod common;

use common::builders::RigBuilder;
use common::mock_helpers::{FaultPlan, FlakyOpener};
use imu_recorder::storage::LogOpener;
use imu_recorder::SessionState;
use std::time::Duration;

#[test]
fn test_infrastructure_setup() {
    let rig = RigBuilder::new().buffer_capacity(5).build();

    assert_eq!(rig.service().state(), SessionState::Idle);
    assert_eq!(rig.service().data_dir(), rig.data_dir());
    assert_eq!(rig.config.buffer_capacity, 5);
    assert_eq!(rig.store().path(), rig.data_dir().join("session_state.json"));
    assert_eq!(rig.wake.acquires(), 0);
}

#[test]
fn test_manual_ticks_need_a_session() {
    let mut rig = RigBuilder::new().build();
    assert_eq!(rig.tick(3), 0);

    rig.service().start_session("infra", 50).unwrap();
    assert_eq!(rig.tick(3), 3);
}

#[test]
fn test_flaky_opener_injects_failures() {
    let dir = tempfile::tempdir().unwrap();
    let opener = FlakyOpener::default();
    let mut file = opener.open(&dir.path().join("f.csv")).unwrap();

    opener.plan.fail_next_appends(1);
    assert!(file.append(b"lost\n").is_err());
    file.append(b"kept\n").unwrap();
    file.sync().unwrap();

    assert_eq!(std::fs::read_to_string(dir.path().join("f.csv")).unwrap(), "kept\n");
    assert_eq!(opener.plan.appends.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn test_torn_write_leaves_partial_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let opener = FlakyOpener::default();
    let path = dir.path().join("torn.csv");
    let mut file = opener.open(&path).unwrap();

    opener.plan.tear_writes(true);
    opener.plan.fail_next_appends(1);
    assert!(file.append(b"abcdef").is_err());
    assert_eq!(file.size().unwrap(), 3);
}

#[test]
fn test_fault_plan_defaults_are_benign() {
    let plan = FaultPlan::default();
    plan.delay_syncs(Duration::from_millis(10));
    assert_eq!(plan.sync_delay_ms.load(std::sync::atomic::Ordering::SeqCst), 10);
    assert_eq!(plan.failing_appends.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[test]
fn test_wait_until() {
    assert!(common::wait_until(Duration::from_millis(50), || true));
    assert!(!common::wait_until(Duration::from_millis(20), || false));
}

#[test]
fn test_float_comparison() {
    common::assert_float_eq(1.0, 1.0000001, 0.001);
}

#[test]
#[should_panic]
fn test_float_comparison_fails() {
    common::assert_float_eq(1.0, 2.0, 0.001);
}
