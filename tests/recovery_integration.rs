//! Integration tests for crash recovery
//!
//! A relaunched service that is started without a session id must resume the
//! persisted session into the same file, keep its original start time, and
//! never write a second header.

mod common;

use chrono::Utc;
use common::builders::RigBuilder;
use common::{header_count, line_count};
use imu_recorder::{ErrorKind, SessionRecord, SessionState, StartOutcome};

#[test]
fn test_resume_after_relaunch_appends_to_same_file() {
    let mut rig = RigBuilder::new().build();
    rig.deliver([0.0, 0.0, 9.81], [0.0; 3]);

    let started = rig.service().start_session("r1", 50).unwrap();
    rig.tick(30);

    // In-process teardown flushes the buffer but keeps the record
    rig.relaunch();
    let path = rig.session_path("r1");
    assert_eq!(line_count(&path), 31);
    assert!(rig.store().exists());
    assert!(!rig.lease.is_held());

    let resumed = rig.service().resume(50).unwrap();
    let StartOutcome::Resumed(info) = &resumed else {
        panic!("expected a resumed session, got {:?}", resumed);
    };
    assert_eq!(info.session_id, "r1");
    assert_eq!(info.file_path, path);
    assert!(info.resumed);
    assert_eq!(
        info.started_at.timestamp_millis(),
        started.info().started_at.timestamp_millis()
    );
    assert!(rig.lease.is_held());

    rig.tick(10);
    rig.service().stop().unwrap();
    assert_eq!(line_count(&path), 41);
    assert_eq!(header_count(&path), 1);
    assert!(!rig.store().exists());
}

#[test]
fn test_resume_after_kill_loses_only_buffered_rows() {
    let mut rig = RigBuilder::new().buffer_capacity(10).build();
    rig.service().start_session("k1", 50).unwrap();
    rig.tick(15);

    // Ten rows were flushed, five were still in memory
    rig.kill_and_relaunch();
    let path = rig.session_path("k1");
    assert_eq!(line_count(&path), 11);

    let resumed = rig.service().resume(50).unwrap();
    assert!(matches!(resumed, StartOutcome::Resumed(ref info) if info.session_id == "k1"));
    assert_eq!(rig.service().state(), SessionState::Recording);

    rig.service().stop().unwrap();
    assert_eq!(line_count(&path), 11);
    assert_eq!(header_count(&path), 1);
}

#[test]
fn test_resume_without_record_fails() {
    let rig = RigBuilder::new().build();

    let err = rig.service().resume(50).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RecoveryFailure);
    assert_eq!(rig.service().state(), SessionState::Idle);
    assert_eq!(rig.wake.acquires(), 0);
    assert_eq!(rig.service().current_session_file_path(), None);
    assert_eq!(
        rig.service().last_fault().map(|f| f.kind),
        Some(ErrorKind::RecoveryFailure)
    );
}

#[test]
fn test_stopped_session_cannot_be_resumed() {
    let mut rig = RigBuilder::new().build();
    rig.service().start_session("done", 50).unwrap();
    rig.tick(5);
    rig.service().stop().unwrap();

    rig.relaunch();
    let err = rig.service().resume(50).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RecoveryFailure);
}

#[test]
fn test_corrupt_record_fails_recovery() {
    let rig = RigBuilder::new().build();
    std::fs::write(rig.store().path(), "{\"sessionId\": ").unwrap();

    let err = rig.service().resume(50).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RecoveryFailure);
    assert_eq!(rig.wake.acquires(), 0);
}

#[test]
fn test_record_written_in_camel_case() {
    let rig = RigBuilder::new().build();
    rig.service().start_session("json", 50).unwrap();

    let raw = std::fs::read_to_string(rig.store().path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["sessionId"], "json");
    assert!(value["startTimeMillis"].as_i64().unwrap() > 0);
    assert_eq!(
        value["filePath"].as_str().map(std::path::PathBuf::from),
        Some(rig.session_path("json"))
    );
}

#[test]
fn test_resume_uses_recorded_file_location() {
    let mut rig = RigBuilder::new().build();
    let moved = rig.data_dir().join("moved").join("sensor_data_away.csv");
    let record = SessionRecord::new("away", Utc::now(), moved.clone());
    rig.store().persist(&record).unwrap();

    rig.service().resume(50).unwrap();
    assert_eq!(rig.service().current_session_file_path(), Some(moved.clone()));

    rig.tick(3);
    rig.service().stop().unwrap();
    assert_eq!(line_count(&moved), 4);
}

#[test]
fn test_resume_while_recording_keeps_session() {
    let mut rig = RigBuilder::new().build();
    rig.service().start_session("live", 50).unwrap();
    rig.tick(2);

    let again = rig.service().resume(50).unwrap();
    assert!(matches!(again, StartOutcome::AlreadyRecording(ref info) if info.session_id == "live"));
    assert_eq!(rig.wake.acquires(), 1);
}

#[test]
fn test_reopening_session_writes_header_once() {
    let mut rig = RigBuilder::new().build();
    for _ in 0..3 {
        let outcome = rig.service().start_session("again", 50).unwrap();
        assert!(matches!(outcome, StartOutcome::Started(_)));
        rig.tick(5);
        rig.service().stop().unwrap();
    }

    let path = rig.session_path("again");
    assert_eq!(line_count(&path), 16);
    assert_eq!(header_count(&path), 1);
}

#[test]
fn test_failed_resume_keeps_record() {
    let rig = RigBuilder::new().build();
    // The recorded directory cannot be created
    let blocker = rig.data_dir().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let record = SessionRecord::new("stuck", Utc::now(), blocker.join("sensor_data_stuck.csv"));
    rig.store().persist(&record).unwrap();

    let err = rig.service().resume(50).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InitFailure);
    assert_eq!(rig.service().state(), SessionState::Idle);
    assert_eq!(rig.store().load().unwrap(), Some(record));
    assert!(!rig.lease.is_held());
}

#[test]
fn test_resume_drops_row_torn_by_crash() {
    let mut rig = RigBuilder::new().buffer_capacity(1).build();
    let path = rig.session_path("torn");
    std::fs::write(
        &path,
        format!(
            "{}1.000,0.00,0.00,9.81,0.00,0.00,0.00,0.00,0\n2.000,0.0",
            imu_recorder::storage::HEADER
        ),
    )
    .unwrap();
    rig.store()
        .persist(&SessionRecord::new("torn", Utc::now(), path.clone()))
        .unwrap();

    rig.deliver([0.01, 0.02, 9.81], [0.0; 3]);
    rig.service().resume(50).unwrap();
    rig.tick(2);
    rig.service().stop().unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 4);
    assert_eq!(header_count(&path), 1);
    for (n, line) in content.lines().enumerate().skip(1) {
        assert_eq!(line.split(',').count(), 9, "malformed row {}: {}", n, line);
    }
}
