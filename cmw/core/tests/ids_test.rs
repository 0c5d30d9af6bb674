//! Identifier and timestamp tests for cmw-core

use core::time::Duration;

use cmw_core::{error_name, glue, ldp, TaskId, Timestamp, NONE_ID};

#[test]
fn test_task_none_sentinel() {
    assert!(TaskId::NONE.is_none());
    assert_eq!(TaskId::NONE.raw(), NONE_ID);
    assert!(!TaskId::new(0).is_none());
    assert_eq!(TaskId::new(3).to_string(), "task#3");
}

#[test]
fn test_timestamp_arithmetic() {
    let t = Timestamp::from_millis(10);
    assert_eq!((t + Duration::from_millis(5)).as_nanos(), 15_000_000);
    assert_eq!(t.saturating_duration_since(Timestamp::from_millis(4)), Duration::from_millis(6));
    assert_eq!(t.saturating_duration_since(Timestamp::from_millis(40)), Duration::ZERO);
}

#[test]
fn test_error_names() {
    assert_eq!(error_name(ldp::SERIAL_OVERFLOW), "SERIAL_OVERFLOW");
    assert_eq!(error_name(glue::FIFOSIZE_OVERFLOW), "FIFOSIZE_OVERFLOW");
    assert_eq!(error_name(0x7777), "UNKNOWN");
}
