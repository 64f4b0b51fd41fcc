//! Structured fault handling scenarios: catch selection, finally
//! ordering, handler faults, rethrow.

mod common;

use std::sync::Arc;

use common::{entries, new_log, Raise, Record, RecordFault, Sequence};
use weft_core::{InstanceStatus, TryCatch, WorkflowInstance};
use weft_types::instance::WorkflowOutcome;

#[test]
fn exact_match_beats_earlier_registered_ancestor() {
    let log = new_log();
    let root = Arc::new(
        TryCatch::new("guard", Raise::new("app.db.timeout", "query timed out"))
            .catch("app", RecordFault::new("broad", &log))
            .catch("app.db.timeout", RecordFault::new("exact", &log)),
    );
    let instance = WorkflowInstance::new(root);
    assert_eq!(
        instance.run(),
        InstanceStatus::Complete(WorkflowOutcome::Completed)
    );
    assert_eq!(entries(&log), vec!["exact:app.db.timeout"]);
}

#[test]
fn first_registered_assignable_wins_without_an_exact_match() {
    let log = new_log();
    // "app" is registered before the more specific "app.db"; registration
    // order decides, not specificity.
    let root = Arc::new(
        TryCatch::new("guard", Raise::new("app.db.timeout", "query timed out"))
            .catch("app", RecordFault::new("broad", &log))
            .catch("app.db", RecordFault::new("narrow", &log)),
    );
    let instance = WorkflowInstance::new(root);
    assert_eq!(
        instance.run(),
        InstanceStatus::Complete(WorkflowOutcome::Completed)
    );
    assert_eq!(entries(&log), vec!["broad:app.db.timeout"]);
}

#[test]
fn assignability_respects_segment_boundaries() {
    let log = new_log();
    // "app.db" must not catch "app.database".
    let root = Arc::new(
        TryCatch::new("guard", Raise::new("app.database", "down"))
            .catch("app.db", RecordFault::new("db", &log)),
    );
    let instance = WorkflowInstance::new(root);
    match instance.run() {
        InstanceStatus::Complete(WorkflowOutcome::Faulted { fault }) => {
            assert_eq!(fault.code.as_str(), "app.database");
        }
        other => panic!("unexpected status: {other:?}"),
    }
    assert!(entries(&log).is_empty());
}

#[test]
fn unmatched_fault_rethrows_after_finally() {
    let log = new_log();
    let root = Arc::new(
        TryCatch::new("guard", Raise::new("sys.io", "disk gone"))
            .catch("app", RecordFault::new("app", &log))
            .with_finally(Record::new("finally", &log)),
    );
    let instance = WorkflowInstance::new(root);
    match instance.run() {
        InstanceStatus::Complete(WorkflowOutcome::Faulted { fault }) => {
            assert_eq!(fault.code.as_str(), "sys.io");
        }
        other => panic!("unexpected status: {other:?}"),
    }
    // Finally ran even though nothing caught the fault.
    assert_eq!(entries(&log), vec!["finally"]);
}

#[test]
fn finally_runs_after_the_handler_on_a_caught_fault() {
    let log = new_log();
    let root = Arc::new(
        TryCatch::new("guard", Raise::new("app.a", "oops"))
            .catch("app", RecordFault::new("handler", &log))
            .with_finally(Record::new("finally", &log)),
    );
    let instance = WorkflowInstance::new(root);
    assert_eq!(
        instance.run(),
        InstanceStatus::Complete(WorkflowOutcome::Completed)
    );
    assert_eq!(entries(&log), vec!["handler:app.a", "finally"]);
}

#[test]
fn finally_runs_on_the_success_path() {
    let log = new_log();
    let root = Arc::new(
        TryCatch::new("guard", Record::new("body", &log))
            .catch("app", RecordFault::new("handler", &log))
            .with_finally(Record::new("finally", &log)),
    );
    let instance = WorkflowInstance::new(root);
    assert_eq!(
        instance.run(),
        InstanceStatus::Complete(WorkflowOutcome::Completed)
    );
    assert_eq!(entries(&log), vec!["body", "finally"]);
}

#[test]
fn faulting_handler_replaces_the_original_fault() {
    let log = new_log();
    let root = Arc::new(
        TryCatch::new("guard", Raise::new("app.a", "first"))
            .catch("app.a", Raise::new("app.b", "handler broke"))
            .with_finally(Record::new("finally", &log)),
    );
    let instance = WorkflowInstance::new(root);
    match instance.run() {
        InstanceStatus::Complete(WorkflowOutcome::Faulted { fault }) => {
            assert_eq!(fault.code.as_str(), "app.b");
        }
        other => panic!("unexpected status: {other:?}"),
    }
    assert_eq!(entries(&log), vec!["finally"]);
}

#[test]
fn nested_try_catch_bubbles_to_the_outer_handler() {
    let log = new_log();
    let inner = Arc::new(
        TryCatch::new("inner", Raise::new("sys.io", "disk gone"))
            .catch("app", RecordFault::new("inner", &log)),
    );
    let root = Arc::new(
        TryCatch::new("outer", inner).catch("sys", RecordFault::new("outer", &log)),
    );
    let instance = WorkflowInstance::new(root);
    assert_eq!(
        instance.run(),
        InstanceStatus::Complete(WorkflowOutcome::Completed)
    );
    assert_eq!(entries(&log), vec!["outer:sys.io"]);
}

#[test]
fn sibling_work_after_a_handled_fault_continues() {
    let log = new_log();
    let guarded = Arc::new(
        TryCatch::new("guard", Raise::new("app.a", "oops"))
            .catch("app", RecordFault::new("handler", &log)),
    );
    let root = Sequence::new("root", vec![guarded, Record::new("tail", &log)]);
    let instance = WorkflowInstance::new(root);
    assert_eq!(
        instance.run(),
        InstanceStatus::Complete(WorkflowOutcome::Completed)
    );
    assert_eq!(entries(&log), vec!["handler:app.a", "tail"]);
}
