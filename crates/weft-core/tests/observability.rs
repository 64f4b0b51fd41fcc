//! Subscriber wiring over a real workflow run.

mod common;

use common::{entries, new_log, Record, Sequence};
use weft_core::{InstanceStatus, WorkflowInstance};
use weft_observe::tracing_setup::{init_tracing, LogFormat, TracingOptions};
use weft_types::instance::WorkflowOutcome;

#[test]
fn subscriber_installs_once_and_captures_a_run() {
    let _telemetry = init_tracing(TracingOptions::default()).expect("first install");

    // One global subscriber per process; a second call reports the
    // conflict instead of silently replacing it.
    assert!(init_tracing(TracingOptions {
        format: LogFormat::Json,
        export_spans: false,
    })
    .is_err());

    // Drive a workflow under the subscriber so the pump and dispatch
    // spans run end to end.
    let log = new_log();
    let root = Sequence::new(
        "root",
        vec![Record::new("a", &log), Record::new("b", &log)],
    );
    let instance = WorkflowInstance::new(root);
    assert_eq!(
        instance.run(),
        InstanceStatus::Complete(WorkflowOutcome::Completed)
    );
    assert_eq!(entries(&log), vec!["a", "b"]);
}

#[test]
fn attribute_keys_are_stable() {
    use weft_observe::wf_attrs;

    // Exported trace consumers key on these names; renames are breaking.
    assert_eq!(wf_attrs::WF_INSTANCE_ID, "wf.instance.id");
    assert_eq!(wf_attrs::WF_ACTIVITY_OUTCOME, "wf.activity.outcome");
    assert_eq!(wf_attrs::WF_BOOKMARK_STATUS, "wf.bookmark.status");
    assert_eq!(wf_attrs::WF_FAULT_CODE, "wf.fault.code");
}
