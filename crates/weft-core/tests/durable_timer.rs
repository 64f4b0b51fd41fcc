//! Durable timer scenarios with a real clock. Margins are generous on
//! purpose: these assert ordering against absolute due instants, not
//! precise latencies.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{entries, new_log, PersistPoint, Record, Sequence};
use weft_core::{
    timer::KEY_TIMER_TABLE, Delay, DurableTimerExtension, InstanceStatus, WorkflowInstance,
};
use weft_types::instance::WorkflowOutcome;
use weft_types::timer::TimerEntry;

async fn wait_for_outcome(
    instance: &WorkflowInstance,
    limit: Duration,
) -> Option<WorkflowOutcome> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(outcome) = instance.outcome() {
            return Some(outcome);
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn delay_fires_and_completes_the_workflow() {
    let log = new_log();
    let root = Sequence::new(
        "root",
        vec![
            Arc::new(Delay::from_millis(50)),
            Record::new("after", &log),
        ],
    );
    let instance = WorkflowInstance::new(root);
    let timer = instance.add_extension(Arc::new(DurableTimerExtension::new()));
    assert_eq!(instance.run(), InstanceStatus::Idle);
    assert_eq!(timer.pending(), 1);

    let outcome = wait_for_outcome(&instance, Duration::from_secs(5)).await;
    assert_eq!(outcome, Some(WorkflowOutcome::Completed));
    assert_eq!(entries(&log), vec!["after"]);
    assert_eq!(timer.pending(), 0);
}

#[tokio::test]
async fn canceled_delay_never_fires() {
    let root = Arc::new(Delay::from_millis(100));
    let instance = WorkflowInstance::new(root);
    let timer = instance.add_extension(Arc::new(DurableTimerExtension::new()));
    assert_eq!(instance.run(), InstanceStatus::Idle);

    instance.cancel();
    assert_eq!(
        instance.run(),
        InstanceStatus::Complete(WorkflowOutcome::Canceled)
    );
    assert_eq!(timer.pending(), 0);

    // Past the original due instant, the outcome is unchanged.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(instance.outcome(), Some(WorkflowOutcome::Canceled));
}

#[tokio::test]
async fn restored_timer_fires_at_the_original_due_instant() {
    let start = Instant::now();
    let root = Arc::new(Delay::from_millis(600));
    let instance = WorkflowInstance::new(root);
    let timer = instance.add_extension(Arc::new(DurableTimerExtension::new()));
    assert_eq!(instance.run(), InstanceStatus::Idle);

    // Round-trip the snapshot through disk the way a durable host would.
    let snapshot = instance.prepare_snapshot().expect("snapshot");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("snapshot.json");
    std::fs::write(&path, serde_json::to_vec(&snapshot).expect("encode")).expect("write");

    let raw = std::fs::read(&path).expect("read");
    let restored: weft_core::InstanceSnapshot = serde_json::from_slice(&raw).expect("decode");
    let table: Vec<TimerEntry> =
        serde_json::from_value(restored.values[KEY_TIMER_TABLE].clone()).expect("timer table");
    assert_eq!(table.len(), 1);

    // Simulate losing the in-memory arm; the snapshot keeps the entry.
    assert!(timer.cancel_timer(table[0].bookmark).expect("cancel"));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(instance.outcome(), None);

    instance.apply_snapshot(&restored).expect("restore");
    let outcome = wait_for_outcome(&instance, Duration::from_secs(5)).await;
    assert_eq!(outcome, Some(WorkflowOutcome::Completed));

    // Fired relative to the original due instant, not the restore point
    // (restore at ~150ms + a fresh 600ms wait would be ~750ms).
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(550), "fired early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(740), "fired late: {elapsed:?}");
}

#[tokio::test]
async fn suspended_instance_retries_until_activated() {
    let log = new_log();
    let root = Sequence::new(
        "root",
        vec![
            Arc::new(Delay::from_millis(30)),
            Record::new("after", &log),
        ],
    );
    let instance = WorkflowInstance::new(root);
    instance.add_extension(Arc::new(DurableTimerExtension::with_retry_interval(
        Duration::from_millis(20),
    )));
    assert_eq!(instance.run(), InstanceStatus::Idle);

    instance.suspend();
    tokio::time::sleep(Duration::from_millis(120)).await;
    // The timer keeps retrying against the suspended host.
    assert_eq!(instance.outcome(), None);

    instance.activate();
    let outcome = wait_for_outcome(&instance, Duration::from_secs(5)).await;
    assert_eq!(outcome, Some(WorkflowOutcome::Completed));
    assert_eq!(entries(&log), vec!["after"]);
}

#[tokio::test]
async fn timer_fire_pumps_past_a_persistence_pause() {
    let log = new_log();
    let root = Sequence::new(
        "root",
        vec![
            Arc::new(Delay::from_millis(20)),
            PersistPoint::new(),
            Record::new("after", &log),
        ],
    );
    let instance = WorkflowInstance::new(root);
    instance.add_extension(Arc::new(DurableTimerExtension::new()));
    assert_eq!(instance.run(), InstanceStatus::Idle);

    // The fire resumes through the proxy, which has no host to hand a
    // snapshot to; it pumps straight past the pause to completion.
    let outcome = wait_for_outcome(&instance, Duration::from_secs(5)).await;
    assert_eq!(outcome, Some(WorkflowOutcome::Completed));
    assert_eq!(entries(&log), vec!["after"]);
}

#[tokio::test]
async fn rebuffed_fire_keeps_the_entry_in_the_table() {
    let log = new_log();
    let root = Sequence::new(
        "root",
        vec![
            Arc::new(Delay::from_millis(20)),
            Record::new("after", &log),
        ],
    );
    let instance = WorkflowInstance::new(root);
    let timer = instance.add_extension(Arc::new(DurableTimerExtension::with_retry_interval(
        Duration::from_millis(5),
    )));
    assert_eq!(instance.run(), InstanceStatus::Idle);

    instance.suspend();
    tokio::time::sleep(Duration::from_millis(60)).await;

    // The due instant passed and every fire attempt comes back NotReady.
    // The entry must stay visible between retries, at every sample point,
    // or a snapshot taken at the wrong moment loses the timer.
    let deadline = Instant::now() + Duration::from_millis(100);
    while Instant::now() < deadline {
        assert_eq!(timer.pending(), 1);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let snapshot = instance.prepare_snapshot().expect("snapshot");
    let table: Vec<TimerEntry> =
        serde_json::from_value(snapshot.values[KEY_TIMER_TABLE].clone()).expect("timer table");
    assert_eq!(table.len(), 1);
    assert!(table[0].retry);

    instance.activate();
    let outcome = wait_for_outcome(&instance, Duration::from_secs(5)).await;
    assert_eq!(outcome, Some(WorkflowOutcome::Completed));
    assert_eq!(entries(&log), vec!["after"]);
}
