//! Shared helper activities for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use weft_core::{Activity, ActivityContext, ChildCompletion};
use weft_types::bookmark::BookmarkOptions;
use weft_types::fault::WorkflowFault;
use weft_types::instance::CompletionState;

/// Shared append-only log used to assert execution order.
pub type Log = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Appends its label to the log and closes.
pub struct Record {
    label: String,
    log: Log,
}

impl Record {
    pub fn new(label: impl Into<String>, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            log: log.clone(),
        })
    }
}

impl Activity for Record {
    fn display_name(&self) -> &str {
        &self.label
    }

    fn execute(&self, _ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        self.log.lock().unwrap().push(self.label.clone());
        Ok(())
    }
}

/// Immediately faults with the given code.
pub struct Raise {
    fault: WorkflowFault,
}

impl Raise {
    pub fn new(code: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            fault: WorkflowFault::new(code, message),
        })
    }
}

impl Activity for Raise {
    fn display_name(&self) -> &str {
        "raise"
    }

    fn execute(&self, _ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        Err(self.fault.clone())
    }
}

/// Does nothing and closes.
pub struct NoOp;

impl NoOp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl Activity for NoOp {
    fn display_name(&self) -> &str {
        "no-op"
    }

    fn execute(&self, _ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        Ok(())
    }
}

/// Parks on a named bookmark until the host resumes it.
pub struct WaitFor {
    name: String,
}

impl WaitFor {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { name: name.into() })
    }
}

impl Activity for WaitFor {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        ctx.create_named_bookmark(&self.name, None, 1, None, BookmarkOptions::default())
            .map_err(|e| WorkflowFault::usage(e.to_string()))?;
        Ok(())
    }
}

/// Runs its steps strictly one after another.
///
/// Each step's result is captured into the sequence's property frame as
/// `seq.result.{index}`, where descendants of later steps can read it.
pub struct Sequence {
    name: String,
    steps: Vec<Arc<dyn Activity>>,
}

impl Sequence {
    pub fn new(name: impl Into<String>, steps: Vec<Arc<dyn Activity>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            steps,
        })
    }

    fn schedule_step(&self, ctx: &mut ActivityContext<'_>, index: usize) {
        if let Some(step) = self.steps.get(index) {
            ctx.schedule_activity(step.clone(), Some(index as u32), None);
        }
    }
}

impl Activity for Sequence {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        self.schedule_step(ctx, 0);
        Ok(())
    }

    fn child_completed(
        &self,
        ctx: &mut ActivityContext<'_>,
        child: ChildCompletion,
        tag: u32,
    ) -> Result<(), WorkflowFault> {
        if let Some(result) = child.result {
            ctx.set_property(&format!("seq.result.{tag}"), result);
        }
        if child.outcome != CompletionState::Closed || ctx.is_cancel_requested() {
            // Canceled step or canceled sequence: stop advancing.
            return Ok(());
        }
        self.schedule_step(ctx, tag as usize + 1);
        Ok(())
    }
}

/// Asks the host for a persistence point and closes.
pub struct PersistPoint;

impl PersistPoint {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl Activity for PersistPoint {
    fn display_name(&self) -> &str {
        "persist-point"
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        ctx.request_persist();
        Ok(())
    }
}

/// Runs its body inside a no-persist block, with a persistence point
/// requested up front. The pause may only surface once the body is done
/// and the block has closed.
pub struct NoPersistSection {
    body: Arc<dyn Activity>,
}

impl NoPersistSection {
    pub fn new(body: Arc<dyn Activity>) -> Arc<Self> {
        Arc::new(Self { body })
    }
}

impl Activity for NoPersistSection {
    fn display_name(&self) -> &str {
        "no-persist-section"
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        ctx.enter_no_persist();
        ctx.request_persist();
        ctx.schedule_activity(self.body.clone(), Some(0), None);
        Ok(())
    }

    fn child_completed(
        &self,
        ctx: &mut ActivityContext<'_>,
        _child: ChildCompletion,
        _tag: u32,
    ) -> Result<(), WorkflowFault> {
        ctx.exit_no_persist();
        Ok(())
    }
}

/// Handler that records the fault it was invoked with.
pub struct RecordFault {
    label: String,
    log: Log,
}

impl RecordFault {
    pub fn new(label: impl Into<String>, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            log: log.clone(),
        })
    }
}

impl Activity for RecordFault {
    fn display_name(&self) -> &str {
        &self.label
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), WorkflowFault> {
        let code = ctx
            .argument()
            .cloned()
            .and_then(|v| serde_json::from_value::<WorkflowFault>(v).ok())
            .map(|f| f.code.as_str().to_string())
            .unwrap_or_else(|| "<none>".to_string());
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.label, code));
        Ok(())
    }
}
