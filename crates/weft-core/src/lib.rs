//! Execution core of the Weft workflow engine.
//!
//! This crate contains the "brain" of the engine:
//! - `executor` -- work-list scheduler and the activity-instance arena
//! - `bookmark` -- the resumption table behind durable suspension
//! - `extension` -- extension registry and the persistence-participant contract
//! - `timer` -- durable timer extension (restart-safe waits)
//! - `compensation` -- saga token table and protocol bookkeeping
//! - `activities` -- the machinery activities (compensable scope, confirm,
//!   compensate, try/catch, delay)
//! - `host` -- the host-facing workflow instance handle and runtime registry
//! - `event` -- broadcast bus for engine lifecycle events

pub mod activities;
pub mod activity;
pub mod bookmark;
pub mod compensation;
pub mod event;
pub mod executor;
pub mod extension;
pub mod host;
pub mod timer;

pub use activities::{CompensableScope, Compensate, Confirm, Delay, TryCatch};
pub use activity::{Activity, BookmarkResumption, ChildCompletion, FaultDisposition};
pub use compensation::CompensationExtension;
pub use event::EngineEventBus;
pub use executor::context::ActivityContext;
pub use extension::{PersistenceParticipant, WorkflowExtension};
pub use host::{
    InstanceProxy, InstanceSnapshot, InstanceStatus, WorkflowInstance, WorkflowRuntime,
};
pub use timer::DurableTimerExtension;
