//! Observability for the Weft workflow engine.
//!
//! - `tracing_setup` -- subscriber initialization with optional
//!   OpenTelemetry export
//! - `wf_attrs` -- span attribute name constants for workflow
//!   instrumentation

pub mod tracing_setup;
pub mod wf_attrs;
