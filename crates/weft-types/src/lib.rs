//! Shared domain types for the Weft workflow engine.
//!
//! This crate contains the serializable core of the engine: bookmarks and
//! their tagged resumption callbacks, activity-instance identity and states,
//! the fault taxonomy, compensation token data, durable timer entries,
//! engine events, and runtime configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod bookmark;
pub mod compensation;
pub mod config;
pub mod event;
pub mod fault;
pub mod instance;
pub mod timer;
