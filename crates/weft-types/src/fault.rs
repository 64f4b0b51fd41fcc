//! Fault taxonomy: hierarchical fault codes, workflow faults, and the
//! captured context used for deferred catch-handler selection.
//!
//! Faults replace language exceptions. A fault carries a dot-separated
//! `FaultCode` forming a hierarchy (`weft.usage.argument` is a kind of
//! `weft.usage`), which is what TryCatch handler selection matches on:
//! exact code first, then the first registered handler whose code is an
//! ancestor of the fault's code, in registration order.

use serde::{Deserialize, Serialize};

use crate::instance::InstanceId;

// ---------------------------------------------------------------------------
// FaultCode
// ---------------------------------------------------------------------------

/// Dot-separated hierarchical fault code.
///
/// `a.b` is assignable from `a.b` and from `a.b.c`, but not from `a.bc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaultCode(String);

impl FaultCode {
    /// Create a fault code from a dot-separated path.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The full dot-separated path.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a fault carrying `other` can be handled by a catch declared
    /// for `self`: equal codes, or `self` is a segment-prefix ancestor.
    pub fn is_assignable_from(&self, other: &FaultCode) -> bool {
        if self.0 == other.0 {
            return true;
        }
        other
            .0
            .strip_prefix(&self.0)
            .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl std::fmt::Display for FaultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FaultCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Well-known codes
// ---------------------------------------------------------------------------

/// Root of all engine-raised faults.
pub const CODE_ENGINE: &str = "weft";
/// Invalid-usage runtime errors (recoverable, catchable by TryCatch).
pub const CODE_USAGE: &str = "weft.usage";
/// Invalid or missing argument.
pub const CODE_USAGE_ARGUMENT: &str = "weft.usage.argument";
/// Compensation protocol misuse (no ambient token, wrong state, ...).
pub const CODE_USAGE_COMPENSATION: &str = "weft.usage.compensation";
/// Structural validation failure detected before execution.
pub const CODE_VALIDATION: &str = "weft.validation";
/// Internal invariant violation -- a defect, not user-recoverable.
pub const CODE_INTERNAL: &str = "weft.internal";

// ---------------------------------------------------------------------------
// WorkflowFault
// ---------------------------------------------------------------------------

/// A propagating fault: a code plus a human-readable message.
///
/// Serializable so it can ride inside persisted instance state and inside
/// bookmark payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct WorkflowFault {
    /// Hierarchical fault code used for handler selection.
    pub code: FaultCode,
    /// Human-readable description.
    pub message: String,
}

impl WorkflowFault {
    /// Create a fault with an explicit code.
    pub fn new(code: impl Into<FaultCode>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Invalid-usage fault (`weft.usage`).
    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(CODE_USAGE, message)
    }

    /// Invalid-argument fault (`weft.usage.argument`).
    pub fn argument(name: &str, reason: impl Into<String>) -> Self {
        Self::new(
            CODE_USAGE_ARGUMENT,
            format!("argument '{name}': {}", reason.into()),
        )
    }

    /// Compensation-protocol misuse fault (`weft.usage.compensation`).
    pub fn compensation_usage(message: impl Into<String>) -> Self {
        Self::new(CODE_USAGE_COMPENSATION, message)
    }

    /// Structural validation fault (`weft.validation`).
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(CODE_VALIDATION, message)
    }

    /// Internal invariant violation (`weft.internal`).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CODE_INTERNAL, message)
    }
}

impl From<String> for FaultCode {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// FaultContext
// ---------------------------------------------------------------------------

/// Immutable snapshot of a propagating fault plus the instance that raised
/// it. Lives between fault capture and catch-handler dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultContext {
    /// The fault being propagated.
    pub fault: WorkflowFault,
    /// The instance that originally raised it.
    pub source: InstanceId,
}

impl FaultContext {
    pub fn new(fault: WorkflowFault, source: InstanceId) -> Self {
        Self { fault, source }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_code_is_assignable() {
        let a = FaultCode::new("weft.usage");
        let b = FaultCode::new("weft.usage");
        assert!(a.is_assignable_from(&b));
    }

    #[test]
    fn ancestor_code_is_assignable_from_descendant() {
        let broad = FaultCode::new("weft.usage");
        let narrow = FaultCode::new("weft.usage.argument");
        assert!(broad.is_assignable_from(&narrow));
        assert!(!narrow.is_assignable_from(&broad));
    }

    #[test]
    fn segment_boundary_is_respected() {
        let a = FaultCode::new("weft.usage");
        let lookalike = FaultCode::new("weft.usages");
        assert!(!a.is_assignable_from(&lookalike));
    }

    #[test]
    fn fault_display_contains_code_and_message() {
        let fault = WorkflowFault::argument("duration", "must not be negative");
        assert!(fault.to_string().contains("weft.usage.argument"));
        assert!(fault.to_string().contains("duration"));
    }

    #[test]
    fn fault_roundtrips_through_json() {
        let fault = WorkflowFault::compensation_usage("no ambient token");
        let json = serde_json::to_value(&fault).unwrap();
        let back: WorkflowFault = serde_json::from_value(json).unwrap();
        assert_eq!(back, fault);
    }
}
