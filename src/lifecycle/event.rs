//! Normalized termination triggers.

use std::time::SystemTime;

use crate::observability::logging::ErrorDetail;

/// Where a termination trigger came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// An OS termination signal. Graceful completion exits with status 0.
    Signal,
    /// An unrecoverable fault. The process always exits with status 1.
    Fault,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Signal => "signal",
            TriggerKind::Fault => "fault",
        }
    }
}

/// One detected termination trigger, normalized for the orchestrator.
#[derive(Debug, Clone)]
pub struct GraceEvent {
    pub kind: TriggerKind,
    /// What fired: a signal name, "panic", or a task label.
    pub label: String,
    /// The originating error for fault triggers, kept for log enrichment.
    pub error: Option<ErrorDetail>,
    pub timestamp: SystemTime,
}

impl GraceEvent {
    pub fn signal(label: impl Into<String>) -> Self {
        Self {
            kind: TriggerKind::Signal,
            label: label.into(),
            error: None,
            timestamp: SystemTime::now(),
        }
    }

    pub fn fault(label: impl Into<String>, error: ErrorDetail) -> Self {
        Self {
            kind: TriggerKind::Fault,
            label: label.into(),
            error: Some(error),
            timestamp: SystemTime::now(),
        }
    }

    pub fn is_fault(&self) -> bool {
        self.kind == TriggerKind::Fault
    }
}
