//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Triggers (signals.rs):
//!     SIGINT/SIGTERM/SIGHUP → GraceEvent
//!     fault channel / panic hook → GraceEvent
//!
//! Shutdown (orchestrator.rs):
//!     first event → Draining: stop accepting, run cleanup under deadline
//!     repeat within 500ms → duplicate, ignored
//!     repeat after 500ms → escalation, forced exit
//!     cleanup settled or deadline → Terminated: process exit
//! ```
//!
//! # Design Decisions
//! - State advances strictly forward: Running → Draining → Terminated
//! - Cleanup runs at most once, guarded by one atomic transition
//! - The deadline timer is the only thing allowed to preempt a stuck cleanup
//! - Exit status: 0 for a graceful signal path, 1 for faults and all
//!   failed or forced paths

pub mod event;
pub mod orchestrator;
pub mod process;
pub mod signals;

pub use event::{GraceEvent, TriggerKind};
pub use orchestrator::{
    CleanupError, RegisterOptions, ShutdownOrchestrator, ShutdownState, DEBOUNCE_WINDOW,
};
pub use process::{OsProcess, ProcessControl};
pub use signals::{FaultReporter, SignalListener};
