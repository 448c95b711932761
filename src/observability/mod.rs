//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured JSON records, one per call)
//!     → metrics.rs (counters for acquires, drift conflicts, shutdown)
//!
//! Consumers:
//!     → Log aggregation (stdout for info, stderr for errors)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Error and Fatal records go to stderr, everything else to stdout
//! - Child loggers own their merged context; parents never leak into them
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

pub use logging::{Logger, LoggerFactory};
