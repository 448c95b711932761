//! Habit Tracker Backend Service Core

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resources;

pub use config::schema::AppConfig;
pub use http::HttpServer;
pub use lifecycle::{GraceEvent, ShutdownOrchestrator, SignalListener};
pub use observability::logging::{Logger, LoggerFactory};
pub use resources::{DriftPolicy, Fingerprint, ResourceCache};
