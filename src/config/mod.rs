//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     TOML file (optional) → env overrides → validation → AppConfig
//!
//! Reload (watcher.rs):
//!     File change → reload + validate → config update channel →
//!     fingerprint recomputed → ResourceCache drift policy applies
//! ```
//!
//! # Design Decisions
//! - Every section has serde defaults so a partial file is valid
//! - Env overrides (DATABASE_URL, APP_ENV, PORT) win over the file
//! - Validation is a pure function and reports all errors, not just the first
//! - A rejected reload keeps the current configuration in service

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{AppConfig, DatabaseConfig, Environment, RuntimeConfig};
