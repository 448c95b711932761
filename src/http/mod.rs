//! HTTP hosting layer.
//!
//! # Responsibilities
//! - Build the Axum router and middleware stack
//! - Give every request an ID and a request-scoped logger
//! - Stop accepting new connections when the drain notification fires
//!
//! # Design Decisions
//! - Route handlers, schema validation and the relational layer live
//!   upstream; their contract with this crate is acquire() plus the
//!   registered cleanup hook
//! - In-flight requests get the drain deadline to finish; new ones are
//!   refused as soon as draining begins

pub mod request;
pub mod server;

pub use server::{AppState, HttpServer};
