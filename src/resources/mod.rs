//! Resource lifecycle subsystem.
//!
//! # Data Flow
//! ```text
//! acquire(fingerprint):
//!     slot hit (same fingerprint) → cached handle, lock-free
//!     slot hit (drift)            → policy: fail-fast conflict | replace + close old
//!     slot miss                   → single-flight init → publish → handle
//!
//! Shutdown:
//!     cleanup hook → close_active() → close hook on the pooled transport
//! ```
//!
//! # Design Decisions
//! - One process-wide slot per cache; the entry is replaced as a unit
//! - Readers never take a lock; a hit is an atomic pointer load
//! - Initialization is guarded per fingerprint, never globally
//! - Close is a capability trait, checked by membership, not shape-probing

pub mod cache;
pub mod database;
pub mod fingerprint;

pub use cache::{CacheError, CacheResource, Closeable, DriftPolicy, ResourceCache};
pub use database::DatabaseHandle;
pub use fingerprint::Fingerprint;
