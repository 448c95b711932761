//! Process-wide resource cache keyed by configuration fingerprint.
//!
//! # Responsibilities
//! - Serve the cached handle lock-free on the hot path
//! - Detect configuration drift and apply the configured policy
//! - Guarantee single-flight initialization per fingerprint
//!
//! # Design Decisions
//! - A conflict is a tagged outcome the caller must handle, not a panic
//! - Replaced handles are closed through the capability trait
//! - Concurrent callers of a pending initialization share one future and
//!   observe the same handle or the same failure

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use thiserror::Error;

use crate::observability::metrics;
use crate::resources::Fingerprint;

/// What to do when the cached handle was built from a different fingerprint
/// than the one requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriftPolicy {
    /// Reject the request and keep the existing handle in service.
    FailFast,
    /// Build a new handle, swap it in and close the old one.
    Replace,
}

/// Close capability for cached resources that hold live connections.
pub trait Closeable: Send + Sync {
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// A resource the cache can own.
///
/// Resources that hold something worth releasing opt in by returning their
/// close capability; everything else is dropped silently on replacement.
pub trait CacheResource: Send + Sync + 'static {
    fn as_closeable(&self) -> Option<&dyn Closeable> {
        None
    }
}

/// Acquire failure. A conflict is not fatal: the process keeps serving
/// requests against the existing handle.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("configuration drift rejected: cached handle was built from [{cached}], request asked for [{requested}]")]
    Conflict {
        cached: Fingerprint,
        requested: Fingerprint,
    },

    #[error("resource initialization failed: {0}")]
    Init(String),
}

struct CachedEntry<T> {
    fingerprint: Fingerprint,
    handle: Arc<T>,
    #[allow(dead_code)]
    initialized_at: SystemTime,
}

type BuildFuture<T> = BoxFuture<'static, Result<Arc<T>, CacheError>>;
type SharedInit<T> = Shared<BuildFuture<T>>;
type BuilderFn<T> = Box<dyn Fn(Fingerprint) -> BuildFuture<T> + Send + Sync>;

struct CacheInner<T: CacheResource> {
    name: &'static str,
    policy: DriftPolicy,
    slot: ArcSwapOption<CachedEntry<T>>,
    publish_lock: Mutex<()>,
    inflight: DashMap<Fingerprint, SharedInit<T>>,
    builder: BuilderFn<T>,
}

/// Process-wide cache holding at most one live handle at a time.
pub struct ResourceCache<T: CacheResource> {
    inner: Arc<CacheInner<T>>,
}

impl<T: CacheResource> Clone for ResourceCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: CacheResource> ResourceCache<T> {
    /// Create a cache. The builder runs at most once per fingerprint at a
    /// time, on the first acquire that needs it.
    pub fn new<F, Fut>(name: &'static str, policy: DriftPolicy, builder: F) -> Self
    where
        F: Fn(Fingerprint) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<T>, CacheError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(CacheInner {
                name,
                policy,
                slot: ArcSwapOption::new(None),
                publish_lock: Mutex::new(()),
                inflight: DashMap::new(),
                builder: Box::new(move |fingerprint| builder(fingerprint).boxed()),
            }),
        }
    }

    pub fn policy(&self) -> DriftPolicy {
        self.inner.policy
    }

    /// The currently cached handle, if any.
    pub fn active(&self) -> Option<Arc<T>> {
        self.inner.slot.load_full().map(|e| Arc::clone(&e.handle))
    }

    /// Get the handle for this fingerprint, initializing it if needed.
    pub async fn acquire(&self, fingerprint: &Fingerprint) -> Result<Arc<T>, CacheError> {
        if let Some(entry) = self.inner.slot.load_full() {
            if entry.fingerprint == *fingerprint {
                metrics::record_acquire(self.inner.name, "hit");
                return Ok(Arc::clone(&entry.handle));
            }
            if self.inner.policy == DriftPolicy::FailFast {
                metrics::record_acquire(self.inner.name, "conflict");
                return Err(CacheError::Conflict {
                    cached: entry.fingerprint.clone(),
                    requested: fingerprint.clone(),
                });
            }
        }

        let init = self
            .inner
            .inflight
            .entry(fingerprint.clone())
            .or_insert_with(|| init_future(Arc::clone(&self.inner), fingerprint.clone()))
            .clone();
        init.await
    }

    /// Drop the cached handle and invoke its close capability, if any.
    /// Used by the shutdown cleanup hook.
    pub async fn close_active(&self) {
        if let Some(entry) = self.inner.slot.swap(None) {
            if let Some(closeable) = entry.handle.as_closeable() {
                closeable.close().await;
            }
        }
    }
}

fn init_future<T: CacheResource>(
    inner: Arc<CacheInner<T>>,
    fingerprint: Fingerprint,
) -> SharedInit<T> {
    async move {
        let result = match (inner.builder)(fingerprint.clone()).await {
            Ok(handle) => publish(&inner, &fingerprint, handle).await,
            Err(e) => {
                metrics::record_acquire(inner.name, "init-error");
                Err(e)
            }
        };
        inner.inflight.remove(&fingerprint);
        result
    }
    .boxed()
    .shared()
}

enum PublishOutcome<T> {
    Stored,
    Raced(Arc<T>),
    Displaced(Arc<CachedEntry<T>>),
    Conflict(Fingerprint),
}

/// Install a freshly built handle into the slot.
///
/// The lock only covers the swap decision; close hooks run after it is
/// released. Readers keep loading the slot lock-free throughout.
async fn publish<T: CacheResource>(
    inner: &CacheInner<T>,
    fingerprint: &Fingerprint,
    handle: Arc<T>,
) -> Result<Arc<T>, CacheError> {
    let entry = Arc::new(CachedEntry {
        fingerprint: fingerprint.clone(),
        handle: Arc::clone(&handle),
        initialized_at: SystemTime::now(),
    });

    let outcome = {
        let _guard = inner
            .publish_lock
            .lock()
            .expect("cache publish lock poisoned");
        match inner.slot.load_full() {
            None => {
                inner.slot.store(Some(entry));
                PublishOutcome::Stored
            }
            Some(existing) if existing.fingerprint == *fingerprint => {
                PublishOutcome::Raced(Arc::clone(&existing.handle))
            }
            Some(existing) => match inner.policy {
                DriftPolicy::Replace => {
                    inner.slot.store(Some(entry));
                    PublishOutcome::Displaced(existing)
                }
                DriftPolicy::FailFast => PublishOutcome::Conflict(existing.fingerprint.clone()),
            },
        }
    };

    match outcome {
        PublishOutcome::Stored => {
            metrics::record_acquire(inner.name, "initialized");
            Ok(handle)
        }
        PublishOutcome::Raced(existing) => {
            // Another initializer published the same fingerprint first.
            if let Some(closeable) = handle.as_closeable() {
                closeable.close().await;
            }
            metrics::record_acquire(inner.name, "hit");
            Ok(existing)
        }
        PublishOutcome::Displaced(previous) => {
            if let Some(closeable) = previous.handle.as_closeable() {
                closeable.close().await;
            }
            metrics::record_acquire(inner.name, "replaced");
            Ok(handle)
        }
        PublishOutcome::Conflict(cached) => {
            // The slot was claimed by a different configuration while we
            // were building. Our handle never went live.
            if let Some(closeable) = handle.as_closeable() {
                closeable.close().await;
            }
            metrics::record_acquire(inner.name, "conflict");
            Err(CacheError::Conflict {
                cached,
                requested: fingerprint.clone(),
            })
        }
    }
}
