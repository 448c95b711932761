//! Shutdown coordination.
//!
//! # Responsibilities
//! - Own the shutdown state machine
//! - Run the registered cleanup exactly once, under a deadline
//! - Debounce duplicate triggers, escalate persistent ones
//! - Terminate the process with the right exit status
//!
//! # Design Decisions
//! - One atomic guard closes every race between concurrent triggers
//! - The drain broadcast fires before cleanup so listeners stop accepting
//!   new work first
//! - A cleanup that outlives the deadline is abandoned, never awaited again

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::lifecycle::event::{GraceEvent, TriggerKind};
use crate::lifecycle::process::ProcessControl;
use crate::observability::logging::{err_field, fields, Logger};
use crate::observability::metrics;

/// Repeat triggers inside this window are duplicate deliveries of the same
/// logical trigger (e.g., SIGINT and SIGTERM raised together).
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

const RUNNING: u8 = 0;
const DRAINING: u8 = 1;
const TERMINATED: u8 = 2;

/// Shutdown progress. Transitions strictly forward; there is no way back
/// to Running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Terminated,
}

pub type CleanupError = Box<dyn std::error::Error + Send + Sync>;
type CleanupFn = Box<dyn FnOnce(GraceEvent) -> BoxFuture<'static, Result<(), CleanupError>> + Send>;

/// Options for cleanup registration.
pub struct RegisterOptions {
    /// How long cleanup may run before the process is force-exited.
    pub deadline: Duration,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            deadline: Duration::from_millis(5000),
        }
    }
}

struct Registration {
    cleanup: CleanupFn,
    deadline: Duration,
}

struct FirstTrigger {
    at: Instant,
}

struct OrchestratorInner {
    state: AtomicU8,
    registration: Mutex<Option<Registration>>,
    first_trigger: Mutex<Option<FirstTrigger>>,
    drain_tx: broadcast::Sender<()>,
    logger: Logger,
    process: Arc<dyn ProcessControl>,
    runtime: tokio::runtime::Handle,
}

/// Owns the shutdown state machine and the process exit. Cheap to clone;
/// clones share the same state machine.
#[derive(Clone)]
pub struct ShutdownOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl ShutdownOrchestrator {
    /// Must be constructed inside the runtime. The handle is captured so
    /// triggers arriving on non-runtime threads (panic hook, watcher
    /// callbacks) can still start the drain task.
    pub fn new(logger: Logger, process: Arc<dyn ProcessControl>) -> Self {
        let (drain_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(OrchestratorInner {
                state: AtomicU8::new(RUNNING),
                registration: Mutex::new(None),
                first_trigger: Mutex::new(None),
                drain_tx,
                logger,
                process,
                runtime: tokio::runtime::Handle::current(),
            }),
        }
    }

    /// Register the cleanup callback. Called once by the hosting entry
    /// point; later calls are ignored.
    pub fn register<F, Fut>(&self, cleanup: F, options: RegisterOptions)
    where
        F: FnOnce(GraceEvent) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CleanupError>> + Send + 'static,
    {
        let mut registration = self
            .inner
            .registration
            .lock()
            .expect("registration mutex poisoned");
        if registration.is_some() {
            self.inner.logger.warn("Cleanup already registered, ignoring");
            return;
        }
        *registration = Some(Registration {
            cleanup: Box::new(move |event| cleanup(event).boxed()),
            deadline: options.deadline,
        });
    }

    /// Subscribe to the drain notification. Long-running tasks stop
    /// accepting new work when it fires.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.inner.drain_tx.subscribe()
    }

    pub fn state(&self) -> ShutdownState {
        match self.inner.state.load(Ordering::Acquire) {
            RUNNING => ShutdownState::Running,
            DRAINING => ShutdownState::Draining,
            _ => ShutdownState::Terminated,
        }
    }

    /// Feed one normalized termination trigger into the state machine.
    ///
    /// Safe to call from any thread, any number of times; only the first
    /// call starts a drain.
    pub fn notify(&self, event: GraceEvent) {
        match self.inner.state.compare_exchange(
            RUNNING,
            DRAINING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => self.begin_drain(event),
            Err(DRAINING) => self.inner.handle_repeat(event),
            Err(_) => {} // terminated; the winner owns the exit
        }
    }

    fn begin_drain(&self, event: GraceEvent) {
        *self
            .inner
            .first_trigger
            .lock()
            .expect("first trigger mutex poisoned") = Some(FirstTrigger { at: Instant::now() });

        metrics::record_shutdown_trigger(event.kind.as_str());
        match (&event.kind, &event.error) {
            (TriggerKind::Fault, Some(detail)) => self.inner.logger.fatal_with(
                "Unrecoverable fault detected, draining",
                fields(json!({ "trigger": event.label, "err": detail.to_value() })),
            ),
            (TriggerKind::Fault, None) => self.inner.logger.fatal_with(
                "Unrecoverable fault detected, draining",
                fields(json!({ "trigger": event.label })),
            ),
            (TriggerKind::Signal, _) => self.inner.logger.warn_with(
                "Termination signal received, draining",
                fields(json!({ "trigger": event.label })),
            ),
        }

        // Stop accepting new work before cleanup starts.
        let _ = self.inner.drain_tx.send(());

        let registration = self
            .inner
            .registration
            .lock()
            .expect("registration mutex poisoned")
            .take();
        let inner = Arc::clone(&self.inner);
        self.inner
            .runtime
            .spawn(async move { inner.drain(registration, event).await });
    }
}

impl OrchestratorInner {
    async fn drain(self: Arc<Self>, registration: Option<Registration>, event: GraceEvent) {
        let graceful_status = if event.is_fault() { 1 } else { 0 };

        let Some(Registration { cleanup, deadline }) = registration else {
            if self.try_terminate() {
                self.logger.warn("No cleanup registered");
                self.logger.info("Service stopped");
                self.process.exit(graceful_status);
            }
            return;
        };

        match tokio::time::timeout(deadline, cleanup(event)).await {
            Ok(Ok(())) => {
                if self.try_terminate() {
                    self.logger.info("Service stopped");
                    self.process.exit(graceful_status);
                }
            }
            Ok(Err(err)) => {
                if self.try_terminate() {
                    metrics::record_forced_exit("cleanup-error");
                    self.logger.fatal_with("Cleanup failed", err_field(&*err));
                    self.process.exit(1);
                }
            }
            Err(_) => {
                // The cleanup future is dropped here; whatever it would
                // eventually have done is unobserved.
                if self.try_terminate() {
                    metrics::record_forced_exit("deadline");
                    self.logger.fatal_with(
                        "Cleanup deadline exceeded, forcing exit",
                        fields(json!({ "deadline_ms": deadline.as_millis() as u64 })),
                    );
                    self.process.exit(1);
                }
            }
        }
    }

    fn handle_repeat(&self, event: GraceEvent) {
        // A racing first trigger may not have recorded its instant yet;
        // treat that as a duplicate delivery.
        let within_window = self
            .first_trigger
            .lock()
            .expect("first trigger mutex poisoned")
            .as_ref()
            .map(|t| t.at.elapsed() <= DEBOUNCE_WINDOW)
            .unwrap_or(true);

        if within_window {
            self.logger.debug_with(
                "Duplicate termination trigger ignored",
                fields(json!({ "trigger": event.label })),
            );
            return;
        }

        if !self.try_terminate() {
            return;
        }
        metrics::record_forced_exit("escalation");
        self.logger.fatal_with(
            "Repeat trigger while draining, forcing exit",
            fields(json!({ "trigger": event.label })),
        );
        self.process.exit(1);
    }

    /// Draining → Terminated. Exactly one caller wins the right to exit;
    /// the drain task and the escalation path both go through here.
    fn try_terminate(&self) -> bool {
        self.state
            .compare_exchange(DRAINING, TERMINATED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Environment;
    use crate::observability::logging::{CaptureHandle, ErrorDetail, LoggerFactory};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct FakeProcess {
        exits: Mutex<Vec<i32>>,
        notify: Notify,
    }

    impl FakeProcess {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                exits: Mutex::new(Vec::new()),
                notify: Notify::new(),
            })
        }

        async fn wait_exit(&self) -> i32 {
            self.notify.notified().await;
            self.exits.lock().unwrap()[0]
        }

        fn exits(&self) -> Vec<i32> {
            self.exits.lock().unwrap().clone()
        }
    }

    impl ProcessControl for FakeProcess {
        fn exit(&self, status: i32) {
            self.exits.lock().unwrap().push(status);
            self.notify.notify_one();
        }
    }

    fn orchestrator_with(process: Arc<FakeProcess>) -> (ShutdownOrchestrator, CaptureHandle) {
        let (logger, capture) = LoggerFactory::with_capture(Environment::Development);
        (ShutdownOrchestrator::new(logger, process), capture)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_runs_exactly_once_under_many_triggers() {
        let process = FakeProcess::new();
        let (orchestrator, _capture) = orchestrator_with(Arc::clone(&process));

        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls);
            orchestrator.register(
                move |_event| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(())
                },
                RegisterOptions::default(),
            );
        }

        for i in 0..8 {
            let event = if i % 2 == 0 {
                GraceEvent::signal("SIGTERM")
            } else {
                GraceEvent::fault("task", ErrorDetail::from_message("boom"))
            };
            orchestrator.notify(event);
        }

        process.wait_exit().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(process.exits().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_within_debounce_is_a_noop() {
        let process = FakeProcess::new();
        let (orchestrator, capture) = orchestrator_with(Arc::clone(&process));

        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls);
            orchestrator.register(
                move |_event| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Ok(())
                },
                RegisterOptions::default(),
            );
        }

        orchestrator.notify(GraceEvent::signal("SIGINT"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        orchestrator.notify(GraceEvent::signal("SIGTERM"));

        let status = process.wait_exit().await;
        assert_eq!(status, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(process.exits(), vec![0]);
        assert_eq!(capture.records_with_message("Service stopped").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_after_debounce_escalates() {
        let process = FakeProcess::new();
        let (orchestrator, capture) = orchestrator_with(Arc::clone(&process));

        orchestrator.register(
            |_event| async {
                futures_util::future::pending::<()>().await;
                Ok(())
            },
            RegisterOptions {
                deadline: Duration::from_secs(60),
            },
        );

        let started = Instant::now();
        orchestrator.notify(GraceEvent::signal("SIGINT"));
        tokio::time::sleep(Duration::from_millis(600)).await;
        orchestrator.notify(GraceEvent::signal("SIGINT"));

        let status = process.wait_exit().await;
        assert_eq!(status, 1);
        // Escalation bypasses the deadline entirely.
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(
            capture
                .records_with_message("Repeat trigger while draining, forcing exit")
                .len(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_forces_exit_at_the_deadline() {
        let process = FakeProcess::new();
        let (orchestrator, capture) = orchestrator_with(Arc::clone(&process));

        orchestrator.register(
            |_event| async {
                futures_util::future::pending::<()>().await;
                Ok(())
            },
            RegisterOptions {
                deadline: Duration::from_millis(5000),
            },
        );

        let started = Instant::now();
        orchestrator.notify(GraceEvent::signal("SIGTERM"));
        let status = process.wait_exit().await;

        assert_eq!(status, 1);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(5000));
        assert!(elapsed < Duration::from_millis(5200));
        assert_eq!(
            capture
                .records_with_message("Cleanup deadline exceeded, forcing exit")
                .len(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_failure_exits_with_failure_status() {
        let process = FakeProcess::new();
        let (orchestrator, capture) = orchestrator_with(Arc::clone(&process));

        orchestrator.register(
            |_event| async { Err::<(), CleanupError>("flush failed".into()) },
            RegisterOptions::default(),
        );

        orchestrator.notify(GraceEvent::signal("SIGINT"));
        let status = process.wait_exit().await;

        assert_eq!(status, 1);
        let fatals = capture.records_with_message("Cleanup failed");
        assert_eq!(fatals.len(), 1);
        assert_eq!(fatals[0].record["err"]["message"], "flush failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_origin_exits_one_even_when_cleanup_succeeds() {
        let process = FakeProcess::new();
        let (orchestrator, _capture) = orchestrator_with(Arc::clone(&process));

        orchestrator.register(|_event| async { Ok(()) }, RegisterOptions::default());

        orchestrator.notify(GraceEvent::fault(
            "unhandled-rejection",
            ErrorDetail::from_message("boom"),
        ));
        assert_eq!(process.wait_exit().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_advances_monotonically() {
        let process = FakeProcess::new();
        let (orchestrator, _capture) = orchestrator_with(Arc::clone(&process));

        orchestrator.register(
            |_event| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(())
            },
            RegisterOptions::default(),
        );

        assert_eq!(orchestrator.state(), ShutdownState::Running);
        orchestrator.notify(GraceEvent::signal("SIGINT"));
        assert_eq!(orchestrator.state(), ShutdownState::Draining);

        process.wait_exit().await;
        assert_eq!(orchestrator.state(), ShutdownState::Terminated);

        // Triggers after termination change nothing.
        orchestrator.notify(GraceEvent::signal("SIGINT"));
        assert_eq!(orchestrator.state(), ShutdownState::Terminated);
        assert_eq!(process.exits().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_subscribers_are_notified_before_cleanup() {
        let process = FakeProcess::new();
        let (orchestrator, _capture) = orchestrator_with(Arc::clone(&process));

        let mut drain = orchestrator.subscribe();
        orchestrator.register(
            |_event| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            },
            RegisterOptions::default(),
        );

        orchestrator.notify(GraceEvent::signal("SIGTERM"));
        drain.recv().await.expect("drain notification");
        assert_eq!(orchestrator.state(), ShutdownState::Draining);
    }
}
