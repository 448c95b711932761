//! OS signal handling and the process-fault channel.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals and faults into GraceEvents
//! - Forward every trigger to the ShutdownOrchestrator
//!
//! # Design Decisions
//! - Detection and normalization only; no cleanup happens here
//! - The listener keeps running after the first trigger so repeats can
//!   drive the debounce and escalation policy
//! - Fault triggers capture the originating error for log enrichment

use crate::lifecycle::event::GraceEvent;
use crate::lifecycle::orchestrator::ShutdownOrchestrator;
use crate::observability::logging::ErrorDetail;

/// Subscribes to termination triggers and feeds them to the orchestrator.
pub struct SignalListener {
    orchestrator: ShutdownOrchestrator,
}

impl SignalListener {
    pub fn new(orchestrator: ShutdownOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Install the OS signal handlers and return the fault channel.
    pub fn spawn(self) -> FaultReporter {
        let reporter = FaultReporter {
            orchestrator: self.orchestrator.clone(),
        };
        tokio::spawn(listen(self.orchestrator));
        reporter
    }
}

#[cfg(unix)]
async fn listen(orchestrator: ShutdownOrchestrator) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt =
        signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
    let mut terminate =
        signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut hangup = signal(SignalKind::hangup()).expect("failed to register SIGHUP handler");

    loop {
        let label = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = hangup.recv() => "SIGHUP",
        };
        orchestrator.notify(GraceEvent::signal(label));
    }
}

#[cfg(not(unix))]
async fn listen(orchestrator: ShutdownOrchestrator) {
    while tokio::signal::ctrl_c().await.is_ok() {
        orchestrator.notify(GraceEvent::signal("ctrl-c"));
    }
}

/// Channel for faults the hosting layer cannot recover from: a failed
/// server task, or an async failure with no handler attached.
#[derive(Clone)]
pub struct FaultReporter {
    orchestrator: ShutdownOrchestrator,
}

impl FaultReporter {
    pub fn report(&self, label: &str, err: &dyn std::error::Error) {
        self.orchestrator
            .notify(GraceEvent::fault(label, ErrorDetail::from_error(err)));
    }

    pub fn report_message(&self, label: &str, message: impl Into<String>) {
        self.orchestrator
            .notify(GraceEvent::fault(label, ErrorDetail::from_message(message)));
    }

    /// Route panics into the fault channel. A panic has no handler of its
    /// own, so the process drains and exits with failure status.
    pub fn install_panic_hook(&self) {
        let reporter = self.clone();
        std::panic::set_hook(Box::new(move |info| {
            reporter.report_message("panic", info.to_string());
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Environment;
    use crate::lifecycle::orchestrator::RegisterOptions;
    use crate::lifecycle::process::ProcessControl;
    use crate::observability::logging::LoggerFactory;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    struct FakeProcess {
        exits: Mutex<Vec<i32>>,
        notify: Notify,
    }

    impl ProcessControl for FakeProcess {
        fn exit(&self, status: i32) {
            self.exits.lock().unwrap().push(status);
            self.notify.notify_one();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reported_fault_drains_and_exits_with_failure() {
        let (logger, capture) = LoggerFactory::with_capture(Environment::Development);
        let process = Arc::new(FakeProcess {
            exits: Mutex::new(Vec::new()),
            notify: Notify::new(),
        });
        let orchestrator =
            ShutdownOrchestrator::new(logger, process.clone() as Arc<dyn ProcessControl>);
        orchestrator.register(|_event| async { Ok(()) }, RegisterOptions::default());

        let reporter = SignalListener::new(orchestrator.clone()).spawn();
        let err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "socket gone");
        reporter.report("http-server", &err);

        process.notify.notified().await;
        assert_eq!(process.exits.lock().unwrap().clone(), vec![1]);

        let fatals = capture.records_with_message("Unrecoverable fault detected, draining");
        assert_eq!(fatals.len(), 1);
        assert_eq!(fatals[0].record["err"]["message"], "socket gone");
        assert_eq!(fatals[0].record["trigger"], "http-server");
    }
}
