//! Shared utilities for integration testing.

// Not every test binary uses every helper.
#![allow(dead_code)]

use habitd::lifecycle::ProcessControl;
use std::sync::Mutex;
use tokio::net::TcpListener;
use tokio::sync::Notify;

/// ProcessControl double that records exit statuses instead of terminating
/// the test runner.
pub struct RecordingProcess {
    exits: Mutex<Vec<i32>>,
    notify: Notify,
}

impl RecordingProcess {
    pub fn new() -> Self {
        Self {
            exits: Mutex::new(Vec::new()),
            notify: Notify::new(),
        }
    }

    /// Wait until the first exit call and return its status.
    pub async fn wait_exit(&self) -> i32 {
        self.notify.notified().await;
        self.exits.lock().expect("exit log poisoned")[0]
    }

    pub fn exits(&self) -> Vec<i32> {
        self.exits.lock().expect("exit log poisoned").clone()
    }
}

impl ProcessControl for RecordingProcess {
    fn exit(&self, status: i32) {
        self.exits.lock().expect("exit log poisoned").push(status);
        self.notify.notify_one();
    }
}

/// Bind a local listener the pooled transport can connect against and
/// return a database URL pointing at it. The listener must stay alive for
/// the duration of the test.
pub async fn reachable_database_url() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, format!("postgres://habit:secret@{addr}/habits"))
}
