//! Process termination seam.

use std::io::Write;

/// How the orchestrator terminates the process.
///
/// The seam exists so shutdown semantics can be exercised in tests without
/// killing the test runner.
pub trait ProcessControl: Send + Sync + 'static {
    fn exit(&self, status: i32);
}

/// Production implementation.
pub struct OsProcess;

impl ProcessControl for OsProcess {
    fn exit(&self, status: i32) {
        // process::exit skips destructors; flush buffered output first so
        // the final records are not lost.
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
        std::process::exit(status);
    }
}
