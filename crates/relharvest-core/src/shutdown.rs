//! Graceful interruption between entities.
//!
//! Signal handlers (installed by the binary) flip a process-wide flag; the
//! harvest loop polls it only at entity boundaries so an in-flight entity
//! always finishes its resolve → commit → checkpoint sequence.

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide interruption flag
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

/// Set the flag; returns true if it was already set (second signal)
pub fn request_shutdown() -> bool {
    shutdown_flag().swap(true, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_request_reports_already_set() {
        request_shutdown();
        assert!(request_shutdown());
        assert!(shutdown_flag().load(Ordering::Relaxed));
        shutdown_flag().store(false, Ordering::Relaxed);
    }
}
