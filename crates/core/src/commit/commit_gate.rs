use std::sync::{Arc, Mutex, PoisonError};

/// Exit status used when the run is stopped by SIGINT.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Serializes commits against interrupt handling.
///
/// A commit holds the gate for its whole duration; the interrupt handler
/// takes the gate before acting, so a signal that lands mid-commit is
/// honoured only after the video, database and log are consistent again.
#[derive(Clone, Default)]
pub struct CommitGate {
    lock: Arc<Mutex<()>>,
}

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with interrupts deferred.
    pub fn critical<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Wraps `on_interrupt` so it runs only between commits.
    pub fn interrupt_handler<F>(&self, on_interrupt: F) -> impl Fn() + Send + 'static
    where
        F: Fn() + Send + 'static,
    {
        let lock = Arc::clone(&self.lock);
        move || {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            on_interrupt();
        }
    }

    /// Installs a process-wide SIGINT handler that waits for any in-flight
    /// commit and then exits with status 130.
    pub fn install_interrupt_handler(&self) -> Result<(), ctrlc::Error> {
        ctrlc::set_handler(self.interrupt_handler(|| {
            log::warn!("Interrupted, stopping after the last committed video");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }))
    }
}
