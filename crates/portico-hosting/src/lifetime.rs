//! Application lifetime notifications.

use std::fmt;

use portico_core::CancellationToken;

/// Where the application is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeState {
    /// The server has not started yet.
    Created,
    /// The server is running.
    Started,
    /// Shutdown has been requested.
    Stopping,
    /// Shutdown completed.
    Stopped,
}

impl fmt::Display for LifetimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Three one-shot signals shared between the host and the application.
///
/// Each signal fires at most once. Callbacks registered on a signal run in
/// registration order, and a callback registered after the signal fired
/// runs immediately. Registered as a singleton in the application services.
///
/// # Example
///
/// ```rust
/// use portico_hosting::ApplicationLifetime;
///
/// let lifetime = ApplicationLifetime::new();
/// lifetime.application_stopping().register(|| println!("draining"));
///
/// lifetime.stop_application();
/// lifetime.stop_application();
/// assert!(lifetime.application_stopping().is_cancelled());
/// ```
#[derive(Clone, Default)]
pub struct ApplicationLifetime {
    started: CancellationToken,
    stopping: CancellationToken,
    stopped: CancellationToken,
}

impl ApplicationLifetime {
    /// Creates a lifetime with no signal fired.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires once the server has started.
    #[must_use]
    pub fn application_started(&self) -> &CancellationToken {
        &self.started
    }

    /// Fires when shutdown begins.
    #[must_use]
    pub fn application_stopping(&self) -> &CancellationToken {
        &self.stopping
    }

    /// Fires once shutdown has completed.
    #[must_use]
    pub fn application_stopped(&self) -> &CancellationToken {
        &self.stopped
    }

    /// Requests shutdown.
    ///
    /// Idempotent and safe from any thread. Every caller returns only after
    /// the stopping callbacks have run. Callbacks run inline on the calling
    /// thread, so a slow callback blocks an async caller's worker.
    pub fn stop_application(&self) {
        self.stopping.cancel();
    }

    /// Returns the current state, derived from the signals.
    #[must_use]
    pub fn state(&self) -> LifetimeState {
        if self.stopped.is_cancelled() {
            LifetimeState::Stopped
        } else if self.stopping.is_cancelled() {
            LifetimeState::Stopping
        } else if self.started.is_cancelled() {
            LifetimeState::Started
        } else {
            LifetimeState::Created
        }
    }

    pub(crate) fn notify_started(&self) {
        self.started.cancel();
    }

    pub(crate) fn notify_stopped(&self) {
        self.stopping.cancel();
        self.stopped.cancel();
    }
}

impl fmt::Debug for ApplicationLifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationLifetime")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_state_progression() {
        let lifetime = ApplicationLifetime::new();
        assert_eq!(lifetime.state(), LifetimeState::Created);

        lifetime.notify_started();
        assert_eq!(lifetime.state(), LifetimeState::Started);

        lifetime.stop_application();
        assert_eq!(lifetime.state(), LifetimeState::Stopping);

        lifetime.notify_stopped();
        assert_eq!(lifetime.state(), LifetimeState::Stopped);
    }

    #[test]
    fn test_notify_stopped_fires_stopping_first() {
        let lifetime = ApplicationLifetime::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let log = Arc::clone(&order);
        lifetime
            .application_stopped()
            .register(move || log.lock().push("stopped"));
        let log = Arc::clone(&order);
        lifetime
            .application_stopping()
            .register(move || log.lock().push("stopping"));

        lifetime.notify_stopped();
        assert_eq!(*order.lock(), vec!["stopping", "stopped"]);
    }

    #[test]
    fn test_stopping_wait_completes_on_stop_application() {
        let lifetime = ApplicationLifetime::new();
        let mut stopping = tokio_test::task::spawn(lifetime.application_stopping().cancelled());

        lifetime.notify_started();
        tokio_test::assert_pending!(stopping.poll());

        lifetime.stop_application();
        tokio_test::assert_ready!(stopping.poll());
    }

    #[test]
    fn test_concurrent_stop_runs_callback_once_and_waits() {
        const CALLERS: usize = 8;

        let lifetime = ApplicationLifetime::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        lifetime.application_stopping().register(move || {
            thread::sleep(Duration::from_millis(50));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let barrier = Arc::new(Barrier::new(CALLERS));
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let lifetime = lifetime.clone();
                let barrier = Arc::clone(&barrier);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    barrier.wait();
                    lifetime.stop_application();
                    calls.load(Ordering::SeqCst)
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
