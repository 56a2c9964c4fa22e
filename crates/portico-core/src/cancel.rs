//! One-shot cancellation tokens.
//!
//! A [`CancellationToken`] is cancelled at most once. Callbacks registered
//! before cancellation run synchronously, in registration order, on the
//! thread that cancels; callbacks registered afterwards run immediately.
//!
//! # Example
//!
//! ```rust
//! use portico_core::CancellationToken;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! let token = CancellationToken::new();
//! let fired = Arc::new(AtomicBool::new(false));
//!
//! let flag = Arc::clone(&fired);
//! token.register(move || flag.store(true, Ordering::SeqCst));
//!
//! token.cancel();
//! assert!(token.is_cancelled());
//! assert!(fired.load(Ordering::SeqCst));
//! ```

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::Notify;

type Callback = Box<dyn FnOnce() + Send>;

struct TokenInner {
    cancelled: AtomicBool,
    /// Held for the whole transition so concurrent cancellers wait for the
    /// first one to finish running callbacks. Reentrant so a callback may
    /// cancel the same token.
    transition: ReentrantMutex<()>,
    callbacks: Mutex<Vec<Callback>>,
    notify: Notify,
}

/// A cloneable, one-shot cancellation signal.
///
/// All clones observe the same state.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                transition: ReentrantMutex::new(()),
                callbacks: Mutex::new(Vec::new()),
                notify: Notify::new(),
            }),
        }
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Cancels the token and runs the registered callbacks.
    ///
    /// Only the first call runs callbacks. Concurrent callers block until
    /// that first call has finished, so every caller observes a completed
    /// transition when this returns. A panicking callback is logged and does
    /// not prevent the remaining callbacks from running.
    pub fn cancel(&self) {
        let _transition = self.inner.transition.lock();
        if self.is_cancelled() {
            return;
        }

        let callbacks = {
            let mut callbacks = self.inner.callbacks.lock();
            self.inner.cancelled.store(true, Ordering::Release);
            std::mem::take(&mut *callbacks)
        };

        for callback in callbacks {
            run_callback(callback);
        }

        self.inner.notify.notify_waiters();
    }

    /// Registers a callback to run on cancellation.
    ///
    /// If the token is already cancelled the callback runs immediately on
    /// the calling thread.
    pub fn register<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut callbacks = self.inner.callbacks.lock();
        if self.is_cancelled() {
            drop(callbacks);
            run_callback(Box::new(callback));
            return;
        }
        callbacks.push(Box::new(callback));
    }

    /// Completes once the token is cancelled.
    ///
    /// Completes immediately if the token is already cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

fn run_callback(callback: Callback) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(callback)) {
        tracing::error!(
            panic = %panic_message(panic.as_ref()),
            "Cancellation callback panicked"
        );
    }
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_token_new() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_idempotent() {
        let token = CancellationToken::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        token.register(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        token.cancel();
        token.cancel();
        token.cancel();

        assert!(token.is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callbacks_run_in_registration_order() {
        let token = CancellationToken::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let log = Arc::clone(&log);
            token.register(move || log.lock().push(i));
        }

        token.cancel();
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_register_after_cancel_runs_immediately() {
        let token = CancellationToken::new();
        token.cancel();

        let fired = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&fired);
        token.register(move || f.store(true, Ordering::SeqCst));

        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panicking_callback_does_not_stop_others() {
        let token = CancellationToken::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&count);
        token.register(move || {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        token.register(|| panic!("callback failure"));
        let c2 = Arc::clone(&count);
        token.register(move || {
            c2.fetch_add(1, Ordering::SeqCst);
        });

        token.cancel();
        assert!(token.is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_may_cancel_same_token() {
        let token = CancellationToken::new();
        let inner = token.clone();
        token.register(move || inner.cancel());

        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_concurrent_cancel_runs_callbacks_once() {
        let token = CancellationToken::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        token.register(move || {
            std::thread::sleep(Duration::from_millis(20));
            c.fetch_add(1, Ordering::SeqCst);
        });

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let token = token.clone();
                let count = Arc::clone(&count);
                std::thread::spawn(move || {
                    token.cancel();
                    // Every caller returns only after the callback finished.
                    count.load(Ordering::SeqCst)
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_future_completes() {
        let token = CancellationToken::new();
        let trigger = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("cancelled should complete");
    }

    #[tokio::test]
    async fn test_cancelled_future_immediate() {
        let token = CancellationToken::new();
        token.cancel();

        tokio::time::timeout(Duration::from_millis(10), token.cancelled())
            .await
            .expect("cancelled should complete immediately");
    }

    #[test]
    fn test_cancelled_wakes_pending_waiter() {
        let token = CancellationToken::new();
        let mut waiter = tokio_test::task::spawn(token.cancelled());

        tokio_test::assert_pending!(waiter.poll());
        token.cancel();
        assert!(waiter.is_woken());
        tokio_test::assert_ready!(waiter.poll());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
