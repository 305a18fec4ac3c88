//! Blocking cancellation signal for retry waits.
//!
//! Mirrors the shape of `tokio_util::sync::CancellationToken` for code that
//! runs on the caller's thread: a token can be cancelled once, cancellation
//! is sticky, and children observe their parent's cancellation.

use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

struct State {
    cancelled: bool,
    children: Vec<Weak<Inner>>,
}

struct Inner {
    state: Mutex<State>,
    wake: Condvar,
}

/// How a [`CancelToken::wait_for`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full duration elapsed.
    Elapsed,
    /// The token was cancelled before the duration elapsed.
    Cancelled,
}

/// A cloneable, sticky cancellation signal.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    cancelled: false,
                    children: Vec::new(),
                }),
                wake: Condvar::new(),
            }),
        }
    }

    /// Create a token that is cancelled whenever this one is.
    ///
    /// Cancelling the child does not affect the parent.
    pub fn child_token(&self) -> CancelToken {
        let child = CancelToken::new();
        let mut state = self.inner.state.lock();
        if state.cancelled {
            child.inner.state.lock().cancelled = true;
        } else {
            state.children.retain(|weak| weak.strong_count() > 0);
            state.children.push(Arc::downgrade(&child.inner));
        }
        child
    }

    /// Cancel this token and all of its children, waking every waiter.
    pub fn cancel(&self) {
        let children = {
            let mut state = self.inner.state.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            self.inner.wake.notify_all();
            std::mem::take(&mut state.children)
        };

        for child in children.iter().filter_map(Weak::upgrade) {
            CancelToken { inner: child }.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().cancelled
    }

    /// Block the calling thread for `duration` or until cancelled.
    ///
    /// Spurious wakeups are absorbed: `Elapsed` is only returned once the
    /// full duration has passed. A duration too large to form a deadline
    /// waits for cancellation only.
    pub fn wait_for(&self, duration: Duration) -> WaitOutcome {
        let deadline = Instant::now().checked_add(duration);
        let mut state = self.inner.state.lock();

        loop {
            if state.cancelled {
                return WaitOutcome::Cancelled;
            }
            match deadline {
                Some(deadline) if Instant::now() >= deadline => return WaitOutcome::Elapsed,
                Some(deadline) => {
                    self.inner.wake.wait_until(&mut state, deadline);
                }
                None => self.inner.wake.wait(&mut state),
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_elapses_without_cancel() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert_eq!(token.wait_for(Duration::from_millis(30)), WaitOutcome::Elapsed);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();

        let handle = thread::spawn(move || {
            let start = Instant::now();
            let outcome = waiter.wait_for(Duration::from_secs(10));
            (outcome, start.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        token.cancel();

        let (outcome, elapsed) = handle.join().unwrap();
        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_unbounded_wait_ends_on_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = thread::spawn(move || waiter.wait_for(Duration::MAX));

        thread::sleep(Duration::from_millis(30));
        token.cancel();

        assert_eq!(handle.join().unwrap(), WaitOutcome::Cancelled);
    }

    #[test]
    fn test_cancellation_is_sticky() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.wait_for(Duration::from_secs(10)), WaitOutcome::Cancelled);
    }

    #[test]
    fn test_child_follows_parent() {
        let parent = CancelToken::new();
        let child = parent.child_token();
        assert!(!child.is_cancelled());

        parent.cancel();
        assert!(child.is_cancelled());

        // Children created after cancellation start cancelled.
        assert!(parent.child_token().is_cancelled());
    }

    #[test]
    fn test_child_cancel_leaves_parent() {
        let parent = CancelToken::new();
        let child = parent.child_token();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }
}
