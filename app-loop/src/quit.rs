//! Exactly-once quit notification
//!
//! [`QuitSignal`] is a single-slot broadcast: the first [`QuitSignal::fire`]
//! stores the exit code and wakes every registered waiter, later fires are
//! no-ops. A [`Wait`] future polled after the signal fired resolves on its
//! first poll.
//!
//! Firing usually happens on the native loop thread while waiters live on a
//! cooperative executor, possibly on another thread, so the state sits behind
//! a mutex and wakers are woken after the lock is released.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;
use tracing::trace;

#[derive(Debug, Default)]
struct QuitState {
    code: Option<i32>,
    // Stays unallocated until the first waiter registers.
    waiters: Vec<(u64, Waker)>,
    next_waiter: u64,
}

/// Single-shot broadcast carrying an exit code.
#[derive(Debug, Default)]
pub struct QuitSignal {
    state: Mutex<QuitState>,
}

impl QuitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `code` and wake all waiters, unless the signal already fired.
    ///
    /// Returns `true` if this call fired the signal.
    pub fn fire(&self, code: i32) -> bool {
        let waiters = {
            let mut state = self.state.lock();
            if state.code.is_some() {
                return false;
            }
            state.code = Some(code);
            std::mem::take(&mut state.waiters)
        };
        trace!(code, waiters = waiters.len(), "quit signal fired");
        for (_, waker) in waiters {
            waker.wake();
        }
        true
    }

    pub fn is_fired(&self) -> bool {
        self.state.lock().code.is_some()
    }

    /// Stored exit code, `None` until fired.
    pub fn code(&self) -> Option<i32> {
        self.state.lock().code
    }

    /// Wait for the signal. Resolves immediately if it already fired.
    pub fn wait(&self) -> Wait<'_> {
        Wait {
            signal: self,
            slot: None,
        }
    }

    /// Number of waiters currently registered
    pub fn waiter_count(&self) -> usize {
        self.state.lock().waiters.len()
    }

    fn poll_wait(&self, slot: &mut Option<u64>, cx: &mut Context<'_>) -> Poll<i32> {
        let mut state = self.state.lock();
        if let Some(code) = state.code {
            *slot = None;
            return Poll::Ready(code);
        }

        if let Some(id) = *slot {
            if let Some((_, waker)) = state.waiters.iter_mut().find(|(w, _)| *w == id) {
                waker.clone_from(cx.waker());
                return Poll::Pending;
            }
        }

        let id = state.next_waiter;
        state.next_waiter += 1;
        state.waiters.push((id, cx.waker().clone()));
        *slot = Some(id);
        Poll::Pending
    }

    fn unregister(&self, id: u64) {
        let mut state = self.state.lock();
        state.waiters.retain(|(w, _)| *w != id);
    }
}

/// Future returned by [`QuitSignal::wait`].
///
/// Dropping it before completion removes its registration.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Wait<'a> {
    signal: &'a QuitSignal,
    slot: Option<u64>,
}

impl Future for Wait<'_> {
    type Output = i32;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<i32> {
        let this = self.get_mut();
        this.signal.poll_wait(&mut this.slot, cx)
    }
}

impl Drop for Wait<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.slot.take() {
            self.signal.unregister(id);
        }
    }
}

/// Shared handle to a runner's quit signal.
///
/// Clones can be moved to other threads or into cooperative tasks to request
/// exit or wait for it while the runner blocks in `run`.
#[derive(Clone, Debug, Default)]
pub struct QuitHandle {
    signal: Arc<QuitSignal>,
}

impl QuitHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request exit with `code`. The first request wins.
    pub fn exit(&self, code: i32) -> bool {
        self.signal.fire(code)
    }

    pub fn is_requested(&self) -> bool {
        self.signal.is_fired()
    }

    pub fn code(&self) -> Option<i32> {
        self.signal.code()
    }

    /// Suspend until exit is requested and resolve with the exit code.
    pub fn wait_quit(&self) -> Wait<'_> {
        self.signal.wait()
    }

    pub fn signal(&self) -> &QuitSignal {
        &self.signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Wake;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn waiter_is_registered_once_across_polls() {
        let signal = QuitSignal::new();
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        let mut cx = Context::from_waker(&waker);

        let mut wait = Box::pin(signal.wait());
        assert!(wait.as_mut().poll(&mut cx).is_pending());
        assert!(wait.as_mut().poll(&mut cx).is_pending());
        assert_eq!(signal.waiter_count(), 1);

        assert!(signal.fire(3));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(signal.waiter_count(), 0);
        assert_eq!(wait.as_mut().poll(&mut cx), Poll::Ready(3));
    }

    #[test]
    fn dropped_waiter_is_cleared() {
        let signal = QuitSignal::new();
        {
            let mut wait = signal.wait();
            assert!((&mut wait).now_or_never().is_none());
            assert_eq!(signal.waiter_count(), 1);
        }
        assert_eq!(signal.waiter_count(), 0);
        assert!(signal.fire(0));
    }

    #[test]
    fn handle_clones_share_the_signal() {
        let handle = QuitHandle::new();
        let other = handle.clone();
        assert!(!other.is_requested());
        assert!(handle.exit(9));
        assert!(!other.exit(1));
        assert_eq!(other.code(), Some(9));
        assert_eq!(other.wait_quit().now_or_never(), Some(9));
    }
}
