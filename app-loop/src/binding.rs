//! Thread-local runner binding
//!
//! The init callback of a native main loop receives no user pointer, only an
//! out-parameter for the state it should hand to every later callback. The
//! runner therefore parks its state pointer in thread-local storage right
//! before entering the loop; the init trampoline takes it out (clearing the
//! slot) and writes it into the loop's state. After that, callbacks only see
//! the explicit state pointer.
//!
//! A [`Binding`] guard marks the thread as driving a runner for the duration
//! of one `run` call and clears both slots on drop, unwinding included.

use std::cell::Cell;
use std::ffi::c_void;
use std::marker::PhantomData;
use std::ptr;

use tracing::trace;

use crate::error::{RunnerError, RunnerResult};

thread_local! {
    static ACTIVE: Cell<bool> = const { Cell::new(false) };
    static PENDING: Cell<*mut c_void> = const { Cell::new(ptr::null_mut()) };
}

/// Guard for the current thread's runner binding.
#[derive(Debug)]
pub(crate) struct Binding {
    // Thread-local state: the guard must drop on the thread that bound it.
    _not_send: PhantomData<*const ()>,
}

impl Binding {
    /// Bind `state` to the current thread.
    ///
    /// Fails with [`RunnerError::AlreadyBound`] if another runner is still
    /// inside its `run` call on this thread.
    pub(crate) fn bind(state: *mut c_void) -> RunnerResult<Self> {
        if ACTIVE.with(Cell::get) {
            return Err(RunnerError::AlreadyBound);
        }
        ACTIVE.with(|active| active.set(true));
        PENDING.with(|pending| pending.set(state));
        trace!(?state, "runner bound to thread");
        Ok(Self {
            _not_send: PhantomData,
        })
    }

    /// Take the pending state pointer, leaving the slot empty.
    ///
    /// Returns null if nothing is pending (no `run` in progress, or the init
    /// callback already captured it).
    pub(crate) fn take_pending() -> *mut c_void {
        PENDING.with(|pending| pending.replace(ptr::null_mut()))
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        PENDING.with(|pending| pending.set(ptr::null_mut()));
        ACTIVE.with(|active| active.set(false));
        trace!("runner binding cleared");
    }
}

/// Whether a runner is currently inside `run` on this thread.
pub fn is_runner_active() -> bool {
    ACTIVE.with(Cell::get)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_pointer_is_taken_once() {
        let mut slot = 7u32;
        let state = (&mut slot as *mut u32).cast::<c_void>();

        let binding = Binding::bind(state).unwrap();
        assert!(is_runner_active());
        assert_eq!(Binding::take_pending(), state);
        assert!(Binding::take_pending().is_null());
        assert!(is_runner_active());

        drop(binding);
        assert!(!is_runner_active());
    }

    #[test]
    fn second_bind_is_rejected() {
        let binding = Binding::bind(ptr::null_mut()).unwrap();
        assert!(matches!(
            Binding::bind(ptr::null_mut()),
            Err(RunnerError::AlreadyBound)
        ));
        drop(binding);
        assert!(Binding::bind(ptr::null_mut()).is_ok());
    }

    #[test]
    fn binding_is_per_thread() {
        let _binding = Binding::bind(ptr::null_mut()).unwrap();
        let other = std::thread::spawn(is_runner_active).join().unwrap();
        assert!(!other);
    }
}
