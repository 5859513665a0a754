//! Platform binding
//!
//! A platform supplies the native resources the runner owns (window and
//! renderer) plus a [`MainLoop`] driver. The driver follows the SDL3 main
//! callbacks protocol: it calls `init` once with a pointer to an opaque state
//! slot, then `event`/`iterate` with that state until one of them returns
//! something other than [`AppResult::Continue`], then `quit` exactly once.
//!
//! The four callbacks are plain `extern "C"` functions so that a C loop such
//! as `SDL_EnterAppMainCallbacks` can call them directly. Their result type is
//! the platform's native [`Platform::Status`], converted with
//! [`Platform::encode`] and [`Platform::decode`].

use std::ffi::{c_char, c_int, c_void};
use std::fmt;
use std::time::Instant;

use crate::config::{VSync, WindowConfig};
use crate::error::RunnerResult;

/// Outcome of a main-loop callback
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppResult {
    /// Keep the loop running
    Continue,
    /// Leave the loop, reporting success
    Success,
    /// Leave the loop, reporting failure
    Failure,
}

/// What the runner needs to know about a platform event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// The application was asked to quit (last window closed, OS request, ...)
    Quit,
    /// The Escape key was pressed
    Escape,
    Other,
}

/// When a platform completes its loop relative to `MainLoop::enter` returning
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Teardown {
    /// `enter` returns after `quit` has run
    #[default]
    Synchronous,
    /// `enter` may return while the loop keeps running, `quit` comes later
    Deferred,
}

pub type AppInitFn<S> =
    unsafe extern "C" fn(appstate: *mut *mut c_void, argc: c_int, argv: *mut *mut c_char) -> S;
pub type AppIterateFn<S> = unsafe extern "C" fn(appstate: *mut c_void) -> S;
pub type AppEventFn<E, S> = unsafe extern "C" fn(appstate: *mut c_void, event: *mut E) -> S;
pub type AppQuitFn<S> = unsafe extern "C" fn(appstate: *mut c_void, result: S);

/// The four entry points handed to a platform's main loop.
pub struct MainCallbacks<P: Platform> {
    pub init: AppInitFn<P::Status>,
    pub iterate: AppIterateFn<P::Status>,
    pub event: AppEventFn<P::Event, P::Status>,
    pub quit: AppQuitFn<P::Status>,
}

impl<P: Platform> Clone for MainCallbacks<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Platform> Copy for MainCallbacks<P> {}

impl<P: Platform> fmt::Debug for MainCallbacks<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainCallbacks")
            .field("init", &(self.init as *const ()))
            .field("iterate", &(self.iterate as *const ()))
            .field("event", &(self.event as *const ()))
            .field("quit", &(self.quit as *const ()))
            .finish()
    }
}

/// Native main-loop driver.
pub trait MainLoop<P: Platform> {
    /// Run the main callbacks protocol and return the platform's result code.
    ///
    /// # Safety contract
    ///
    /// Implementations must pass the state written by `init` to every later
    /// callback, must not call any callback after `quit`, and must call all of
    /// them on the thread that called `enter` unless the platform is
    /// [`Teardown::Deferred`], in which case they run on the thread the
    /// platform schedules its loop on.
    fn enter(&mut self, callbacks: MainCallbacks<P>) -> c_int;
}

/// Native resources and loop binding consumed by the runner.
pub trait Platform: Sized + 'static {
    /// Main window, released on drop
    type Window;
    /// Renderer bound to the main window, released on drop
    type Renderer;
    /// Native event passed to the event callback
    type Event;
    /// Native callback result type
    type Status: Copy;
    /// Loop driver
    type MainLoop: MainLoop<Self>;

    /// Initialize the platform subsystems. Called once from the init callback.
    fn init(&mut self) -> RunnerResult<()> {
        Ok(())
    }

    fn create_window(&mut self, config: &WindowConfig) -> RunnerResult<Self::Window>;

    fn create_renderer(&mut self, window: &Self::Window) -> RunnerResult<Self::Renderer>;

    /// Apply a vsync mode. Returns `false` if the mode is not supported.
    fn set_vsync(&mut self, renderer: &Self::Renderer, vsync: VSync) -> bool;

    /// Present the frame rendered during the current iteration.
    fn present(&mut self, renderer: &Self::Renderer);

    fn classify_event(event: &Self::Event) -> EventKind;

    /// Monotonic time source for the frame clock
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn teardown(&self) -> Teardown {
        Teardown::Synchronous
    }

    /// Produce the driver for one run.
    fn main_loop(&mut self) -> Self::MainLoop;

    fn encode(result: AppResult) -> Self::Status;

    fn decode(status: Self::Status) -> AppResult;
}
