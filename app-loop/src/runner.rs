//! Lifecycle runner
//!
//! [`Runner`] owns a [`Handler`], the platform resources and a
//! [`FrameClock`], and drives them through the native main callbacks:
//!
//! ```text
//! Created -> Initializing -> Running -> Quitting -> Terminated
//! ```
//!
//! `run` parks the runner's state in a thread-local slot and enters the
//! platform loop; the init trampoline picks the state up, every later
//! callback receives it back as the loop's opaque state pointer.
//!
//! Exit requests go through the runner's [`QuitHandle`]. The first code wins
//! and firing the quit signal wakes every task blocked in `wait_quit`.

use std::any::Any;
use std::cell::Cell;
use std::ffi::{c_char, c_int, c_void};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::rc::Rc;

use tracing::{debug, error, trace, warn};

use crate::binding::Binding;
use crate::clock::{FrameClock, FrameContext};
use crate::config::{RunnerConfig, VSync};
use crate::error::{EXIT_FAILURE, EXIT_SUCCESS, RunnerError, RunnerResult};
use crate::handler::{Flow, Handler};
use crate::platform::{AppResult, EventKind, MainCallbacks, MainLoop, Platform, Teardown};
use crate::quit::{QuitHandle, Wait};

/// Runner lifecycle states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Initializing,
    Running,
    Quitting,
    /// Absorbing: later callbacks are no-ops
    Terminated,
}

/// View of the runner handed to handlers and lifecycle callbacks.
///
/// Window and renderer are borrowed from the runner; handlers must not
/// release them.
pub struct RunnerContext<'a, P: Platform> {
    window: Option<&'a P::Window>,
    renderer: Option<&'a P::Renderer>,
    config: &'a RunnerConfig,
    quit: &'a QuitHandle,
    frame: FrameContext,
    lifecycle: Lifecycle,
}

impl<'a, P: Platform> RunnerContext<'a, P> {
    pub fn window(&self) -> Option<&'a P::Window> {
        self.window
    }

    pub fn renderer(&self) -> Option<&'a P::Renderer> {
        self.renderer
    }

    pub fn config(&self) -> &'a RunnerConfig {
        self.config
    }

    /// Timing of the current (or most recent) frame
    pub fn frame(&self) -> FrameContext {
        self.frame
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Request exit with `code`. Returns `false` if a code was already set.
    pub fn exit(&self, code: i32) -> bool {
        let first = self.quit.exit(code);
        if first {
            debug!(code, "exit requested");
        }
        first
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running && !self.quit.is_requested()
    }

    pub fn quit_handle(&self) -> QuitHandle {
        self.quit.clone()
    }
}

impl<P: Platform> fmt::Debug for RunnerContext<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerContext")
            .field("has_window", &self.window.is_some())
            .field("has_renderer", &self.renderer.is_some())
            .field("frame", &self.frame)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

type InitedFn<P> = Box<dyn FnMut(&mut RunnerContext<'_, P>) -> bool>;
type QuittingFn<P> = Box<dyn FnMut(&mut RunnerContext<'_, P>)>;
type RenderFn<P> = Box<dyn FnMut(&<P as Platform>::Renderer, &FrameContext)>;
type EventFn<P> = Box<dyn FnMut(&<P as Platform>::Event) -> Flow>;

/// Runner lifecycle callbacks (all optional)
pub struct RunnerCallbacks<P: Platform> {
    /// Called once after window and renderer exist, before `Handler::start`.
    /// Returning `false` fails the run.
    pub on_inited: Option<InitedFn<P>>,
    /// Called once after `Handler::stop`, before resources are released
    pub on_quitting: Option<QuittingFn<P>>,
    /// Called every frame after `Handler::update`, before present
    pub on_render: Option<RenderFn<P>>,
    /// Called for every event after `Handler::event`
    pub on_event: Option<EventFn<P>>,
}

impl<P: Platform> Default for RunnerCallbacks<P> {
    fn default() -> Self {
        Self {
            on_inited: None,
            on_quitting: None,
            on_render: None,
            on_event: None,
        }
    }
}

/// Owned pointer to a leaked runner core, reclaimed by the quit callback when
/// the platform tears the loop down after `run` returned.
struct KeepAlive<T> {
    ptr: NonNull<T>,
}

impl<T> KeepAlive<T> {
    /// # Safety
    ///
    /// `ptr` must come from `Box::into_raw` and must not be freed elsewhere.
    unsafe fn from_raw(ptr: *mut T) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr })
    }

    fn release(self) {
        // SAFETY: see `from_raw`; `self` is consumed so this runs once.
        drop(unsafe { Box::from_raw(self.ptr.as_ptr()) });
    }
}

struct RunnerCore<P: Platform, H> {
    platform: P,
    handler: H,
    config: RunnerConfig,
    callbacks: RunnerCallbacks<P>,
    clock: FrameClock,
    // Field order matters: the renderer drops before the window.
    renderer: Option<P::Renderer>,
    window: Option<P::Window>,
    quit: QuitHandle,
    lifecycle: Rc<Cell<Lifecycle>>,
    // Set when init fails; overrides an exit code requested earlier.
    init_failed: Rc<Cell<bool>>,
    inited: bool,
    started: bool,
    panic: Option<Box<dyn Any + Send>>,
    keep_alive: Option<KeepAlive<Self>>,
}

impl<P: Platform, H: Handler<P>> RunnerCore<P, H> {
    fn set_lifecycle(&self, next: Lifecycle) {
        let prev = self.lifecycle.replace(next);
        if prev != next {
            trace!(?prev, ?next, "lifecycle transition");
        }
    }

    fn parts(&mut self) -> (&mut H, &mut RunnerCallbacks<P>, RunnerContext<'_, P>) {
        let ctx = RunnerContext {
            window: self.window.as_ref(),
            renderer: self.renderer.as_ref(),
            config: &self.config,
            quit: &self.quit,
            frame: self.clock.context(),
            lifecycle: self.lifecycle.get(),
        };
        (&mut self.handler, &mut self.callbacks, ctx)
    }

    /// Run a callback body, turning a panic into a failed iteration.
    ///
    /// The payload is kept and resumed once `run` is back on the caller's
    /// side of the native loop.
    fn guarded(&mut self, body: impl FnOnce(&mut Self) -> AppResult) -> AppResult {
        if self.panic.is_some() {
            return AppResult::Failure;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| body(self))) {
            Ok(result) => result,
            Err(payload) => {
                error!("panic in runner callback");
                self.panic = Some(payload);
                self.quit.exit(EXIT_FAILURE);
                AppResult::Failure
            }
        }
    }

    fn acquire(&mut self) -> RunnerResult<()> {
        self.platform.init()?;

        let window_config = &self.config.window;
        trace!(
            title = %window_config.title,
            width = window_config.width,
            height = window_config.height,
            "creating window"
        );
        let window = self.platform.create_window(window_config)?;
        // An early return drops `window` here, before anything else exists.
        let renderer = self.platform.create_renderer(&window)?;

        let vsync = self.config.vsync;
        if self.platform.set_vsync(&renderer, vsync) {
            debug!(?vsync, "vsync set");
        } else {
            warn!(?vsync, "vsync mode not supported, using disabled");
            if vsync != VSync::Disabled {
                self.platform.set_vsync(&renderer, VSync::Disabled);
            }
        }

        self.window = Some(window);
        self.renderer = Some(renderer);
        trace!("window and renderer created");
        Ok(())
    }

    fn fail(&mut self, err: RunnerError) -> AppResult {
        error!(%err, "runner initialization failed");
        self.init_failed.set(true);
        self.quit.exit(EXIT_FAILURE);
        AppResult::Failure
    }

    fn on_init(&mut self) -> AppResult {
        self.set_lifecycle(Lifecycle::Initializing);

        if let Err(err) = self.acquire() {
            return self.fail(err);
        }
        self.inited = true;

        let (handler, callbacks, mut ctx) = self.parts();
        let inited = callbacks
            .on_inited
            .as_mut()
            .is_none_or(|on_inited| on_inited(&mut ctx));
        if !inited {
            return self.fail(RunnerError::InitCallbackFailed);
        }
        if !handler.start(&mut ctx) {
            return self.fail(RunnerError::StartFailed);
        }
        self.started = true;

        let now = self.platform.now();
        self.clock.initialize_at(now);
        self.set_lifecycle(Lifecycle::Running);
        debug!("runner started");
        AppResult::Continue
    }

    fn begin_quitting(&mut self) -> AppResult {
        if self.lifecycle.get() == Lifecycle::Running {
            debug!(code = ?self.quit.code(), "quitting");
            self.set_lifecycle(Lifecycle::Quitting);
        }
        AppResult::Success
    }

    fn on_iterate(&mut self) -> AppResult {
        if self.lifecycle.get() != Lifecycle::Running {
            return AppResult::Success;
        }
        if self.quit.is_requested() {
            return self.begin_quitting();
        }

        let now = self.platform.now();
        let frame = self.clock.tick_at(now);
        {
            let (handler, _, mut ctx) = self.parts();
            if handler.update(&mut ctx, &frame).is_exit() {
                debug!("update hook is stopping");
                ctx.exit(EXIT_SUCCESS);
            }
        }
        if self.quit.is_requested() {
            return self.begin_quitting();
        }

        if let (Some(on_render), Some(renderer)) =
            (self.callbacks.on_render.as_mut(), self.renderer.as_ref())
        {
            on_render(renderer, &frame);
        }
        if let Some(renderer) = self.renderer.as_ref() {
            self.platform.present(renderer);
        }
        AppResult::Continue
    }

    fn on_event(&mut self, event: &P::Event) -> AppResult {
        if self.lifecycle.get() != Lifecycle::Running {
            return AppResult::Success;
        }
        if self.quit.is_requested() {
            return self.begin_quitting();
        }

        let kind = P::classify_event(event);
        {
            let (handler, callbacks, mut ctx) = self.parts();
            let mut flow = handler.event(&mut ctx, event);
            if let Some(on_event) = callbacks.on_event.as_mut() {
                if on_event(event).is_exit() {
                    flow = Flow::Exit;
                }
            }
            if flow.is_exit() {
                debug!("event hook is stopping");
                ctx.exit(EXIT_SUCCESS);
            }
        }

        match kind {
            EventKind::Quit if self.config.exit_on_quit_event => {
                debug!("received quit event");
                self.quit.exit(EXIT_SUCCESS);
            }
            EventKind::Escape if self.config.exit_on_escape => {
                debug!("escape pressed, quitting");
                self.quit.exit(EXIT_SUCCESS);
            }
            _ => {}
        }

        if self.quit.is_requested() {
            self.begin_quitting()
        } else {
            AppResult::Continue
        }
    }

    fn on_quit(&mut self, result: AppResult) {
        if self.lifecycle.get() == Lifecycle::Terminated {
            return;
        }
        self.set_lifecycle(Lifecycle::Quitting);

        // Waiters must never outlive the run, whatever ended it.
        let fallback = match result {
            AppResult::Failure => EXIT_FAILURE,
            AppResult::Continue | AppResult::Success => EXIT_SUCCESS,
        };
        self.quit.exit(fallback);
        debug!(code = ?self.quit.code(), "shutting down");

        let hooks = self.panic.is_none();
        let started = std::mem::take(&mut self.started);
        let inited = std::mem::take(&mut self.inited);
        if hooks {
            let (handler, callbacks, mut ctx) = self.parts();
            if started {
                handler.stop(&mut ctx);
            }
            if inited {
                if let Some(on_quitting) = callbacks.on_quitting.as_mut() {
                    on_quitting(&mut ctx);
                }
            }
        }

        self.release();
        trace!("runner cleanup complete");
    }

    fn release(&mut self) {
        self.renderer = None;
        self.window = None;
        self.started = false;
        self.inited = false;
        self.set_lifecycle(Lifecycle::Terminated);
    }
}

/// Recover the core behind a callback state pointer.
///
/// # Safety
///
/// `state` must be the pointer written by [`app_init`] for the same `P`/`H`,
/// and the core must still be alive.
unsafe fn core_mut<'a, P: Platform, H: Handler<P>>(
    state: *mut c_void,
) -> Option<&'a mut RunnerCore<P, H>> {
    // SAFETY: per the function contract.
    unsafe { state.cast::<RunnerCore<P, H>>().as_mut() }
}

#[allow(improper_ctypes_definitions)]
unsafe extern "C" fn app_init<P: Platform, H: Handler<P>>(
    appstate: *mut *mut c_void,
    _argc: c_int,
    _argv: *mut *mut c_char,
) -> P::Status {
    let state = Binding::take_pending();
    if state.is_null() || appstate.is_null() {
        error!("init callback: no runner bound to this thread");
        return P::encode(AppResult::Failure);
    }
    // SAFETY: `appstate` is the loop's state slot; `state` was bound by `run`.
    unsafe { *appstate = state };
    match unsafe { core_mut::<P, H>(state) } {
        Some(core) => P::encode(core.guarded(RunnerCore::on_init)),
        None => P::encode(AppResult::Failure),
    }
}

#[allow(improper_ctypes_definitions)]
unsafe extern "C" fn app_iterate<P: Platform, H: Handler<P>>(appstate: *mut c_void) -> P::Status {
    match unsafe { core_mut::<P, H>(appstate) } {
        Some(core) => P::encode(core.guarded(RunnerCore::on_iterate)),
        None => P::encode(AppResult::Failure),
    }
}

#[allow(improper_ctypes_definitions)]
unsafe extern "C" fn app_event<P: Platform, H: Handler<P>>(
    appstate: *mut c_void,
    event: *mut P::Event,
) -> P::Status {
    let Some(core) = (unsafe { core_mut::<P, H>(appstate) }) else {
        return P::encode(AppResult::Failure);
    };
    // SAFETY: the loop passes a valid event for the duration of the call.
    match unsafe { event.as_ref() } {
        Some(event) => P::encode(core.guarded(|core| core.on_event(event))),
        None => P::encode(AppResult::Continue),
    }
}

#[allow(improper_ctypes_definitions)]
unsafe extern "C" fn app_quit<P: Platform, H: Handler<P>>(appstate: *mut c_void, result: P::Status) {
    let Some(core) = (unsafe { core_mut::<P, H>(appstate) }) else {
        warn!("quit callback without runner state");
        return;
    };
    let result = P::decode(result);
    trace!(?result, "quit callback");

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| core.on_quit(result))) {
        error!("panic while shutting down the runner");
        core.panic.get_or_insert(payload);
        core.release();
    }

    if let Some(keep_alive) = core.keep_alive.take() {
        if core.panic.is_some() {
            error!("dropping panic payload of a runner torn down after run returned");
        }
        trace!("releasing deferred runner");
        keep_alive.release();
    }
}

/// Drives a [`Handler`] through a platform's native main loop.
pub struct Runner<P: Platform, H: Handler<P>> {
    core: Option<Box<RunnerCore<P, H>>>,
    quit: QuitHandle,
    lifecycle: Rc<Cell<Lifecycle>>,
    init_failed: Rc<Cell<bool>>,
    teardown: Teardown,
}

impl<P: Platform, H: Handler<P>> fmt::Debug for Runner<P, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("lifecycle", &self.lifecycle.get())
            .field("exit_code", &self.quit.code())
            .field("teardown", &self.teardown)
            .finish()
    }
}

impl<P: Platform, H: Handler<P>> Runner<P, H> {
    pub fn new(platform: P, handler: H) -> Self {
        Self::with_config(platform, handler, RunnerConfig::default())
    }

    pub fn with_config(platform: P, handler: H, config: RunnerConfig) -> Self {
        Self::from_parts(
            platform,
            handler,
            config,
            RunnerCallbacks::default(),
            QuitHandle::new(),
        )
    }

    pub fn builder(platform: P, handler: H) -> RunnerBuilder<P, H> {
        RunnerBuilder::new(platform, handler)
    }

    fn from_parts(
        platform: P,
        handler: H,
        config: RunnerConfig,
        callbacks: RunnerCallbacks<P>,
        quit: QuitHandle,
    ) -> Self {
        let lifecycle = Rc::new(Cell::new(Lifecycle::Created));
        let init_failed = Rc::new(Cell::new(false));
        let teardown = platform.teardown();
        let core = Box::new(RunnerCore {
            platform,
            handler,
            config,
            callbacks,
            clock: FrameClock::new(),
            renderer: None,
            window: None,
            quit: quit.clone(),
            lifecycle: lifecycle.clone(),
            init_failed: init_failed.clone(),
            inited: false,
            started: false,
            panic: None,
            keep_alive: None,
        });
        trace!("runner created");
        Self {
            core: Some(core),
            quit,
            lifecycle,
            init_failed,
            teardown,
        }
    }

    /// Drive the native loop until the runner terminates and return the exit
    /// code.
    ///
    /// The code is the first one requested, or [`EXIT_SUCCESS`] if the loop
    /// ended without a request. Initialization failures report
    /// [`EXIT_FAILURE`], even if a code was requested before the failure. A
    /// runner runs once; later calls return the stored code.
    ///
    /// With a [`Teardown::Deferred`] platform this returns as soon as the
    /// platform's `enter` does, possibly before the loop finished; the final
    /// code is then available through [`QuitHandle`].
    ///
    /// A panic in a handler hook or callback stops the loop, runs the
    /// teardown and is resumed from here.
    pub fn run(&mut self) -> i32 {
        let mut core = match self.core.take() {
            Some(core) if self.lifecycle.get() == Lifecycle::Created => core,
            core => {
                warn!(lifecycle = ?self.lifecycle.get(), "runner already ran");
                self.core = core;
                return self.exit_code();
            }
        };

        debug!(teardown = ?self.teardown, "starting");
        self.lifecycle.set(Lifecycle::Initializing);

        let mut main_loop = core.platform.main_loop();
        let raw = Box::into_raw(core);

        let binding = match Binding::bind(raw.cast()) {
            Ok(binding) => binding,
            Err(err) => {
                error!(%err, "cannot start runner");
                // SAFETY: `raw` came from `Box::into_raw` above and nothing else saw it.
                let mut core = unsafe { Box::from_raw(raw) };
                core.init_failed.set(true);
                core.quit.exit(EXIT_FAILURE);
                core.release();
                self.core = Some(core);
                return EXIT_FAILURE;
            }
        };

        if self.teardown == Teardown::Deferred {
            // SAFETY: `raw` is live and owned by nobody else until the quit callback.
            unsafe { (*raw).keep_alive = KeepAlive::from_raw(raw) };
        }

        let callbacks = MainCallbacks::<P> {
            init: app_init::<P, H>,
            iterate: app_iterate::<P, H>,
            event: app_event::<P, H>,
            quit: app_quit::<P, H>,
        };
        let native = main_loop.enter(callbacks);
        drop(binding);
        trace!(native, "main loop returned");

        match self.teardown {
            Teardown::Synchronous => {
                // SAFETY: the loop is done with the state; take ownership back.
                let mut core = unsafe { Box::from_raw(raw) };
                if self.lifecycle.get() != Lifecycle::Terminated {
                    warn!("main loop returned without running the quit callback");
                    let result = if native == 0 {
                        AppResult::Success
                    } else {
                        AppResult::Failure
                    };
                    core.on_quit(result);
                }
                let payload = core.panic.take();
                self.core = Some(core);
                if let Some(payload) = payload {
                    panic::resume_unwind(payload);
                }
            }
            Teardown::Deferred => {
                debug!("teardown deferred to the platform");
            }
        }

        self.exit_code()
    }

    /// Request exit with `code`. The first request wins.
    pub fn exit(&self, code: i32) -> bool {
        let first = self.quit.exit(code);
        if first {
            debug!(code, "exit requested");
        }
        first
    }

    /// Wait for exit to be requested, resolving with the exit code.
    pub fn wait_quit(&self) -> Wait<'_> {
        self.quit.wait_quit()
    }

    /// Handle sharing this runner's quit signal
    pub fn quit_handle(&self) -> QuitHandle {
        self.quit.clone()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.get()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.get() == Lifecycle::Running && !self.quit.is_requested()
    }

    /// Exit code so far, [`EXIT_SUCCESS`] if none was requested and
    /// [`EXIT_FAILURE`] if initialization failed
    pub fn exit_code(&self) -> i32 {
        if self.init_failed.get() {
            return EXIT_FAILURE;
        }
        self.quit.code().unwrap_or(EXIT_SUCCESS)
    }

    /// The handler, unless it was handed to a deferred teardown
    pub fn handler(&self) -> Option<&H> {
        self.core.as_ref().map(|core| &core.handler)
    }

    pub fn handler_mut(&mut self) -> Option<&mut H> {
        self.core.as_mut().map(|core| &mut core.handler)
    }

    pub fn into_handler(mut self) -> Option<H> {
        self.core.take().map(|core| core.handler)
    }

    pub fn platform(&self) -> Option<&P> {
        self.core.as_ref().map(|core| &core.platform)
    }
}

/// Builder for [`Runner`]
pub struct RunnerBuilder<P: Platform, H: Handler<P>> {
    platform: P,
    handler: H,
    cfg: RunnerConfig,
    cbs: RunnerCallbacks<P>,
    quit: QuitHandle,
}

impl<P: Platform, H: Handler<P>> RunnerBuilder<P, H> {
    pub fn new(platform: P, handler: H) -> Self {
        Self {
            platform,
            handler,
            cfg: RunnerConfig::default(),
            cbs: RunnerCallbacks::default(),
            quit: QuitHandle::new(),
        }
    }
    pub fn with_config(mut self, cfg: RunnerConfig) -> Self {
        self.cfg = cfg;
        self
    }
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.cfg.window.title = title.into();
        self
    }
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.cfg.window.width = width;
        self.cfg.window.height = height;
        self
    }
    pub fn with_vsync(mut self, vsync: VSync) -> Self {
        self.cfg.vsync = vsync;
        self
    }
    pub fn exit_on_escape(mut self, enabled: bool) -> Self {
        self.cfg.exit_on_escape = enabled;
        self
    }
    /// Share an existing quit handle, e.g. one already given to async tasks.
    pub fn with_quit_handle(mut self, quit: QuitHandle) -> Self {
        self.quit = quit;
        self
    }
    pub fn on_inited<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut RunnerContext<'_, P>) -> bool + 'static,
    {
        self.cbs.on_inited = Some(Box::new(f));
        self
    }
    pub fn on_quitting<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut RunnerContext<'_, P>) + 'static,
    {
        self.cbs.on_quitting = Some(Box::new(f));
        self
    }
    pub fn on_render<F>(mut self, f: F) -> Self
    where
        F: FnMut(&P::Renderer, &FrameContext) + 'static,
    {
        self.cbs.on_render = Some(Box::new(f));
        self
    }
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: FnMut(&P::Event) -> Flow + 'static,
    {
        self.cbs.on_event = Some(Box::new(f));
        self
    }
    pub fn build(self) -> Runner<P, H> {
        Runner::from_parts(self.platform, self.handler, self.cfg, self.cbs, self.quit)
    }
    /// Build and run, returning the exit code.
    pub fn run(self) -> i32 {
        self.build().run()
    }
}
