//! SDL3 platform for `app-loop`.
//!
//! Binds [`app_loop::Runner`] to SDL's main callbacks through
//! `SDL_EnterAppMainCallbacks`, so the same handler runs on desktop, mobile
//! and the web, where SDL owns the main loop. The runner's window and renderer
//! are a plain `SDL_Window` and `SDL_Renderer`, released in reverse order of
//! creation when the loop ends.
//!
//! ```no_run
//! use app_loop::{Flow, RunnerConfig, RunnerContext, from_update};
//! use app_loop_sdl3::Sdl3Platform;
//!
//! let handler = from_update(|ctx: &mut RunnerContext<'_, Sdl3Platform>, frame| {
//!     if frame.elapsed_seconds() > 5.0 {
//!         ctx.exit(0);
//!     }
//!     Flow::Continue
//! });
//! let code = app_loop_sdl3::run(handler, RunnerConfig::default());
//! std::process::exit(code);
//! ```

use std::ffi::{CStr, CString, c_int};
use std::ptr::{self, NonNull};

use app_loop::{
    AppResult, EventKind, Handler, MainCallbacks, MainLoop, Platform, Runner, RunnerConfig,
    RunnerError, RunnerResult, Teardown, VSync, WindowConfig,
};
use sdl3::event::Event;
use sdl3::keyboard::Keycode;
use sdl3_sys::events::SDL_Event;
use sdl3_sys::init::{
    SDL_APP_CONTINUE, SDL_APP_FAILURE, SDL_APP_SUCCESS, SDL_AppResult, SDL_INIT_VIDEO, SDL_Init,
    SDL_InitFlags,
};
use sdl3_sys::render::{
    SDL_CreateRenderer, SDL_DestroyRenderer, SDL_RenderPresent, SDL_Renderer, SDL_SetRenderVSync,
};
use sdl3_sys::video::{
    SDL_CreateWindow, SDL_DestroyWindow, SDL_WINDOW_RESIZABLE, SDL_Window, SDL_WindowFlags,
};
use tracing::{debug, trace};

/// Errors raised while bringing SDL3 resources up.
#[derive(Debug, thiserror::Error)]
pub enum Sdl3PlatformError {
    #[error("SDL_Init failed: {0}")]
    Init(String),
    #[error("SDL_CreateWindow failed: {0}")]
    CreateWindow(String),
    #[error("SDL_CreateRenderer failed: {0}")]
    CreateRenderer(String),
    #[error("Invalid window title (interior NUL byte)")]
    InvalidTitle,
}

impl From<Sdl3PlatformError> for RunnerError {
    fn from(err: Sdl3PlatformError) -> Self {
        match err {
            Sdl3PlatformError::Init(reason) => RunnerError::platform_init(reason),
            Sdl3PlatformError::CreateWindow(reason) => RunnerError::window_creation(reason),
            Sdl3PlatformError::CreateRenderer(reason) => RunnerError::renderer_creation(reason),
            other => RunnerError::platform(other),
        }
    }
}

/// Text of `SDL_GetError()` for the calling thread
pub fn last_error() -> String {
    // SAFETY: SDL_GetError returns a valid C string owned by SDL (or null).
    unsafe {
        let message = sdl3_sys::error::SDL_GetError();
        if message.is_null() {
            String::new()
        } else {
            CStr::from_ptr(message).to_string_lossy().into_owned()
        }
    }
}

/// Convert a raw SDL event into the `sdl3` crate's event enum.
pub fn to_event(raw: &SDL_Event) -> Event {
    Event::from_ll(*raw)
}

/// Main window owned by the runner
#[derive(Debug)]
pub struct Sdl3Window {
    raw: NonNull<SDL_Window>,
}

impl Sdl3Window {
    /// Raw window handle. Do not destroy it; the runner owns the window.
    pub fn raw(&self) -> *mut SDL_Window {
        self.raw.as_ptr()
    }
}

impl Drop for Sdl3Window {
    fn drop(&mut self) {
        trace!("destroying window");
        // SAFETY: created by SDL_CreateWindow and destroyed only here.
        unsafe { SDL_DestroyWindow(self.raw.as_ptr()) };
    }
}

/// Renderer bound to the main window
#[derive(Debug)]
pub struct Sdl3Renderer {
    raw: NonNull<SDL_Renderer>,
}

impl Sdl3Renderer {
    /// Raw renderer handle. Do not destroy it; the runner owns the renderer.
    pub fn raw(&self) -> *mut SDL_Renderer {
        self.raw.as_ptr()
    }
}

impl Drop for Sdl3Renderer {
    fn drop(&mut self) {
        trace!("destroying renderer");
        // SAFETY: created by SDL_CreateRenderer and destroyed only here, before its window.
        unsafe { SDL_DestroyRenderer(self.raw.as_ptr()) };
    }
}

/// SDL3 platform using SDL's main callbacks
#[derive(Clone, Copy, Debug)]
pub struct Sdl3Platform {
    init_flags: SDL_InitFlags,
}

impl Default for Sdl3Platform {
    fn default() -> Self {
        Self::new()
    }
}

impl Sdl3Platform {
    pub fn new() -> Self {
        Self {
            init_flags: SDL_INIT_VIDEO,
        }
    }

    /// Subsystems passed to `SDL_Init` (video by default)
    pub fn with_init_flags(mut self, flags: SDL_InitFlags) -> Self {
        self.init_flags = flags;
        self
    }
}

impl Platform for Sdl3Platform {
    type Window = Sdl3Window;
    type Renderer = Sdl3Renderer;
    type Event = SDL_Event;
    type Status = SDL_AppResult;
    type MainLoop = Sdl3MainLoop;

    fn init(&mut self) -> RunnerResult<()> {
        // SAFETY: plain query, valid before SDL_Init.
        let version = unsafe { sdl3_sys::version::SDL_GetVersion() };
        debug!(
            "SDL3 version {}.{}.{}",
            version / 1_000_000,
            (version / 1_000) % 1_000,
            version % 1_000
        );

        // SAFETY: called from the init callback on the main-loop thread.
        if !unsafe { SDL_Init(self.init_flags) } {
            return Err(Sdl3PlatformError::Init(last_error()).into());
        }
        Ok(())
    }

    fn create_window(&mut self, config: &WindowConfig) -> RunnerResult<Sdl3Window> {
        let title =
            CString::new(config.title.as_str()).map_err(|_| Sdl3PlatformError::InvalidTitle)?;
        let mut flags = SDL_WindowFlags::default();
        if config.resizable {
            flags |= SDL_WINDOW_RESIZABLE;
        }

        // SAFETY: `title` outlives the call; SDL copies it.
        let raw = unsafe {
            SDL_CreateWindow(
                title.as_ptr(),
                config.width as c_int,
                config.height as c_int,
                flags,
            )
        };
        NonNull::new(raw)
            .map(|raw| Sdl3Window { raw })
            .ok_or_else(|| Sdl3PlatformError::CreateWindow(last_error()).into())
    }

    fn create_renderer(&mut self, window: &Sdl3Window) -> RunnerResult<Sdl3Renderer> {
        // SAFETY: `window` is alive; a null name lets SDL pick the driver.
        let raw = unsafe { SDL_CreateRenderer(window.raw(), ptr::null()) };
        NonNull::new(raw)
            .map(|raw| Sdl3Renderer { raw })
            .ok_or_else(|| Sdl3PlatformError::CreateRenderer(last_error()).into())
    }

    fn set_vsync(&mut self, renderer: &Sdl3Renderer, vsync: VSync) -> bool {
        // SAFETY: `renderer` is alive.
        unsafe { SDL_SetRenderVSync(renderer.raw(), vsync.interval()) }
    }

    fn present(&mut self, renderer: &Sdl3Renderer) {
        // SAFETY: `renderer` is alive.
        if !unsafe { SDL_RenderPresent(renderer.raw()) } {
            trace!(error = %last_error(), "SDL_RenderPresent failed");
        }
    }

    fn classify_event(event: &SDL_Event) -> EventKind {
        match to_event(event) {
            Event::Quit { .. } => EventKind::Quit,
            Event::KeyDown {
                keycode: Some(Keycode::Escape),
                ..
            } => EventKind::Escape,
            _ => EventKind::Other,
        }
    }

    fn teardown(&self) -> Teardown {
        // The browser owns the loop: SDL_EnterAppMainCallbacks returns at once
        // and SDL_AppQuit runs whenever the page stops the loop.
        if cfg!(target_os = "emscripten") {
            Teardown::Deferred
        } else {
            Teardown::Synchronous
        }
    }

    fn main_loop(&mut self) -> Sdl3MainLoop {
        Sdl3MainLoop { _private: () }
    }

    fn encode(result: AppResult) -> SDL_AppResult {
        match result {
            AppResult::Continue => SDL_APP_CONTINUE,
            AppResult::Success => SDL_APP_SUCCESS,
            AppResult::Failure => SDL_APP_FAILURE,
        }
    }

    fn decode(status: SDL_AppResult) -> AppResult {
        if status == SDL_APP_CONTINUE {
            AppResult::Continue
        } else if status == SDL_APP_SUCCESS {
            AppResult::Success
        } else {
            AppResult::Failure
        }
    }
}

/// Drives `SDL_EnterAppMainCallbacks`
#[derive(Debug)]
pub struct Sdl3MainLoop {
    _private: (),
}

impl MainLoop<Sdl3Platform> for Sdl3MainLoop {
    fn enter(&mut self, callbacks: MainCallbacks<Sdl3Platform>) -> c_int {
        // SAFETY: the callbacks follow SDL's main callbacks contract; argc/argv
        // are not forwarded.
        unsafe {
            sdl3_sys::main::SDL_EnterAppMainCallbacks(
                0,
                ptr::null_mut(),
                Some(callbacks.init),
                Some(callbacks.iterate),
                Some(callbacks.event),
                Some(callbacks.quit),
            )
        }
    }
}

/// Run `handler` on SDL3 with `config` and return the exit code.
pub fn run<H: Handler<Sdl3Platform>>(handler: H, config: RunnerConfig) -> i32 {
    Runner::with_config(Sdl3Platform::new(), handler, config).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_onto_runner_errors() {
        let err: RunnerError = Sdl3PlatformError::CreateWindow("no display".into()).into();
        assert!(matches!(err, RunnerError::WindowCreation { ref reason } if reason == "no display"));

        let err: RunnerError = Sdl3PlatformError::InvalidTitle.into();
        assert!(matches!(err, RunnerError::Platform(_)));
    }

    #[test]
    fn app_results_round_trip() {
        for result in [AppResult::Continue, AppResult::Success, AppResult::Failure] {
            assert_eq!(Sdl3Platform::decode(Sdl3Platform::encode(result)), result);
        }
    }
}
