//! app-loop: lifecycle runner for callback-driven native main loops
//!
//! Native loops such as SDL3's main callbacks (`SDL_AppInit`,
//! `SDL_AppIterate`, `SDL_AppEvent`, `SDL_AppQuit`) call into the application
//! instead of letting it own a `loop {}`. [`Runner`] adapts that protocol to a
//! structured lifecycle:
//!
//! - [`Handler::start`] once the window and renderer exist
//! - [`Handler::update`] every iteration with a [`FrameContext`] from the
//!   runner's [`FrameClock`], [`Handler::event`] for every platform event
//! - [`Handler::stop`] once, after the last update or event
//!
//! Exit is requested with a code through [`Runner::exit`],
//! [`RunnerContext::exit`] or a cloned [`QuitHandle`]. The first code wins and
//! is what [`Runner::run`] returns. The same request fires a [`QuitSignal`],
//! so async tasks can `wait_quit().await` on a [`QueueExecutor`] or any other
//! executor.
//!
//! Quickstart
//! ```no_run
//! use app_loop::headless::HeadlessPlatform;
//! use app_loop::{Flow, Runner, from_update};
//!
//! let handler = from_update::<HeadlessPlatform, _>(|ctx, frame| {
//!     if frame.frame_index == 3 {
//!         ctx.exit(2);
//!     }
//!     Flow::Continue
//! });
//! let code = Runner::new(HeadlessPlatform::new(), handler).run();
//! assert_eq!(code, 2);
//! ```

mod binding;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod handler;
pub mod headless;
pub mod logging;
pub mod platform;
pub mod quit;
pub mod runner;

pub use binding::is_runner_active;
pub use clock::{FpsCounter, FrameClock, FrameContext};
pub use config::{RunnerConfig, VSync, WindowConfig};
pub use error::{EXIT_FAILURE, EXIT_SUCCESS, RunnerError, RunnerResult};
pub use executor::{QueueExecutor, TaskHandle};
pub use handler::{CompositeHandler, Flow, FnHandler, Handler, from_update};
pub use platform::{
    AppEventFn, AppInitFn, AppIterateFn, AppQuitFn, AppResult, EventKind, MainCallbacks,
    MainLoop, Platform, Teardown,
};
pub use quit::{QuitHandle, QuitSignal, Wait};
pub use runner::{Lifecycle, Runner, RunnerBuilder, RunnerCallbacks, RunnerContext};
