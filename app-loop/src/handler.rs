//! Application handler contract
//!
//! A [`Handler`] supplies the application-specific behavior driven by a
//! [`Runner`](crate::Runner). All hooks run on the native loop thread, in
//! order: `start` once, then `update`/`event` in loop order, then `stop` once
//! (only if `start` succeeded).

use std::fmt;
use std::marker::PhantomData;

use crate::clock::FrameContext;
use crate::platform::Platform;
use crate::runner::RunnerContext;

/// Whether the loop should keep going after a hook returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Flow {
    #[default]
    Continue,
    /// Request exit with the success code (unless a code is already set)
    Exit,
}

impl Flow {
    pub fn is_exit(self) -> bool {
        matches!(self, Flow::Exit)
    }
}

impl From<bool> for Flow {
    /// `true` keeps running, `false` requests exit.
    fn from(keep_running: bool) -> Self {
        if keep_running {
            Flow::Continue
        } else {
            Flow::Exit
        }
    }
}

/// Lifecycle hooks driven by the runner.
pub trait Handler<P: Platform> {
    /// Called once after the platform resources exist.
    ///
    /// Returning `false` aborts the run with a failure exit code; `update`,
    /// `event` and `stop` are then never called.
    fn start(&mut self, ctx: &mut RunnerContext<'_, P>) -> bool {
        let _ = ctx;
        true
    }

    /// Called once per iteration with the frame timing.
    fn update(&mut self, ctx: &mut RunnerContext<'_, P>, frame: &FrameContext) -> Flow;

    /// Called for each platform event, before the runner's own quit handling.
    fn event(&mut self, ctx: &mut RunnerContext<'_, P>, event: &P::Event) -> Flow {
        let _ = (ctx, event);
        Flow::Continue
    }

    /// Called once after the last `update`/`event`.
    fn stop(&mut self, ctx: &mut RunnerContext<'_, P>) {
        let _ = ctx;
    }
}

impl<P: Platform, H: Handler<P> + ?Sized> Handler<P> for Box<H> {
    fn start(&mut self, ctx: &mut RunnerContext<'_, P>) -> bool {
        (**self).start(ctx)
    }

    fn update(&mut self, ctx: &mut RunnerContext<'_, P>, frame: &FrameContext) -> Flow {
        (**self).update(ctx, frame)
    }

    fn event(&mut self, ctx: &mut RunnerContext<'_, P>, event: &P::Event) -> Flow {
        (**self).event(ctx, event)
    }

    fn stop(&mut self, ctx: &mut RunnerContext<'_, P>) {
        (**self).stop(ctx)
    }
}

/// Handler made from an update closure.
pub struct FnHandler<P, F> {
    update: F,
    _platform: PhantomData<fn(P)>,
}

impl<P, F> fmt::Debug for FnHandler<P, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Build a handler that only implements `update`.
pub fn from_update<P, F>(update: F) -> FnHandler<P, F>
where
    P: Platform,
    F: FnMut(&mut RunnerContext<'_, P>, &FrameContext) -> Flow,
{
    FnHandler {
        update,
        _platform: PhantomData,
    }
}

impl<P, F> Handler<P> for FnHandler<P, F>
where
    P: Platform,
    F: FnMut(&mut RunnerContext<'_, P>, &FrameContext) -> Flow,
{
    fn update(&mut self, ctx: &mut RunnerContext<'_, P>, frame: &FrameContext) -> Flow {
        (self.update)(ctx, frame)
    }
}

/// Fans lifecycle hooks out to several handlers.
///
/// Children start in insertion order and stop in reverse. If a child fails to
/// start, the children already started are stopped (in reverse) and the
/// composite reports failure. Events are offered in order until one of them
/// asks to exit.
pub struct CompositeHandler<P: Platform> {
    children: Vec<Box<dyn Handler<P>>>,
    started: usize,
}

impl<P: Platform> Default for CompositeHandler<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Platform> fmt::Debug for CompositeHandler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeHandler")
            .field("children", &self.children.len())
            .field("started", &self.started)
            .finish()
    }
}

impl<P: Platform> CompositeHandler<P> {
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
            started: 0,
        }
    }

    pub fn with<H: Handler<P> + 'static>(mut self, handler: H) -> Self {
        self.push(handler);
        self
    }

    pub fn push<H: Handler<P> + 'static>(&mut self, handler: H) {
        self.children.push(Box::new(handler));
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn stop_started(&mut self, ctx: &mut RunnerContext<'_, P>) {
        while self.started > 0 {
            self.started -= 1;
            self.children[self.started].stop(ctx);
        }
    }
}

impl<P: Platform> Handler<P> for CompositeHandler<P> {
    fn start(&mut self, ctx: &mut RunnerContext<'_, P>) -> bool {
        for index in 0..self.children.len() {
            if !self.children[index].start(ctx) {
                tracing::debug!(index, "composite child failed to start");
                self.stop_started(ctx);
                return false;
            }
            self.started = index + 1;
        }
        true
    }

    fn update(&mut self, ctx: &mut RunnerContext<'_, P>, frame: &FrameContext) -> Flow {
        let mut flow = Flow::Continue;
        for child in &mut self.children[..self.started] {
            if child.update(ctx, frame).is_exit() {
                flow = Flow::Exit;
            }
        }
        flow
    }

    fn event(&mut self, ctx: &mut RunnerContext<'_, P>, event: &P::Event) -> Flow {
        for child in &mut self.children[..self.started] {
            if child.event(ctx, event).is_exit() {
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    fn stop(&mut self, ctx: &mut RunnerContext<'_, P>) {
        self.stop_started(ctx);
    }
}
