//! Headless platform
//!
//! A [`Platform`] without any native window system. Its loop driver follows
//! the same callback protocol as SDL's main callbacks (init, then events and
//! iterate per frame, then quit) from a scripted list of events, and records
//! what happened in a shared [`Journal`]. Useful for tests, tools and CI.

use std::cell::{Cell, RefCell};
use std::ffi::{c_int, c_void};
use std::fmt;
use std::ptr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::config::{VSync, WindowConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::platform::{AppResult, EventKind, MainCallbacks, MainLoop, Platform, Teardown};

/// Keys the headless platform can report
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Escape,
    Char(char),
}

/// Scripted platform event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeadlessEvent {
    /// The application was asked to quit
    Quit,
    KeyDown(Key),
    Resized { width: u32, height: u32 },
    /// Application-defined payload
    User(u32),
}

/// Something the headless platform did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record {
    Init,
    WindowCreated { title: String },
    RendererCreated,
    VSync { mode: VSync, applied: bool },
    Present { frame: u64 },
    RendererReleased,
    WindowReleased,
}

/// Shared, thread-safe log of [`Record`]s
#[derive(Clone, Debug, Default)]
pub struct Journal {
    records: Arc<Mutex<Vec<Record>>>,
}

impl Journal {
    pub fn push(&self, record: Record) {
        self.records.lock().push(record);
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    pub fn presents(&self) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|record| matches!(record, Record::Present { .. }))
            .count()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

/// Headless main window
#[derive(Debug)]
pub struct HeadlessWindow {
    title: String,
    size: (u32, u32),
    journal: Journal,
}

impl HeadlessWindow {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

impl Drop for HeadlessWindow {
    fn drop(&mut self) {
        self.journal.push(Record::WindowReleased);
    }
}

/// Headless renderer
#[derive(Debug)]
pub struct HeadlessRenderer {
    journal: Journal,
}

impl Drop for HeadlessRenderer {
    fn drop(&mut self) {
        self.journal.push(Record::RendererReleased);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Failure {
    #[default]
    None,
    Init,
    Window,
    Renderer,
}

/// Scripted platform with no native resources.
#[derive(Debug)]
pub struct HeadlessPlatform {
    script: Vec<(u64, HeadlessEvent)>,
    max_frames: Option<u64>,
    frame_step: Option<Duration>,
    vsync_modes: Vec<VSync>,
    failure: Failure,
    teardown: Teardown,
    journal: Journal,
    frames: u64,
    start: Instant,
    clock_reads: Cell<u32>,
    deferred: DeferredDriver,
}

impl Default for HeadlessPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessPlatform {
    pub fn new() -> Self {
        Self {
            script: Vec::new(),
            max_frames: None,
            frame_step: None,
            vsync_modes: vec![VSync::Disabled, VSync::Enabled],
            failure: Failure::None,
            teardown: Teardown::Synchronous,
            journal: Journal::default(),
            frames: 0,
            start: Instant::now(),
            clock_reads: Cell::new(0),
            deferred: DeferredDriver::default(),
        }
    }

    /// Deliver `event` right before iteration `frame` (0-based).
    pub fn with_event(mut self, frame: u64, event: HeadlessEvent) -> Self {
        self.script.push((frame, event));
        self.script.sort_by_key(|(at, _)| *at);
        self
    }

    /// Deliver a quit event before iteration `frames` if the loop is still
    /// running, so that exactly `frames` iterations happen.
    pub fn with_max_frames(mut self, frames: u64) -> Self {
        self.max_frames = Some(frames);
        self
    }

    /// Advance the reported time by `step` on every clock read instead of
    /// using the wall clock. The runner reads the clock once when it starts
    /// and once per iteration.
    pub fn with_frame_step(mut self, step: Duration) -> Self {
        self.frame_step = Some(step);
        self
    }

    /// VSync modes the renderer accepts
    pub fn with_vsync_modes(mut self, modes: &[VSync]) -> Self {
        self.vsync_modes = modes.to_vec();
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.failure = Failure::Init;
        self
    }

    pub fn failing_window(mut self) -> Self {
        self.failure = Failure::Window;
        self
    }

    pub fn failing_renderer(mut self) -> Self {
        self.failure = Failure::Renderer;
        self
    }

    /// Return from `enter` right after init and leave the rest of the loop
    /// to [`DeferredDriver`].
    pub fn deferred(mut self) -> Self {
        self.teardown = Teardown::Deferred;
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    pub fn deferred_driver(&self) -> DeferredDriver {
        self.deferred.clone()
    }
}

impl Platform for HeadlessPlatform {
    type Window = HeadlessWindow;
    type Renderer = HeadlessRenderer;
    type Event = HeadlessEvent;
    type Status = AppResult;
    type MainLoop = HeadlessLoop;

    fn init(&mut self) -> RunnerResult<()> {
        if self.failure == Failure::Init {
            return Err(RunnerError::platform_init("scripted init failure"));
        }
        self.journal.push(Record::Init);
        Ok(())
    }

    fn create_window(&mut self, config: &WindowConfig) -> RunnerResult<HeadlessWindow> {
        if self.failure == Failure::Window {
            return Err(RunnerError::window_creation("scripted window failure"));
        }
        self.journal.push(Record::WindowCreated {
            title: config.title.clone(),
        });
        Ok(HeadlessWindow {
            title: config.title.clone(),
            size: (config.width, config.height),
            journal: self.journal.clone(),
        })
    }

    fn create_renderer(&mut self, _window: &HeadlessWindow) -> RunnerResult<HeadlessRenderer> {
        if self.failure == Failure::Renderer {
            return Err(RunnerError::renderer_creation("scripted renderer failure"));
        }
        self.journal.push(Record::RendererCreated);
        Ok(HeadlessRenderer {
            journal: self.journal.clone(),
        })
    }

    fn set_vsync(&mut self, _renderer: &HeadlessRenderer, vsync: VSync) -> bool {
        let applied = self.vsync_modes.contains(&vsync);
        self.journal.push(Record::VSync {
            mode: vsync,
            applied,
        });
        applied
    }

    fn present(&mut self, _renderer: &HeadlessRenderer) {
        self.frames += 1;
        self.journal.push(Record::Present { frame: self.frames });
    }

    fn classify_event(event: &HeadlessEvent) -> EventKind {
        match event {
            HeadlessEvent::Quit => EventKind::Quit,
            HeadlessEvent::KeyDown(Key::Escape) => EventKind::Escape,
            _ => EventKind::Other,
        }
    }

    fn now(&self) -> Instant {
        match self.frame_step {
            Some(step) => {
                let reads = self.clock_reads.get();
                self.clock_reads.set(reads + 1);
                self.start + step * reads
            }
            None => Instant::now(),
        }
    }

    fn teardown(&self) -> Teardown {
        self.teardown
    }

    fn main_loop(&mut self) -> HeadlessLoop {
        HeadlessLoop {
            script: self.script.clone().into(),
            max_frames: self.max_frames,
            teardown: self.teardown,
            deferred: self.deferred.clone(),
        }
    }

    fn encode(result: AppResult) -> AppResult {
        result
    }

    fn decode(status: AppResult) -> AppResult {
        status
    }
}

/// Loop driver of [`HeadlessPlatform`]
pub struct HeadlessLoop {
    script: std::collections::VecDeque<(u64, HeadlessEvent)>,
    max_frames: Option<u64>,
    teardown: Teardown,
    deferred: DeferredDriver,
}

impl fmt::Debug for HeadlessLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessLoop")
            .field("scripted", &self.script.len())
            .field("max_frames", &self.max_frames)
            .field("teardown", &self.teardown)
            .finish()
    }
}

struct LoopState {
    callbacks: MainCallbacks<HeadlessPlatform>,
    appstate: *mut c_void,
    script: std::collections::VecDeque<(u64, HeadlessEvent)>,
    max_frames: Option<u64>,
    frame: u64,
    result: AppResult,
    quit_sent: bool,
}

impl LoopState {
    /// Deliver this frame's events and iterate once.
    fn step(&mut self) -> AppResult {
        if self.result != AppResult::Continue {
            return self.result;
        }

        let mut due = Vec::new();
        while self
            .script
            .front()
            .is_some_and(|(at, _)| *at <= self.frame)
        {
            if let Some((_, event)) = self.script.pop_front() {
                due.push(event);
            }
        }
        if self.max_frames.is_some_and(|max| self.frame >= max) && !self.quit_sent {
            self.quit_sent = true;
            due.push(HeadlessEvent::Quit);
        }

        for mut event in due {
            // SAFETY: `appstate` was produced by init and the event outlives the call.
            self.result = unsafe { (self.callbacks.event)(self.appstate, &mut event) };
            if self.result != AppResult::Continue {
                return self.result;
            }
        }

        // SAFETY: as above.
        self.result = unsafe { (self.callbacks.iterate)(self.appstate) };
        self.frame += 1;
        self.result
    }

    fn finish(&mut self) {
        trace!(result = ?self.result, frames = self.frame, "headless loop finished");
        // SAFETY: quit runs exactly once, after which `appstate` is not used.
        unsafe { (self.callbacks.quit)(self.appstate, self.result) };
        self.appstate = ptr::null_mut();
    }
}

impl MainLoop<HeadlessPlatform> for HeadlessLoop {
    fn enter(&mut self, callbacks: MainCallbacks<HeadlessPlatform>) -> c_int {
        let mut appstate: *mut c_void = ptr::null_mut();
        // SAFETY: the callbacks follow the main callbacks contract.
        let result = unsafe { (callbacks.init)(&mut appstate, 0, ptr::null_mut()) };

        let mut state = LoopState {
            callbacks,
            appstate,
            script: std::mem::take(&mut self.script),
            max_frames: self.max_frames,
            frame: 0,
            result,
            quit_sent: false,
        };

        if self.teardown == Teardown::Deferred {
            if result == AppResult::Continue {
                *self.deferred.state.borrow_mut() = Some(state);
            } else {
                state.finish();
            }
            return 0;
        }

        while state.step() == AppResult::Continue {}
        state.finish();
        match state.result {
            AppResult::Failure => 1,
            AppResult::Continue | AppResult::Success => 0,
        }
    }
}

/// Pumps a deferred headless loop after `Runner::run` has returned.
#[derive(Clone, Default)]
pub struct DeferredDriver {
    state: Rc<RefCell<Option<LoopState>>>,
}

impl fmt::Debug for DeferredDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredDriver")
            .field("active", &self.is_active())
            .finish()
    }
}

impl DeferredDriver {
    /// A loop is waiting to be pumped
    pub fn is_active(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Run one frame. Runs the quit callback and returns `false` once the
    /// loop ends.
    pub fn pump(&self) -> bool {
        let Some(mut state) = self.state.borrow_mut().take() else {
            return false;
        };
        if state.step() == AppResult::Continue {
            *self.state.borrow_mut() = Some(state);
            true
        } else {
            state.finish();
            false
        }
    }

    /// Pump until the loop ends. Returns the number of frames pumped.
    pub fn run_to_end(&self) -> usize {
        let mut frames = 0;
        while self.pump() {
            frames += 1;
        }
        frames
    }
}

impl Drop for LoopState {
    fn drop(&mut self) {
        if !self.appstate.is_null() {
            warn!("headless loop dropped without running its quit callback");
        }
    }
}
