//! Frame timing
//!
//! [`FrameClock`] is owned by the runner: initialized once when the run
//! starts and ticked once per iteration. Handlers only ever see the
//! [`FrameContext`] snapshot produced by each tick.

use std::time::{Duration, Instant};

/// Per-iteration timing snapshot passed to `Handler::update`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameContext {
    /// Number of ticks so far, starting at 1 for the first frame
    pub frame_index: u64,
    /// Time since the previous tick (or since initialization for the first one)
    pub delta: Duration,
    /// Time since the session started
    pub elapsed: Duration,
}

impl FrameContext {
    /// Frame delta in seconds
    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Session time in seconds
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Session and frame timing tracker.
#[derive(Clone, Debug)]
pub struct FrameClock {
    session_start: Instant,
    last_tick: Instant,
    frame_index: u64,
    delta: Duration,
    elapsed: Duration,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    /// Create a clock whose session starts now.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a clock whose session starts at `now`.
    pub fn starting_at(now: Instant) -> Self {
        Self {
            session_start: now,
            last_tick: now,
            frame_index: 0,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
        }
    }

    /// Restart the session at the current instant.
    pub fn initialize(&mut self) {
        self.initialize_at(Instant::now());
    }

    /// Restart the session at `now`, resetting the frame index.
    pub fn initialize_at(&mut self, now: Instant) {
        *self = Self::starting_at(now);
    }

    /// Advance one frame using the current instant.
    pub fn tick(&mut self) -> FrameContext {
        self.tick_at(Instant::now())
    }

    /// Advance one frame at `now`.
    ///
    /// A `now` earlier than the previous tick yields a zero delta.
    pub fn tick_at(&mut self, now: Instant) -> FrameContext {
        self.delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.frame_index += 1;
        self.elapsed = now.saturating_duration_since(self.session_start);
        self.context()
    }

    /// Snapshot of the most recent tick
    pub fn context(&self) -> FrameContext {
        FrameContext {
            frame_index: self.frame_index,
            delta: self.delta,
            elapsed: self.elapsed,
        }
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn session_start(&self) -> Instant {
        self.session_start
    }
}

/// Average FPS over a sliding window of frame deltas.
#[derive(Clone, Debug)]
pub struct FpsCounter {
    frame_times: Vec<f32>,
    index: usize,
    samples: usize,
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl FpsCounter {
    pub const DEFAULT_CAPACITY: usize = 30;

    /// Create a counter averaging over the last `capacity` frames.
    ///
    /// A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            frame_times: vec![0.0; capacity.max(1)],
            index: 0,
            samples: 0,
        }
    }

    /// Record a frame. Non-positive deltas are ignored.
    pub fn add_frame(&mut self, delta_seconds: f32) {
        if delta_seconds > 0.0 {
            let capacity = self.frame_times.len();
            self.frame_times[self.index] = delta_seconds;
            self.index = (self.index + 1) % capacity;
            self.samples = (self.samples + 1).min(capacity);
        }
    }

    pub fn average_fps(&self) -> f32 {
        if self.samples == 0 {
            return 0.0;
        }
        let total: f32 = self.frame_times[..self.samples].iter().sum();
        if total == 0.0 {
            return 0.0;
        }
        self.samples as f32 / total
    }

    pub fn sample_count(&self) -> usize {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_is_measured_from_initialize() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start);
        let ctx = clock.tick_at(start + Duration::from_millis(16));
        assert_eq!(ctx.frame_index, 1);
        assert_eq!(ctx.delta, Duration::from_millis(16));
        assert_eq!(ctx.elapsed, Duration::from_millis(16));
    }

    #[test]
    fn elapsed_equals_sum_of_deltas() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start);
        let steps = [3u64, 16, 17, 1, 40, 8];
        let mut now = start;
        let mut sum = Duration::ZERO;
        for ms in steps {
            now += Duration::from_millis(ms);
            sum += clock.tick_at(now).delta;
        }
        assert_eq!(clock.frame_index(), steps.len() as u64);
        assert_eq!(clock.elapsed(), sum);
    }

    #[test]
    fn initialize_resets_the_session() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start);
        clock.tick_at(start + Duration::from_millis(5));
        clock.tick_at(start + Duration::from_millis(9));

        let restart = start + Duration::from_secs(1);
        clock.initialize_at(restart);
        assert_eq!(clock.frame_index(), 0);
        assert_eq!(clock.elapsed(), Duration::ZERO);

        let ctx = clock.tick_at(restart + Duration::from_millis(2));
        assert_eq!(ctx.frame_index, 1);
        assert_eq!(ctx.delta, Duration::from_millis(2));
    }

    #[test]
    fn backwards_time_saturates() {
        let start = Instant::now() + Duration::from_secs(1);
        let mut clock = FrameClock::starting_at(start);
        let ctx = clock.tick_at(start - Duration::from_millis(10));
        assert_eq!(ctx.delta, Duration::ZERO);
        assert_eq!(ctx.frame_index, 1);
    }

    #[test]
    fn fps_counter_averages_over_window() {
        let mut fps = FpsCounter::new(4);
        assert_eq!(fps.average_fps(), 0.0);

        fps.add_frame(0.0);
        fps.add_frame(-1.0);
        assert_eq!(fps.sample_count(), 0);

        for _ in 0..4 {
            fps.add_frame(0.5);
        }
        assert!((fps.average_fps() - 2.0).abs() < 1e-6);

        // Older samples fall out of the window.
        for _ in 0..4 {
            fps.add_frame(0.25);
        }
        assert_eq!(fps.sample_count(), 4);
        assert!((fps.average_fps() - 4.0).abs() < 1e-6);
    }
}
