//! Cycle and phase timing.

use std::{
    fmt,
    time::{Duration, Instant},
};

use itertools::Itertools;

use crate::filter::{Ema, SimpleFilter};

/// Smoothing factor for per-phase timers.
const TIMER_ALPHA: f32 = 0.3;

/// Smoothing factor for whole pipeline cycles. Small on purpose so that the displayed rate
/// doesn't jitter with every frame.
const CYCLE_ALPHA: f32 = 0.05;

/// Measures how long an operation takes, averaged over its invocations.
///
/// Recorded times are smoothed with an exponentially weighted average and can be displayed
/// using `{}` ([`std::fmt::Display`]).
pub struct Timer {
    name: &'static str,
    avg: SimpleFilter<Ema, f32>,
    avg_ms: f32,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            avg: SimpleFilter::new(Ema::new(TIMER_ALPHA)),
            avg_ms: 0.0,
        }
    }

    /// Runs `timee` and records how long it took.
    pub fn time<T>(&mut self, timee: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        timee()
    }

    /// Begins a measurement that ends when the returned guard is dropped.
    pub fn start(&mut self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    fn stop(&mut self, start: Instant) {
        let ms = start.elapsed().as_secs_f32() * 1000.0;
        self.avg_ms = self.avg.filter(ms);
    }
}

/// Displays the smoothed time in milliseconds.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.01}ms", self.name, self.avg_ms)
    }
}

/// Records the elapsed time into its [`Timer`] on drop.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a mut Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.stop(self.start);
    }
}

/// Counts iterations and logs the per-second rate.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
        }
    }

    /// Counts one frame, logging the rate once per second.
    pub fn tick(&mut self) {
        self.tick_with(std::iter::empty::<&str>());
    }

    /// Counts one frame; the per-second log line additionally lists `extra`.
    pub fn tick_with<D: fmt::Display, I: IntoIterator<Item = D>>(&mut self, extra: I) {
        self.frames += 1;
        if self.start.elapsed() > Duration::from_secs(1) {
            let extra = extra.into_iter().map(|item| item.to_string()).join(", ");
            if extra.is_empty() {
                log::debug!("{}: {} FPS", self.name, self.frames);
            } else {
                log::debug!("{}: {} FPS ({})", self.name, self.frames, extra);
            }

            self.frames = 0;
            self.start = Instant::now();
        }
    }
}

/// Tracks the smoothed duration of whole pipeline cycles.
///
/// Unlike [`Timer`] this is meant for user-facing display, so the derived rate is truncated to
/// one decimal place instead of showing fractional milliseconds.
pub struct CycleTimer {
    started: Option<Instant>,
    avg: SimpleFilter<Ema, f32>,
    mean: f32,
}

impl CycleTimer {
    pub fn new() -> Self {
        Self {
            started: None,
            avg: SimpleFilter::new(Ema::new(CYCLE_ALPHA)),
            mean: 0.0,
        }
    }

    /// Marks the start of a cycle.
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Marks the end of a cycle, folding its duration into the running mean.
    ///
    /// Returns the duration of this cycle in seconds. Calling `stop` without a preceding
    /// [`CycleTimer::start`] does nothing.
    pub fn stop(&mut self) -> f32 {
        match self.started.take() {
            Some(started) => {
                let secs = started.elapsed().as_secs_f32();
                self.record(secs);
                secs
            }
            None => 0.0,
        }
    }

    fn record(&mut self, secs: f32) {
        self.mean = self.avg.filter(secs);
    }

    /// Returns the smoothed cycle duration in seconds (0.0 until a cycle completes).
    pub fn mean(&self) -> f32 {
        self.mean
    }

    /// Returns the smoothed rate in cycles per second, truncated to one decimal place.
    pub fn display_fps(&self) -> f32 {
        if self.mean == 0.0 {
            0.0
        } else {
            (10.0 / self.mean).trunc() / 10.0
        }
    }
}

impl Default for CycleTimer {
    fn default() -> Self {
        Self::new()
    }
}
