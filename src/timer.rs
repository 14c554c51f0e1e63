//! Frame clock.

use std::time::Instant;

/// Produces delta, fixed delta and elapsed time once per frame.
///
/// The pipeline is the only writer. Passes get a shared reference while they render.
///
/// Timestamps are in milliseconds, the way display callbacks report them. Without a
/// timestamp the timer measures wall time since it was created.
#[derive(Clone, Debug)]
pub struct Timer {
    start: Instant,
    previous: Option<f64>,
    current: f64,
    delta: f64,
    fixed_delta: f64,
    elapsed: f64,
    time_scale: f64,
    frame: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            previous: None,
            current: 0.0,
            delta: 0.0,
            fixed_delta: 1.0 / 60.0,
            elapsed: 0.0,
            time_scale: 1.0,
            frame: 0,
        }
    }

    /// Advances the clock. The first update after construction or [`reset`](Self::reset)
    /// yields a zero delta.
    pub fn update(&mut self, timestamp: Option<f64>) {
        let now = timestamp.unwrap_or_else(|| self.start.elapsed().as_secs_f64() * 1e3);
        let previous = self.previous.unwrap_or(now);

        self.delta = (now - previous).max(0.0) * self.time_scale / 1e3;
        self.elapsed += self.delta;
        self.previous = Some(now);
        self.current = now;
        self.frame += 1;
    }

    pub fn reset(&mut self) {
        self.start = Instant::now();
        self.previous = None;
        self.current = 0.0;
        self.delta = 0.0;
        self.elapsed = 0.0;
        self.frame = 0;
    }

    /// Seconds since the previous update, scaled.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn fixed_delta(&self) -> f64 {
        self.fixed_delta
    }

    pub fn set_fixed_delta(&mut self, seconds: f64) {
        self.fixed_delta = seconds;
    }

    /// Scaled seconds accumulated over all updates.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    pub fn set_time_scale(&mut self, scale: f64) {
        self.time_scale = scale;
    }

    /// The last timestamp, in milliseconds.
    pub fn timestamp(&self) -> f64 {
        self.current
    }

    /// Number of updates since the last reset.
    pub fn frame(&self) -> u64 {
        self.frame
    }
}
