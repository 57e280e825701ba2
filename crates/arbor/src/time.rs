//! Frame timing.
//!
//! The root ticks [`Time`] once per frame, right before the time pulse, and
//! hands [`Time::delta_secs`] to every `update` hook. A fixed step can be
//! configured for deterministic runs (tests, headless replays); the wall
//! clock is still tracked for diagnostics.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Time {
    startup: Instant,
    frame_start: Instant,
    delta: Duration,
    elapsed: Duration,
    frame_count: u64,
    fixed_step: Option<Duration>,
    /// Wall-clock duration of the previous frame, even under a fixed step.
    real_delta: Duration,
}

impl Time {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            startup: now,
            frame_start: now,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_count: 0,
            fixed_step: None,
            real_delta: Duration::ZERO,
        }
    }

    /// Report `step` as every frame's delta regardless of the wall clock.
    pub fn with_fixed_step(mut self, step: Option<Duration>) -> Self {
        self.fixed_step = step;
        self
    }

    /// Measure the next delta from now. The root calls this right before its
    /// first frame so setup work is not billed to frame one.
    pub fn restart_clock(&mut self) {
        self.frame_start = Instant::now();
    }

    /// Advance to a new frame.
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.real_delta = now - self.frame_start;
        self.frame_start = now;
        self.delta = self.fixed_step.unwrap_or(self.real_delta);
        self.elapsed += self.delta;
        self.frame_count += 1;
    }

    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Sum of all deltas so far.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }

    /// Wall-clock time since startup.
    pub fn uptime(&self) -> Duration {
        self.startup.elapsed()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Estimated FPS from the last wall-clock frame time.
    pub fn fps(&self) -> f32 {
        let secs = self.real_delta.as_secs_f32();
        if secs > 0.0 { 1.0 / secs } else { 0.0 }
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_step_reports_the_step() {
        let mut time = Time::new().with_fixed_step(Some(Duration::from_millis(20)));
        time.tick();
        time.tick();
        assert_eq!(time.delta(), Duration::from_millis(20));
        assert_eq!(time.elapsed(), Duration::from_millis(40));
        assert_eq!(time.frame_count(), 2);
    }

    #[test]
    fn restart_clock_excludes_setup_time() {
        let mut time = Time::new();
        std::thread::sleep(Duration::from_millis(50));
        time.restart_clock();
        time.tick();
        assert!(time.delta() < Duration::from_millis(50));
        assert!(time.uptime() >= Duration::from_millis(50));
    }

    #[test]
    fn wall_clock_delta_is_monotonic() {
        let mut time = Time::new();
        std::thread::sleep(Duration::from_millis(2));
        time.tick();
        assert!(time.delta() >= Duration::from_millis(2));
        assert!(time.fps() > 0.0);
    }
}
