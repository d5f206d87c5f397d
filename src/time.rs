//! Frame timing for the status labels.
//!
//! [`FrameTimer`] averages the simulation time of the last
//! [`SIM_SAMPLES`] frames and counts rendered frames. Both labels are
//! refreshed every [`REFRESH_INTERVAL`] so the numbers stay readable.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Frames averaged for the simulation time label.
pub const SIM_SAMPLES: usize = 10;

/// How often the displayed values change.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct FrameTimer {
    sim_samples: VecDeque<Duration>,
    frames_since_refresh: u32,
    last_refresh: Instant,
    last_frame: Instant,
    frame_count: u64,
    /// Displayed values.
    sim_ms: f32,
    fps: f32,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            sim_samples: VecDeque::with_capacity(SIM_SAMPLES),
            frames_since_refresh: 0,
            last_refresh: now,
            last_frame: now,
            frame_count: 0,
            sim_ms: 0.0,
            fps: 0.0,
        }
    }

    /// Record how long the solver took this frame.
    pub fn record_sim(&mut self, elapsed: Duration) {
        if self.sim_samples.len() == SIM_SAMPLES {
            self.sim_samples.pop_front();
        }
        self.sim_samples.push_back(elapsed);
    }

    /// Mark a rendered frame. Returns the time since the previous frame.
    pub fn frame(&mut self) -> Duration {
        self.frame_at(Instant::now())
    }

    fn frame_at(&mut self, now: Instant) -> Duration {
        let delta = now.saturating_duration_since(self.last_frame);
        self.last_frame = now;
        self.frame_count += 1;
        self.frames_since_refresh += 1;

        let since_refresh = now.saturating_duration_since(self.last_refresh);
        if since_refresh >= REFRESH_INTERVAL {
            self.fps = self.frames_since_refresh as f32 / since_refresh.as_secs_f32();
            self.sim_ms = self.average_sim_ms();
            self.frames_since_refresh = 0;
            self.last_refresh = now;
        }
        delta
    }

    /// Current average over the sample window, ignoring the refresh interval.
    pub fn average_sim_ms(&self) -> f32 {
        if self.sim_samples.is_empty() {
            return 0.0;
        }
        let total: Duration = self.sim_samples.iter().sum();
        total.as_secs_f32() * 1000.0 / self.sim_samples.len() as f32
    }

    /// Displayed simulation ms/frame.
    pub fn sim_ms(&self) -> f32 {
        self.sim_ms
    }

    /// Displayed frames per second.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_average_window() {
        let mut timer = FrameTimer::new();
        assert_eq!(timer.average_sim_ms(), 0.0);

        for _ in 0..SIM_SAMPLES {
            timer.record_sim(Duration::from_millis(10));
        }
        assert!((timer.average_sim_ms() - 10.0).abs() < 1e-3);

        // Old samples fall out of the window.
        for _ in 0..SIM_SAMPLES {
            timer.record_sim(Duration::from_millis(2));
        }
        assert!((timer.average_sim_ms() - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_labels_refresh_every_interval() {
        let start = Instant::now();
        let mut timer = FrameTimer::starting_at(start);
        timer.record_sim(Duration::from_millis(4));

        timer.frame_at(start + Duration::from_millis(500));
        assert_eq!(timer.fps(), 0.0);
        assert_eq!(timer.sim_ms(), 0.0);

        for i in 2..=40 {
            timer.frame_at(start + Duration::from_millis(50 * i));
        }
        // 40 frames over 2 s.
        assert!((timer.fps() - 20.0).abs() < 1e-3);
        assert!((timer.sim_ms() - 4.0).abs() < 1e-3);
        assert_eq!(timer.frame_count(), 40);
    }

    #[test]
    fn test_frame_delta() {
        let start = Instant::now();
        let mut timer = FrameTimer::starting_at(start);
        let dt = timer.frame_at(start + Duration::from_millis(16));
        assert_eq!(dt, Duration::from_millis(16));
    }
}
