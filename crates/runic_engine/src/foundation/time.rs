//! Frame timing

use std::time::{Duration, Instant};

/// Longest delta handed to the application, so a stall does not teleport the camera
const MAX_DELTA_SECONDS: f32 = 0.25;

/// Per-frame delta timer with a rolling frames-per-second counter
pub struct FrameTimer {
    last_frame: Instant,
    delta_time: f32,
    window_start: Instant,
    window_frames: u32,
    fps: f32,
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTimer {
    /// Start timing from now
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_frame: now,
            delta_time: 0.0,
            window_start: now,
            window_frames: 0,
            fps: 0.0,
        }
    }

    /// Advance one frame and return the clamped delta in seconds
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> f32 {
        self.delta_time = now
            .duration_since(self.last_frame)
            .as_secs_f32()
            .min(MAX_DELTA_SECONDS);
        self.last_frame = now;

        self.window_frames += 1;
        let window = now.duration_since(self.window_start);
        if window >= Duration::from_secs(1) {
            #[allow(clippy::cast_precision_loss)]
            let frames = self.window_frames as f32;
            self.fps = frames / window.as_secs_f32();
            self.window_frames = 0;
            self.window_start = now;
        }
        self.delta_time
    }

    /// Delta of the last tick in seconds
    pub const fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Frames per second over the last full second, zero until one has passed
    pub const fn fps(&self) -> f32 {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_delta_is_clamped() {
        let mut timer = FrameTimer::new();
        let start = timer.last_frame;

        assert_relative_eq!(timer.tick_at(start + Duration::from_millis(10)), 0.01, epsilon = 1e-4);
        assert_relative_eq!(timer.tick_at(start + Duration::from_secs(5)), MAX_DELTA_SECONDS);
    }

    #[test]
    fn test_fps_over_one_second() {
        let mut timer = FrameTimer::new();
        let start = timer.last_frame;
        assert_relative_eq!(timer.fps(), 0.0);

        for frame in 1..=50 {
            timer.tick_at(start + Duration::from_millis(20 * frame));
        }
        assert_relative_eq!(timer.fps(), 50.0, epsilon = 1e-3);
    }
}
