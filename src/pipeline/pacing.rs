//! Fixed-rate frame pacing for the recording loop.

use std::thread;
use std::time::{Duration, Instant};

/// Sleeps out the remainder of each frame interval.
///
/// No catch-up: an iteration that overruns its interval starts the next one
/// immediately.
#[derive(Debug, Clone, Copy)]
pub struct FramePacer {
    fps: u32,
    interval: Duration,
    total_frames: u64,
}

impl FramePacer {
    pub fn new(fps: u32, duration_secs: u32) -> Self {
        let fps = fps.max(1);
        Self {
            fps,
            interval: Duration::from_secs_f64(1.0 / fps as f64),
            total_frames: u64::from(fps) * u64::from(duration_secs),
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Iterations in the whole run.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Time left in the interval after `elapsed` of work.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.interval.saturating_sub(elapsed)
    }

    /// Sleep until one interval has passed since `frame_start`.
    pub fn wait(&self, frame_start: Instant) {
        let remaining = self.remaining(frame_start.elapsed());
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_frames() {
        assert_eq!(FramePacer::new(30, 10).total_frames(), 300);
        assert_eq!(FramePacer::new(60, 1).total_frames(), 60);
    }

    #[test]
    fn test_interval() {
        let pacer = FramePacer::new(50, 1);
        assert_eq!(pacer.interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_zero_fps_is_clamped() {
        let pacer = FramePacer::new(0, 2);
        assert_eq!(pacer.fps(), 1);
        assert_eq!(pacer.total_frames(), 2);
    }

    #[test]
    fn test_remaining_never_negative() {
        let pacer = FramePacer::new(100, 1);
        assert_eq!(pacer.remaining(Duration::from_millis(4)), Duration::from_millis(6));
        assert_eq!(pacer.remaining(Duration::from_millis(25)), Duration::ZERO);
    }

    #[test]
    fn test_wait_sleeps_out_interval() {
        let pacer = FramePacer::new(20, 1);
        let start = Instant::now();
        pacer.wait(start);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
