use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PyrffectError, PyrffectResult};

/// The discrete simulation clock shared by every layer of a run.
///
/// Layers never keep their own notion of wall time: they count ticks and
/// ask the clock how much simulated time those ticks represent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimClock {
    fps: u32,
    timestep: f64,
}

impl SimClock {
    /// Create a clock ticking `fps` times per simulated second.
    pub fn new(fps: u32) -> PyrffectResult<Self> {
        if fps == 0 {
            return Err(PyrffectError::config("framerate must be non-zero"));
        }
        Ok(Self {
            fps,
            timestep: 1.0 / fps as f64,
        })
    }

    /// Frames per second.
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Simulated seconds per tick.
    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    /// Simulated time covered by `ticks` ticks.
    pub fn elapsed(&self, ticks: u64) -> f64 {
        ticks as f64 * self.timestep
    }

    /// Number of frames needed to cover `seconds` of animation.
    pub fn frame_count(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.fps as f64).ceil() as u64
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self {
            fps: 60,
            timestep: 1.0 / 60.0,
        }
    }
}

impl fmt::Display for SimClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}fps", self.fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_fps_rejected() {
        assert!(SimClock::new(0).is_err());
    }

    #[test]
    fn test_elapsed_is_exact_multiple() {
        let clock = SimClock::new(4).unwrap();
        assert_eq!(clock.timestep(), 0.25);
        assert_eq!(clock.elapsed(6), 1.5);
    }

    #[test]
    fn test_frame_count() {
        let clock = SimClock::new(30).unwrap();
        assert_eq!(clock.frame_count(1.0), 30);
        assert_eq!(clock.frame_count(2.5), 75);
        assert_eq!(clock.frame_count(-1.0), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(SimClock::default().to_string(), "60fps");
    }
}
