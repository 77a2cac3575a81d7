//! Frame clock

use serde::{Deserialize, Serialize};

/// Monotonic frame counter. Frame 0 is "before the first update".
pub type FrameId = u64;

/// Frame clock advanced once per `update(frame_time)`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FrameClock {
    frame: FrameId,
    /// Seconds since the clock started
    elapsed: f64,
    /// Seconds spent in the last frame
    delta: f32,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by one frame. Negative or non-finite times count as zero.
    pub fn advance(&mut self, frame_time: f32) -> FrameId {
        let delta = if frame_time.is_finite() { frame_time.max(0.0) } else { 0.0 };
        self.frame += 1;
        self.delta = delta;
        self.elapsed += delta as f64;
        self.frame
    }

    #[inline]
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta
    }

    #[inline]
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.frame(), 0);
        assert_eq!(clock.advance(0.016), 1);
        assert_eq!(clock.advance(0.016), 2);
        assert!((clock.elapsed() - 0.032).abs() < 1e-6);
        assert!((clock.delta() - 0.016).abs() < 1e-6);
    }

    #[test]
    fn test_clock_rejects_bad_time() {
        let mut clock = FrameClock::new();
        clock.advance(f32::NAN);
        assert_eq!(clock.delta(), 0.0);
        clock.advance(-1.0);
        assert_eq!(clock.delta(), 0.0);
        assert_eq!(clock.frame(), 2);
    }

    #[test]
    fn test_clock_serialization() {
        let mut clock = FrameClock::new();
        clock.advance(0.5);
        let json = serde_json::to_string(&clock).unwrap();
        let restored: FrameClock = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.frame(), 1);
    }
}
