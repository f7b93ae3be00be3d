// src/state/steering.rs
//
// Listener orientation and pickup settings.

use crate::directivity::{Directivity, PolarPattern};
use crate::geometry::{PAN_STEPS, STEP_DEGREES, TILT_CENTER, TILT_STEPS};

/// Pan step for 0°. The database frame faces the listener, so looking
/// forward is a half turn.
pub const PAN_CENTER: usize = PAN_STEPS / 2;

/// Pan/tilt steps plus directivity, read by the renderer every block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringState {
    /// 0..72, 5° per step, `PAN_CENTER` = facing the front
    pub pan_step: usize,

    /// 0..36, 5° per step, 18 = level
    pub tilt_step: usize,

    pub directivity: Directivity,
}

impl Default for SteeringState {
    fn default() -> Self {
        Self {
            pan_step: PAN_CENTER,
            tilt_step: TILT_CENTER,
            directivity: Directivity::default(),
        }
    }
}

impl SteeringState {
    /// Pan in degrees, clamped to [-180, 179].
    pub fn set_pan_degrees(&mut self, degrees: f32) {
        self.pan_step = pan_step_for_degrees(degrees);
    }

    /// Tilt in degrees, clamped to [-90, 89].
    pub fn set_tilt_degrees(&mut self, degrees: f32) {
        self.tilt_step = tilt_step_for_degrees(degrees);
    }

    /// Focus in listener degrees (0/0 = front). Turned by the same half
    /// turn as the pan so it lands in the steered database frame.
    pub fn set_directivity(&mut self, pattern: PolarPattern, azimuth_deg: f32, elevation_deg: f32) {
        self.directivity = Directivity::new(pattern, azimuth_deg + 180.0, elevation_deg);
    }

    /// Pan in degrees (-180..180).
    #[inline]
    pub fn pan_degrees(&self) -> f32 {
        (self.pan_step as f32 - PAN_CENTER as f32) * STEP_DEGREES
    }

    /// Tilt in degrees as seen by the renderer (-90..90).
    #[inline]
    pub fn tilt_degrees(&self) -> f32 {
        (self.tilt_step as f32 - TILT_CENTER as f32) * STEP_DEGREES
    }
}

/// Pan step for a pan angle in degrees.
pub fn pan_step_for_degrees(degrees: f32) -> usize {
    let degrees = if degrees.is_nan() { 0.0 } else { degrees.clamp(-180.0, 179.0) };
    ((PAN_CENTER as f32 + degrees / STEP_DEGREES).floor() as i32).rem_euclid(PAN_STEPS as i32) as usize
}

/// Tilt step for a tilt angle in degrees.
pub fn tilt_step_for_degrees(degrees: f32) -> usize {
    let degrees = if degrees.is_nan() { 0.0 } else { degrees.clamp(-90.0, 89.0) };
    let step = (TILT_CENTER as f32 + degrees / STEP_DEGREES).floor() as i32;
    step.clamp(0, TILT_STEPS as i32 - 1) as usize
}

/// What happens at the end of the playing chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Continue with the next chunk (or loop the only one).
    #[default]
    Continue,
    /// Stop at the end and rewind.
    LastLoop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pan_mapping() {
        assert_eq!(pan_step_for_degrees(0.0), PAN_CENTER);
        assert_eq!(pan_step_for_degrees(4.9), 36);
        assert_eq!(pan_step_for_degrees(5.0), 37);
        assert_eq!(pan_step_for_degrees(90.0), 54);
        assert_eq!(pan_step_for_degrees(-5.0), 35);
        assert_eq!(pan_step_for_degrees(-180.0), 0);
        assert_eq!(pan_step_for_degrees(179.0), 71);
        assert_eq!(pan_step_for_degrees(f32::NAN), PAN_CENTER);
        // Clamped
        assert_eq!(pan_step_for_degrees(720.0), 71);
        assert_eq!(pan_step_for_degrees(-1000.0), 0);
    }

    #[test]
    fn test_tilt_mapping() {
        assert_eq!(tilt_step_for_degrees(0.0), TILT_CENTER);
        assert_eq!(tilt_step_for_degrees(-90.0), 0);
        assert_eq!(tilt_step_for_degrees(89.0), 35);
        assert_eq!(tilt_step_for_degrees(200.0), 35);
        assert_eq!(tilt_step_for_degrees(-2.5), 17);
        assert_eq!(tilt_step_for_degrees(f32::NAN), TILT_CENTER);
    }

    #[test]
    fn test_state_setters() {
        let mut state = SteeringState::default();
        state.set_pan_degrees(-90.0);
        state.set_tilt_degrees(30.0);
        assert_eq!(state.pan_step, 18);
        assert_eq!(state.pan_degrees(), -90.0);
        assert_eq!(state.tilt_degrees(), 30.0);

        // Focus is half-turned along with the pan.
        state.set_directivity(PolarPattern::Cardioid, 90.0, 0.0);
        assert!((state.directivity.focus.x + 1.0).abs() < 1e-5);
        state.set_directivity(PolarPattern::Cardioid, 0.0, 0.0);
        assert!((state.directivity.focus.z + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_zero_pan_is_default() {
        let mut state = SteeringState::default();
        assert_eq!(state.pan_step, PAN_CENTER);
        assert_eq!(state.pan_degrees(), 0.0);

        state.set_pan_degrees(30.0);
        state.set_pan_degrees(0.0);
        assert_eq!(state, SteeringState::default());
    }
}
