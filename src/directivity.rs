// src/directivity.rs
//
// Microphone-style pickup patterns steered towards a focus direction.
//
// A pattern turns the angle between the focus and one or two source
// directions into a gain in [0, 1]. When two sources share a bin they are
// weighted together through their bisector so the pair stays coherent.

use std::f32::consts::PI;

use crate::geometry::Vec3;

/// Polar pattern of the virtual pickup.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PolarPattern {
    /// Uniform pickup, weight is always 1.
    #[default]
    Omni,
    Cardioid,
    /// Cardioid narrowed by a lateral shaping term.
    Hypercardioid,
    /// Steepest pattern, silent beyond the side axis.
    Narrow,
    /// Cardioid raised to a non-negative exponent.
    Custom(f32),
}

impl PolarPattern {
    /// Decode the numeric mode used by the C and wasm bindings.
    ///
    /// 0 omni, 1 cardioid, 2 cardioid squared, 3 hypercardioid, 4 narrow.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => PolarPattern::Cardioid,
            2 => PolarPattern::Custom(2.0),
            3 => PolarPattern::Hypercardioid,
            4 => PolarPattern::Narrow,
            _ => PolarPattern::Omni,
        }
    }

    #[inline]
    pub fn is_omni(&self) -> bool {
        matches!(self, PolarPattern::Omni)
    }
}

/// Pickup pattern plus the unit vector it is steered towards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Directivity {
    pub pattern: PolarPattern,
    pub focus: Vec3,
}

impl Default for Directivity {
    fn default() -> Self {
        Self {
            pattern: PolarPattern::Omni,
            focus: Vec3::new(0.0, 0.0, 1.0),
        }
    }
}

impl Directivity {
    /// Pattern steered to `azimuth`/`elevation` in degrees (0/0 = front,
    /// positive azimuth to the right).
    pub fn new(pattern: PolarPattern, azimuth_deg: f32, elevation_deg: f32) -> Self {
        Self {
            pattern,
            focus: Vec3::from_angles(azimuth_deg.to_radians(), elevation_deg.to_radians()),
        }
    }

    /// Gain for one source direction, or a pair sharing a bin.
    pub fn weight(&self, primary: Vec3, secondary: Option<Vec3>) -> f32 {
        if self.pattern.is_omni() {
            return 1.0;
        }

        let (bisector, half_angle) = match secondary {
            Some(other) => {
                let sum = primary.add(other);
                if sum.length() < 1e-6 {
                    // Opposite directions have no bisector; treat the pair as spread wide.
                    (primary, PI / 2.0)
                } else {
                    let half = primary.dot(other).clamp(-1.0, 1.0).acos() / 2.0;
                    (sum.normalize(), half)
                }
            }
            None => (primary, 0.0),
        };

        let angle = self.focus.dot(bisector).clamp(-1.0, 1.0).acos();
        let spread = half_angle.cos();

        let phi = (PI * angle.cos() * spread - PI) / 2.0;
        let lateral = PI * angle.sin() * spread;
        let cardioid = (1.0 + phi.cos()) / 2.0;

        let weight = match self.pattern {
            PolarPattern::Omni => 1.0,
            PolarPattern::Cardioid => cardioid,
            PolarPattern::Hypercardioid => cardioid * (1.0 + (lateral / 2.0).cos() * spread) / 2.0,
            PolarPattern::Narrow => {
                if phi < -PI / 2.0 {
                    0.0
                } else {
                    let shape = (lateral / 2.0).cos();
                    cardioid * shape * shape * spread
                }
            }
            PolarPattern::Custom(exponent) => cardioid.powf(exponent.max(0.0)),
        };

        weight.abs().min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{SECTOR_COUNT, sector_to_vector};

    const PATTERNS: [PolarPattern; 4] = [
        PolarPattern::Cardioid,
        PolarPattern::Hypercardioid,
        PolarPattern::Narrow,
        PolarPattern::Custom(2.0),
    ];

    #[test]
    fn test_omni_is_unity() {
        let d = Directivity::new(PolarPattern::Omni, 30.0, 10.0);
        for s in (0..SECTOR_COUNT).step_by(7) {
            let v = sector_to_vector(s as u8);
            assert_eq!(d.weight(v, None), 1.0);
            assert_eq!(d.weight(v, Some(sector_to_vector(253 - s as u8))), 1.0);
        }
    }

    #[test]
    fn test_cardioid_family_bounds() {
        let foci = [(0.0, 0.0), (90.0, 0.0), (-135.0, 30.0), (10.0, -60.0)];
        for pattern in PATTERNS {
            for (az, el) in foci {
                let d = Directivity::new(pattern, az, el);
                for a in (0..SECTOR_COUNT).step_by(3) {
                    for b in (0..SECTOR_COUNT).step_by(11) {
                        let w = d.weight(sector_to_vector(a as u8), Some(sector_to_vector(b as u8)));
                        assert!((0.0..=1.0).contains(&w), "{:?} gave {}", pattern, w);
                    }
                }
            }
        }
    }

    #[test]
    fn test_cardioid_on_and_off_axis() {
        let d = Directivity::new(PolarPattern::Cardioid, 0.0, 0.0);
        let front = Vec3::new(0.0, 0.0, 1.0);
        let back = Vec3::new(0.0, 0.0, -1.0);
        let side = Vec3::new(1.0, 0.0, 0.0);

        assert!((d.weight(front, None) - 1.0).abs() < 1e-6);
        assert!(d.weight(back, None) < 1e-6);
        assert!((d.weight(side, None) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_narrower_patterns_reject_more() {
        let side = Vec3::from_angles(60f32.to_radians(), 0.0);
        let cardioid = Directivity::new(PolarPattern::Cardioid, 0.0, 0.0).weight(side, None);
        let hyper = Directivity::new(PolarPattern::Hypercardioid, 0.0, 0.0).weight(side, None);
        let narrow = Directivity::new(PolarPattern::Narrow, 0.0, 0.0).weight(side, None);

        assert!(hyper < cardioid);
        assert!(narrow < cardioid);

        let rear = Vec3::from_angles(120f32.to_radians(), 0.0);
        assert_eq!(Directivity::new(PolarPattern::Narrow, 0.0, 0.0).weight(rear, None), 0.0);
    }

    #[test]
    fn test_pair_uses_bisector() {
        let d = Directivity::new(PolarPattern::Cardioid, 0.0, 0.0);
        let left = Vec3::from_angles(-20f32.to_radians(), 0.0);
        let right = Vec3::from_angles(20f32.to_radians(), 0.0);

        // Bisector is the focus itself; only the spread reduces the weight.
        let pair = d.weight(left, Some(right));
        assert!((pair - d.weight(right, Some(left))).abs() < 1e-6);
        let wide = d.weight(Vec3::from_angles(40f32.to_radians(), 0.0), None);
        assert!(pair <= 1.0 && pair > wide);

        // Opposite pair falls back to the primary with maximal spread.
        let w = d.weight(Vec3::new(0.0, 0.0, 1.0), Some(Vec3::new(0.0, 0.0, -1.0)));
        assert!((w - 0.5).abs() < 1e-5);
    }
}
