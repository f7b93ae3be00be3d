// src/geometry.rs
//
// Direction geometry for the sector tessellation of the HRTF database.
//
// Sector 0 is the zenith cap, sector 253 the nadir cap. In between sit
// eleven latitude rings, 15° apart, described by the `RINGS` table. Every
// mapping (sector → vector, vector → sector, mirror) walks the same table.
//
// Coordinates: x points right, y up, z to the front. Azimuth is measured
// from the front towards the right, `atan2(x, z)`.

use std::f32::consts::PI;

/// Sector index into the tessellation (0..=253), or one of the special codes.
pub type Sector = u8;

/// Number of real sectors (rows of the HRTF tables).
pub const SECTOR_COUNT: usize = 254;

/// Direction code for non-directional (diffuse) content.
pub const DIFFUSE: Sector = 254;

/// Marker code used by the block-size detection.
pub const SENTINEL: Sector = 255;

pub const ZENITH: Sector = 0;
pub const NADIR: Sector = 253;

/// Steering resolution.
pub const PAN_STEPS: usize = 72;
pub const TILT_STEPS: usize = 36;
/// Tilt step meaning "level".
pub const TILT_CENTER: usize = 18;
pub const STEP_DEGREES: f32 = 5.0;

/// One latitude unit (15°).
const LATITUDE_UNIT: f32 = PI / 12.0;

/// Caps cover everything above ±82.5°.
const CAP_LATITUDE_STEPS: f32 = 5.5;

/// Plain 3-component vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Unit vector from azimuth (radians, front = 0, right positive) and elevation.
    pub fn from_angles(azimuth: f32, elevation: f32) -> Self {
        let horizontal = elevation.cos();
        Self {
            x: horizontal * azimuth.sin(),
            y: elevation.sin(),
            z: horizontal * azimuth.cos(),
        }
    }

    #[inline]
    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Normalized copy; the zero vector is returned unchanged.
    #[inline]
    pub fn normalize(self) -> Vec3 {
        let len = self.length();
        if len > 0.0 {
            Vec3::new(self.x / len, self.y / len, self.z / len)
        } else {
            self
        }
    }

    #[inline]
    pub fn add(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Rotate about the vertical axis (adds `angle` to the azimuth).
    #[inline]
    pub fn rotate_pan(self, angle: f32) -> Vec3 {
        let (s, c) = angle.sin_cos();
        Vec3::new(self.x * c + self.z * s, self.y, self.z * c - self.x * s)
    }

    /// Rotate in the vertical/front plane (positive tilts the front upwards).
    #[inline]
    pub fn rotate_tilt(self, angle: f32) -> Vec3 {
        let (s, c) = angle.sin_cos();
        Vec3::new(self.x, self.y * c + self.z * s, self.z * c - self.y * s)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Ring descriptors
// ═══════════════════════════════════════════════════════════════════

/// Direction in which a ring's sector numbers walk around the vertical axis.
///
/// The winding is fixed by the measured database's row order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Winding {
    /// Starts at the back (-π), azimuth increasing.
    Ascending,
    /// Starts one cell left of the front, azimuth decreasing to the front.
    Descending,
    /// Left half ascending from the back, then right half descending to the front.
    Split,
}

#[derive(Debug, Clone, Copy)]
struct Ring {
    first: u8,
    divisions: u8,
    /// Latitude in units of 15°.
    latitude: i8,
    winding: Winding,
}

const RINGS: [Ring; 11] = [
    Ring { first: 1, divisions: 8, latitude: 5, winding: Winding::Ascending },
    Ring { first: 9, divisions: 16, latitude: 4, winding: Winding::Ascending },
    Ring { first: 25, divisions: 24, latitude: 3, winding: Winding::Ascending },
    Ring { first: 49, divisions: 30, latitude: 2, winding: Winding::Ascending },
    Ring { first: 79, divisions: 32, latitude: 1, winding: Winding::Ascending },
    Ring { first: 111, divisions: 32, latitude: 0, winding: Winding::Split },
    Ring { first: 143, divisions: 32, latitude: -1, winding: Winding::Descending },
    Ring { first: 175, divisions: 30, latitude: -2, winding: Winding::Descending },
    Ring { first: 205, divisions: 24, latitude: -3, winding: Winding::Descending },
    Ring { first: 229, divisions: 16, latitude: -4, winding: Winding::Descending },
    Ring { first: 245, divisions: 8, latitude: -5, winding: Winding::Descending },
];

impl Ring {
    #[inline]
    fn contains(&self, sector: Sector) -> bool {
        sector >= self.first && sector < self.first + self.divisions
    }

    #[inline]
    fn azimuth_unit(&self) -> f32 {
        2.0 * PI / self.divisions as f32
    }

    /// Azimuth slot `m` (azimuth = m·unit) of the ring's `k`-th sector.
    fn slot(&self, k: usize) -> usize {
        let div = self.divisions as usize;
        let half = div / 2;
        match self.winding {
            Winding::Ascending => (k + half) % div,
            Winding::Descending => div - 1 - k,
            Winding::Split if k < half => k + half,
            Winding::Split => div - 1 - k,
        }
    }

    /// Inverse of [`slot`](Self::slot).
    fn index(&self, slot: usize) -> usize {
        let div = self.divisions as usize;
        let half = div / 2;
        match self.winding {
            Winding::Ascending => (slot + half) % div,
            Winding::Descending => div - 1 - slot,
            Winding::Split if slot >= half => slot - half,
            Winding::Split => div - 1 - slot,
        }
    }

    fn sector_at_slot(&self, slot: usize) -> Sector {
        self.first + self.index(slot) as u8
    }
}

fn ring_of(sector: Sector) -> Option<&'static Ring> {
    RINGS.iter().find(|ring| ring.contains(sector))
}

// ═══════════════════════════════════════════════════════════════════
// Sector mappings
// ═══════════════════════════════════════════════════════════════════

/// Unit direction of a sector's center. Codes above 253 map to the front.
pub fn sector_to_vector(sector: Sector) -> Vec3 {
    match sector {
        ZENITH => Vec3::new(0.0, 1.0, 0.0),
        NADIR => Vec3::new(0.0, -1.0, 0.0),
        _ => match ring_of(sector) {
            Some(ring) => {
                let k = (sector - ring.first) as usize;
                let azimuth = ring.slot(k) as f32 * ring.azimuth_unit();
                let elevation = ring.latitude as f32 * LATITUDE_UNIT;
                Vec3::from_angles(azimuth, elevation)
            }
            None => Vec3::new(0.0, 0.0, 1.0),
        },
    }
}

/// Nearest sector to a direction.
pub fn vector_to_sector(direction: Vec3) -> Sector {
    let v = direction.normalize();
    let vertical = v.y.clamp(-1.0, 1.0);

    let cap = (CAP_LATITUDE_STEPS * LATITUDE_UNIT).sin();
    if vertical >= cap {
        return ZENITH;
    }
    if vertical <= -cap {
        return NADIR;
    }

    let latitude = (vertical.asin() / LATITUDE_UNIT).round().clamp(-5.0, 5.0) as i8;
    let ring = RINGS
        .iter()
        .find(|ring| ring.latitude == latitude)
        .unwrap_or(&RINGS[5]);

    let div = ring.divisions as i32;
    let azimuth = v.x.atan2(v.z);
    let slot = ((azimuth / ring.azimuth_unit()).round() as i32).rem_euclid(div);
    ring.sector_at_slot(slot as usize)
}

/// Sector on the other-ear side of the same ring (azimuth negated).
///
/// Caps, the front/back cells of every ring and the special codes map to
/// themselves.
pub fn mirror_sector(sector: Sector) -> Sector {
    match ring_of(sector) {
        Some(ring) => {
            let div = ring.divisions as usize;
            let k = (sector - ring.first) as usize;
            let mirrored = (div - ring.slot(k)) % div;
            ring.sector_at_slot(mirrored)
        }
        None => sector,
    }
}

/// Rotate a sector by `pan` (about the vertical axis) then `tilt` and
/// requantize. Angles in radians; codes above 253 are returned unchanged.
pub fn steer(sector: Sector, pan: f32, tilt: f32) -> Sector {
    if sector as usize >= SECTOR_COUNT {
        return sector;
    }
    let rotated = sector_to_vector(sector).rotate_pan(pan).rotate_tilt(tilt);
    vector_to_sector(rotated)
}

/// Pan angle in radians for a pan step.
#[inline]
pub fn pan_angle(step: usize) -> f32 {
    (step % PAN_STEPS) as f32 * STEP_DEGREES.to_radians()
}

/// Tilt angle in radians for a tilt step.
#[inline]
pub fn tilt_angle(step: usize) -> f32 {
    (step as f32 - TILT_CENTER as f32) * STEP_DEGREES.to_radians()
}

/// Pan step of the mirrored (left-ear) lookup.
#[inline]
pub fn mirror_pan_step(step: usize) -> usize {
    (PAN_STEPS - step % PAN_STEPS) % PAN_STEPS
}

// ═══════════════════════════════════════════════════════════════════
// Steering table
// ═══════════════════════════════════════════════════════════════════

/// Precomputed `steer` results for every (code, pan step, tilt step).
///
/// Built once off the audio thread and shared read-only; lookups are O(1)
/// inside the per-bin loop.
pub struct SteeringTable {
    /// Indexed `(sector * PAN_STEPS + pan) * TILT_STEPS + tilt`.
    entries: Vec<Sector>,

    /// Unit vector of every real sector.
    vectors: Vec<Vec3>,
}

impl SteeringTable {
    pub fn new() -> Self {
        let vectors: Vec<Vec3> = (0..SECTOR_COUNT)
            .map(|s| sector_to_vector(s as Sector))
            .collect();

        let mut entries = vec![0; 256 * PAN_STEPS * TILT_STEPS];
        for code in 0..256usize {
            for pan in 0..PAN_STEPS {
                let pan_rad = pan_angle(pan);
                for tilt in 0..TILT_STEPS {
                    let index = (code * PAN_STEPS + pan) * TILT_STEPS + tilt;
                    entries[index] = if code >= SECTOR_COUNT {
                        code as Sector
                    } else {
                        let rotated = vectors[code].rotate_pan(pan_rad).rotate_tilt(tilt_angle(tilt));
                        vector_to_sector(rotated)
                    };
                }
            }
        }

        log::debug!(
            "Steering table ready: {} entries ({} KiB)",
            entries.len(),
            entries.len() / 1024
        );

        Self { entries, vectors }
    }

    /// Steered sector for a code at the given pan/tilt steps.
    #[inline]
    pub fn lookup(&self, sector: Sector, pan_step: usize, tilt_step: usize) -> Sector {
        let pan = pan_step % PAN_STEPS;
        let tilt = tilt_step.min(TILT_STEPS - 1);
        self.entries[(sector as usize * PAN_STEPS + pan) * TILT_STEPS + tilt]
    }

    /// Precomputed unit vector of a sector (front for special codes).
    #[inline]
    pub fn vector(&self, sector: Sector) -> Vec3 {
        self.vectors
            .get(sector as usize)
            .copied()
            .unwrap_or(Vec3::new(0.0, 0.0, 1.0))
    }
}

impl Default for SteeringTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec_close(a: Vec3, b: Vec3) {
        assert!(
            (a.x - b.x).abs() < 1e-5 && (a.y - b.y).abs() < 1e-5 && (a.z - b.z).abs() < 1e-5,
            "{:?} != {:?}",
            a,
            b
        );
    }

    #[test]
    fn test_rings_tile_all_sectors() {
        let mut expected = 1u8;
        for ring in &RINGS {
            assert_eq!(ring.first, expected);
            assert_eq!(ring.divisions % 2, 0);
            expected += ring.divisions;
        }
        assert_eq!(expected, NADIR);
    }

    #[test]
    fn test_sector_vector_round_trip() {
        for s in 0..SECTOR_COUNT as u16 {
            let sector = s as Sector;
            let v = sector_to_vector(sector);
            assert!((v.length() - 1.0).abs() < 1e-5);
            assert_eq!(vector_to_sector(v), sector, "round trip failed for {}", sector);
        }
    }

    #[test]
    fn test_known_directions() {
        assert_vec_close(sector_to_vector(ZENITH), Vec3::new(0.0, 1.0, 0.0));
        assert_vec_close(sector_to_vector(NADIR), Vec3::new(0.0, -1.0, 0.0));
        // Equator: 111 is straight behind, 142 straight ahead.
        assert_vec_close(sector_to_vector(111), Vec3::new(0.0, 0.0, -1.0));
        assert_vec_close(sector_to_vector(142), Vec3::new(0.0, 0.0, 1.0));
        // 119 is a quarter turn from the back with increasing azimuth: hard left.
        assert_vec_close(sector_to_vector(119), Vec3::new(-1.0, 0.0, 0.0));
        assert_vec_close(sector_to_vector(134), Vec3::new(1.0, 0.0, 0.0));
        // First ring starts at the back, fifth sector faces front.
        let back = sector_to_vector(1);
        assert!(back.z < 0.0 && back.x.abs() < 1e-5 && back.y > 0.9);
        let front = sector_to_vector(5);
        assert!(front.z > 0.0 && front.x.abs() < 1e-5);
        // Southern rings end at the front.
        let front_low = sector_to_vector(174);
        assert!(front_low.z > 0.9 && front_low.x.abs() < 1e-5 && front_low.y < 0.0);
    }

    #[test]
    fn test_mirror_is_involution() {
        for s in 0..=255u8 {
            assert_eq!(mirror_sector(mirror_sector(s)), s);
        }
    }

    #[test]
    fn test_mirror_negates_lateral_axis() {
        for s in 0..SECTOR_COUNT as u16 {
            let sector = s as Sector;
            let v = sector_to_vector(sector);
            let m = sector_to_vector(mirror_sector(sector));
            assert_vec_close(m, Vec3::new(-v.x, v.y, v.z));
        }
    }

    #[test]
    fn test_mirror_matches_database_pairs() {
        assert_eq!(mirror_sector(1), 1);
        assert_eq!(mirror_sector(2), 8);
        assert_eq!(mirror_sector(5), 5);
        assert_eq!(mirror_sector(10), 24);
        assert_eq!(mirror_sector(112), 127);
        assert_eq!(mirror_sector(142), 142);
        assert_eq!(mirror_sector(143), 173);
        assert_eq!(mirror_sector(158), 158);
        assert_eq!(mirror_sector(245), 251);
        assert_eq!(mirror_sector(252), 252);
        assert_eq!(mirror_sector(DIFFUSE), DIFFUSE);
    }

    #[test]
    fn test_steering_identity() {
        let table = SteeringTable::new();
        for s in 0..=255u8 {
            assert_eq!(steer(s, 0.0, 0.0), s);
            assert_eq!(table.lookup(s, 0, TILT_CENTER), s);
        }
    }

    #[test]
    fn test_half_turn_pan_swaps_front_and_back() {
        let table = SteeringTable::new();
        assert_eq!(table.lookup(142, 36, TILT_CENTER), 111);
        assert_eq!(table.lookup(111, 36, TILT_CENTER), 142);
        // Quarter turn to the right moves front to hard right.
        assert_eq!(table.lookup(142, 18, TILT_CENTER), 134);
    }

    #[test]
    fn test_tilt_moves_front_upwards() {
        // Tilting by +90° moves the front to the zenith.
        assert_eq!(steer(142, 0.0, PI / 2.0), ZENITH);
        // A small tilt lands on the 15° ring still facing front.
        let tilted = steer(142, 0.0, 15f32.to_radians());
        let v = sector_to_vector(tilted);
        assert!(v.y > 0.2 && v.z > 0.9 && v.x.abs() < 1e-5);
    }

    #[test]
    fn test_left_ear_lookup_commutes_with_mirror() {
        let table = SteeringTable::new();
        for pan in [0usize, 5, 18, 36, 60] {
            let left = table.lookup(mirror_sector(142), mirror_pan_step(pan), TILT_CENTER);
            let right = table.lookup(142, pan, TILT_CENTER);
            assert_eq!(left, mirror_sector(right));
        }
    }
}
