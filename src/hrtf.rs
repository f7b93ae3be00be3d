// src/hrtf.rs
//
// Measured HRTF database: one magnitude and one phase table, each
// 254 sectors × 512 bins of little-endian i16.

use crate::format::FormatError;
use crate::geometry::{SECTOR_COUNT, Sector};

/// Bins per sector in the database.
pub const TABLE_BINS: usize = 512;

/// Sample rate the table bins are laid out for.
pub const TABLE_SAMPLE_RATE: u32 = 44100;

/// Byte length of one table.
pub const TABLE_BYTES: usize = SECTOR_COUNT * TABLE_BINS * 2;

const MAGNITUDE_SCALE: f32 = 1.0 / 2048.0;
const PHASE_SCALE: f32 = 1.0 / 10000.0;

/// Which of the two tables a byte buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Magnitude,
    Phase,
}

impl TableKind {
    /// 0 = magnitude, anything else = phase (binding convention).
    pub fn from_code(code: u32) -> Self {
        if code == 0 {
            TableKind::Magnitude
        } else {
            TableKind::Phase
        }
    }
}

/// Scaled magnitude/phase pairs, indexed by `(sector, table bin)`.
///
/// Read-only once built; shared with the audio thread behind an `Arc`.
pub struct HrtfTable {
    magnitude: Vec<f32>,
    phase: Vec<f32>,
}

impl HrtfTable {
    /// Build from the two raw database files.
    pub fn from_bytes(magnitude: &[u8], phase: &[u8]) -> Result<Self, FormatError> {
        Ok(Self {
            magnitude: decode_table(magnitude, MAGNITUDE_SCALE)?,
            phase: decode_table(phase, PHASE_SCALE)?,
        })
    }

    /// Build a synthetic table from `f(sector, bin) -> (magnitude, phase)`.
    pub fn from_fn<F>(mut f: F) -> Self
    where
        F: FnMut(Sector, usize) -> (f32, f32),
    {
        let mut magnitude = Vec::with_capacity(SECTOR_COUNT * TABLE_BINS);
        let mut phase = Vec::with_capacity(SECTOR_COUNT * TABLE_BINS);
        for sector in 0..SECTOR_COUNT {
            for bin in 0..TABLE_BINS {
                let (m, p) = f(sector as Sector, bin);
                magnitude.push(m);
                phase.push(p);
            }
        }
        Self { magnitude, phase }
    }

    /// Encode a table as the raw i16 bytes of the database format.
    pub fn encode(&self, kind: TableKind) -> Vec<u8> {
        let (values, scale) = match kind {
            TableKind::Magnitude => (&self.magnitude, MAGNITUDE_SCALE),
            TableKind::Phase => (&self.phase, PHASE_SCALE),
        };
        let mut out = Vec::with_capacity(TABLE_BYTES);
        for v in values {
            let raw = (v / scale).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            out.extend_from_slice(&raw.to_le_bytes());
        }
        out
    }

    #[inline]
    pub fn magnitude(&self, sector: Sector, bin: usize) -> f32 {
        self.magnitude[sector as usize * TABLE_BINS + bin]
    }

    #[inline]
    pub fn phase(&self, sector: Sector, bin: usize) -> f32 {
        self.phase[sector as usize * TABLE_BINS + bin]
    }
}

fn decode_table(bytes: &[u8], scale: f32) -> Result<Vec<f32>, FormatError> {
    if bytes.len() < TABLE_BYTES {
        return Err(FormatError::TableSize {
            expected: TABLE_BYTES,
            actual: bytes.len(),
        });
    }
    Ok(bytes[..TABLE_BYTES]
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 * scale)
        .collect())
}

// ═══════════════════════════════════════════════════════════════════
// Loader
// ═══════════════════════════════════════════════════════════════════

/// Collects the two tables as they arrive, in either order.
#[derive(Default)]
pub struct TableLoader {
    magnitude: Option<Vec<f32>>,
    phase: Option<Vec<f32>>,
}

impl TableLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept one table. Returns the finished database once both are in.
    pub fn load(&mut self, kind: TableKind, bytes: &[u8]) -> Result<Option<HrtfTable>, FormatError> {
        match kind {
            TableKind::Magnitude => self.magnitude = Some(decode_table(bytes, MAGNITUDE_SCALE)?),
            TableKind::Phase => self.phase = Some(decode_table(bytes, PHASE_SCALE)?),
        }

        match (self.magnitude.take(), self.phase.take()) {
            (Some(magnitude), Some(phase)) => {
                log::info!("HRTF database ready ({} sectors × {} bins)", SECTOR_COUNT, TABLE_BINS);
                Ok(Some(HrtfTable { magnitude, phase }))
            }
            (magnitude, phase) => {
                self.magnitude = magnitude;
                self.phase = phase;
                Ok(None)
            }
        }
    }

    /// Tables received so far and still waiting for their partner.
    pub fn pending(&self) -> (bool, bool) {
        (self.magnitude.is_some(), self.phase.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_table(f: impl Fn(usize, usize) -> i16) -> Vec<u8> {
        let mut out = Vec::with_capacity(TABLE_BYTES);
        for s in 0..SECTOR_COUNT {
            for b in 0..TABLE_BINS {
                out.extend_from_slice(&f(s, b).to_le_bytes());
            }
        }
        out
    }

    #[test]
    fn test_tables_are_scaled() {
        let mag = raw_table(|s, b| if s == 142 && b == 10 { 4096 } else { 2048 });
        let phase = raw_table(|s, _| if s == 3 { -31416 } else { 5000 });

        let table = HrtfTable::from_bytes(&mag, &phase).unwrap();
        assert_eq!(table.magnitude(142, 10), 2.0);
        assert_eq!(table.magnitude(142, 11), 1.0);
        assert!((table.phase(3, 0) + 3.1416).abs() < 1e-5);
        assert!((table.phase(4, 0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_short_table_rejected() {
        let mag = vec![0u8; TABLE_BYTES - 2];
        let phase = vec![0u8; TABLE_BYTES];
        assert_eq!(
            HrtfTable::from_bytes(&mag, &phase).err(),
            Some(FormatError::TableSize {
                expected: TABLE_BYTES,
                actual: TABLE_BYTES - 2
            })
        );
    }

    #[test]
    fn test_loader_waits_for_both_tables() {
        let table = HrtfTable::from_fn(|s, b| (1.0 + s as f32 / 256.0, b as f32 / 1000.0));
        let mut loader = TableLoader::new();

        assert!(loader.load(TableKind::Phase, &table.encode(TableKind::Phase)).unwrap().is_none());
        assert_eq!(loader.pending(), (false, true));

        assert!(loader.load(TableKind::Magnitude, &[0u8; 16]).is_err());
        assert_eq!(loader.pending(), (false, true));

        let loaded = loader
            .load(TableKind::Magnitude, &table.encode(TableKind::Magnitude))
            .unwrap()
            .unwrap();
        assert_eq!(loader.pending(), (false, false));
        assert!((loaded.magnitude(200, 5) - table.magnitude(200, 5)).abs() < 1e-3);
        assert!((loaded.phase(7, 300) - 0.3).abs() < 1e-4);
    }
}
