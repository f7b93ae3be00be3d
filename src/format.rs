// src/format.rs
//
// SOPA stream format: header validation, block-size detection and chunk decode.
//
// A stream is a 44-byte header followed by 4-byte frames. Bytes 0 and 1 of
// each frame carry direction codes, bytes 2..4 one little-endian PCM sample.
// Decoding splits a chunk into two typed arrays once at load time so the
// audio thread never reinterprets raw bytes.

use crate::geometry::SENTINEL;

/// Length of the fixed header.
pub const HEADER_LEN: usize = 44;

/// Bytes per data frame (two direction codes + one i16 sample).
pub const FRAME_BYTES: usize = 4;

/// Largest supported analysis block.
pub const MAX_FFT_SIZE: usize = 4096;

const FORMAT_TAG: &[u8; 4] = b"SOPA";
const FORMAT_CHUNK: &[u8; 3] = b"fmt";
const BIT_DEPTH: u8 = 16;
const SUPPORTED_RATES: [u32; 2] = [22050, 44100];
const MIN_VERSION: u8 = 2;
const DUAL_DIRECTION_VERSION: u8 = 3;

// ═══════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════

/// Malformed stream or database bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Fewer bytes than the fixed header.
    Truncated { len: usize },
    /// Bytes 8..12 are not "SOPA".
    BadTag,
    /// Bytes 12..15 are not "fmt".
    BadFormatChunk,
    /// PCM must be 16-bit.
    BitDepth(u8),
    /// Only 22050 Hz and 44100 Hz streams exist.
    SampleRate(u32),
    /// Major version below 2.
    Version(u8),
    /// Declared data size is zero or not frame-aligned.
    ChunkSize(u32),
    /// Chunk holds fewer frames than one analysis window.
    ChunkTooShort { frames: usize, required: usize },
    /// HRTF table shorter than 254 × 512 samples.
    TableSize { expected: usize, actual: usize },
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatError::Truncated { len } => {
                write!(f, "Stream of {} bytes is shorter than the {} byte header", len, HEADER_LEN)
            }
            FormatError::BadTag => write!(f, "Missing SOPA tag"),
            FormatError::BadFormatChunk => write!(f, "Missing fmt chunk"),
            FormatError::BitDepth(bits) => write!(f, "PCM data should be 16-bit, found {}", bits),
            FormatError::SampleRate(rate) => write!(f, "Unsupported sample rate {}", rate),
            FormatError::Version(version) => write!(f, "Unsupported format version {}", version),
            FormatError::ChunkSize(size) => write!(f, "Invalid data chunk size {}", size),
            FormatError::ChunkTooShort { frames, required } => {
                write!(f, "Chunk has {} frames, at least {} required", frames, required)
            }
            FormatError::TableSize { expected, actual } => {
                write!(f, "HRTF table has {} bytes, expected {}", actual, expected)
            }
        }
    }
}

impl std::error::Error for FormatError {}

/// The block-size detection did not find a usable sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSizeError {
    /// Size implied by the sentinel position, if one was found.
    pub detected: Option<usize>,
}

impl std::fmt::Display for TransformSizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.detected {
            Some(size) => write!(f, "Transform size {} is not a power of two up to {}", size, MAX_FFT_SIZE),
            None => write!(f, "No block-size sentinel within the first {} bins", MAX_FFT_SIZE),
        }
    }
}

impl std::error::Error for TransformSizeError {}

/// Any failure on the load path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    Format(FormatError),
    TransformSize(TransformSizeError),
    /// The external loader reported a failure (network, file system, ...).
    Fetch(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Format(e) => write!(f, "Format error: {}", e),
            LoadError::TransformSize(e) => write!(f, "Transform size error: {}", e),
            LoadError::Fetch(reason) => write!(f, "Fetch failed: {}", reason),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Format(e) => Some(e),
            LoadError::TransformSize(e) => Some(e),
            LoadError::Fetch(_) => None,
        }
    }
}

impl From<FormatError> for LoadError {
    fn from(e: FormatError) -> Self {
        LoadError::Format(e)
    }
}

impl From<TransformSizeError> for LoadError {
    fn from(e: TransformSizeError) -> Self {
        LoadError::TransformSize(e)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Header
// ═══════════════════════════════════════════════════════════════════

/// Validated stream header. Parsed once from the first chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub bit_depth: u8,
    pub sample_rate: u32,
    /// (major, minor, patch)
    pub version: (u8, u8, u8),
    /// Declared data chunk size in bytes.
    pub chunk_size: u32,
}

impl StreamHeader {
    /// Header for a freshly written stream.
    pub fn new(sample_rate: u32, major_version: u8) -> Self {
        Self {
            bit_depth: BIT_DEPTH,
            sample_rate,
            version: (major_version, 0, 0),
            chunk_size: 0,
        }
    }

    /// Validate the fixed 44-byte header.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_LEN {
            return Err(FormatError::Truncated { len: bytes.len() });
        }
        if &bytes[8..12] != FORMAT_TAG {
            return Err(FormatError::BadTag);
        }
        if &bytes[12..15] != FORMAT_CHUNK {
            return Err(FormatError::BadFormatChunk);
        }

        let bit_depth = bytes[16];
        if bit_depth != BIT_DEPTH {
            return Err(FormatError::BitDepth(bit_depth));
        }

        let sample_rate = u16::from_le_bytes([bytes[24], bytes[25]]) as u32;
        if !SUPPORTED_RATES.contains(&sample_rate) {
            return Err(FormatError::SampleRate(sample_rate));
        }

        let version = (bytes[39], bytes[38], bytes[37]);
        if version.0 < MIN_VERSION {
            return Err(FormatError::Version(version.0));
        }

        let chunk_size = u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]);
        if chunk_size == 0 || chunk_size as usize % FRAME_BYTES != 0 {
            return Err(FormatError::ChunkSize(chunk_size));
        }

        Ok(Self {
            bit_depth,
            sample_rate,
            version,
            chunk_size,
        })
    }

    /// Version 3 and later carry a secondary direction per bin.
    #[inline]
    pub fn dual_direction(&self) -> bool {
        self.version.0 >= DUAL_DIRECTION_VERSION
    }

    /// Serialize as the 44-byte header.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(b"RIFF");
        let riff_size = self.chunk_size.saturating_add(HEADER_LEN as u32 - 8);
        out[4..8].copy_from_slice(&riff_size.to_le_bytes());
        out[8..12].copy_from_slice(FORMAT_TAG);
        out[12..15].copy_from_slice(FORMAT_CHUNK);
        out[15] = b' ';
        out[16] = self.bit_depth;
        out[22] = 1;
        out[24..26].copy_from_slice(&(self.sample_rate as u16).to_le_bytes());
        out[36] = 0;
        out[37] = self.version.2;
        out[38] = self.version.1;
        out[39] = self.version.0;
        out[40..44].copy_from_slice(&self.chunk_size.to_le_bytes());
        out
    }
}

// ═══════════════════════════════════════════════════════════════════
// Block-size detection
// ═══════════════════════════════════════════════════════════════════

/// Find the analysis block size from the sentinel in the first chunk.
///
/// The sentinel sits in byte 1 of frame `k` (k ≥ 1) and marks `N = 4k`.
pub fn detect_fft_size(bytes: &[u8]) -> Result<usize, TransformSizeError> {
    let data = bytes.get(HEADER_LEN..).unwrap_or(&[]);

    let mut index = FRAME_BYTES + 1;
    while index <= MAX_FFT_SIZE + 1 && index < data.len() {
        if data[index] == SENTINEL {
            let size = index - 1;
            if !size.is_power_of_two() {
                return Err(TransformSizeError { detected: Some(size) });
            }
            return Ok(size);
        }
        index += FRAME_BYTES;
    }

    Err(TransformSizeError { detected: None })
}

// ═══════════════════════════════════════════════════════════════════
// Decoded chunk
// ═══════════════════════════════════════════════════════════════════

/// One decoded chunk of the source stream.
#[derive(Debug, Clone)]
pub struct SourceChunk {
    /// PCM normalized to [-1, 1).
    pub pcm: Vec<f32>,
    /// Two direction code bytes per frame, in frame order.
    pub codes: Vec<u8>,
}

impl SourceChunk {
    /// Split the data section of a chunk into PCM and direction codes.
    pub fn decode(bytes: &[u8], min_frames: usize) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_LEN {
            return Err(FormatError::Truncated { len: bytes.len() });
        }

        let data = &bytes[HEADER_LEN..];
        let frames = data.len() / FRAME_BYTES;
        if frames < min_frames.max(1) {
            return Err(FormatError::ChunkTooShort {
                frames,
                required: min_frames.max(1),
            });
        }

        let mut pcm = Vec::with_capacity(frames);
        let mut codes = Vec::with_capacity(frames * 2);
        for frame in data.chunks_exact(FRAME_BYTES) {
            codes.push(frame[0]);
            codes.push(frame[1]);
            pcm.push(i16::from_le_bytes([frame[2], frame[3]]) as f32 / 32768.0);
        }

        Ok(Self { pcm, codes })
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.pcm.len()
    }
}

// ═══════════════════════════════════════════════════════════════════
// Sector layout
// ═══════════════════════════════════════════════════════════════════

/// Which of the two per-bin directions to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Primary,
    Secondary,
}

/// Where a block's per-bin direction codes live.
///
/// Offsets are into the code bytes of the block (two bytes per frame,
/// starting at the block's first frame) and must stay below `fft_size`,
/// i.e. inside the block's first hop.
pub trait SectorLayout: Send + Sync {
    fn code_offset(&self, bin: usize, layer: Layer, fft_size: usize) -> usize;
}

/// Layout written by the reference encoder.
///
/// Even bins use byte 1 and odd bins byte 0 of frame `bin / 2`; the
/// secondary layer is shifted by `fft_size / 4` frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterleavedLayout;

impl SectorLayout for InterleavedLayout {
    #[inline]
    fn code_offset(&self, bin: usize, layer: Layer, fft_size: usize) -> usize {
        let frame = bin / 2
            + match layer {
                Layer::Primary => 0,
                Layer::Secondary => fft_size / 4,
            };
        2 * frame + if bin % 2 == 0 { 1 } else { 0 }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Writer
// ═══════════════════════════════════════════════════════════════════

/// Encodes PCM and per-block sector codes into a SOPA stream.
pub struct StreamWriter<L: SectorLayout = InterleavedLayout> {
    header: StreamHeader,
    fft_size: usize,
    layout: L,
}

impl StreamWriter<InterleavedLayout> {
    pub fn new(header: StreamHeader, fft_size: usize) -> Self {
        Self::with_layout(header, fft_size, InterleavedLayout)
    }
}

impl<L: SectorLayout> StreamWriter<L> {
    pub fn with_layout(header: StreamHeader, fft_size: usize, layout: L) -> Self {
        debug_assert!(fft_size.is_power_of_two() && fft_size >= 4 && fft_size <= MAX_FFT_SIZE);
        Self {
            header,
            fft_size,
            layout,
        }
    }

    /// Encode `pcm` with `sectors(block, bin) -> (primary, secondary)`.
    ///
    /// The secondary code is only written for dual-direction versions. The
    /// block-size sentinel is placed in the first block.
    pub fn encode<F>(&self, pcm: &[i16], mut sectors: F) -> Vec<u8>
    where
        F: FnMut(usize, usize) -> (u8, u8),
    {
        let hop = self.fft_size / 2;
        let frames = pcm.len();
        let data_len = frames * FRAME_BYTES;

        let mut header = self.header;
        header.chunk_size = data_len as u32;

        let mut codes = vec![0u8; frames * 2];
        let mut block = 0;
        while block * hop < frames {
            let base = block * hop * 2;
            for bin in 0..hop {
                let (primary, secondary) = sectors(block, bin);
                let offset = base + self.layout.code_offset(bin, Layer::Primary, self.fft_size);
                if let Some(slot) = codes.get_mut(offset) {
                    *slot = primary;
                }
                if header.dual_direction() {
                    let offset = base + self.layout.code_offset(bin, Layer::Secondary, self.fft_size);
                    if let Some(slot) = codes.get_mut(offset) {
                        *slot = secondary;
                    }
                }
            }
            block += 1;
        }

        // Sentinel: byte 1 of frame fft_size / 4.
        if let Some(slot) = codes.get_mut(2 * (self.fft_size / 4) + 1) {
            *slot = SENTINEL;
        }

        let mut out = Vec::with_capacity(HEADER_LEN + data_len);
        out.extend_from_slice(&header.to_bytes());
        for (frame, sample) in pcm.iter().enumerate() {
            out.push(codes[2 * frame]);
            out.push(codes[2 * frame + 1]);
            out.extend_from_slice(&sample.to_le_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(sample_rate: u32, version: u8, fft_size: usize, frames: usize) -> Vec<u8> {
        let pcm: Vec<i16> = (0..frames).map(|i| (i as i16).wrapping_mul(7)).collect();
        StreamWriter::new(StreamHeader::new(sample_rate, version), fft_size)
            .encode(&pcm, |_, bin| ((bin % 200) as u8, 142))
    }

    #[test]
    fn test_valid_header_scenario() {
        let bytes = stream(44100, 3, 512, 2048);
        let header = StreamHeader::parse(&bytes).unwrap();

        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.bit_depth, 16);
        assert_eq!(header.version.0, 3);
        assert!(header.dual_direction());
        assert_eq!(header.chunk_size as usize, 2048 * FRAME_BYTES);
    }

    #[test]
    fn test_malformed_headers_rejected() {
        let good = stream(22050, 2, 256, 1024);
        assert!(StreamHeader::parse(&good).is_ok());

        let mut bad_tag = good.clone();
        bad_tag[8] = b'X';
        assert_eq!(StreamHeader::parse(&bad_tag), Err(FormatError::BadTag));

        let mut bad_fmt = good.clone();
        bad_fmt[13] = b'x';
        assert_eq!(StreamHeader::parse(&bad_fmt), Err(FormatError::BadFormatChunk));

        let mut bad_depth = good.clone();
        bad_depth[16] = 24;
        assert_eq!(StreamHeader::parse(&bad_depth), Err(FormatError::BitDepth(24)));

        let mut bad_rate = good.clone();
        bad_rate[24..26].copy_from_slice(&48000u16.to_le_bytes());
        assert_eq!(StreamHeader::parse(&bad_rate), Err(FormatError::SampleRate(48000)));

        let mut old = good.clone();
        old[39] = 1;
        assert_eq!(StreamHeader::parse(&old), Err(FormatError::Version(1)));

        let mut bad_chunk = good.clone();
        bad_chunk[40..44].copy_from_slice(&6u32.to_le_bytes());
        assert_eq!(StreamHeader::parse(&bad_chunk), Err(FormatError::ChunkSize(6)));

        assert_eq!(StreamHeader::parse(&good[..20]), Err(FormatError::Truncated { len: 20 }));
    }

    #[test]
    fn test_detect_finds_block_size() {
        for size in [8, 64, 512, 4096] {
            let bytes = stream(44100, 2, size, size * 2);
            assert_eq!(detect_fft_size(&bytes), Ok(size));
        }
    }

    #[test]
    fn test_detect_failures() {
        let mut bytes = stream(44100, 2, 512, 2048);
        // Remove the sentinel.
        bytes[HEADER_LEN + 2 * FRAME_BYTES * 64 + 1] = 0;
        assert_eq!(detect_fft_size(&bytes), Err(TransformSizeError { detected: None }));

        // Sentinel at frame 3 implies 12, which is not a power of two.
        bytes[HEADER_LEN + 3 * FRAME_BYTES + 1] = SENTINEL;
        assert_eq!(detect_fft_size(&bytes), Err(TransformSizeError { detected: Some(12) }));

        // Header only.
        assert!(detect_fft_size(&bytes[..HEADER_LEN]).is_err());
    }

    #[test]
    fn test_decode_splits_pcm_and_codes() {
        let pcm: Vec<i16> = vec![0, 16384, -32768, 100, 5, 6, 7, 8];
        let bytes = StreamWriter::new(StreamHeader::new(44100, 2), 8)
            .encode(&pcm, |block, bin| ((block * 10 + bin) as u8, 0));

        let chunk = SourceChunk::decode(&bytes, 8).unwrap();
        assert_eq!(chunk.frames(), 8);
        assert_eq!(chunk.pcm[1], 0.5);
        assert_eq!(chunk.pcm[2], -1.0);

        // Block 0, bin 1 is byte 0 of frame 0; bin 2 is byte 1 of frame 1.
        assert_eq!(chunk.codes[0], 1);
        assert_eq!(chunk.codes[3], 2);
        // Sentinel for an 8-point block sits in byte 1 of frame 2.
        assert_eq!(chunk.codes[5], SENTINEL);
        // Block 1 starts at frame 4.
        assert_eq!(chunk.codes[8 + 1], 10);

        assert!(matches!(
            SourceChunk::decode(&bytes, 16),
            Err(FormatError::ChunkTooShort { frames: 8, required: 16 })
        ));
    }

    #[test]
    fn test_interleaved_layout_stays_inside_first_hop() {
        let layout = InterleavedLayout;
        for size in [8usize, 64, 4096] {
            let mut seen = vec![false; size];
            for bin in 0..size / 2 {
                for layer in [Layer::Primary, Layer::Secondary] {
                    let offset = layout.code_offset(bin, layer, size);
                    assert!(offset < size);
                    assert!(!seen[offset], "offset {} used twice", offset);
                    seen[offset] = true;
                }
            }
        }
    }
}
