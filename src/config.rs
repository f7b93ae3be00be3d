// src/config.rs
//
// Engine configuration shared by the bridge and the bindings.

/// Device rate used when the host does not report one.
pub const DEFAULT_DEVICE_SAMPLE_RATE: u32 = 44_100;

/// Largest callback the engine renders in one piece.
pub const DEFAULT_CALLBACK_FRAMES: usize = 4096;

/// Audio device parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Output sample rate (Hz)
    pub device_sample_rate: u32,

    /// Scratch size for interleaved rendering; longer requests are split.
    pub max_callback_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_sample_rate: DEFAULT_DEVICE_SAMPLE_RATE,
            max_callback_frames: DEFAULT_CALLBACK_FRAMES,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device_sample_rate(mut self, rate: u32) -> Self {
        self.device_sample_rate = if rate == 0 { DEFAULT_DEVICE_SAMPLE_RATE } else { rate };
        self
    }

    pub fn with_max_callback_frames(mut self, frames: usize) -> Self {
        self.max_callback_frames = frames.max(1);
        self
    }
}
