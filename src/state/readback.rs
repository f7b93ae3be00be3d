// src/state/readback.rs

use crate::transport::PlaybackClock;

/// Snapshot of engine state for the control side.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineReadback {
    /// Stream and HRTF tables are both installed.
    pub ready: bool,

    /// Playback is running.
    pub playing: bool,

    /// The last loop has played to its end.
    pub finished: bool,

    /// Sample counters and position.
    pub clock: PlaybackClock,
}
