// src/state/command.rs
//
// Commands from the control side to the audio engine.
//
// Commands are the ONLY way the control side can change engine state.
// They are queued and applied at the start of the next audio callback.

use std::sync::Arc;

use crate::engine::Stream;
use crate::format::SourceChunk;
use crate::hrtf::HrtfTable;

use super::{LoopMode, SteeringState};

/// A command for the audio engine.
///
/// Everything a command carries was allocated on the control side.
pub enum Command {
    // ═══════════════════════════════════════════
    // Steering
    // ═══════════════════════════════════════════
    /// Replace pan/tilt/directivity.
    SetSteering(SteeringState),

    /// Set the end-of-chunk behaviour.
    SetLoopMode(LoopMode),

    // ═══════════════════════════════════════════
    // Transport
    // ═══════════════════════════════════════════
    /// Rewind and start playback.
    Play,

    /// Stop playback, keeping every loaded resource.
    Stop,

    // ═══════════════════════════════════════════
    // Resources
    // ═══════════════════════════════════════════
    /// Replace the whole stream (header, renderer state and first chunk).
    InstallStream(Box<Stream>),

    /// Add a chunk to the current stream.
    PushChunk(Arc<SourceChunk>),

    /// Replace the HRTF database.
    InstallTables(Arc<HrtfTable>),
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::SetSteering(state) => f.debug_tuple("SetSteering").field(state).finish(),
            Command::SetLoopMode(mode) => f.debug_tuple("SetLoopMode").field(mode).finish(),
            Command::Play => write!(f, "Play"),
            Command::Stop => write!(f, "Stop"),
            Command::InstallStream(stream) => write!(f, "InstallStream(fft_size={})", stream.fft_size()),
            Command::PushChunk(chunk) => write!(f, "PushChunk(frames={})", chunk.frames()),
            Command::InstallTables(_) => write!(f, "InstallTables"),
        }
    }
}

/// Objects the engine replaced, handed back for release on the control side.
pub enum CommandResult {
    RetiredStream(Box<Stream>),
    RetiredChunk(Arc<SourceChunk>),
    RetiredTables(Arc<HrtfTable>),
}
