// src/lib.rs
//
// Library entry point for Rust, FFI (iOS/Swift) and wasm consumers.

pub mod audio_buffer;
pub mod bridge;
pub mod config;
pub mod directivity;
pub mod engine;
pub mod format;
pub mod geometry;
pub mod hrtf;
pub mod renderer;
pub mod scheduler;
pub mod source_buffer;
pub mod spectral;
pub mod state;
pub mod transport;

#[cfg(feature = "ios")]
pub mod ffi;

#[cfg(feature = "web")]
pub mod wasm;

// Re-export key types for Rust consumers
pub use audio_buffer::AudioBuffer;
pub use bridge::{ControlHandle, EngineHandle, create_bridge};
pub use config::EngineConfig;
pub use directivity::PolarPattern;
pub use engine::{Engine, NotReady};
pub use format::{FormatError, LoadError, StreamHeader, StreamWriter, TransformSizeError};
pub use hrtf::{HrtfTable, TableKind};
pub use scheduler::FillStatus;
pub use state::{LoopMode, SteeringState};
pub use transport::PlaybackClock;
