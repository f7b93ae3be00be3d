//! WebAssembly bindings via wasm-bindgen for browser integration.
//!
//! This module is only compiled when the `web` feature is enabled.
//!
//! # Usage
//!
//! Build with wasm-pack:
//! ```bash
//! wasm-pack build --target web --features web
//! ```
//!
//! # JavaScript Example
//!
//! ```javascript
//! import init, { sopa_init, SopaConfig, SopaControl } from './sopa.js';
//!
//! await init();
//! sopa_init();
//!
//! const control = new SopaControl(new SopaConfig());
//! const engine = control.take_engine();
//!
//! // Feed fetched bytes as they arrive
//! control.on_stream_loaded(new Uint8Array(await streamResponse.arrayBuffer()));
//! control.on_table_loaded(0, new Uint8Array(await magnitudes.arrayBuffer()));
//! control.on_table_loaded(1, new Uint8Array(await phases.arrayBuffer()));
//! control.set_pan(45);
//! control.play();
//!
//! // In the audio callback
//! engine.process_commands();
//! engine.render(frames, interleavedOutput);
//! ```

use wasm_bindgen::prelude::*;

use crate::bridge::{ControlHandle, EngineHandle, create_bridge};
use crate::config::{DEFAULT_CALLBACK_FRAMES, DEFAULT_DEVICE_SAMPLE_RATE, EngineConfig};
use crate::directivity::PolarPattern;
use crate::hrtf::TableKind;
use crate::scheduler::FillStatus;

// ═══════════════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the wasm module. Call this once before using any other functions.
/// Sets up panic hooks and console logging.
#[wasm_bindgen]
pub fn sopa_init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════

/// Configuration for creating a control/engine pair.
#[wasm_bindgen]
#[derive(Clone, Copy)]
pub struct SopaConfig {
    /// AudioContext sample rate in Hz.
    pub device_sample_rate: u32,
    /// Largest callback rendered in one piece, in frames.
    pub max_callback_frames: u32,
}

#[wasm_bindgen]
impl SopaConfig {
    /// Create a new configuration with default values.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration with custom values.
    pub fn with_values(device_sample_rate: u32, max_callback_frames: u32) -> Self {
        Self {
            device_sample_rate,
            max_callback_frames,
        }
    }
}

impl Default for SopaConfig {
    fn default() -> Self {
        Self {
            device_sample_rate: DEFAULT_DEVICE_SAMPLE_RATE,
            max_callback_frames: DEFAULT_CALLBACK_FRAMES as u32,
        }
    }
}

impl From<SopaConfig> for EngineConfig {
    fn from(cfg: SopaConfig) -> Self {
        EngineConfig::new()
            .with_device_sample_rate(cfg.device_sample_rate)
            .with_max_callback_frames(cfg.max_callback_frames as usize)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Readback Data
// ═══════════════════════════════════════════════════════════════════════════

/// Readback data from the engine (for UI displays).
#[wasm_bindgen]
#[derive(Clone, Copy, Default)]
pub struct SopaReadback {
    /// Stream and HRTF tables are installed.
    pub ready: bool,
    pub playing: bool,
    /// The last loop has ended.
    pub finished: bool,
    /// Source samples rendered since play.
    pub elapsed_samples: u64,
    /// Device samples delivered since play.
    pub device_samples: u64,
    /// Frame offset in the playing chunk.
    pub current_offset: u64,
    /// Elapsed time at the device, in seconds.
    pub elapsed_seconds: f64,
    /// Peak level of left channel.
    pub peak_left: f32,
    /// Peak level of right channel.
    pub peak_right: f32,
}

// ═══════════════════════════════════════════════════════════════════════════
// Control Handle
// ═══════════════════════════════════════════════════════════════════════════

/// Loader and UI side. Receives fetched bytes and listener controls.
#[wasm_bindgen]
pub struct SopaControl {
    inner: ControlHandle,
    engine: Option<EngineHandle>,
}

#[wasm_bindgen]
impl SopaControl {
    /// Create a linked control/engine pair.
    #[wasm_bindgen(constructor)]
    pub fn new(config: SopaConfig) -> SopaControl {
        let (control, engine) = create_bridge(EngineConfig::from(config));
        SopaControl {
            inner: control,
            engine: Some(engine),
        }
    }

    /// Take the engine paired with this control handle.
    ///
    /// Returns `undefined` after the first call.
    pub fn take_engine(&mut self) -> Option<SopaEngine> {
        self.engine.take().map(|inner| SopaEngine { inner })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────────────────

    /// Hand over one fetched chunk of the source stream.
    /// Returns true if the chunk was accepted.
    pub fn on_stream_loaded(&mut self, bytes: &[u8]) -> bool {
        self.inner.on_stream_loaded(bytes).is_ok()
    }

    /// Report that fetching the stream failed.
    pub fn on_stream_failed(&mut self, reason: &str) {
        self.inner.on_stream_failed(reason);
    }

    /// Next chunk starts a new stream.
    pub fn reset_stream(&mut self) {
        self.inner.reset_stream();
    }

    /// Hand over one HRTF table (0 = magnitude, 1 = phase).
    pub fn on_table_loaded(&mut self, kind: u32, bytes: &[u8]) -> bool {
        self.inner.on_table_loaded(TableKind::from_code(kind), bytes).is_ok()
    }

    /// Description of the last load failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error().map(|e| e.to_string())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Steering & Transport
    // ─────────────────────────────────────────────────────────────────────────

    pub fn set_pan(&mut self, degrees: f32) {
        self.inner.set_pan(degrees);
    }

    pub fn set_tilt(&mut self, degrees: f32) {
        self.inner.set_tilt(degrees);
    }

    /// 0 omni, 1 cardioid, 2 cardioid squared, 3 hypercardioid, 4 narrow.
    pub fn set_directivity(&mut self, pattern: u32, azimuth_deg: f32, elevation_deg: f32) {
        self.inner
            .set_directivity(PolarPattern::from_code(pattern), azimuth_deg, elevation_deg);
    }

    /// Cardioid raised to an arbitrary power.
    pub fn set_custom_directivity(&mut self, exponent: f32, azimuth_deg: f32, elevation_deg: f32) {
        self.inner
            .set_directivity(PolarPattern::Custom(exponent.max(0.0)), azimuth_deg, elevation_deg);
    }

    pub fn set_last_loop(&mut self, last: bool) {
        self.inner.set_last_loop(last);
    }

    pub fn play(&mut self) {
        self.inner.play();
    }

    pub fn stop(&mut self) {
        self.inner.stop();
    }

    /// Release objects the engine replaced. Returns the number released.
    pub fn collect_garbage(&self) -> u32 {
        self.inner.collect_garbage() as u32
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the current readback state from the engine.
    pub fn get_readback(&self) -> SopaReadback {
        let r = self.inner.readback();
        let peaks = self.inner.output_peaks();
        SopaReadback {
            ready: r.ready,
            playing: r.playing,
            finished: r.finished,
            elapsed_samples: r.clock.produced_samples,
            device_samples: r.clock.device_samples,
            current_offset: r.clock.current_offset,
            elapsed_seconds: r.clock.seconds(),
            peak_left: peaks[0],
            peak_right: peaks[1],
        }
    }

    /// Transform size of the loaded stream (0 if loading failed).
    pub fn fft_size(&self) -> u32 {
        self.inner.fft_size() as u32
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    pub fn load_ok(&self) -> bool {
        self.inner.load_ok()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.is_playing()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    pub fn elapsed_samples(&self) -> u64 {
        self.inner.elapsed_samples()
    }

    pub fn device_samples(&self) -> u64 {
        self.inner.device_samples()
    }

    pub fn current_offset(&self) -> u64 {
        self.inner.current_offset()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Engine Handle
// ═══════════════════════════════════════════════════════════════════════════

/// Audio-side engine handle for rendering audio.
/// Use this in an AudioWorklet for real-time processing.
#[wasm_bindgen]
pub struct SopaEngine {
    inner: EngineHandle,
}

#[wasm_bindgen]
impl SopaEngine {
    /// Process all pending commands from the control side.
    /// Call this at the start of each audio render callback.
    pub fn process_commands(&mut self) -> u32 {
        self.inner.process_commands() as u32
    }

    /// Render audio frames to the provided output buffer (interleaved stereo).
    /// Output format: [L0, R0, L1, R1, L2, R2, ...]
    ///
    /// The output slice must have length >= frames * 2. Returns a fill
    /// status: 0 idle, 1 filled, 2 starved, 3 finished.
    pub fn render(&mut self, frames: u32, output: &mut [f32]) -> u32 {
        let total = frames as usize * 2;
        if output.len() < total {
            output.fill(0.0);
            return FillStatus::Idle.code();
        }
        self.inner.render_interleaved(&mut output[..total]).code()
    }

    /// Render separate left and right channel buffers.
    pub fn render_planar(&mut self, left: &mut [f32], right: &mut [f32]) -> u32 {
        let frames = left.len().min(right.len());
        self.inner.render(&mut left[..frames], &mut right[..frames]).code()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.is_playing()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════

#[wasm_bindgen]
pub fn table_magnitude() -> u32 {
    0
}

#[wasm_bindgen]
pub fn table_phase() -> u32 {
    1
}

#[wasm_bindgen]
pub fn status_finished() -> u32 {
    FillStatus::Finished.code()
}
