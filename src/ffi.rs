// C-compatible FFI bindings for Swift/iOS integration.
//
// Safety requirements:
// - All pointers must be non-null unless documented otherwise
// - All handles must be created by this module and not fabricated
// - Byte buffers are only read during the call; the engine keeps its own copy
// - Caller must call the corresponding _destroy function for each _create

use std::ffi::{CStr, c_char};

use crate::audio_buffer::AudioBuffer;
use crate::bridge::{ControlHandle, EngineHandle, create_bridge};
use crate::config::{DEFAULT_CALLBACK_FRAMES, DEFAULT_DEVICE_SAMPLE_RATE, EngineConfig};
use crate::directivity::PolarPattern;
use crate::hrtf::TableKind;
use crate::scheduler::FillStatus;
use crate::state::EngineReadback;

use log::LevelFilter;
use oslog::OsLogger;

// Logger subsystem identifier
const LOG_SUBSYSTEM: &str = "com.sopa.engine";

// ═══════════════════════════════════════════════════════════════════════════
// Logger Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the oslog logger.
///
/// Call once at application startup before using any other FFI function.
/// Messages appear in Console.app and Xcode's debug console.
#[unsafe(no_mangle)]
pub extern "C" fn sopa_init_logger() {
    OsLogger::new(LOG_SUBSYSTEM)
        .level_filter(LevelFilter::Debug)
        .init()
        .ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Opaque Handle Types
// ═══════════════════════════════════════════════════════════════════════════

/// Opaque handle to the ControlHandle (loader/UI side).
pub struct SopaControl {
    inner: ControlHandle,
}

/// Opaque handle to the EngineHandle (audio side).
pub struct SopaEngine {
    inner: EngineHandle,
}

// ═══════════════════════════════════════════════════════════════════════════
// FFI Result Types
// ═══════════════════════════════════════════════════════════════════════════

/// Readback data from the engine (for UI displays).
#[repr(C)]
pub struct SopaReadback {
    pub ready: bool,
    pub playing: bool,
    pub finished: bool,
    pub elapsed_samples: u64,
    pub device_samples: u64,
    pub current_offset: u64,
    pub elapsed_seconds: f64,
    pub peak_left: f32,
    pub peak_right: f32,
}

impl SopaReadback {
    fn new(r: EngineReadback, peaks: [f32; 2]) -> Self {
        Self {
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
}

// ═══════════════════════════════════════════════════════════════════════════
// Creation
// ═══════════════════════════════════════════════════════════════════════════

/// Configuration for creating a control/engine pair.
#[repr(C)]
pub struct SopaConfig {
    /// Output sample rate in Hz (0 selects 44100).
    pub device_sample_rate: u32,
    /// Largest callback rendered in one piece, in frames.
    pub max_callback_frames: u32,
}

impl Default for SopaConfig {
    fn default() -> Self {
        Self {
            device_sample_rate: DEFAULT_DEVICE_SAMPLE_RATE,
            max_callback_frames: DEFAULT_CALLBACK_FRAMES as u32,
        }
    }
}

impl From<&SopaConfig> for EngineConfig {
    fn from(cfg: &SopaConfig) -> Self {
        EngineConfig::new()
            .with_device_sample_rate(cfg.device_sample_rate)
            .with_max_callback_frames(cfg.max_callback_frames as usize)
    }
}

/// Get the default configuration values.
#[unsafe(no_mangle)]
pub extern "C" fn sopa_default_config() -> SopaConfig {
    SopaConfig::default()
}

/// Create a control/engine pair with default configuration.
///
/// # Safety
/// `out_engine` must be a valid pointer to store the engine handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sopa_create(out_engine: *mut *mut SopaEngine) -> *mut SopaControl {
    let config = SopaConfig::default();
    unsafe { sopa_create_with_config(&config, out_engine) }
}

/// Create a control/engine pair with custom configuration.
///
/// Returns the control handle. The engine handle is returned via
/// `out_engine`. Both must be destroyed with their destroy functions.
///
/// # Safety
/// - `config` must be a valid pointer to a SopaConfig struct or NULL
/// - `out_engine` must be a valid pointer to store the engine handle
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sopa_create_with_config(
    config: *const SopaConfig,
    out_engine: *mut *mut SopaEngine,
) -> *mut SopaControl {
    // Use provided config or defaults
    let cfg = if config.is_null() {
        SopaConfig::default()
    } else {
        unsafe { std::ptr::read(config) }
    };

    let (control, engine) = create_bridge(EngineConfig::from(&cfg));

    if !out_engine.is_null() {
        unsafe {
            *out_engine = Box::into_raw(Box::new(SopaEngine { inner: engine }));
        }
    }

    Box::into_raw(Box::new(SopaControl { inner: control }))
}

/// Destroy a control handle.
///
/// # Safety
/// `control` must be a valid pointer returned by `sopa_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_destroy(control: *mut SopaControl) {
    if !control.is_null() {
        unsafe { drop(Box::from_raw(control)) };
    }
}

/// Destroy an engine handle.
///
/// # Safety
/// `engine` must be a valid pointer returned via `sopa_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn engine_destroy(engine: *mut SopaEngine) {
    if !engine.is_null() {
        unsafe { drop(Box::from_raw(engine)) };
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Control - Loading
// ═══════════════════════════════════════════════════════════════════════════

unsafe fn bytes<'a>(data: *const u8, len: usize) -> &'a [u8] {
    if data.is_null() || len == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(data, len) }
    }
}

/// Hand over one fetched chunk of the source stream.
///
/// Returns `true` if the chunk was accepted.
///
/// # Safety
/// `data` must point to `len` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_on_stream_loaded(control: *mut SopaControl, data: *const u8, len: usize) -> bool {
    if control.is_null() {
        return false;
    }
    unsafe { (*control).inner.on_stream_loaded(bytes(data, len)).is_ok() }
}

/// Report that fetching the stream failed.
///
/// # Safety
/// `reason` must be a valid null-terminated UTF-8 string or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_on_stream_failed(control: *mut SopaControl, reason: *const c_char) {
    if control.is_null() {
        return;
    }
    let reason = if reason.is_null() {
        "unknown".to_string()
    } else {
        unsafe { CStr::from_ptr(reason).to_string_lossy().into_owned() }
    };
    unsafe { (*control).inner.on_stream_failed(&reason) };
}

/// Start over: the next chunk is parsed as a new stream.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_reset_stream(control: *mut SopaControl) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.reset_stream() };
}

/// Hand over one HRTF table (`kind` 0 = magnitude, 1 = phase).
///
/// Returns `true` if the table was accepted.
///
/// # Safety
/// `data` must point to `len` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_on_table_loaded(
    control: *mut SopaControl,
    kind: u32,
    data: *const u8,
    len: usize,
) -> bool {
    if control.is_null() {
        return false;
    }
    unsafe {
        (*control)
            .inner
            .on_table_loaded(TableKind::from_code(kind), bytes(data, len))
            .is_ok()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Control - Steering & Transport
// ═══════════════════════════════════════════════════════════════════════════

/// Set the listener pan in degrees.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_set_pan(control: *mut SopaControl, degrees: f32) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.set_pan(degrees) };
}

/// Set the listener tilt in degrees.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_set_tilt(control: *mut SopaControl, degrees: f32) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.set_tilt(degrees) };
}

/// Set the pickup pattern (0 omni, 1 cardioid, 2 cardioid squared,
/// 3 hypercardioid, 4 narrow) and its focus in degrees.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_set_directivity(
    control: *mut SopaControl,
    pattern: u32,
    azimuth_deg: f32,
    elevation_deg: f32,
) {
    if control.is_null() {
        return;
    }
    unsafe {
        (*control)
            .inner
            .set_directivity(PolarPattern::from_code(pattern), azimuth_deg, elevation_deg)
    };
}

/// Cardioid raised to an arbitrary power.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_set_custom_directivity(
    control: *mut SopaControl,
    exponent: f32,
    azimuth_deg: f32,
    elevation_deg: f32,
) {
    if control.is_null() {
        return;
    }
    unsafe {
        (*control)
            .inner
            .set_directivity(PolarPattern::Custom(exponent.max(0.0)), azimuth_deg, elevation_deg)
    };
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_set_last_loop(control: *mut SopaControl, last: bool) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.set_last_loop(last) };
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_play(control: *mut SopaControl) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.play() };
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_stop(control: *mut SopaControl) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.stop() };
}

/// Release chunks, tables and streams the engine has replaced.
///
/// Call periodically from the control thread. Returns the number released.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_collect_garbage(control: *mut SopaControl) -> u32 {
    if control.is_null() {
        return 0;
    }
    unsafe { (*control).inner.collect_garbage() as u32 }
}

// ═══════════════════════════════════════════════════════════════════════════
// Control - Queries
// ═══════════════════════════════════════════════════════════════════════════

/// Get the current readback state from the engine.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_get_readback(control: *const SopaControl) -> SopaReadback {
    if control.is_null() {
        return SopaReadback::new(EngineReadback::default(), [0.0; 2]);
    }
    let inner = unsafe { &(*control).inner };
    SopaReadback::new(inner.readback(), inner.output_peaks())
}

/// Transform size of the loaded stream (0 if loading failed).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_fft_size(control: *const SopaControl) -> u32 {
    if control.is_null() {
        return 0;
    }
    unsafe { (*control).inner.fft_size() as u32 }
}

/// Sample rate of the loaded stream (0 if none).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_sample_rate(control: *const SopaControl) -> u32 {
    if control.is_null() {
        return 0;
    }
    unsafe { (*control).inner.sample_rate() }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_load_ok(control: *const SopaControl) -> bool {
    if control.is_null() {
        return false;
    }
    unsafe { (*control).inner.load_ok() }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_is_ready(control: *const SopaControl) -> bool {
    if control.is_null() {
        return false;
    }
    unsafe { (*control).inner.is_ready() }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_is_playing(control: *const SopaControl) -> bool {
    if control.is_null() {
        return false;
    }
    unsafe { (*control).inner.is_playing() }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_is_finished(control: *const SopaControl) -> bool {
    if control.is_null() {
        return false;
    }
    unsafe { (*control).inner.is_finished() }
}

/// Source samples rendered since the last play.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_elapsed_samples(control: *const SopaControl) -> u64 {
    if control.is_null() {
        return 0;
    }
    unsafe { (*control).inner.elapsed_samples() }
}

/// Device samples delivered since the last play.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_device_samples(control: *const SopaControl) -> u64 {
    if control.is_null() {
        return 0;
    }
    unsafe { (*control).inner.device_samples() }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_current_offset(control: *const SopaControl) -> u64 {
    if control.is_null() {
        return 0;
    }
    unsafe { (*control).inner.current_offset() }
}

// ═══════════════════════════════════════════════════════════════════════════
// Engine Functions (Audio Thread)
// ═══════════════════════════════════════════════════════════════════════════

/// Process all pending commands from the control thread.
///
/// Call this at the start of each audio render callback. Returns the number
/// of commands applied.
///
/// # Safety
/// Must be called from the audio thread. `engine` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn engine_process_commands(engine: *mut SopaEngine) -> u32 {
    if engine.is_null() {
        return 0;
    }
    unsafe { (*engine).inner.process_commands() as u32 }
}

/// Render audio frames to separate left and right buffers.
///
/// Call this from your audio callback after `engine_process_commands`.
/// Buffers are filled with silence while stopped or not ready.
///
/// Returns a fill status: 0 idle, 1 filled, 2 starved, 3 finished.
///
/// # Safety
/// - Must be called from the audio thread
/// - Output buffers must be valid and have space for `frames` samples
#[unsafe(no_mangle)]
pub unsafe extern "C" fn engine_render(
    engine: *mut SopaEngine,
    frames: u32,
    output_left: *mut f32,
    output_right: *mut f32,
) -> u32 {
    let total_frames = frames as usize;

    // Fill with silence if invalid
    if engine.is_null() || output_left.is_null() || output_right.is_null() {
        if !output_left.is_null() {
            unsafe { std::ptr::write_bytes(output_left, 0, total_frames) };
        }
        if !output_right.is_null() {
            unsafe { std::ptr::write_bytes(output_right, 0, total_frames) };
        }
        return FillStatus::Idle.code();
    }

    let out_left = unsafe { std::slice::from_raw_parts_mut(output_left, total_frames) };
    let out_right = unsafe { std::slice::from_raw_parts_mut(output_right, total_frames) };

    unsafe { (*engine).inner.render(out_left, out_right).code() }
}

/// Render into one planar buffer: `frames` left samples, then `frames`
/// right samples.
///
/// # Safety
/// - `output` must have space for `frames * 2` floats
#[unsafe(no_mangle)]
pub unsafe extern "C" fn engine_render_planar(engine: *mut SopaEngine, frames: u32, output: *mut f32) -> u32 {
    let total = frames as usize * AudioBuffer::CHANNELS;

    if engine.is_null() || output.is_null() {
        if !output.is_null() {
            unsafe { std::ptr::write_bytes(output, 0, total) };
        }
        return FillStatus::Idle.code();
    }

    let data = unsafe { std::slice::from_raw_parts_mut(output, total) };
    let mut buffer = AudioBuffer::new(data);
    unsafe { (*engine).inner.on_audio_request(&mut buffer).code() }
}

/// Render audio to an interleaved stereo buffer.
///
/// Output format: [L0, R0, L1, R1, L2, R2, ...]
///
/// # Safety
/// - `output` must have space for `frames * 2` floats
#[unsafe(no_mangle)]
pub unsafe extern "C" fn engine_render_interleaved(engine: *mut SopaEngine, frames: u32, output: *mut f32) -> u32 {
    let total = frames as usize * 2;

    if engine.is_null() || output.is_null() {
        if !output.is_null() {
            unsafe { std::ptr::write_bytes(output, 0, total) };
        }
        return FillStatus::Idle.code();
    }

    let out_slice = unsafe { std::slice::from_raw_parts_mut(output, total) };
    unsafe { (*engine).inner.render_interleaved(out_slice).code() }
}

/// Check if the engine is currently playing.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn engine_is_playing(engine: *const SopaEngine) -> bool {
    if engine.is_null() {
        return false;
    }
    unsafe { (*engine).inner.is_playing() }
}

// ═══════════════════════════════════════════════════════════════════════════
// Constants (for Swift convenience)
// ═══════════════════════════════════════════════════════════════════════════

#[unsafe(no_mangle)]
pub static SOPA_TABLE_MAGNITUDE: u32 = 0;

#[unsafe(no_mangle)]
pub static SOPA_TABLE_PHASE: u32 = 1;

#[unsafe(no_mangle)]
pub static SOPA_STATUS_IDLE: u32 = 0;

#[unsafe(no_mangle)]
pub static SOPA_STATUS_FILLED: u32 = 1;

#[unsafe(no_mangle)]
pub static SOPA_STATUS_STARVED: u32 = 2;

#[unsafe(no_mangle)]
pub static SOPA_STATUS_FINISHED: u32 = 3;

#[unsafe(no_mangle)]
pub static SOPA_PATTERN_OMNI: u32 = 0;

#[unsafe(no_mangle)]
pub static SOPA_PATTERN_CARDIOID: u32 = 1;

#[unsafe(no_mangle)]
pub static SOPA_PATTERN_CARDIOID_SQUARED: u32 = 2;

#[unsafe(no_mangle)]
pub static SOPA_PATTERN_HYPERCARDIOID: u32 = 3;

#[unsafe(no_mangle)]
pub static SOPA_PATTERN_NARROW: u32 = 4;
