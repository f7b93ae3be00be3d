//! Thread-safe bridge between the control side and the audio engine.
//!
//! This module provides the communication layer that lets loaders and UI
//! code drive the real-time binaural engine.
//!
//! # Architecture
//!
//! - **Control thread** owns [`ControlHandle`]: it parses and decodes loaded
//!   bytes, keeps the listener's steering, and sends [`Command`]s
//! - **Audio thread** owns [`EngineHandle`] with the [`Engine`]
//! - Communication uses MPSC channels for commands and atomics for readback;
//!   objects the engine replaces come back as [`CommandResult`]s and are
//!   dropped by [`ControlHandle::collect_garbage`]
//!
//! # Usage
//!
//! ```ignore
//! let (mut control, mut engine) = create_bridge(EngineConfig::default());
//!
//! // Control thread: hand over loaded bytes and steer
//! control.on_stream_loaded(&stream_bytes)?;
//! control.on_table_loaded(TableKind::Magnitude, &magnitude_bytes)?;
//! control.on_table_loaded(TableKind::Phase, &phase_bytes)?;
//! control.set_pan(45.0);
//! control.play();
//!
//! // Audio thread: process commands and render
//! engine.process_commands();
//! engine.on_audio_request(&mut buffer);
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    mpsc::{self, Receiver, Sender, TryRecvError},
};

use crate::audio_buffer::AudioBuffer;
use crate::config::EngineConfig;
use crate::directivity::PolarPattern;
use crate::engine::{Engine, Stream};
use crate::format::{InterleavedLayout, LoadError, SectorLayout, SourceChunk, StreamHeader, detect_fft_size};
use crate::geometry::SteeringTable;
use crate::hrtf::{TableKind, TableLoader};
use crate::scheduler::FillStatus;
use crate::state::{Command, CommandResult, EngineReadback, LoopMode, SteeringState};
use crate::transport::PlaybackClock;

/// Handle for the control thread.
///
/// Loader callbacks and UI controls go through here. Nothing in this
/// handle is touched by the audio thread.
pub struct ControlHandle {
    config: EngineConfig,

    /// Channel to send commands to the engine.
    command_tx: Sender<Command>,

    /// Channel to receive replaced objects.
    result_rx: Receiver<CommandResult>,

    /// Shared readback state (updated by engine, read here).
    readback: Arc<SharedReadback>,

    /// Local copy of the steering sent to the engine.
    steering: SteeringState,
    loop_mode: LoopMode,

    /// Header of the current stream, parsed from its first chunk.
    header: Option<StreamHeader>,
    fft_size: usize,
    load_ok: bool,
    last_error: Option<LoadError>,

    tables: TableLoader,
    tables_loaded: bool,
}

/// Handle for the audio thread containing the engine and communication channels.
pub struct EngineHandle {
    /// The audio engine (owned by audio thread).
    engine: Engine,

    /// Channel to receive commands from the control side.
    command_rx: Receiver<Command>,

    /// Channel to send replaced objects back.
    result_tx: Sender<CommandResult>,

    /// Shared readback state (written by engine).
    readback: Arc<SharedReadback>,

    /// Planar scratch for interleaved rendering.
    scratch: Vec<f32>,
}

/// Lock-free shared state for engine -> control readback.
struct SharedReadback {
    ready: AtomicBool,
    playing: AtomicBool,
    finished: AtomicBool,
    produced_samples: AtomicU64,
    device_samples: AtomicU64,
    current_offset: AtomicU64,
    /// Peak levels stored as f32 bits
    peak_left_bits: AtomicU32,
    peak_right_bits: AtomicU32,
}

impl SharedReadback {
    fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            produced_samples: AtomicU64::new(0),
            device_samples: AtomicU64::new(0),
            current_offset: AtomicU64::new(0),
            peak_left_bits: AtomicU32::new(0.0_f32.to_bits()),
            peak_right_bits: AtomicU32::new(0.0_f32.to_bits()),
        }
    }
}

/// Create a linked pair of handles.
///
/// Builds the steering table (the expensive part of setup) once; it is
/// reused for every stream loaded afterwards.
pub fn create_bridge(config: EngineConfig) -> (ControlHandle, EngineHandle) {
    create_bridge_with_table(config, Arc::new(SteeringTable::new()))
}

/// Create a linked pair of handles around an existing steering table.
pub fn create_bridge_with_table(config: EngineConfig, steering_table: Arc<SteeringTable>) -> (ControlHandle, EngineHandle) {
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let (result_tx, result_rx) = mpsc::channel();
    let readback = Arc::new(SharedReadback::new());

    let control_handle = ControlHandle {
        config,
        command_tx: cmd_tx,
        result_rx,
        readback: Arc::clone(&readback),
        steering: SteeringState::default(),
        loop_mode: LoopMode::Continue,
        header: None,
        fft_size: 0,
        load_ok: false,
        last_error: None,
        tables: TableLoader::new(),
        tables_loaded: false,
    };

    let engine_handle = EngineHandle {
        engine: Engine::new(config, steering_table),
        command_rx: cmd_rx,
        result_tx,
        readback,
        scratch: vec![0.0; config.max_callback_frames * 2],
    };

    log::info!(
        "Bridge created (device rate {} Hz, {} frame callbacks)",
        config.device_sample_rate,
        config.max_callback_frames
    );

    (control_handle, engine_handle)
}

// ═══════════════════════════════════════════════════════════════════
// ControlHandle - Control Thread API
// ═══════════════════════════════════════════════════════════════════

impl ControlHandle {
    /// Send a command to the engine.
    pub fn send(&self, cmd: Command) {
        let _ = self.command_tx.send(cmd);
    }

    // ───────────────────────────────────────────────────────────────
    // Loader callbacks
    // ───────────────────────────────────────────────────────────────

    /// A chunk of the source stream arrived.
    ///
    /// The first chunk carries the header and the block-size sentinel and
    /// installs a new stream; later chunks are queued behind it.
    pub fn on_stream_loaded(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        self.on_stream_loaded_with_layout(bytes, Box::new(InterleavedLayout))
    }

    /// Like [`on_stream_loaded`](Self::on_stream_loaded) with a custom
    /// direction-code layout (used for the first chunk only).
    pub fn on_stream_loaded_with_layout(&mut self, bytes: &[u8], layout: Box<dyn SectorLayout>) -> Result<(), LoadError> {
        let result = if self.header.is_none() {
            self.install_stream(bytes, layout)
        } else {
            self.push_chunk(bytes)
        };

        if let Err(e) = &result {
            self.last_error = Some(e.clone());
        }
        result
    }

    fn install_stream(&mut self, bytes: &[u8], layout: Box<dyn SectorLayout>) -> Result<(), LoadError> {
        let (header, fft_size, chunk) = match parse_first_chunk(bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::error!("Stream load failed: {}", e);
                self.load_ok = false;
                self.fft_size = 0;
                return Err(e);
            }
        };

        let stream = Stream::new(header, fft_size, Arc::new(chunk), layout, &self.config);
        self.send(Command::InstallStream(Box::new(stream)));

        log::info!(
            "Stream loaded: {} Hz, version {}.{}.{}, transform size {}{}",
            header.sample_rate,
            header.version.0,
            header.version.1,
            header.version.2,
            fft_size,
            if header.dual_direction() { ", dual direction" } else { "" }
        );

        self.header = Some(header);
        self.fft_size = fft_size;
        self.load_ok = true;
        self.last_error = None;
        Ok(())
    }

    fn push_chunk(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        match SourceChunk::decode(bytes, self.fft_size) {
            Ok(chunk) => {
                log::debug!("Queued chunk of {} frames", chunk.frames());
                self.send(Command::PushChunk(Arc::new(chunk)));
                Ok(())
            }
            Err(e) => {
                log::warn!("Skipping malformed chunk: {}", e);
                Err(e.into())
            }
        }
    }

    /// The stream loader gave up.
    pub fn on_stream_failed(&mut self, reason: &str) {
        log::error!("Stream fetch failed: {}", reason);
        if self.header.is_none() {
            self.load_ok = false;
            self.fft_size = 0;
        }
        self.last_error = Some(LoadError::Fetch(reason.to_string()));
    }

    /// Forget the current header so the next chunk starts a new stream.
    pub fn reset_stream(&mut self) {
        self.header = None;
        self.fft_size = 0;
        self.load_ok = false;
    }

    /// One of the two HRTF tables arrived.
    pub fn on_table_loaded(&mut self, kind: TableKind, bytes: &[u8]) -> Result<(), LoadError> {
        match self.tables.load(kind, bytes) {
            Ok(Some(table)) => {
                self.tables_loaded = true;
                self.send(Command::InstallTables(Arc::new(table)));
                Ok(())
            }
            Ok(None) => {
                log::debug!("{:?} table loaded, waiting for its partner", kind);
                Ok(())
            }
            Err(e) => {
                log::error!("{:?} table rejected: {}", kind, e);
                let e = LoadError::from(e);
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    // ───────────────────────────────────────────────────────────────
    // Controls
    // ───────────────────────────────────────────────────────────────

    /// Pan in degrees, clamped to [-180, 179].
    pub fn set_pan(&mut self, degrees: f32) {
        self.steering.set_pan_degrees(degrees);
        self.send(Command::SetSteering(self.steering));
    }

    /// Tilt in degrees, clamped to [-90, 89].
    pub fn set_tilt(&mut self, degrees: f32) {
        self.steering.set_tilt_degrees(degrees);
        self.send(Command::SetSteering(self.steering));
    }

    /// Pickup pattern and its focus (degrees, 0/0 = front).
    pub fn set_directivity(&mut self, pattern: PolarPattern, azimuth_deg: f32, elevation_deg: f32) {
        self.steering.set_directivity(pattern, azimuth_deg, elevation_deg);
        self.send(Command::SetSteering(self.steering));
    }

    /// Stop at the end of the playing chunk instead of continuing.
    pub fn set_last_loop(&mut self, last: bool) {
        self.loop_mode = if last { LoopMode::LastLoop } else { LoopMode::Continue };
        self.send(Command::SetLoopMode(self.loop_mode));
    }

    /// Rewind and start playback.
    pub fn play(&mut self) {
        log::info!("Play");
        self.send(Command::Play);
    }

    /// Stop playback.
    pub fn stop(&mut self) {
        log::info!("Stop");
        self.send(Command::Stop);
    }

    /// Drop everything the engine handed back. Returns how many objects
    /// were released.
    pub fn collect_garbage(&self) -> usize {
        let mut released = 0;
        loop {
            match self.result_rx.try_recv() {
                Ok(_) => released += 1,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        released
    }

    // ───────────────────────────────────────────────────────────────
    // Queries
    // ───────────────────────────────────────────────────────────────

    /// Transform size of the current stream, 0 when no stream loaded.
    #[inline]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Source sample rate, 0 when no stream loaded.
    pub fn sample_rate(&self) -> u32 {
        self.header.map(|h| h.sample_rate).unwrap_or(0)
    }

    #[inline]
    pub fn load_ok(&self) -> bool {
        self.load_ok
    }

    pub fn last_error(&self) -> Option<&LoadError> {
        self.last_error.as_ref()
    }

    pub fn header(&self) -> Option<&StreamHeader> {
        self.header.as_ref()
    }

    /// Both HRTF tables have been accepted.
    #[inline]
    pub fn tables_loaded(&self) -> bool {
        self.tables_loaded
    }

    #[inline]
    pub fn steering(&self) -> &SteeringState {
        &self.steering
    }

    #[inline]
    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    /// The engine has a stream and tables installed.
    pub fn is_ready(&self) -> bool {
        self.readback.ready.load(Ordering::Acquire)
    }

    pub fn is_playing(&self) -> bool {
        self.readback.playing.load(Ordering::Acquire)
    }

    /// The last loop has played to its end.
    pub fn is_finished(&self) -> bool {
        self.readback.finished.load(Ordering::Acquire)
    }

    /// Source-rate samples rendered since the last `play`.
    pub fn elapsed_samples(&self) -> u64 {
        self.readback.produced_samples.load(Ordering::Relaxed)
    }

    /// Device-rate samples delivered since the last `play`.
    pub fn device_samples(&self) -> u64 {
        self.readback.device_samples.load(Ordering::Relaxed)
    }

    /// Frame offset of the next analysis window in the playing chunk.
    pub fn current_offset(&self) -> u64 {
        self.readback.current_offset.load(Ordering::Relaxed)
    }

    /// Peak output level of the last callback, per channel.
    pub fn output_peaks(&self) -> [f32; 2] {
        [
            f32::from_bits(self.readback.peak_left_bits.load(Ordering::Relaxed)),
            f32::from_bits(self.readback.peak_right_bits.load(Ordering::Relaxed)),
        ]
    }

    pub fn clock(&self) -> PlaybackClock {
        PlaybackClock {
            produced_samples: self.elapsed_samples(),
            device_samples: self.device_samples(),
            current_offset: self.current_offset(),
            source_rate: self.sample_rate(),
            device_rate: self.config.device_sample_rate,
        }
    }

    /// Full engine readback.
    pub fn readback(&self) -> EngineReadback {
        EngineReadback {
            ready: self.is_ready(),
            playing: self.is_playing(),
            finished: self.is_finished(),
            clock: self.clock(),
        }
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

// ═══════════════════════════════════════════════════════════════════
// EngineHandle - Audio Thread API
// ═══════════════════════════════════════════════════════════════════

impl EngineHandle {
    // ───────────────────────────────────────────────────────────────
    // Command Processing
    // ───────────────────────────────────────────────────────────────

    /// Apply all pending commands.
    ///
    /// Call this at the start of each audio callback. Returns the number
    /// of commands applied.
    pub fn process_commands(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(cmd) = self.command_rx.try_recv() {
            if let Some(result) = self.engine.process_command(cmd) {
                let _ = self.result_tx.send(result);
            }
            applied += 1;
        }
        if applied > 0 {
            self.sync_readback();
        }
        applied
    }

    // ───────────────────────────────────────────────────────────────
    // Audio Processing (delegates to Engine)
    // ───────────────────────────────────────────────────────────────

    /// Fill a planar stereo device buffer.
    pub fn on_audio_request(&mut self, buffer: &mut AudioBuffer) -> FillStatus {
        let (left, right) = buffer.split_stereo_mut();
        let status = self.engine.render(left, right);
        self.store_peaks(buffer.peaks());
        self.sync_readback();
        status
    }

    /// Fill separate left/right slices.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) -> FillStatus {
        let status = self.engine.render(left, right);
        self.store_peaks([peak(left), peak(right)]);
        self.sync_readback();
        status
    }

    /// Fill an interleaved stereo buffer (L R L R ...).
    ///
    /// Rendered in pieces of at most `max_callback_frames`.
    pub fn render_interleaved(&mut self, output: &mut [f32]) -> FillStatus {
        let total_frames = output.len() / 2;
        let max_block = (self.scratch.len() / 2).max(1);
        let mut status = if self.engine.is_playing() { FillStatus::Filled } else { FillStatus::Idle };
        let mut peaks = [0.0f32; 2];

        let mut offset = 0;
        while offset < total_frames {
            let chunk_frames = (total_frames - offset).min(max_block);
            let (left, right) = self.scratch.split_at_mut(max_block);
            let (left, right) = (&mut left[..chunk_frames], &mut right[..chunk_frames]);

            // Once a piece comes back short, the rest of the callback is silent.
            if status == FillStatus::Filled {
                status = self.engine.render(left, right);
            } else {
                left.fill(0.0);
                right.fill(0.0);
            }

            // Convert planar to interleaved
            let out_chunk = &mut output[offset * 2..(offset + chunk_frames) * 2];
            for i in 0..chunk_frames {
                out_chunk[i * 2] = left[i];
                out_chunk[i * 2 + 1] = right[i];
            }
            peaks[0] = peaks[0].max(peak(left));
            peaks[1] = peaks[1].max(peak(right));

            offset += chunk_frames;
        }

        // Odd trailing sample
        output[total_frames * 2..].fill(0.0);

        self.store_peaks(peaks);
        self.sync_readback();
        status
    }

    // ───────────────────────────────────────────────────────────────
    // Engine State Access
    // ───────────────────────────────────────────────────────────────

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.engine.is_playing()
    }

    /// Get a reference to the engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Get a mutable reference to the engine.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    // ───────────────────────────────────────────────────────────────
    // Readback Updates
    // ───────────────────────────────────────────────────────────────

    /// Publish engine state to the control side.
    pub fn sync_readback(&self) {
        let readback = self.engine.readback();
        self.readback.ready.store(readback.ready, Ordering::Release);
        self.readback.playing.store(readback.playing, Ordering::Release);
        self.readback.finished.store(readback.finished, Ordering::Release);
        self.readback
            .produced_samples
            .store(readback.clock.produced_samples, Ordering::Relaxed);
        self.readback
            .device_samples
            .store(readback.clock.device_samples, Ordering::Relaxed);
        self.readback
            .current_offset
            .store(readback.clock.current_offset, Ordering::Relaxed);
    }

    fn store_peaks(&self, peaks: [f32; 2]) {
        self.readback.peak_left_bits.store(peaks[0].to_bits(), Ordering::Relaxed);
        self.readback.peak_right_bits.store(peaks[1].to_bits(), Ordering::Relaxed);
    }
}

/// Header, block size and decoded data of a stream's first chunk.
fn parse_first_chunk(bytes: &[u8]) -> Result<(StreamHeader, usize, SourceChunk), LoadError> {
    let header = StreamHeader::parse(bytes)?;
    let fft_size = detect_fft_size(bytes)?;
    let chunk = SourceChunk::decode(bytes, fft_size)?;
    Ok((header, fft_size, chunk))
}

#[inline]
fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |m, v| m.max(v.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{FormatError, StreamWriter};
    use crate::hrtf::HrtfTable;

    const FFT: usize = 128;

    fn stream_bytes(sample_rate: u32, version: u8, frames: usize) -> Vec<u8> {
        let pcm: Vec<i16> = (0..frames)
            .map(|i| ((i as f32 * 0.05).sin() * 12000.0) as i16)
            .collect();
        StreamWriter::new(StreamHeader::new(sample_rate, version), FFT)
            .encode(&pcm, |block, _| (((block * 7) % 254) as u8, 142))
    }

    fn load_tables(control: &mut ControlHandle) {
        let table = HrtfTable::from_fn(|_, _| (1.0, 0.0));
        control
            .on_table_loaded(TableKind::Magnitude, &table.encode(TableKind::Magnitude))
            .unwrap();
        control
            .on_table_loaded(TableKind::Phase, &table.encode(TableKind::Phase))
            .unwrap();
    }

    fn bridge() -> (ControlHandle, EngineHandle) {
        create_bridge(EngineConfig::default().with_max_callback_frames(256))
    }

    #[test]
    fn test_valid_header_loads() {
        let (mut control, mut engine) = bridge();
        control.on_stream_loaded(&stream_bytes(44100, 3, 2048)).unwrap();

        assert!(control.load_ok());
        assert_eq!(control.sample_rate(), 44100);
        assert_eq!(control.fft_size(), FFT);
        assert!(control.header().unwrap().dual_direction());

        engine.process_commands();
        assert_eq!(engine.engine().fft_size(), FFT);
        assert!(!control.is_ready());
    }

    #[test]
    fn test_malformed_tag_fails_load() {
        let (mut control, _engine) = bridge();
        let mut bytes = stream_bytes(44100, 3, 2048);
        bytes[9] = b'Q';

        assert_eq!(
            control.on_stream_loaded(&bytes),
            Err(LoadError::Format(FormatError::BadTag))
        );
        assert!(!control.load_ok());
        assert_eq!(control.fft_size(), 0);
        assert_eq!(control.sample_rate(), 0);

        // A valid stream afterwards still loads.
        control.on_stream_loaded(&stream_bytes(22050, 2, 1024)).unwrap();
        assert!(control.load_ok());
        assert!(control.last_error().is_none());
    }

    #[test]
    fn test_fetch_failure_is_reported() {
        let (mut control, _engine) = bridge();
        control.on_stream_failed("404");
        assert!(!control.load_ok());
        assert_eq!(control.last_error(), Some(&LoadError::Fetch("404".to_string())));
    }

    #[test]
    fn test_end_to_end_render() {
        let (mut control, mut engine) = bridge();
        control.on_stream_loaded(&stream_bytes(22050, 3, 4096)).unwrap();
        load_tables(&mut control);
        control.set_pan(30.0);
        control.set_directivity(PolarPattern::Cardioid, 0.0, 0.0);
        control.play();

        engine.process_commands();
        assert!(control.is_ready());
        assert!(control.is_playing());
        assert_eq!(engine.engine().steering().pan_step, 42);

        let mut output = vec![0.0; 2 * 1000];
        assert_eq!(engine.render_interleaved(&mut output), FillStatus::Filled);
        assert!(output.iter().any(|v| v.abs() > 1e-3));
        assert!(output.iter().all(|v| v.is_finite()));
        assert_eq!(control.device_samples(), 1000);
        assert!(control.elapsed_samples() >= 500);
        assert!(control.output_peaks()[0] > 0.0);

        control.stop();
        engine.process_commands();
        assert!(!control.is_playing());
        assert_eq!(engine.render_interleaved(&mut output), FillStatus::Idle);
        assert!(output.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_planar_request() {
        let (mut control, mut engine) = bridge();
        control.on_stream_loaded(&stream_bytes(44100, 2, 4096)).unwrap();
        load_tables(&mut control);
        control.play();
        engine.process_commands();

        let mut data = vec![0.0; 2 * 512];
        let mut buffer = AudioBuffer::new(&mut data);
        assert_eq!(engine.on_audio_request(&mut buffer), FillStatus::Filled);
        assert!(buffer.peaks()[0] > 1e-3);
        assert_eq!(control.clock().device_samples, 512);
        assert_eq!(control.clock().source_rate, 44100);
    }

    #[test]
    fn test_last_loop_reports_finished() {
        let (mut control, mut engine) = bridge();
        control.on_stream_loaded(&stream_bytes(44100, 2, 512)).unwrap();
        load_tables(&mut control);
        control.set_last_loop(true);
        control.play();
        engine.process_commands();

        let mut output = vec![0.0; 2 * 2048];
        assert_eq!(engine.render_interleaved(&mut output), FillStatus::Finished);
        assert!(control.is_finished());
        assert!(!control.is_playing());
        assert_eq!(control.current_offset(), 0);
    }

    #[test]
    fn test_chunks_stream_and_retire() {
        let (mut control, mut engine) = bridge();
        control.on_stream_loaded(&stream_bytes(44100, 2, 1024)).unwrap();
        control.on_stream_loaded(&stream_bytes(44100, 2, 1024)).unwrap();
        control.on_stream_loaded(&stream_bytes(44100, 2, 1024)).unwrap();

        // Too short to hold one analysis window.
        assert!(control.on_stream_loaded(&stream_bytes(44100, 2, 16)).is_err());
        assert!(control.load_ok());

        engine.process_commands();
        assert_eq!(control.collect_garbage(), 1);
        assert_eq!(control.collect_garbage(), 0);

        // A new stream replaces the old one, which comes back as garbage.
        control.reset_stream();
        control.on_stream_loaded(&stream_bytes(22050, 3, 1024)).unwrap();
        engine.process_commands();
        assert_eq!(control.collect_garbage(), 1);
        assert_eq!(control.sample_rate(), 22050);
    }
}
