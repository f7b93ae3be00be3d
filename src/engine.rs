// src/engine.rs

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::format::{SectorLayout, SourceChunk, StreamHeader};
use crate::geometry::SteeringTable;
use crate::hrtf::HrtfTable;
use crate::renderer::{HrtfRenderer, RenderContext};
use crate::scheduler::{BlockSource, FillStatus, StreamScheduler};
use crate::source_buffer::{Advance, SourceBuffers};
use crate::state::{Command, CommandResult, EngineReadback, LoopMode, SteeringState};
use crate::transport::PlaybackClock;

/// Why the engine cannot render yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReady {
    /// No stream has been installed.
    NoStream,
    /// The HRTF database is incomplete.
    NoTables,
}

impl std::fmt::Display for NotReady {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotReady::NoStream => write!(f, "No stream loaded"),
            NotReady::NoTables => write!(f, "HRTF database not loaded"),
        }
    }
}

impl std::error::Error for NotReady {}

// ═══════════════════════════════════════════════════════════════════
// Stream
// ═══════════════════════════════════════════════════════════════════

/// Everything that belongs to one loaded stream.
///
/// Built on the control side (all allocation happens here) and moved to the
/// audio thread with `Command::InstallStream`.
pub struct Stream {
    header: StreamHeader,
    renderer: HrtfRenderer,
    source: SourceBuffers,
    scheduler: StreamScheduler,
}

impl Stream {
    pub fn new(
        header: StreamHeader,
        fft_size: usize,
        first_chunk: Arc<SourceChunk>,
        layout: Box<dyn SectorLayout>,
        config: &EngineConfig,
    ) -> Self {
        let renderer = HrtfRenderer::new(fft_size, header.sample_rate, layout);
        let scheduler = StreamScheduler::new(header.sample_rate, config.device_sample_rate, renderer.hop());
        let mut source = SourceBuffers::new();
        source.push(first_chunk);

        Self {
            header,
            renderer,
            source,
            scheduler,
        }
    }

    #[inline]
    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    #[inline]
    pub fn fft_size(&self) -> usize {
        self.renderer.fft_size()
    }

    /// Back to the beginning with no overlap-add or carry-over history.
    fn rewind(&mut self) {
        self.source.rewind();
        self.renderer.reset();
        self.scheduler.reset();
    }
}

/// One stream's renderer, source and context, seen as a block source.
struct BlockCursor<'a> {
    renderer: &'a mut HrtfRenderer,
    source: &'a mut SourceBuffers,
    ctx: RenderContext<'a>,
    loop_mode: LoopMode,
}

impl BlockSource for BlockCursor<'_> {
    fn render_block(&mut self) -> bool {
        let (pcm, codes) = self.renderer.input_mut();
        if !self.source.read_window(pcm, codes) {
            return false;
        }
        self.renderer.render(&self.ctx);
        true
    }

    fn output(&self) -> (&[f32], &[f32]) {
        self.renderer.output()
    }

    fn advance(&mut self) -> Advance {
        self.renderer.advance();
        self.source.advance(self.renderer.hop(), self.loop_mode)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Engine
// ═══════════════════════════════════════════════════════════════════

/// Real-time binaural engine.
///
/// This struct runs exclusively on the audio thread.
/// It must be deterministic, allocation-free, and lock-free.
/// Anything it replaces is returned to the caller instead of dropped.
pub struct Engine {
    config: EngineConfig,

    /// Precomputed steering lookups, shared with the control side
    steering_table: Arc<SteeringTable>,

    stream: Option<Box<Stream>>,
    tables: Option<Arc<HrtfTable>>,

    steering: SteeringState,
    loop_mode: LoopMode,

    playing: bool,
    finished: bool,
}

impl Engine {
    pub fn new(config: EngineConfig, steering_table: Arc<SteeringTable>) -> Self {
        Self {
            config,
            steering_table,
            stream: None,
            tables: None,
            steering: SteeringState::default(),
            loop_mode: LoopMode::Continue,
            playing: false,
            finished: false,
        }
    }

    /// Apply one command. Returns anything the command displaced.
    pub fn process_command(&mut self, cmd: Command) -> Option<CommandResult> {
        match cmd {
            Command::SetSteering(state) => {
                self.steering = state;
                None
            }

            Command::SetLoopMode(mode) => {
                self.loop_mode = mode;
                None
            }

            Command::Play => {
                self.play();
                None
            }

            Command::Stop => {
                self.playing = false;
                None
            }

            Command::InstallStream(stream) => {
                self.playing = false;
                self.finished = false;
                self.stream.replace(stream).map(CommandResult::RetiredStream)
            }

            Command::PushChunk(chunk) => match self.stream.as_mut() {
                Some(stream) => stream.source.push(chunk).map(CommandResult::RetiredChunk),
                None => Some(CommandResult::RetiredChunk(chunk)),
            },

            Command::InstallTables(tables) => self.tables.replace(tables).map(CommandResult::RetiredTables),
        }
    }

    /// Rewind and start.
    pub fn play(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            stream.rewind();
        }
        self.playing = true;
        self.finished = false;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    /// Both the stream and the HRTF database are installed.
    pub fn readiness(&self) -> Result<(), NotReady> {
        if self.stream.is_none() {
            return Err(NotReady::NoStream);
        }
        if self.tables.is_none() {
            return Err(NotReady::NoTables);
        }
        Ok(())
    }

    /// Fill one planar stereo callback.
    ///
    /// Writes silence and leaves the clocks alone while stopped or not ready.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) -> FillStatus {
        if !self.playing {
            left.fill(0.0);
            right.fill(0.0);
            return FillStatus::Idle;
        }

        let status = {
            let (Some(stream), Some(table)) = (self.stream.as_deref_mut(), self.tables.as_deref()) else {
                left.fill(0.0);
                right.fill(0.0);
                return FillStatus::Starved;
            };

            let Stream {
                header,
                renderer,
                source,
                scheduler,
            } = stream;

            let mut cursor = BlockCursor {
                renderer,
                source,
                ctx: RenderContext {
                    table,
                    steering_table: &self.steering_table,
                    steering: &self.steering,
                    dual_direction: header.dual_direction(),
                },
                loop_mode: self.loop_mode,
            };
            scheduler.fill(&mut cursor, left, right)
        };

        if status == FillStatus::Finished {
            self.playing = false;
            self.finished = true;
            if let Some(stream) = self.stream.as_mut() {
                stream.rewind();
            }
        }
        status
    }

    // ───────────────────────────────────────────────────────────────
    // State access
    // ───────────────────────────────────────────────────────────────

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[inline]
    pub fn steering(&self) -> &SteeringState {
        &self.steering
    }

    #[inline]
    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn fft_size(&self) -> usize {
        self.stream.as_ref().map(|s| s.fft_size()).unwrap_or(0)
    }

    pub fn clock(&self) -> PlaybackClock {
        match self.stream.as_deref() {
            Some(stream) => PlaybackClock {
                produced_samples: stream.scheduler.produced_samples(),
                device_samples: stream.scheduler.device_samples(),
                current_offset: stream.source.current_offset() as u64,
                source_rate: stream.header.sample_rate,
                device_rate: self.config.device_sample_rate,
            },
            None => PlaybackClock {
                device_rate: self.config.device_sample_rate,
                ..PlaybackClock::default()
            },
        }
    }

    pub fn readback(&self) -> EngineReadback {
        EngineReadback {
            ready: self.readiness().is_ok(),
            playing: self.playing,
            finished: self.finished,
            clock: self.clock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{InterleavedLayout, StreamWriter};

    const FFT: usize = 64;

    fn stream(frames: usize, config: &EngineConfig) -> Box<Stream> {
        let pcm: Vec<i16> = (0..frames)
            .map(|i| ((i as f32 * 0.3).sin() * 8000.0) as i16)
            .collect();
        let bytes = StreamWriter::new(StreamHeader::new(22050, 3), FFT).encode(&pcm, |_, _| (142, 142));
        let header = StreamHeader::parse(&bytes).unwrap();
        let chunk = Arc::new(SourceChunk::decode(&bytes, FFT).unwrap());
        Box::new(Stream::new(header, FFT, chunk, Box::new(InterleavedLayout), config))
    }

    fn engine() -> Engine {
        Engine::new(EngineConfig::default(), Arc::new(SteeringTable::new()))
    }

    fn tables() -> Arc<HrtfTable> {
        Arc::new(HrtfTable::from_fn(|_, _| (1.0, 0.0)))
    }

    #[test]
    fn test_not_ready_renders_silence() {
        let mut engine = engine();
        assert_eq!(engine.readiness(), Err(NotReady::NoStream));

        engine.process_command(Command::Play);
        let mut left = vec![1.0; 128];
        let mut right = vec![1.0; 128];
        assert_eq!(engine.render(&mut left, &mut right), FillStatus::Starved);
        assert!(left.iter().chain(&right).all(|v| *v == 0.0));

        let config = *engine.config();
        assert!(engine.process_command(Command::InstallStream(stream(1024, &config))).is_none());
        assert_eq!(engine.readiness(), Err(NotReady::NoTables));
        // Installing a stream stops playback.
        assert_eq!(engine.render(&mut left, &mut right), FillStatus::Idle);
        engine.process_command(Command::Play);
        assert_eq!(engine.render(&mut left, &mut right), FillStatus::Starved);
        assert_eq!(engine.clock().device_samples, 0);

        engine.process_command(Command::InstallTables(tables()));
        assert!(engine.readiness().is_ok());
    }

    #[test]
    fn test_stopped_engine_is_idle() {
        let mut engine = engine();
        let config = *engine.config();
        engine.process_command(Command::InstallStream(stream(1024, &config)));
        engine.process_command(Command::InstallTables(tables()));

        let mut left = vec![1.0; 64];
        let mut right = vec![1.0; 64];
        assert_eq!(engine.render(&mut left, &mut right), FillStatus::Idle);
        assert!(left.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_playback_advances_clock() {
        let mut engine = engine();
        let config = *engine.config();
        engine.process_command(Command::InstallStream(stream(4096, &config)));
        engine.process_command(Command::InstallTables(tables()));
        engine.process_command(Command::Play);

        let mut left = vec![0.0; 512];
        let mut right = vec![0.0; 512];
        assert_eq!(engine.render(&mut left, &mut right), FillStatus::Filled);
        assert!(left.iter().any(|v| v.abs() > 1e-3));

        let clock = engine.clock();
        assert_eq!(clock.device_samples, 512);
        assert_eq!(clock.source_rate, 22050);
        // 22050 → 44100: one source sample per two device samples, in whole hops.
        assert_eq!(clock.produced_samples % (FFT as u64 / 2), 0);
        assert!(clock.produced_samples >= 256);

        engine.process_command(Command::Stop);
        assert!(!engine.is_playing());
        engine.process_command(Command::Play);
        assert_eq!(engine.clock().device_samples, 0);
    }

    #[test]
    fn test_last_loop_finishes_and_rewinds() {
        let mut engine = engine();
        let config = *engine.config();
        engine.process_command(Command::InstallStream(stream(256, &config)));
        engine.process_command(Command::InstallTables(tables()));
        engine.process_command(Command::SetLoopMode(LoopMode::LastLoop));
        engine.process_command(Command::Play);

        // 256 source frames at 22050 become ~512 device frames.
        let mut left = vec![0.0; 2048];
        let mut right = vec![0.0; 2048];
        assert_eq!(engine.render(&mut left, &mut right), FillStatus::Finished);
        assert!(!engine.is_playing());
        assert!(engine.is_finished());
        assert!(left[600..].iter().all(|v| *v == 0.0));
        assert_eq!(engine.clock().current_offset, 0);
        assert_eq!(engine.clock().produced_samples, 0);

        engine.process_command(Command::Play);
        assert!(!engine.is_finished());
        assert_eq!(engine.render(&mut left[..128], &mut right[..128]), FillStatus::Filled);
    }

    #[test]
    fn test_replaced_resources_are_returned() {
        let mut engine = engine();
        let config = *engine.config();

        // A chunk without a stream comes straight back.
        let orphan = Arc::new(SourceChunk {
            pcm: vec![0.0; FFT],
            codes: vec![0; 2 * FFT],
        });
        assert!(matches!(
            engine.process_command(Command::PushChunk(orphan)),
            Some(CommandResult::RetiredChunk(_))
        ));

        engine.process_command(Command::InstallStream(stream(512, &config)));
        assert!(matches!(
            engine.process_command(Command::InstallStream(stream(512, &config))),
            Some(CommandResult::RetiredStream(_))
        ));

        engine.process_command(Command::InstallTables(tables()));
        assert!(matches!(
            engine.process_command(Command::InstallTables(tables())),
            Some(CommandResult::RetiredTables(_))
        ));

        let chunk = || {
            Arc::new(SourceChunk {
                pcm: vec![0.0; FFT],
                codes: vec![254; 2 * FFT],
            })
        };
        assert!(engine.process_command(Command::PushChunk(chunk())).is_none());
        assert!(matches!(
            engine.process_command(Command::PushChunk(chunk())),
            Some(CommandResult::RetiredChunk(_))
        ));
    }
}
