// src/main.rs
//
// Offline demo: renders a SOPA stream through the bridge exactly the way a
// host audio callback would, and logs level statistics per second.
//
//   sopa-engine <stream.sopa> <magnitude.bin> <phase.bin> [device_rate]
//   sopa-engine                      (synthetic orbiting source)

use std::f32::consts::TAU;

use sopa::geometry::{Vec3, sector_to_vector, vector_to_sector};
use sopa::{
    EngineConfig, FillStatus, HrtfTable, PolarPattern, StreamHeader, StreamWriter, TableKind,
    create_bridge,
};

/// ===============================
/// Synthetic material
/// ===============================

const SYNTH_RATE: u32 = 44_100;
const SYNTH_FFT: usize = 1024;
const SYNTH_SECONDS: usize = 4;

/// Tone cluster whose direction circles the horizon once per second.
fn synthetic_stream() -> Vec<u8> {
    let frames = SYNTH_RATE as usize * SYNTH_SECONDS;
    let pcm: Vec<i16> = (0..frames)
        .map(|i| {
            let t = i as f32 / SYNTH_RATE as f32;
            let v = (TAU * 220.0 * t).sin() + 0.5 * (TAU * 1375.0 * t).sin() + 0.25 * (TAU * 4410.0 * t).sin();
            (v * 0.4 * i16::MAX as f32) as i16
        })
        .collect();

    let hop = SYNTH_FFT / 2;
    let writer = StreamWriter::new(StreamHeader::new(SYNTH_RATE, 3), SYNTH_FFT);
    writer.encode(&pcm, |block, _bin| {
        let t = (block * hop) as f32 / SYNTH_RATE as f32;
        let sector = vector_to_sector(Vec3::from_angles(TAU * t, 0.0));
        (sector, sector)
    })
}

/// Level difference only: the ear facing the source hears it at full level.
fn synthetic_database() -> HrtfTable {
    HrtfTable::from_fn(|sector, _bin| {
        let right = sector_to_vector(sector).x;
        (0.55 + 0.45 * right, 0.0)
    })
}

/// ===============================
/// Statistics
/// ===============================

#[derive(Default)]
struct Meter {
    frames: usize,
    sum_sq: [f64; 2],
    peak: [f32; 2],
}

impl Meter {
    fn add(&mut self, interleaved: &[f32]) {
        for frame in interleaved.chunks_exact(2) {
            for ch in 0..2 {
                self.sum_sq[ch] += (frame[ch] as f64) * (frame[ch] as f64);
                self.peak[ch] = self.peak[ch].max(frame[ch].abs());
            }
        }
        self.frames += interleaved.len() / 2;
    }

    fn rms_db(&self, ch: usize) -> f64 {
        if self.frames == 0 || self.sum_sq[ch] == 0.0 {
            return f64::NEG_INFINITY;
        }
        10.0 * (self.sum_sq[ch] / self.frames as f64).log10()
    }
}

/// ===============================
/// Main
/// ===============================

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let (stream, magnitude, phase, device_rate) = match args.as_slice() {
        [stream, magnitude, phase, rest @ ..] => {
            let device_rate = match rest.first() {
                Some(rate) => rate.parse::<u32>()?,
                None => 48_000,
            };
            (std::fs::read(stream)?, std::fs::read(magnitude)?, std::fs::read(phase)?, device_rate)
        }
        [] => {
            log::info!("No input files, rendering a synthetic orbiting source");
            let table = synthetic_database();
            (
                synthetic_stream(),
                table.encode(TableKind::Magnitude),
                table.encode(TableKind::Phase),
                48_000,
            )
        }
        _ => return Err("usage: sopa-engine [<stream> <magnitude> <phase> [device_rate]]".into()),
    };

    let config = EngineConfig::new().with_device_sample_rate(device_rate);
    let (mut control, mut engine) = create_bridge(config);

    control.on_stream_loaded(&stream)?;
    control.on_table_loaded(TableKind::Magnitude, &magnitude)?;
    control.on_table_loaded(TableKind::Phase, &phase)?;
    control.set_directivity(PolarPattern::Omni, 0.0, 0.0);
    control.set_last_loop(true);
    control.play();

    // --------------------------------
    // Callback loop
    // --------------------------------

    let callback_frames = 512;
    let mut output = vec![0.0f32; callback_frames * 2];
    let mut meter = Meter::default();
    let mut second = 0;
    let mut delivered = 0usize;
    let max_seconds = 600;

    loop {
        engine.process_commands();
        let status = engine.render_interleaved(&mut output);
        meter.add(&output);
        delivered += callback_frames;

        if meter.frames >= device_rate as usize || status != FillStatus::Filled {
            log::info!(
                "{:>3}s  L {:>6.1} dB (peak {:.3})  R {:>6.1} dB (peak {:.3})  offset {}",
                second,
                meter.rms_db(0),
                meter.peak[0],
                meter.rms_db(1),
                meter.peak[1],
                control.current_offset(),
            );
            meter = Meter::default();
            second += 1;
        }

        match status {
            FillStatus::Filled => {}
            FillStatus::Finished => break,
            other => return Err(format!("render stopped: {:?}", other).into()),
        }
        if second >= max_seconds {
            log::warn!("Stopping after {} seconds", max_seconds);
            break;
        }
    }

    // The engine rewinds when the last loop ends, so count here.
    log::info!(
        "Done: {} device samples ({:.2}s at {} Hz from a {} Hz stream), finished {}, released {} objects",
        delivered,
        delivered as f64 / device_rate as f64,
        device_rate,
        control.sample_rate(),
        control.is_finished(),
        control.collect_garbage(),
    );
    Ok(())
}
