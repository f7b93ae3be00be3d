// src/renderer.rs
//
// Per-block binaural pipeline.
//
// One call to `render` takes an N-sample analysis window, filters every
// frequency bin with the HRTF pair of its steered direction and overlap-adds
// the two synthesized channels into persistent accumulators. The scheduler
// then reads `hop + 1` samples from the accumulators and calls `advance`.

use std::f32::consts::PI;

use crate::format::{Layer, SectorLayout};
use crate::geometry::{SECTOR_COUNT, Sector, SteeringTable, mirror_pan_step, mirror_sector};
use crate::hrtf::{HrtfTable, TABLE_BINS, TABLE_SAMPLE_RATE};
use crate::spectral::{SpectralTransform, polar_to_rect};
use crate::state::SteeringState;

/// Half a turn in table phase units, between the raw values 31415 and 31416.
const PHASE_WRAP: f32 = 3.14155;

/// Read-only inputs shared by every bin of a block.
pub struct RenderContext<'a> {
    pub table: &'a HrtfTable,
    pub steering_table: &'a SteeringTable,
    pub steering: &'a SteeringState,
    pub dual_direction: bool,
}

/// Renderer state for one stream. All buffers are sized in `new`.
pub struct HrtfRenderer {
    transform: SpectralTransform,
    layout: Box<dyn SectorLayout>,
    size: usize,
    hop: usize,

    /// Table bin for analysis bins `0..hop`.
    table_bins: Vec<usize>,

    /// Synthesis window: short cosine ramps around a plateau of 1/2.
    synthesis: Vec<f32>,

    // Inputs, filled by the caller before `render`.
    input: Vec<f32>,
    codes: Vec<u8>,

    // Source spectrum (magnitude, phase).
    magnitude: Vec<f32>,
    phase: Vec<f32>,

    // Ear spectra: polar while assembling, rectangular after conversion.
    left_re: Vec<f32>,
    left_im: Vec<f32>,
    right_re: Vec<f32>,
    right_im: Vec<f32>,

    // Overlap-add accumulators.
    acc_left: Vec<f32>,
    acc_right: Vec<f32>,

    /// Last steered pair and its directivity weight.
    weight_cache: Option<(Sector, Sector, f32)>,
}

impl HrtfRenderer {
    pub fn new(fft_size: usize, source_rate: u32, layout: Box<dyn SectorLayout>) -> Self {
        let hop = fft_size / 2;

        let table_bins = (0..hop)
            .map(|bin| {
                let num = bin as u64 * source_rate as u64 * TABLE_BINS as u64;
                let den = TABLE_SAMPLE_RATE as u64 * fft_size as u64;
                (num / den) as usize
            })
            .collect();

        let ramp = fft_size / 8;
        let synthesis = (0..fft_size)
            .map(|i| {
                if i < ramp {
                    (1.0 - (PI * i as f32 / ramp as f32).cos()) / 4.0
                } else if i >= fft_size - ramp {
                    (1.0 - (PI * (fft_size - i) as f32 / ramp as f32).cos()) / 4.0
                } else {
                    0.5
                }
            })
            .collect();

        Self {
            transform: SpectralTransform::new(fft_size),
            layout,
            size: fft_size,
            hop,
            table_bins,
            synthesis,
            input: vec![0.0; fft_size],
            codes: vec![0; fft_size],
            magnitude: vec![0.0; fft_size],
            phase: vec![0.0; fft_size],
            left_re: vec![0.0; fft_size],
            left_im: vec![0.0; fft_size],
            right_re: vec![0.0; fft_size],
            right_im: vec![0.0; fft_size],
            acc_left: vec![0.0; fft_size],
            acc_right: vec![0.0; fft_size],
            weight_cache: None,
        }
    }

    #[inline]
    pub fn fft_size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Input slots for the next block: N PCM samples and the code bytes of
    /// its first hop (two per frame).
    pub fn input_mut(&mut self) -> (&mut [f32], &mut [u8]) {
        (&mut self.input, &mut self.codes)
    }

    /// Render the block currently in the input slots.
    pub fn render(&mut self, ctx: &RenderContext) {
        self.magnitude.copy_from_slice(&self.input);
        self.transform.forward(&mut self.magnitude, &mut self.phase);

        // Every bin starts as a passthrough of the source.
        self.left_re.copy_from_slice(&self.magnitude);
        self.left_im.copy_from_slice(&self.phase);
        self.right_re.copy_from_slice(&self.magnitude);
        self.right_im.copy_from_slice(&self.phase);

        self.weight_cache = None;
        for bin in 1..self.hop {
            self.spatialize_bin(bin, ctx);
        }

        polar_to_rect(&mut self.left_re, &mut self.left_im);
        polar_to_rect(&mut self.right_re, &mut self.right_im);
        self.transform.inverse(&mut self.left_re, &mut self.left_im);
        self.transform.inverse(&mut self.right_re, &mut self.right_im);

        for i in 0..self.size {
            let w = self.synthesis[i];
            self.acc_left[i] += self.left_re[i] * w;
            self.acc_right[i] += self.right_re[i] * w;
        }
    }

    /// Finished samples of the current block: `hop` outputs plus the
    /// following (partial) sample used as the interpolation partner.
    pub fn output(&self) -> (&[f32], &[f32]) {
        (&self.acc_left[..=self.hop], &self.acc_right[..=self.hop])
    }

    /// Shift the accumulators by one hop.
    pub fn advance(&mut self) {
        let hop = self.hop;
        self.acc_left.copy_within(hop.., 0);
        self.acc_right.copy_within(hop.., 0);
        self.acc_left[self.size - hop..].fill(0.0);
        self.acc_right[self.size - hop..].fill(0.0);
    }

    /// Clear overlap-add history.
    pub fn reset(&mut self) {
        self.acc_left.fill(0.0);
        self.acc_right.fill(0.0);
        self.weight_cache = None;
    }

    /// Filter one positive bin and its image. The image bin gets the same
    /// phase-wrap correction as the positive bin.
    fn spatialize_bin(&mut self, bin: usize, ctx: &RenderContext) {
        let freq = self.table_bins[bin];
        if freq == 0 {
            return;
        }

        let mut primary = self.codes[self.layout.code_offset(bin, Layer::Primary, self.size)];
        let mut secondary = if ctx.dual_direction {
            self.codes[self.layout.code_offset(bin, Layer::Secondary, self.size)]
        } else {
            primary
        };

        // Codes past the last sector are diffuse.
        match (is_diffuse(primary), is_diffuse(secondary)) {
            (true, true) => return,
            (true, false) => primary = secondary,
            (false, true) => secondary = primary,
            (false, false) => {}
        }

        let pan = ctx.steering.pan_step;
        let tilt = ctx.steering.tilt_step;
        let mirror_pan = mirror_pan_step(pan);
        let steer = |code: Sector| ctx.steering_table.lookup(code, pan, tilt);
        let steer_mirror = |code: Sector| ctx.steering_table.lookup(mirror_sector(code), mirror_pan, tilt);

        let right = (steer(primary), steer(secondary));
        let left = (steer_mirror(primary), steer_mirror(secondary));
        let weight = self.pair_weight(right, ctx);

        let image = self.size - bin;
        let image_freq = TABLE_BINS - 1 - freq;

        let (m, p) = blend(ctx.table, right, freq);
        self.right_re[bin] = self.magnitude[bin] * m * weight;
        self.right_im[bin] = self.phase[bin] + p;
        let (m, p) = blend(ctx.table, right, image_freq);
        self.right_re[image] = self.magnitude[image] * m * weight;
        self.right_im[image] = self.phase[image] + p;

        let (m, p) = blend(ctx.table, left, freq);
        self.left_re[bin] = self.magnitude[bin] * m * weight;
        self.left_im[bin] = self.phase[bin] + p;
        let (m, p) = blend(ctx.table, left, image_freq);
        self.left_re[image] = self.magnitude[image] * m * weight;
        self.left_im[image] = self.phase[image] + p;
    }

    fn pair_weight(&mut self, (a, b): (Sector, Sector), ctx: &RenderContext) -> f32 {
        if let Some((ca, cb, w)) = self.weight_cache {
            if ca == a && cb == b {
                return w;
            }
        }
        let primary = ctx.steering_table.vector(a);
        let secondary = (a != b).then(|| ctx.steering_table.vector(b));
        let w = ctx.steering.directivity.weight(primary, secondary);
        self.weight_cache = Some((a, b, w));
        w
    }
}

#[inline]
fn is_diffuse(code: Sector) -> bool {
    code as usize >= SECTOR_COUNT
}

/// Mean HRTF magnitude and phase of two sectors at one table bin.
#[inline]
fn blend(table: &HrtfTable, (a, b): (Sector, Sector), freq: usize) -> (f32, f32) {
    let magnitude = (table.magnitude(a, freq) + table.magnitude(b, freq)) / 2.0;
    (magnitude, blend_phase(table.phase(a, freq), table.phase(b, freq)))
}

/// Mean of two phases, moved half a turn towards zero when they lie more
/// than half a turn apart.
#[inline]
pub fn blend_phase(a: f32, b: f32) -> f32 {
    let mean = (a + b) / 2.0;
    if (a - b).abs() > PHASE_WRAP {
        if mean < 0.0 { mean + PI } else { mean - PI }
    } else {
        mean
    }
}
