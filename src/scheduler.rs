// src/scheduler.rs
//
// Bridges the analysis-block cadence (source rate) to fixed-size device
// callbacks (device rate).
//
// Every rendered block yields `hop` source-rate samples. Device samples are
// interpolated between consecutive source samples; timing is compared in
// exact integers (`generated·src < produced·dev`), so no drift builds up.
// Samples generated past the end of a callback are kept as "stock" and
// emitted first on the next call.

use crate::source_buffer::Advance;

/// Something that renders analysis blocks on demand.
pub trait BlockSource {
    /// Render the next block. False when no block can be rendered.
    fn render_block(&mut self) -> bool;

    /// Finished samples of the last block: `hop + 1` per channel, the last
    /// one being the interpolation partner of the one before it.
    fn output(&self) -> (&[f32], &[f32]);

    /// Move past the last block.
    fn advance(&mut self) -> Advance;
}

/// How a callback was filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    /// Not playing; the callback is silent.
    Idle,
    /// Every requested frame was rendered.
    Filled,
    /// The source could not render; the tail is silent.
    Starved,
    /// Last loop ended inside this callback; the tail is silent.
    Finished,
}

impl FillStatus {
    /// Numeric status used by the C and wasm bindings.
    pub fn code(self) -> u32 {
        match self {
            FillStatus::Idle => 0,
            FillStatus::Filled => 1,
            FillStatus::Starved => 2,
            FillStatus::Finished => 3,
        }
    }
}

/// Resampling overlap-add reader.
///
/// Allocation-free after construction.
pub struct StreamScheduler {
    source_rate: u64,
    device_rate: u64,

    /// Carry-over from the previous callback
    stock_left: Vec<f32>,
    stock_right: Vec<f32>,
    stock_len: usize,

    /// Source-rate samples consumed
    produced: u64,

    /// Device-rate samples generated, including stock
    generated: u64,
}

impl StreamScheduler {
    pub fn new(source_rate: u32, device_rate: u32, hop: usize) -> Self {
        let source_rate = source_rate.max(1) as u64;
        let device_rate = device_rate.max(1) as u64;

        // Most device samples a single block can yield.
        let per_block = (hop as u64 * device_rate).div_ceil(source_rate) as usize + 2;

        Self {
            source_rate,
            device_rate,
            stock_left: vec![0.0; per_block],
            stock_right: vec![0.0; per_block],
            stock_len: 0,
            produced: 0,
            generated: 0,
        }
    }

    /// Source samples consumed so far.
    #[inline]
    pub fn produced_samples(&self) -> u64 {
        self.produced
    }

    /// Device samples handed to callers so far.
    #[inline]
    pub fn device_samples(&self) -> u64 {
        self.generated - self.stock_len as u64
    }

    /// Samples waiting in the carry-over.
    #[inline]
    pub fn stock_len(&self) -> usize {
        self.stock_len
    }

    /// Forget all timing and carry-over.
    pub fn reset(&mut self) {
        self.stock_len = 0;
        self.produced = 0;
        self.generated = 0;
    }

    /// Fill one device callback.
    pub fn fill<S: BlockSource + ?Sized>(&mut self, source: &mut S, left: &mut [f32], right: &mut [f32]) -> FillStatus {
        let frames = left.len().min(right.len());
        let mut count = self.drain_stock(&mut left[..frames], &mut right[..frames]);

        while count < frames {
            if !source.render_block() {
                left[count..frames].fill(0.0);
                right[count..frames].fill(0.0);
                return FillStatus::Starved;
            }

            let (out_left, out_right) = source.output();
            let hop = out_left.len().saturating_sub(1);

            for i in 0..hop {
                let n = self.produced;
                while self.generated * self.source_rate < n * self.device_rate {
                    let prop = (n * self.device_rate - self.generated * self.source_rate) as f32
                        / self.device_rate as f32;
                    let now_left = out_left[i] * prop + out_left[i + 1] * (1.0 - prop);
                    let now_right = out_right[i] * prop + out_right[i + 1] * (1.0 - prop);

                    if count < frames {
                        left[count] = now_left;
                        right[count] = now_right;
                        count += 1;
                    } else if self.stock_len < self.stock_left.len() {
                        self.stock_left[self.stock_len] = now_left;
                        self.stock_right[self.stock_len] = now_right;
                        self.stock_len += 1;
                    } else {
                        debug_assert!(false, "carry-over overflow");
                    }
                    self.generated += 1;
                }
                self.produced += 1;
            }

            if source.advance() == Advance::Finished {
                left[count..frames].fill(0.0);
                right[count..frames].fill(0.0);
                return FillStatus::Finished;
            }
        }

        FillStatus::Filled
    }

    /// Emit carried-over samples first. Returns how many were written.
    fn drain_stock(&mut self, left: &mut [f32], right: &mut [f32]) -> usize {
        let take = self.stock_len.min(left.len());
        left[..take].copy_from_slice(&self.stock_left[..take]);
        right[..take].copy_from_slice(&self.stock_right[..take]);

        self.stock_left.copy_within(take..self.stock_len, 0);
        self.stock_right.copy_within(take..self.stock_len, 0);
        self.stock_len -= take;
        take
    }
}
