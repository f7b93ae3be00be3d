// src/spectral.rs
//
// In-place radix-2 block Fourier transform.
//
// The forward direction windows a real block, transforms it and leaves
// (magnitude, phase) pairs normalized by the block length. The inverse
// direction takes rectangular (real, imaginary) spectra and leaves the raw,
// non-normalized time-domain result; synthesis windowing is the renderer's job.

use std::f32::consts::PI;

/// Radix-2 transform with precomputed bit-reversal and twiddle tables.
///
/// All tables are sized once in [`SpectralTransform::new`]; `forward` and
/// `inverse` never allocate.
pub struct SpectralTransform {
    size: usize,

    /// Hann analysis window applied by `forward`.
    window: Vec<f32>,

    /// Swap partner for every index (only pairs with `i < j` are swapped).
    bit_reverse: Vec<usize>,

    /// cos/sin of `2π·k / size` for `k` in `0..size/2`.
    cos_table: Vec<f32>,
    sin_table: Vec<f32>,
}

impl SpectralTransform {
    /// Create a transform for `size` samples.
    ///
    /// `size` must be a power of two; the block-size detection guarantees this for
    /// every stream that reaches the renderer.
    pub fn new(size: usize) -> Self {
        debug_assert!(size.is_power_of_two(), "transform size must be a power of two");

        let window = (0..size)
            .map(|i| (1.0 - (2.0 * PI * i as f32 / size as f32).cos()) / 2.0)
            .collect();

        let bits = size.trailing_zeros();
        let bit_reverse = (0..size)
            .map(|i| {
                if bits == 0 {
                    0
                } else {
                    i.reverse_bits() >> (usize::BITS - bits)
                }
            })
            .collect();

        let half = size / 2;
        let cos_table = (0..half)
            .map(|k| (2.0 * std::f64::consts::PI * k as f64 / size as f64).cos() as f32)
            .collect();
        let sin_table = (0..half)
            .map(|k| (2.0 * std::f64::consts::PI * k as f64 / size as f64).sin() as f32)
            .collect();

        Self {
            size,
            window,
            bit_reverse,
            cos_table,
            sin_table,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Analysis window applied by [`forward`](Self::forward).
    #[inline]
    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// Windowed forward transform.
    ///
    /// On entry `re` holds the time-domain block; `im` is overwritten. On exit
    /// `re[k]` is the magnitude and `im[k]` the phase of bin `k`, both scaled
    /// by `1/size`.
    pub fn forward(&self, re: &mut [f32], im: &mut [f32]) {
        debug_assert_eq!(re.len(), self.size);
        debug_assert_eq!(im.len(), self.size);

        for ((x, y), w) in re.iter_mut().zip(im.iter_mut()).zip(&self.window) {
            *x *= w;
            *y = 0.0;
        }

        self.butterflies(re, im, -1.0);

        let scale = 1.0 / self.size as f32;
        for (x, y) in re.iter_mut().zip(im.iter_mut()) {
            let real = *x * scale;
            let imag = *y * scale;
            *x = (real * real + imag * imag).sqrt();
            *y = imag.atan2(real);
        }
    }

    /// Inverse transform of a rectangular spectrum, in place.
    ///
    /// No normalization and no windowing: `inverse` applied to the
    /// rectangular form of `forward(x)` yields `x` multiplied by the analysis
    /// window.
    pub fn inverse(&self, re: &mut [f32], im: &mut [f32]) {
        debug_assert_eq!(re.len(), self.size);
        debug_assert_eq!(im.len(), self.size);

        self.butterflies(re, im, 1.0);
    }

    /// Bit-reversal permutation followed by iterative butterflies.
    ///
    /// `sign` is -1 for the forward kernel `e^{-iωt}` and +1 for the inverse.
    fn butterflies(&self, re: &mut [f32], im: &mut [f32], sign: f32) {
        let n = self.size;

        for i in 0..n {
            let j = self.bit_reverse[i];
            if i < j {
                re.swap(i, j);
                im.swap(i, j);
            }
        }

        let mut span = 1;
        while span < n {
            // Twiddle stride into the size-n table for this stage.
            let stride = n / (2 * span);
            for offset in 0..span {
                let c = self.cos_table[offset * stride];
                let s = sign * self.sin_table[offset * stride];

                let mut i0 = offset;
                while i0 < n {
                    let i1 = i0 + span;
                    let x1 = re[i1] * c - im[i1] * s;
                    let y1 = im[i1] * c + re[i1] * s;
                    re[i1] = re[i0] - x1;
                    im[i1] = im[i0] - y1;
                    re[i0] += x1;
                    im[i0] += y1;
                    i0 += 2 * span;
                }
            }
            span *= 2;
        }
    }
}

/// Convert (magnitude, phase) pairs to (real, imaginary) in place.
#[inline]
pub fn polar_to_rect(mag: &mut [f32], phase: &mut [f32]) {
    for (m, p) in mag.iter_mut().zip(phase.iter_mut()) {
        let (sin, cos) = p.sin_cos();
        let r = *m;
        *m = r * cos;
        *p = r * sin;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signal(size: usize) -> Vec<f32> {
        (0..size)
            .map(|i| {
                let t = i as f32 / size as f32;
                0.6 * (2.0 * PI * 3.0 * t).sin() + 0.3 * (2.0 * PI * 7.0 * t + 0.4).cos() + 0.05
            })
            .collect()
    }

    #[test]
    fn test_round_trip_reconstructs_windowed_input() {
        let mut size = 8;
        while size <= 4096 {
            let transform = SpectralTransform::new(size);
            let input = test_signal(size);

            let mut re = input.clone();
            let mut im = vec![0.0; size];
            transform.forward(&mut re, &mut im);
            polar_to_rect(&mut re, &mut im);
            transform.inverse(&mut re, &mut im);

            for i in 0..size {
                let expected = input[i] * transform.window()[i];
                assert!(
                    (re[i] - expected).abs() < 1e-4,
                    "size {} sample {}: {} != {}",
                    size,
                    i,
                    re[i],
                    expected
                );
                assert!(im[i].abs() < 1e-4, "size {} imaginary residue {}", size, im[i]);
            }

            size *= 2;
        }
    }

    #[test]
    fn test_forward_locates_tone() {
        let size = 256;
        let transform = SpectralTransform::new(size);
        let mut re: Vec<f32> = (0..size)
            .map(|i| (2.0 * PI * 16.0 * i as f32 / size as f32).cos())
            .collect();
        let mut im = vec![0.0; size];

        transform.forward(&mut re, &mut im);

        // Hann-windowed cosine: half amplitude split over +/- bins, then halved by the window.
        assert!((re[16] - 0.25).abs() < 1e-4);
        assert!((re[size - 16] - 0.25).abs() < 1e-4);
        assert!(re[40] < 1e-5);
    }

    #[test]
    fn test_bit_reverse_table_is_involution() {
        let transform = SpectralTransform::new(64);
        for i in 0..64 {
            assert_eq!(transform.bit_reverse[transform.bit_reverse[i]], i);
        }
    }
}
