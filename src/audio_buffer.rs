// src/audio_buffer.rs

/// Planar stereo view over one host buffer.
///
/// Layout is channel-major: all left samples, then all right samples.
#[derive(Debug)]
pub struct AudioBuffer<'a> {
    pub frames: usize,
    pub data: &'a mut [f32], // planar: left[0..frames], right[0..frames]
}

impl<'a> AudioBuffer<'a> {
    /// Number of channels in every buffer.
    pub const CHANNELS: usize = 2;

    /// Wrap planar stereo data (`2 × frames` samples).
    #[inline]
    pub fn new(data: &'a mut [f32]) -> Self {
        let frames = data.len() / Self::CHANNELS;
        Self { frames, data }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    #[inline]
    pub fn channel(&self, ch: usize) -> &[f32] {
        let start = ch * self.frames;
        &self.data[start..start + self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let start = ch * self.frames;
        &mut self.data[start..start + self.frames]
    }

    /// Both channels at once, for writers that fill them together.
    #[inline]
    pub fn split_stereo_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        let (left, rest) = self.data.split_at_mut(self.frames);
        (left, &mut rest[..self.frames])
    }

    /// Largest absolute sample per channel.
    pub fn peaks(&self) -> [f32; 2] {
        [
            self.channel(0).iter().fold(0.0f32, |m, v| m.max(v.abs())),
            self.channel(1).iter().fold(0.0f32, |m, v| m.max(v.abs())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planar_split() {
        let mut data = vec![0.0; 9];
        let mut buffer = AudioBuffer::new(&mut data);
        assert_eq!(buffer.frames, 4);

        let (left, right) = buffer.split_stereo_mut();
        left.fill(0.5);
        right[3] = -0.75;

        assert_eq!(buffer.channel(0), &[0.5; 4]);
        assert_eq!(buffer.channel(1)[3], -0.75);
        assert_eq!(buffer.peaks(), [0.5, 0.75]);

        buffer.clear();
        assert_eq!(buffer.peaks(), [0.0, 0.0]);
    }
}
