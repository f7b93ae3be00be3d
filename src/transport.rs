// src/transport.rs

//
// ===============================
// MARK: Playback clock (RT-safe)
// ===============================
//

/// Playback position expressed purely in sample counts.
///
/// This struct:
/// - is real-time safe
/// - is copyable
/// - is a snapshot, never advanced in place
///
/// Produced by the engine after every callback and published to the
/// control side.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PlaybackClock {
    /// Source-rate samples rendered since the last `play`
    pub produced_samples: u64,

    /// Device-rate samples delivered since the last `play`
    pub device_samples: u64,

    /// Frame offset of the next analysis window in the playing chunk
    pub current_offset: u64,

    /// Source sample rate (Hz), 0 before a stream is loaded
    pub source_rate: u32,

    /// Device sample rate (Hz)
    pub device_rate: u32,
}

impl PlaybackClock {
    /// Elapsed playback time in seconds, measured at the device.
    #[inline]
    pub fn seconds(&self) -> f64 {
        if self.device_rate == 0 {
            return 0.0;
        }
        self.device_samples as f64 / self.device_rate as f64
    }

    /// Elapsed source time in seconds.
    #[inline]
    pub fn source_seconds(&self) -> f64 {
        if self.source_rate == 0 {
            return 0.0;
        }
        self.produced_samples as f64 / self.source_rate as f64
    }

    /// Device samples per source sample.
    #[inline]
    pub fn ratio(&self) -> f64 {
        if self.source_rate == 0 {
            return 1.0;
        }
        self.device_rate as f64 / self.source_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds() {
        let clock = PlaybackClock {
            produced_samples: 22050,
            device_samples: 88200,
            current_offset: 0,
            source_rate: 22050,
            device_rate: 44100,
        };
        assert_eq!(clock.seconds(), 2.0);
        assert_eq!(clock.source_seconds(), 1.0);
        assert_eq!(clock.ratio(), 2.0);
    }

    #[test]
    fn test_unloaded_clock_is_zero() {
        let clock = PlaybackClock::default();
        assert_eq!(clock.seconds(), 0.0);
        assert_eq!(clock.source_seconds(), 0.0);
        assert_eq!(clock.ratio(), 1.0);
    }
}
