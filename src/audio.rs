//! Audio capture over PulseAudio.

use libpulse_binding::sample::{Format, Spec};
use libpulse_binding::stream::Direction;
use libpulse_simple_binding::Simple;
use log::warn;

use crate::error::AudioError;

/// Sample format requested from the audio server: signed 16-bit little
/// endian, interleaved channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    /// Sample rate (Hz)
    pub rate: u32,
    /// Channel count (1 or 2)
    pub channels: u8,
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self {
            rate: 48_000,
            channels: 2,
        }
    }
}

impl SampleSpec {
    /// Samples covering `millis` of audio across all channels.
    pub fn samples_for(&self, millis: u32) -> usize {
        (self.rate as usize / 1000 * millis as usize) * self.channels as usize
    }
}

/// Blocking record stream over one audio server connection.
///
/// The connection is opened once for the process lifetime; there is no
/// fallback audio path, so callers treat an open failure as fatal.
pub struct Microphone {
    stream: Simple,
}

impl Microphone {
    pub fn open(app_name: &str, spec: SampleSpec) -> Result<Self, AudioError> {
        let pulse_spec = Spec {
            format: Format::S16le,
            rate: spec.rate,
            channels: spec.channels,
        };
        let stream = Simple::new(
            None,
            app_name,
            Direction::Record,
            None,
            "capture",
            &pulse_spec,
            None,
            None,
        )?;
        Ok(Self { stream })
    }

    /// Read `sample_count` samples, blocking until they are available.
    ///
    /// A read error is logged and whatever the buffer holds is returned
    /// as-is; the stream stays open and the next call reads again.
    pub fn sample(&mut self, sample_count: usize) -> Vec<i16> {
        let mut raw = vec![0u8; sample_count * 2];
        if let Err(err) = self.stream.read(&mut raw) {
            warn!("audio read failed: {}", err);
        }
        raw.chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spec_is_stereo_48k() {
        let spec = SampleSpec::default();
        assert_eq!(spec.rate, 48_000);
        assert_eq!(spec.channels, 2);
    }

    #[test]
    fn chunk_sizing_covers_all_channels() {
        let spec = SampleSpec::default();
        // 20 ms of stereo audio at 48 kHz
        assert_eq!(spec.samples_for(20), 1920);
    }
}
