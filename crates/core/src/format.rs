//! Stream format negotiation and audio chunk types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of one sample in bytes (32-bit float).
pub const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

/// Lowest sample rate accepted during negotiation.
pub const MIN_SAMPLE_RATE: u32 = 8000;

/// Format negotiation and chunk layout errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("non-interleaved layout is not supported")]
    NonInterleaved,

    #[error("unsupported sample rate {0} Hz (minimum 8000 Hz)")]
    UnsupportedSampleRate(u32),

    #[error("unsupported channel count {0}")]
    UnsupportedChannelCount(usize),

    #[error("chunk of {bytes} bytes is not a whole number of {frame_bytes}-byte frames")]
    MisalignedChunk { bytes: usize, frame_bytes: usize },

    #[error("chunk has {actual} channels but the stream was negotiated with {expected}")]
    ChannelMismatch { expected: usize, actual: usize },
}

/// Memory layout of multi-channel samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SampleLayout {
    /// Frame-major, channel-minor (L, R, L, R, ...).
    #[default]
    Interleaved,
    /// One contiguous run per channel.
    NonInterleaved,
}

/// Negotiated stream format, delivered once per format change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels.
    pub channels: usize,
    /// Sample layout.
    pub layout: SampleLayout,
}

impl StreamFormat {
    /// Interleaved 32-bit float format.
    pub fn interleaved(sample_rate: u32, channels: usize) -> Self {
        Self {
            sample_rate,
            channels,
            layout: SampleLayout::Interleaved,
        }
    }

    /// Check the format is one this stage can process.
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.layout != SampleLayout::Interleaved {
            return Err(FormatError::NonInterleaved);
        }
        if self.sample_rate < MIN_SAMPLE_RATE {
            return Err(FormatError::UnsupportedSampleRate(self.sample_rate));
        }
        if self.channels == 0 {
            return Err(FormatError::UnsupportedChannelCount(self.channels));
        }
        Ok(())
    }

    /// Size of one frame in bytes.
    pub fn frame_bytes(&self) -> usize {
        self.channels * SAMPLE_BYTES
    }

    /// Duration of `frames` frames in seconds.
    pub fn frames_to_seconds(&self, frames: usize) -> f64 {
        frames as f64 / self.sample_rate as f64
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = match self.layout {
            SampleLayout::Interleaved => "interleaved",
            SampleLayout::NonInterleaved => "non-interleaved",
        };
        write!(
            f,
            "{} Hz, {} ch, F32 {}",
            self.sample_rate, self.channels, layout
        )
    }
}

/// A bounded block of interleaved 32-bit float audio.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioChunk {
    samples: Vec<f32>,
    channels: usize,
}

impl AudioChunk {
    /// Wrap interleaved samples. A trailing partial frame is ignored by
    /// [`AudioChunk::frame_count`].
    pub fn new(samples: Vec<f32>, channels: usize) -> Self {
        debug_assert!(channels == 0 || samples.len() % channels == 0);
        Self { samples, channels }
    }

    /// A chunk of `frames` frames of silence.
    pub fn silence(frames: usize, channels: usize) -> Self {
        Self::new(vec![0.0; frames * channels], channels)
    }

    /// Build a chunk from raw native-endian bytes.
    ///
    /// The frame count is `bytes.len() / channels / 4`; byte lengths that are not
    /// a whole number of frames are rejected.
    pub fn from_ne_bytes(bytes: &[u8], channels: usize) -> Result<Self, FormatError> {
        if channels == 0 {
            return Err(FormatError::UnsupportedChannelCount(channels));
        }
        let frame_bytes = channels * SAMPLE_BYTES;
        if bytes.len() % frame_bytes != 0 {
            return Err(FormatError::MisalignedChunk {
                bytes: bytes.len(),
                frame_bytes,
            });
        }

        let samples = bytes
            .chunks_exact(SAMPLE_BYTES)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(Self::new(samples, channels))
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of whole frames.
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    /// Returns true if the chunk holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Take the interleaved samples.
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_interleaved_float() {
        assert!(StreamFormat::interleaved(44100, 2).validate().is_ok());
        assert!(StreamFormat::interleaved(MIN_SAMPLE_RATE, 1).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unsupported_formats() {
        let mut format = StreamFormat::interleaved(44100, 2);
        format.layout = SampleLayout::NonInterleaved;
        assert_eq!(format.validate(), Err(FormatError::NonInterleaved));

        assert_eq!(
            StreamFormat::interleaved(4000, 2).validate(),
            Err(FormatError::UnsupportedSampleRate(4000))
        );
        assert_eq!(
            StreamFormat::interleaved(48000, 0).validate(),
            Err(FormatError::UnsupportedChannelCount(0))
        );
    }

    #[test]
    fn test_from_ne_bytes_derives_frame_count() {
        let samples = [0.25f32, -0.5, 1.0, 0.0];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_ne_bytes()).collect();

        let chunk = AudioChunk::from_ne_bytes(&bytes, 2).unwrap();

        assert_eq!(chunk.frame_count(), 2);
        assert_eq!(chunk.samples(), &samples);
    }

    #[test]
    fn test_from_ne_bytes_rejects_partial_frame() {
        let bytes = [0u8; 12];
        assert_eq!(
            AudioChunk::from_ne_bytes(&bytes, 2),
            Err(FormatError::MisalignedChunk {
                bytes: 12,
                frame_bytes: 8
            })
        );
    }

    #[test]
    fn test_display() {
        let format = StreamFormat::interleaved(48000, 2);
        assert_eq!(format.to_string(), "48000 Hz, 2 ch, F32 interleaved");
        assert_eq!(format.frame_bytes(), 8);
    }
}
