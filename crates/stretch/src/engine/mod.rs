//! Time-stretch engine contract and backends.
//!
//! An engine consumes deinterleaved frames through [`TimeStretchEngine::process`]
//! and releases output at its own pace: [`TimeStretchEngine::available`] reports
//! how many frames are ready and [`TimeStretchEngine::retrieve`] consumes them.
//! Input and output rates are decoupled, so one `process` call may make zero or
//! many batches of output available.

mod delay;
mod wsola;

pub use delay::{DelayEngine, DelayFactory};
pub use wsola::{SoundTouchEngine, SoundTouchFactory};

use thiserror::Error;

/// Errors raised by engines and the engine adapter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("failed to construct engine: {0}")]
    Construction(String),

    #[error("no engine session; negotiate a format first")]
    NotConfigured,

    #[error("process call of {frames} frames exceeds max process size {max}")]
    ProcessSizeExceeded { frames: usize, max: usize },

    #[error("unsupported {name}: {value}")]
    UnsupportedParameter { name: &'static str, value: f64 },

    #[error("engine expects {expected} channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("engine already received its final block")]
    Finished,
}

/// Construction flags, mirroring the real-time single-threaded mode the stage needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Process in real-time (streaming) mode rather than offline.
    pub realtime: bool,
    /// Allow the engine to spawn worker threads.
    pub threaded: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            realtime: true,
            threaded: false,
        }
    }
}

/// Everything needed to build an engine session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub channels: usize,
    pub time_ratio: f64,
    pub pitch_scale: f64,
    pub options: EngineOptions,
}

/// Stateful time-stretch / pitch-shift transform.
pub trait TimeStretchEngine {
    /// Channel count the engine was built for.
    fn channels(&self) -> usize;

    /// Largest frame count a single [`TimeStretchEngine::process`] call may carry.
    fn max_process_size(&self) -> usize;

    /// Raise or lower the per-call frame limit. Must precede any larger `process` call.
    fn set_max_process_size(&mut self, frames: usize);

    /// Output duration / input duration.
    fn set_time_ratio(&mut self, ratio: f64) -> Result<(), EngineError>;

    /// Pitch multiplier.
    fn set_pitch_scale(&mut self, scale: f64) -> Result<(), EngineError>;

    /// Feed `frames` frames from each channel slice. `is_final` flushes the
    /// engine's internal state so every remaining frame becomes available.
    fn process(&mut self, input: &[&[f32]], frames: usize, is_final: bool)
        -> Result<(), EngineError>;

    /// Frames ready to retrieve.
    fn available(&self) -> usize;

    /// Consume up to `frames` ready frames into the channel slices.
    /// Returns the number of frames written.
    fn retrieve(&mut self, output: &mut [&mut [f32]], frames: usize) -> usize;

    /// Approximate processing delay in frames.
    fn latency(&self) -> usize;

    /// Drop all buffered state.
    fn reset(&mut self);
}

/// Builds engine sessions for a negotiated format.
pub trait EngineFactory {
    type Engine: TimeStretchEngine;

    fn create(&self, config: &EngineConfig) -> Result<Self::Engine, EngineError>;
}

/// Reject non-finite and non-positive ratios.
pub(crate) fn check_positive(name: &'static str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::UnsupportedParameter { name, value })
    }
}

/// Validate the channel slices handed to `process`/`retrieve`.
pub(crate) fn check_channels(expected: usize, actual: usize) -> Result<(), EngineError> {
    if expected == actual {
        Ok(())
    } else {
        Err(EngineError::ChannelMismatch { expected, actual })
    }
}
