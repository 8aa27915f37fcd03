//! SoundTouch backend.
//!
//! Uses the SoundTouch library (WSOLA algorithm) to change tempo and pitch
//! independently. SoundTouch works on interleaved samples, so the engine keeps
//! an interleaved scratch buffer sized to the max process size and converts on
//! the way in and out.

use soundtouch::{Setting, SoundTouch};
use stretchband_core::convert;

use super::{
    check_channels, check_positive, EngineConfig, EngineError, EngineFactory, TimeStretchEngine,
};

/// SoundTouch refuses more channels than this.
const MAX_CHANNELS: usize = 16;

/// Builds [`SoundTouchEngine`] sessions.
#[derive(Debug, Clone, Copy)]
pub struct SoundTouchFactory {
    /// Enable the anti-alias filter used when the pitch is shifted.
    pub anti_alias: bool,
}

impl Default for SoundTouchFactory {
    fn default() -> Self {
        Self { anti_alias: true }
    }
}

impl EngineFactory for SoundTouchFactory {
    type Engine = SoundTouchEngine;

    fn create(&self, config: &EngineConfig) -> Result<SoundTouchEngine, EngineError> {
        SoundTouchEngine::new(config, self.anti_alias)
    }
}

/// Real-time time stretcher backed by SoundTouch.
pub struct SoundTouchEngine {
    /// SoundTouch processor instance.
    processor: SoundTouch,
    channels: usize,
    time_ratio: f64,
    pitch_scale: f64,
    max_process_size: usize,
    /// Interleaved scratch for put/receive.
    scratch: Vec<f32>,
    /// Set once the final block has been flushed through.
    finished: bool,
}

impl SoundTouchEngine {
    /// Create an engine for the given session parameters.
    pub fn new(config: &EngineConfig, anti_alias: bool) -> Result<Self, EngineError> {
        if !config.options.realtime {
            return Err(EngineError::Construction(
                "SoundTouch only supports real-time processing".to_string(),
            ));
        }
        if config.channels == 0 || config.channels > MAX_CHANNELS {
            return Err(EngineError::Construction(format!(
                "SoundTouch supports 1 to {} channels, got {}",
                MAX_CHANNELS, config.channels
            )));
        }
        check_positive("time ratio", config.time_ratio)?;
        check_positive("pitch scale", config.pitch_scale)?;

        let mut processor = SoundTouch::new();
        processor.set_sample_rate(config.sample_rate);
        processor.set_channels(config.channels as u32);

        // Settings balance quality vs latency for live use
        processor.set_setting(Setting::SequenceMs, 40);
        processor.set_setting(Setting::SeekwindowMs, 15);
        processor.set_setting(Setting::OverlapMs, 8);
        processor.set_setting(Setting::UseAaFilter, if anti_alias { 1 } else { 0 });

        processor.set_tempo(1.0 / config.time_ratio);
        processor.set_pitch(config.pitch_scale);

        log::debug!(
            "SoundTouch session: {} Hz, {} ch, time ratio {}, pitch scale {}",
            config.sample_rate,
            config.channels,
            config.time_ratio,
            config.pitch_scale
        );

        Ok(Self {
            processor,
            channels: config.channels,
            time_ratio: config.time_ratio,
            pitch_scale: config.pitch_scale,
            max_process_size: 0,
            scratch: Vec::new(),
            finished: false,
        })
    }

    /// Current time ratio.
    pub fn time_ratio(&self) -> f64 {
        self.time_ratio
    }

    /// Current pitch scale.
    pub fn pitch_scale(&self) -> f64 {
        self.pitch_scale
    }

    fn ensure_scratch(&mut self, frames: usize) {
        let len = frames * self.channels;
        if self.scratch.len() < len {
            self.scratch.resize(len, 0.0);
        }
    }
}

impl TimeStretchEngine for SoundTouchEngine {
    fn channels(&self) -> usize {
        self.channels
    }

    fn max_process_size(&self) -> usize {
        self.max_process_size
    }

    fn set_max_process_size(&mut self, frames: usize) {
        self.max_process_size = frames;
        self.ensure_scratch(frames);
    }

    fn set_time_ratio(&mut self, ratio: f64) -> Result<(), EngineError> {
        check_positive("time ratio", ratio)?;
        if (ratio - self.time_ratio).abs() > f64::EPSILON {
            self.time_ratio = ratio;
            self.processor.set_tempo(1.0 / ratio);
        }
        Ok(())
    }

    fn set_pitch_scale(&mut self, scale: f64) -> Result<(), EngineError> {
        check_positive("pitch scale", scale)?;
        if (scale - self.pitch_scale).abs() > f64::EPSILON {
            self.pitch_scale = scale;
            self.processor.set_pitch(scale);
        }
        Ok(())
    }

    fn process(
        &mut self,
        input: &[&[f32]],
        frames: usize,
        is_final: bool,
    ) -> Result<(), EngineError> {
        check_channels(self.channels, input.len())?;
        if frames > self.max_process_size {
            return Err(EngineError::ProcessSizeExceeded {
                frames,
                max: self.max_process_size,
            });
        }
        if self.finished && frames > 0 {
            return Err(EngineError::Finished);
        }

        if frames > 0 {
            let len = frames * self.channels;
            self.ensure_scratch(frames);
            convert::interleave(input, &mut self.scratch[..len], frames);
            self.processor.put_samples(&self.scratch[..len], frames);
        }

        if is_final && !self.finished {
            // Pushes the tail of the stream through the overlap window
            self.processor.flush();
            self.finished = true;
        }
        Ok(())
    }

    fn available(&self) -> usize {
        self.processor.num_samples() as usize
    }

    fn retrieve(&mut self, output: &mut [&mut [f32]], frames: usize) -> usize {
        if output.len() != self.channels {
            log::warn!(
                "SoundTouch retrieve with {} channel slices, expected {}",
                output.len(),
                self.channels
            );
            return 0;
        }

        let shortest = output.iter().map(|ch| ch.len()).min().unwrap_or(0);
        let frames = frames.min(shortest).min(self.available());
        if frames == 0 {
            return 0;
        }

        let len = frames * self.channels;
        self.ensure_scratch(frames);
        let received = self
            .processor
            .receive_samples(&mut self.scratch[..len], frames);
        convert::deinterleave(&self.scratch[..received * self.channels], output, received);
        received
    }

    fn latency(&self) -> usize {
        self.processor.num_unprocessed_samples() as usize
    }

    fn reset(&mut self) {
        self.processor.clear();
        self.finished = false;
    }
}
