//! Deterministic reference engine.
//!
//! [`DelayEngine`] is a unity transform with a fixed processing latency: it
//! holds back the most recent `latency` frames and releases everything older
//! in batches of `batch` frames, one batch becoming available at a time. A
//! final block releases the held tail. Only time ratio and pitch scale 1.0
//! are accepted, which makes it usable as a bypass engine and as an exact
//! oracle in tests.

use std::collections::VecDeque;

use super::{
    check_channels, EngineConfig, EngineError, EngineFactory, TimeStretchEngine,
};

/// Builds [`DelayEngine`] sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayFactory {
    /// Frames held back before any output is released.
    pub latency: usize,
    /// Output granularity in frames.
    pub batch: usize,
}

impl Default for DelayFactory {
    fn default() -> Self {
        Self {
            latency: 1024,
            batch: 256,
        }
    }
}

impl EngineFactory for DelayFactory {
    type Engine = DelayEngine;

    fn create(&self, config: &EngineConfig) -> Result<DelayEngine, EngineError> {
        if config.channels == 0 {
            return Err(EngineError::Construction("zero channels".to_string()));
        }
        if self.batch == 0 {
            return Err(EngineError::Construction("zero batch size".to_string()));
        }
        let mut engine = DelayEngine::new(config.channels, self.latency, self.batch);
        engine.set_time_ratio(config.time_ratio)?;
        engine.set_pitch_scale(config.pitch_scale)?;
        Ok(engine)
    }
}

/// Unity-gain delay line that emits in fixed batches.
#[derive(Debug, Clone)]
pub struct DelayEngine {
    /// Pending frames per channel, oldest first.
    pending: Vec<VecDeque<f32>>,
    latency: usize,
    batch: usize,
    max_process_size: usize,
    finished: bool,
}

impl DelayEngine {
    pub fn new(channels: usize, latency: usize, batch: usize) -> Self {
        Self {
            pending: vec![VecDeque::new(); channels],
            latency,
            batch: batch.max(1),
            max_process_size: 0,
            finished: false,
        }
    }

    /// Frames accepted but not yet retrieved.
    pub fn pending_frames(&self) -> usize {
        self.pending.first().map_or(0, VecDeque::len)
    }

    fn unity(name: &'static str, value: f64) -> Result<(), EngineError> {
        if value == 1.0 {
            Ok(())
        } else {
            Err(EngineError::UnsupportedParameter { name, value })
        }
    }
}

impl TimeStretchEngine for DelayEngine {
    fn channels(&self) -> usize {
        self.pending.len()
    }

    fn max_process_size(&self) -> usize {
        self.max_process_size
    }

    fn set_max_process_size(&mut self, frames: usize) {
        self.max_process_size = frames;
    }

    fn set_time_ratio(&mut self, ratio: f64) -> Result<(), EngineError> {
        Self::unity("time ratio", ratio)
    }

    fn set_pitch_scale(&mut self, scale: f64) -> Result<(), EngineError> {
        Self::unity("pitch scale", scale)
    }

    fn process(
        &mut self,
        input: &[&[f32]],
        frames: usize,
        is_final: bool,
    ) -> Result<(), EngineError> {
        check_channels(self.channels(), input.len())?;
        if frames > self.max_process_size {
            return Err(EngineError::ProcessSizeExceeded {
                frames,
                max: self.max_process_size,
            });
        }
        if self.finished && frames > 0 {
            return Err(EngineError::Finished);
        }

        for (queue, samples) in self.pending.iter_mut().zip(input) {
            queue.extend(&samples[..frames]);
        }
        if is_final {
            self.finished = true;
        }
        Ok(())
    }

    fn available(&self) -> usize {
        let pending = self.pending_frames();
        if self.finished {
            return pending.min(self.batch);
        }
        if pending.saturating_sub(self.latency) >= self.batch {
            self.batch
        } else {
            0
        }
    }

    fn retrieve(&mut self, output: &mut [&mut [f32]], frames: usize) -> usize {
        if output.len() != self.channels() {
            return 0;
        }
        let shortest = output.iter().map(|ch| ch.len()).min().unwrap_or(0);
        let frames = frames.min(shortest).min(self.available());

        for (queue, out) in self.pending.iter_mut().zip(output.iter_mut()) {
            for (dst, src) in out[..frames].iter_mut().zip(queue.drain(..frames)) {
                *dst = src;
            }
        }
        frames
    }

    fn latency(&self) -> usize {
        self.latency
    }

    fn reset(&mut self) {
        for queue in &mut self.pending {
            queue.clear();
        }
        self.finished = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;

    fn engine(latency: usize, batch: usize) -> DelayEngine {
        let mut engine = DelayEngine::new(1, latency, batch);
        engine.set_max_process_size(4096);
        engine
    }

    fn feed(engine: &mut DelayEngine, samples: &[f32], is_final: bool) {
        let input: [&[f32]; 1] = [samples];
        engine.process(&input, samples.len(), is_final).unwrap();
    }

    fn drain(engine: &mut DelayEngine) -> Vec<Vec<f32>> {
        let mut batches = Vec::new();
        loop {
            let available = engine.available();
            if available == 0 {
                break;
            }
            let mut buf = vec![0.0; available];
            let mut out: [&mut [f32]; 1] = [buf.as_mut_slice()];
            let got = engine.retrieve(&mut out, available);
            assert_eq!(got, available);
            batches.push(buf);
        }
        batches
    }

    #[test]
    fn test_holds_back_latency() {
        let mut engine = engine(8, 4);

        feed(&mut engine, &[1.0; 8], false);
        assert_eq!(engine.available(), 0);

        feed(&mut engine, &[2.0; 3], false);
        assert_eq!(engine.available(), 0);

        feed(&mut engine, &[3.0; 1], false);
        assert_eq!(engine.available(), 4);
    }

    #[test]
    fn test_releases_in_order_one_batch_at_a_time() {
        let mut engine = engine(2, 3);
        let input: Vec<f32> = (0..11).map(|i| i as f32).collect();

        feed(&mut engine, &input, false);
        let batches = drain(&mut engine);

        assert_eq!(batches, vec![vec![0.0, 1.0, 2.0], vec![3.0, 4.0, 5.0], vec![6.0, 7.0, 8.0]]);
        assert_eq!(engine.pending_frames(), 2);
    }

    #[test]
    fn test_final_releases_tail() {
        let mut engine = engine(16, 4);
        let input: Vec<f32> = (0..10).map(|i| i as f32).collect();

        feed(&mut engine, &input, false);
        assert!(drain(&mut engine).is_empty());

        feed(&mut engine, &[], true);
        let flat: Vec<f32> = drain(&mut engine).into_iter().flatten().collect();
        assert_eq!(flat, input);
        assert_eq!(engine.process(&[&[0.0][..]], 1, false), Err(EngineError::Finished));
    }

    #[test]
    fn test_factory_rejects_non_unity_ratio() {
        let config = EngineConfig {
            sample_rate: 48000,
            channels: 2,
            time_ratio: 2.5,
            pitch_scale: 1.0,
            options: EngineOptions::default(),
        };
        assert_eq!(
            DelayFactory::default().create(&config).unwrap_err(),
            EngineError::UnsupportedParameter {
                name: "time ratio",
                value: 2.5
            }
        );
    }

    #[test]
    fn test_channel_mismatch() {
        let mut engine = DelayEngine::new(2, 0, 1);
        engine.set_max_process_size(4);
        let mono: [&[f32]; 1] = [&[1.0]];
        assert_eq!(
            engine.process(&mono, 1, false),
            Err(EngineError::ChannelMismatch {
                expected: 2,
                actual: 1
            })
        );
    }
}
