//! Chunk-processing state machine.
//!
//! Each incoming chunk goes through four steps:
//!
//! 1. **Sizing**: grow the input buffer to `max(frames, initial_max_process_size)`
//!    and raise the engine's max process size to match. Capacity never shrinks.
//! 2. **Filling**: deinterleave the chunk into the input buffer.
//! 3. **Processing**: hand the buffered frames to the engine and empty the buffer.
//! 4. **Draining**: while the engine reports ready frames, retrieve one batch into
//!    the output buffer, interleave it into a fresh chunk and push it downstream.
//!
//! The engine buffers internally, so the first chunks after a format change
//! usually produce nothing, and a later chunk may produce several batches.

use log::Level;
use stretchband_core::{
    AudioChunk, ChunkSink, FormatError, FrameBuffer, StageSettings, StageStats, StreamFormat,
    StreamStage,
};

use crate::adapter::EngineAdapter;
use crate::controls::{StretchControls, StretchParams};
use crate::engine::{EngineError, EngineFactory};
use crate::error::{Result, StageError};

/// Streaming time-stretch stage.
pub struct StreamProcessor<F: EngineFactory> {
    adapter: EngineAdapter<F>,
    controls: StretchControls,
    /// Control generation last pushed into the adapter.
    applied_generation: u64,
    /// Control change the engine refused, reported after the current chunk.
    rejected: Option<EngineError>,
    input: FrameBuffer,
    output: FrameBuffer,
    format: Option<StreamFormat>,
    /// Set once end of stream has been flushed through the engine.
    finished: bool,
    min_process_size: usize,
    verbose: bool,
    stats: StageStats,
}

impl<F: EngineFactory> StreamProcessor<F> {
    pub fn new(factory: F, settings: &StageSettings) -> Self {
        let params = StretchParams {
            time_ratio: settings.time_ratio,
            pitch_scale: settings.pitch_scale,
        };
        let controls = StretchControls::new(params);
        let (_, applied_generation) = controls.snapshot();

        Self {
            adapter: EngineAdapter::new(factory, params),
            controls,
            applied_generation,
            rejected: None,
            input: FrameBuffer::new(),
            output: FrameBuffer::new(),
            format: None,
            finished: false,
            min_process_size: settings.initial_max_process_size.max(1),
            verbose: settings.verbose,
            stats: StageStats::default(),
        }
    }

    /// Handle for changing the time ratio and pitch scale while streaming.
    pub fn controls(&self) -> StretchControls {
        self.controls.clone()
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn stats(&self) -> &StageStats {
        &self.stats
    }

    /// Negotiated format, if any.
    pub fn format(&self) -> Option<StreamFormat> {
        self.format
    }

    pub fn input_capacity(&self) -> usize {
        self.input.frame_capacity()
    }

    pub fn output_capacity(&self) -> usize {
        self.output.frame_capacity()
    }

    /// Engine max process size, or zero before negotiation.
    pub fn max_process_size(&self) -> usize {
        self.adapter
            .session()
            .map_or(0, |session| session.max_process_size())
    }

    /// Engine processing delay in frames.
    pub fn latency(&self) -> usize {
        self.adapter.latency()
    }

    /// Frames the engine currently reports as ready.
    pub fn ready_frames(&self) -> usize {
        self.adapter.available()
    }

    fn diag_level(&self) -> Level {
        if self.verbose {
            Level::Info
        } else {
            Level::Debug
        }
    }

    /// Push pending control changes into the engine. Runs between chunks only.
    ///
    /// A change the engine refuses is rolled back in the controls and held in
    /// `rejected`; the stream keeps running with the last accepted values.
    fn sync_controls(&mut self) {
        let (params, generation) = self.controls.snapshot();
        if generation == self.applied_generation {
            return;
        }
        self.applied_generation = generation;

        match self.adapter.apply_params(params) {
            Ok(()) => log::log!(
                self.diag_level(),
                "Applied time ratio {}, pitch scale {}",
                params.time_ratio,
                params.pitch_scale
            ),
            Err(err) => {
                let kept = self.adapter.params();
                self.controls.restore(generation, kept);
                log::warn!(
                    "Engine refused time ratio {}, pitch scale {} ({}); keeping {}, {}",
                    params.time_ratio,
                    params.pitch_scale,
                    err,
                    kept.time_ratio,
                    kept.pitch_scale
                );
                self.rejected = Some(err);
            }
        }
    }

    /// Report a refused control change once, after the work it arrived with.
    fn take_rejected(&mut self) -> Result<()> {
        match self.rejected.take() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Grow the input buffer for a chunk of `frames` frames.
    fn size_input(&mut self, frames: usize, channels: usize) -> Result<()> {
        let required = frames.max(self.min_process_size);
        if self.input.ensure_capacity(required, channels)? {
            self.stats.input_reallocations += 1;
            self.adapter.set_max_process_size(self.input.frame_capacity())?;
            log::log!(
                self.diag_level(),
                "Input buffer grown to {} frames x {} ch",
                self.input.frame_capacity(),
                channels
            );
        }
        Ok(())
    }

    /// Feed the buffered input to the engine. The input buffer is empty afterwards
    /// whether or not the engine accepted it.
    fn process_buffered(&mut self) -> Result<()> {
        let frames = self.input.frames_buffered();
        let views = self.input.views(frames);
        let result = self.adapter.process(&views, frames, false);
        self.input.clear();
        result.map_err(StageError::from)
    }

    /// Emit every batch the engine has ready, one chunk per batch, in order.
    fn drain(&mut self, channels: usize, sink: &mut dyn ChunkSink) -> Result<usize> {
        let mut emitted = 0usize;

        loop {
            let available = self.adapter.available();
            if available == 0 {
                break;
            }
            let written = self.retrieve_batch(available, channels)?;
            if written == 0 {
                log::warn!("Engine reported {} ready frames but returned none", available);
                break;
            }

            let mut samples = vec![0.0; written * channels];
            self.output.fetch(&mut samples, written);
            self.output.clear();

            if let Err(err) = sink.push(AudioChunk::new(samples, channels)) {
                let dropped = self.discard_ready(channels)?;
                self.stats.record_drain(emitted as u64 + 1);
                log::warn!(
                    "Downstream refused output ({}), dropped {} ready frames",
                    err,
                    written + dropped
                );
                self.stats.frames_dropped += written as u64;
                return Err(StageError::Downstream(err));
            }

            emitted += 1;
            self.stats.chunks_emitted += 1;
            self.stats.frames_out += written as u64;
        }

        self.stats.record_drain(emitted as u64);
        Ok(emitted)
    }

    /// Retrieve up to `frames` ready frames into the output buffer.
    fn retrieve_batch(&mut self, frames: usize, channels: usize) -> Result<usize> {
        if self.output.ensure_capacity(frames, channels)? {
            self.stats.output_reallocations += 1;
            log::log!(
                self.diag_level(),
                "Output buffer grown to {} frames x {} ch",
                self.output.frame_capacity(),
                channels
            );
        }

        let written = {
            let mut views = self.output.views_mut(frames);
            self.adapter.retrieve(&mut views, frames)
        };
        self.output.commit(written)?;
        Ok(written)
    }

    /// Retrieve and throw away whatever the engine still has ready.
    fn discard_ready(&mut self, channels: usize) -> Result<usize> {
        let mut dropped = 0;
        loop {
            let available = self.adapter.available();
            if available == 0 {
                break;
            }
            let written = self.retrieve_batch(available, channels)?;
            self.output.clear();
            if written == 0 {
                break;
            }
            dropped += written;
        }
        self.stats.frames_dropped += dropped as u64;
        Ok(dropped)
    }

    fn negotiated(&self) -> Result<StreamFormat> {
        self.format.ok_or(StageError::NotNegotiated)
    }
}

impl<F: EngineFactory> StreamStage for StreamProcessor<F> {
    type Error = StageError;

    fn on_format_change(&mut self, format: StreamFormat) -> Result<()> {
        self.format = None;
        self.adapter.teardown();
        self.rejected = None;
        format.validate()?;

        // Build from the last accepted values; pending changes follow below
        self.adapter.reconfigure(format.sample_rate, format.channels)?;
        self.stats.engine_rebuilds += 1;

        if self.input.channels() == format.channels {
            self.input.clear();
            self.output.clear();
            if self.input.frame_capacity() > 0 {
                self.adapter.set_max_process_size(self.input.frame_capacity())?;
            }
        } else {
            self.input = FrameBuffer::new();
            self.output = FrameBuffer::new();
        }

        self.format = Some(format);
        self.finished = false;
        self.sync_controls();

        let params = self.adapter.params();
        log::log!(
            self.diag_level(),
            "Negotiated {} (time ratio {}, pitch scale {})",
            format,
            params.time_ratio,
            params.pitch_scale
        );
        Ok(())
    }

    fn on_chunk(&mut self, chunk: AudioChunk, sink: &mut dyn ChunkSink) -> Result<()> {
        let format = self.negotiated()?;
        if self.finished {
            return Err(StageError::EndOfStream);
        }
        if chunk.channels() != format.channels {
            return Err(FormatError::ChannelMismatch {
                expected: format.channels,
                actual: chunk.channels(),
            }
            .into());
        }

        let frames = chunk.frame_count();
        self.stats.chunks_received += 1;
        self.stats.frames_in += frames as u64;

        self.sync_controls();
        self.size_input(frames, format.channels)?;
        self.input.append(chunk.samples())?;
        drop(chunk);
        self.process_buffered()?;
        let emitted = self.drain(format.channels, sink)?;

        log::log!(
            self.diag_level(),
            "Chunk {}: {} frames in, {} chunks out",
            self.stats.chunks_received,
            frames,
            emitted
        );
        self.take_rejected()
    }

    fn on_end_of_stream(&mut self, sink: &mut dyn ChunkSink) -> Result<()> {
        let format = self.negotiated()?;
        if self.finished {
            return Ok(());
        }

        self.sync_controls();
        let empty = vec![<&[f32]>::default(); format.channels];
        self.adapter.process(&empty, 0, true)?;
        self.finished = true;

        let emitted = self.drain(format.channels, sink)?;
        log::log!(
            self.diag_level(),
            "End of stream: flushed {} chunks, {} frames in, {} frames out",
            emitted,
            self.stats.frames_in,
            self.stats.frames_out
        );
        self.take_rejected()
    }
}
