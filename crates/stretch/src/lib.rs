//! Stretchband stretch stage
//!
//! Adapts a block-oriented time-stretch / pitch-shift engine into a push-based
//! streaming stage: arbitrary-sized interleaved chunks go in, correctly ordered
//! interleaved chunks come out, one per batch the engine makes ready.
//!
//! ```no_run
//! use stretchband_core::{AudioChunk, StageSettings, StreamFormat, StreamStage};
//! use stretchband_stretch::{SoundTouchFactory, StreamProcessor};
//!
//! let settings = StageSettings { time_ratio: 1.5, ..StageSettings::default() };
//! let mut stage = StreamProcessor::new(SoundTouchFactory::default(), &settings);
//! let mut out: Vec<AudioChunk> = Vec::new();
//!
//! stage.on_format_change(StreamFormat::interleaved(44100, 2))?;
//! stage.on_chunk(AudioChunk::silence(1024, 2), &mut out)?;
//! stage.on_end_of_stream(&mut out)?;
//! # Ok::<(), stretchband_stretch::StageError>(())
//! ```

pub mod adapter;
pub mod controls;
pub mod engine;
pub mod error;
pub mod processor;

pub use adapter::{EngineAdapter, EngineSession};
pub use controls::{StretchControls, StretchParams};
pub use engine::{
    DelayEngine, DelayFactory, EngineConfig, EngineError, EngineFactory, EngineOptions,
    SoundTouchEngine, SoundTouchFactory, TimeStretchEngine,
};
pub use error::StageError;
pub use processor::StreamProcessor;
