//! Stretchband core
//!
//! Buffering primitives and stream-stage interfaces shared by the stretch
//! stage and its front ends.
//!
//! # Features
//!
//! - Growable deinterleaved [`FrameBuffer`] with derived per-channel views
//! - Stateless interleave/deinterleave routines
//! - Stream format negotiation and [`AudioChunk`] types
//! - The push-based [`StreamStage`] / [`ChunkSink`] contract
//! - Stage settings with JSON persistence and per-instance diagnostics

pub mod buffer;
pub mod config;
pub mod convert;
pub mod format;
pub mod stage;
pub mod stats;

pub use buffer::{BufferError, FrameBuffer};
pub use config::{ConfigError, StageSettings, INITIAL_MAX_PROCESS_SIZE};
pub use format::{AudioChunk, FormatError, SampleLayout, StreamFormat, MIN_SAMPLE_RATE};
pub use stage::{ChunkSink, FlowError, FnSink, StreamEvent, StreamStage};
pub use stats::StageStats;
