use stretchband_core::{BufferError, FlowError, FormatError};
use thiserror::Error;

use crate::engine::EngineError;

/// Errors surfaced by the stream processor to the enclosing pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    #[error("no format negotiated")]
    NotNegotiated,

    #[error("stream already ended; renegotiate the format to continue")]
    EndOfStream,

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("downstream refused output: {0}")]
    Downstream(#[from] FlowError),
}

pub type Result<T> = std::result::Result<T, StageError>;
