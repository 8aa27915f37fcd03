//! Push-based stream stage interface.
//!
//! A pipeline drives a [`StreamStage`] with format changes, audio chunks and an
//! end-of-stream marker. Output is pushed synchronously into a [`ChunkSink`];
//! a sink error is backpressure and must stop the stage from producing more
//! output for the current call.

use thiserror::Error;

use crate::format::{AudioChunk, StreamFormat};

/// Reasons a downstream consumer can refuse a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("downstream is flushing")]
    Flushing,

    #[error("downstream reached end of stream")]
    Eos,

    #[error("downstream is not negotiated")]
    NotNegotiated,

    #[error("downstream rejected chunk: {0}")]
    Rejected(String),
}

/// Downstream consumer of output chunks. Ownership of each chunk transfers on push.
pub trait ChunkSink {
    fn push(&mut self, chunk: AudioChunk) -> Result<(), FlowError>;
}

impl ChunkSink for Vec<AudioChunk> {
    fn push(&mut self, chunk: AudioChunk) -> Result<(), FlowError> {
        Vec::push(self, chunk);
        Ok(())
    }
}

impl<S: ChunkSink + ?Sized> ChunkSink for &mut S {
    fn push(&mut self, chunk: AudioChunk) -> Result<(), FlowError> {
        (**self).push(chunk)
    }
}

/// Adapts a closure into a [`ChunkSink`].
pub struct FnSink<F>(pub F);

impl<F> ChunkSink for FnSink<F>
where
    F: FnMut(AudioChunk) -> Result<(), FlowError>,
{
    fn push(&mut self, chunk: AudioChunk) -> Result<(), FlowError> {
        (self.0)(chunk)
    }
}

/// Events delivered to a stage by the enclosing pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Out-of-band format change.
    Format(StreamFormat),
    /// A chunk of interleaved audio.
    Chunk(AudioChunk),
    /// No more audio will follow.
    EndOfStream,
}

/// A push-driven streaming transform.
///
/// Calls are strictly sequential: one event is handled completely before the
/// next is delivered. Implementations are not expected to tolerate concurrent
/// submission.
pub trait StreamStage {
    type Error: std::error::Error;

    /// Handle a format change. Must complete before further chunks are accepted.
    fn on_format_change(&mut self, format: StreamFormat) -> Result<(), Self::Error>;

    /// Process one chunk, pushing zero or more output chunks in order.
    fn on_chunk(&mut self, chunk: AudioChunk, sink: &mut dyn ChunkSink) -> Result<(), Self::Error>;

    /// Flush everything still held by the stage.
    fn on_end_of_stream(&mut self, sink: &mut dyn ChunkSink) -> Result<(), Self::Error>;

    /// Dispatch a single event.
    fn handle(&mut self, event: StreamEvent, sink: &mut dyn ChunkSink) -> Result<(), Self::Error> {
        match event {
            StreamEvent::Format(format) => self.on_format_change(format),
            StreamEvent::Chunk(chunk) => self.on_chunk(chunk, sink),
            StreamEvent::EndOfStream => self.on_end_of_stream(sink),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stage that forwards every chunk unchanged.
    #[derive(Default)]
    struct Passthrough {
        format: Option<StreamFormat>,
        ended: bool,
    }

    impl StreamStage for Passthrough {
        type Error = FlowError;

        fn on_format_change(&mut self, format: StreamFormat) -> Result<(), FlowError> {
            self.format = Some(format);
            Ok(())
        }

        fn on_chunk(&mut self, chunk: AudioChunk, sink: &mut dyn ChunkSink) -> Result<(), FlowError> {
            if self.format.is_none() {
                return Err(FlowError::NotNegotiated);
            }
            sink.push(chunk)
        }

        fn on_end_of_stream(&mut self, _sink: &mut dyn ChunkSink) -> Result<(), FlowError> {
            self.ended = true;
            Ok(())
        }
    }

    #[test]
    fn test_handle_dispatches_events() {
        let mut stage = Passthrough::default();
        let mut out: Vec<AudioChunk> = Vec::new();

        let chunk = AudioChunk::new(vec![1.0, 2.0], 2);
        assert_eq!(
            stage.handle(StreamEvent::Chunk(chunk.clone()), &mut out),
            Err(FlowError::NotNegotiated)
        );

        stage
            .handle(StreamEvent::Format(StreamFormat::interleaved(44100, 2)), &mut out)
            .unwrap();
        stage.handle(StreamEvent::Chunk(chunk.clone()), &mut out).unwrap();
        stage.handle(StreamEvent::EndOfStream, &mut out).unwrap();

        assert_eq!(out, vec![chunk]);
        assert!(stage.ended);
    }

    #[test]
    fn test_fn_sink_propagates_rejection() {
        let mut accepted = 0;
        let mut sink = FnSink(|_chunk: AudioChunk| {
            accepted += 1;
            if accepted > 1 {
                Err(FlowError::Flushing)
            } else {
                Ok(())
            }
        });

        assert!(sink.push(AudioChunk::silence(4, 1)).is_ok());
        assert_eq!(sink.push(AudioChunk::silence(4, 1)), Err(FlowError::Flushing));
    }
}
