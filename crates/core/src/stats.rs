//! Per-stage diagnostic counters.

use std::fmt;

use serde::Serialize;

/// Counters owned by a single stage instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageStats {
    /// Chunks received from upstream.
    pub chunks_received: u64,
    /// Chunks pushed downstream.
    pub chunks_emitted: u64,
    /// Frames received from upstream.
    pub frames_in: u64,
    /// Frames pushed downstream.
    pub frames_out: u64,
    /// Input buffer (re)allocations.
    pub input_reallocations: u64,
    /// Output buffer (re)allocations.
    pub output_reallocations: u64,
    /// Engine sessions built.
    pub engine_rebuilds: u64,
    /// Most drain iterations seen for a single call.
    pub longest_drain: u64,
    /// Ready frames discarded after a downstream failure.
    pub frames_dropped: u64,
}

impl StageStats {
    /// Record one completed drain run.
    pub fn record_drain(&mut self, iterations: u64) {
        self.longest_drain = self.longest_drain.max(iterations);
    }

    /// Output/input frame ratio, or `None` before any input.
    pub fn observed_ratio(&self) -> Option<f64> {
        if self.frames_in == 0 {
            None
        } else {
            Some(self.frames_out as f64 / self.frames_in as f64)
        }
    }
}

impl fmt::Display for StageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "chunks: {} in, {} out",
            self.chunks_received, self.chunks_emitted
        )?;
        writeln!(f, "frames: {} in, {} out", self.frames_in, self.frames_out)?;
        if let Some(ratio) = self.observed_ratio() {
            writeln!(f, "observed ratio: {:.3}", ratio)?;
        }
        writeln!(
            f,
            "reallocations: {} input, {} output",
            self.input_reallocations, self.output_reallocations
        )?;
        write!(
            f,
            "engine sessions: {}, longest drain: {}, dropped frames: {}",
            self.engine_rebuilds, self.longest_drain, self.frames_dropped
        )
    }
}
