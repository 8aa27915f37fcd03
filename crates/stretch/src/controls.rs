use std::sync::Arc;

use parking_lot::RwLock;

use crate::engine::{check_positive, EngineError};

/// Time ratio and pitch scale applied to an engine session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretchParams {
    /// Output duration / input duration.
    pub time_ratio: f64,
    /// Pitch multiplier.
    pub pitch_scale: f64,
}

impl Default for StretchParams {
    fn default() -> Self {
        Self {
            time_ratio: 1.0,
            pitch_scale: 1.0,
        }
    }
}

#[derive(Debug, Default)]
struct ControlState {
    params: StretchParams,
    /// Bumped on every accepted change.
    generation: u64,
}

/// Shared handle for changing stretch parameters while a stage is running.
///
/// Clones share state. The processor picks up changes at the start of its next
/// chunk, so a UI or control thread can adjust the ratio without touching the
/// thread that drives the stream.
#[derive(Debug, Clone, Default)]
pub struct StretchControls {
    state: Arc<RwLock<ControlState>>,
}

impl StretchControls {
    pub fn new(params: StretchParams) -> Self {
        Self {
            state: Arc::new(RwLock::new(ControlState {
                params,
                generation: 0,
            })),
        }
    }

    /// Set the time ratio. Rejects non-finite and non-positive values.
    pub fn set_time_ratio(&self, ratio: f64) -> Result<(), EngineError> {
        check_positive("time ratio", ratio)?;
        let mut state = self.state.write();
        state.params.time_ratio = ratio;
        state.generation += 1;
        Ok(())
    }

    /// Set the pitch scale. Rejects non-finite and non-positive values.
    pub fn set_pitch_scale(&self, scale: f64) -> Result<(), EngineError> {
        check_positive("pitch scale", scale)?;
        let mut state = self.state.write();
        state.params.pitch_scale = scale;
        state.generation += 1;
        Ok(())
    }

    pub fn time_ratio(&self) -> f64 {
        self.state.read().params.time_ratio
    }

    pub fn pitch_scale(&self) -> f64 {
        self.state.read().params.pitch_scale
    }

    pub fn params(&self) -> StretchParams {
        self.state.read().params
    }

    /// Current parameters together with their change generation.
    pub fn snapshot(&self) -> (StretchParams, u64) {
        let state = self.state.read();
        (state.params, state.generation)
    }

    /// Put `params` back after an engine refused the change made at
    /// `generation`. Does nothing if a newer change has arrived since.
    pub fn restore(&self, generation: u64, params: StretchParams) -> bool {
        let mut state = self.state.write();
        if state.generation != generation {
            return false;
        }
        state.params = params;
        true
    }
}
