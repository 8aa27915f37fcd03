//! Engine lifecycle management.
//!
//! [`EngineAdapter`] owns at most one engine session at a time. A format change
//! tears the old session down and builds a new one with the current stretch
//! parameters; every call into the engine goes through the adapter, which
//! enforces the max-process-size precondition before the engine sees it.

use crate::controls::StretchParams;
use crate::engine::{EngineConfig, EngineError, EngineFactory, EngineOptions, TimeStretchEngine};

/// A live engine plus the format it was built for.
pub struct EngineSession<E> {
    engine: E,
    sample_rate: u32,
    channels: usize,
    params: StretchParams,
}

impl<E: TimeStretchEngine> EngineSession<E> {
    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn max_process_size(&self) -> usize {
        self.engine.max_process_size()
    }

    pub fn params(&self) -> StretchParams {
        self.params
    }
}

/// Mediates all interaction with the time-stretch engine.
pub struct EngineAdapter<F: EngineFactory> {
    factory: F,
    options: EngineOptions,
    params: StretchParams,
    session: Option<EngineSession<F::Engine>>,
}

impl<F: EngineFactory> EngineAdapter<F> {
    pub fn new(factory: F, params: StretchParams) -> Self {
        Self {
            factory,
            options: EngineOptions::default(),
            params,
            session: None,
        }
    }

    /// Override construction flags used for the next session.
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Discard any existing session and build a new one for `sample_rate`/`channels`.
    ///
    /// On failure the adapter is left without a session.
    pub fn reconfigure(&mut self, sample_rate: u32, channels: usize) -> Result<(), EngineError> {
        self.teardown();

        let config = EngineConfig {
            sample_rate,
            channels,
            time_ratio: self.params.time_ratio,
            pitch_scale: self.params.pitch_scale,
            options: self.options,
        };
        let engine = self.factory.create(&config)?;

        self.session = Some(EngineSession {
            engine,
            sample_rate,
            channels,
            params: self.params,
        });
        Ok(())
    }

    /// Drop the current session and everything buffered inside it.
    pub fn teardown(&mut self) {
        self.session = None;
    }

    pub fn is_configured(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&EngineSession<F::Engine>> {
        self.session.as_ref()
    }

    /// Parameters used for the current or next session.
    pub fn params(&self) -> StretchParams {
        self.params
    }

    /// Raise the engine's per-call limit. Must precede any larger `process` call.
    pub fn set_max_process_size(&mut self, frames: usize) -> Result<(), EngineError> {
        let session = self.session.as_mut().ok_or(EngineError::NotConfigured)?;
        session.engine.set_max_process_size(frames);
        Ok(())
    }

    /// Apply new stretch parameters to the live session, if any.
    ///
    /// Each value is recorded as soon as the engine accepts it, so after a
    /// rejection [`EngineAdapter::params`] matches what the live engine runs
    /// with and the next session is built with the same values.
    pub fn apply_params(&mut self, params: StretchParams) -> Result<(), EngineError> {
        let Some(session) = self.session.as_mut() else {
            self.params = params;
            return Ok(());
        };

        if params.time_ratio != session.params.time_ratio {
            session.engine.set_time_ratio(params.time_ratio)?;
            session.params.time_ratio = params.time_ratio;
            self.params.time_ratio = params.time_ratio;
        }
        if params.pitch_scale != session.params.pitch_scale {
            session.engine.set_pitch_scale(params.pitch_scale)?;
            session.params.pitch_scale = params.pitch_scale;
            self.params.pitch_scale = params.pitch_scale;
        }
        Ok(())
    }

    pub fn process(
        &mut self,
        input: &[&[f32]],
        frames: usize,
        is_final: bool,
    ) -> Result<(), EngineError> {
        let session = self.session.as_mut().ok_or(EngineError::NotConfigured)?;
        let max = session.engine.max_process_size();
        if frames > max {
            return Err(EngineError::ProcessSizeExceeded { frames, max });
        }
        session.engine.process(input, frames, is_final)
    }

    /// Frames ready to retrieve; zero without a session.
    pub fn available(&self) -> usize {
        self.session
            .as_ref()
            .map_or(0, |session| session.engine.available())
    }

    pub fn retrieve(&mut self, output: &mut [&mut [f32]], frames: usize) -> usize {
        self.session
            .as_mut()
            .map_or(0, |session| session.engine.retrieve(output, frames))
    }

    /// Engine processing delay in frames; zero without a session.
    pub fn latency(&self) -> usize {
        self.session
            .as_ref()
            .map_or(0, |session| session.engine.latency())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DelayEngine, DelayFactory};

    fn adapter() -> EngineAdapter<DelayFactory> {
        EngineAdapter::new(
            DelayFactory {
                latency: 4,
                batch: 2,
            },
            StretchParams::default(),
        )
    }

    #[test]
    fn test_requires_session() {
        let mut adapter = adapter();
        let input: [&[f32]; 1] = [&[0.0; 4]];

        assert!(!adapter.is_configured());
        assert_eq!(adapter.available(), 0);
        assert_eq!(
            adapter.process(&input, 4, false),
            Err(EngineError::NotConfigured)
        );
        assert_eq!(
            adapter.set_max_process_size(16),
            Err(EngineError::NotConfigured)
        );
    }

    #[test]
    fn test_enforces_max_process_size() {
        let mut adapter = adapter();
        adapter.reconfigure(44100, 1).unwrap();
        let input: [&[f32]; 1] = [&[0.0; 8]];

        assert_eq!(
            adapter.process(&input, 8, false),
            Err(EngineError::ProcessSizeExceeded { frames: 8, max: 0 })
        );

        adapter.set_max_process_size(8).unwrap();
        assert!(adapter.process(&input, 8, false).is_ok());
        assert_eq!(adapter.available(), 2);
    }

    #[test]
    fn test_reconfigure_discards_engine_state() {
        let mut adapter = adapter();
        adapter.reconfigure(44100, 1).unwrap();
        adapter.set_max_process_size(8).unwrap();
        let input: [&[f32]; 1] = [&[1.0; 8]];
        adapter.process(&input, 8, false).unwrap();
        assert!(adapter.available() > 0);

        adapter.reconfigure(48000, 2).unwrap();
        let session = adapter.session().unwrap();
        assert_eq!(session.sample_rate(), 48000);
        assert_eq!(session.channels(), 2);
        assert_eq!(session.max_process_size(), 0);
        assert_eq!(adapter.available(), 0);
    }

    #[test]
    fn test_failed_reconfigure_leaves_no_session() {
        let mut adapter = adapter();
        adapter.reconfigure(44100, 1).unwrap();

        assert!(adapter.reconfigure(44100, 0).is_err());
        assert!(!adapter.is_configured());
    }

    #[test]
    fn test_rejected_params_are_not_stored() {
        let mut adapter = adapter();
        adapter.reconfigure(44100, 2).unwrap();

        let stretched = StretchParams {
            time_ratio: 2.0,
            pitch_scale: 1.0,
        };
        assert!(adapter.apply_params(stretched).is_err());
        assert_eq!(adapter.params(), StretchParams::default());
        assert_eq!(adapter.session().unwrap().params(), StretchParams::default());
    }

    /// Delay line that accepts any time ratio but only unity pitch.
    struct RatioOnly(DelayEngine);

    impl TimeStretchEngine for RatioOnly {
        fn channels(&self) -> usize {
            self.0.channels()
        }
        fn max_process_size(&self) -> usize {
            self.0.max_process_size()
        }
        fn set_max_process_size(&mut self, frames: usize) {
            self.0.set_max_process_size(frames)
        }
        fn set_time_ratio(&mut self, _ratio: f64) -> Result<(), EngineError> {
            Ok(())
        }
        fn set_pitch_scale(&mut self, scale: f64) -> Result<(), EngineError> {
            self.0.set_pitch_scale(scale)
        }
        fn process(
            &mut self,
            input: &[&[f32]],
            frames: usize,
            is_final: bool,
        ) -> Result<(), EngineError> {
            self.0.process(input, frames, is_final)
        }
        fn available(&self) -> usize {
            self.0.available()
        }
        fn retrieve(&mut self, output: &mut [&mut [f32]], frames: usize) -> usize {
            self.0.retrieve(output, frames)
        }
        fn latency(&self) -> usize {
            self.0.latency()
        }
        fn reset(&mut self) {
            self.0.reset()
        }
    }

    struct RatioOnlyFactory;

    impl EngineFactory for RatioOnlyFactory {
        type Engine = RatioOnly;

        fn create(&self, config: &EngineConfig) -> Result<RatioOnly, EngineError> {
            let mut engine = RatioOnly(DelayEngine::new(config.channels, 0, 1));
            engine.set_pitch_scale(config.pitch_scale)?;
            Ok(engine)
        }
    }

    #[test]
    fn test_partially_accepted_params_carry_into_next_session() {
        let mut adapter = EngineAdapter::new(RatioOnlyFactory, StretchParams::default());
        adapter.reconfigure(44100, 2).unwrap();

        let requested = StretchParams {
            time_ratio: 1.5,
            pitch_scale: 2.0,
        };
        assert!(adapter.apply_params(requested).is_err());

        let running = StretchParams {
            time_ratio: 1.5,
            pitch_scale: 1.0,
        };
        assert_eq!(adapter.session().unwrap().params(), running);
        assert_eq!(adapter.params(), running);

        adapter.reconfigure(48000, 2).unwrap();
        assert_eq!(adapter.session().unwrap().params(), running);
    }

    #[test]
    fn test_params_stored_without_session() {
        let mut adapter = adapter();
        let stretched = StretchParams {
            time_ratio: 2.0,
            pitch_scale: 1.0,
        };
        assert!(adapter.apply_params(stretched).is_ok());
        assert_eq!(adapter.params(), stretched);

        // The reference engine only supports unity
        assert!(adapter.reconfigure(44100, 2).is_err());
    }
}
