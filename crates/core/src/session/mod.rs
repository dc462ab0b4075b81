use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    capture::{AnalysisContext, CaptureProvider, CaptureStream, GainNode, TransformSettings},
    config::MonitorConfig,
    spectrum::{SpectralTransform, SpectrumSnapshot},
    MonitorError, Result,
};

/// Parameters of an open capture-to-analyser pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub sample_rate: u32,
    pub bin_count: usize,
    pub smoothing: f32,
    pub sensitivity: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

/// Owns every platform resource of one analysis run.
///
/// Resources are released by [`release`](Self::release) in a fixed order
/// (tracks, gain, transform, context), either explicitly or on drop. A
/// session that fails half-way through [`open`](Self::open) releases
/// whatever it had already acquired before the error is returned.
pub struct AnalysisSession {
    settings: SessionSettings,
    stream: Option<Box<dyn CaptureStream>>,
    gain: Option<Box<dyn GainNode>>,
    transform: Option<SpectralTransform>,
    context: Option<Box<dyn AnalysisContext>>,
}

impl AnalysisSession {
    /// Builds `stream -> gain -> transform` inside a fresh analysis context.
    pub fn open<P>(
        provider: &mut P,
        stream: Box<dyn CaptureStream>,
        config: &MonitorConfig,
        sensitivity: f32,
    ) -> Result<Self>
    where
        P: CaptureProvider + ?Sized,
    {
        let preferred_rate = stream.sample_rate().or(config.capture.sample_rate);
        let analyser = &config.analyser;
        let mut session = Self {
            settings: SessionSettings {
                sample_rate: preferred_rate.unwrap_or_default(),
                bin_count: analyser.bin_count(),
                smoothing: analyser.smoothing,
                sensitivity,
                min_decibels: analyser.min_decibels,
                max_decibels: analyser.max_decibels,
            },
            stream: Some(stream),
            gain: None,
            transform: None,
            context: None,
        };

        let context = session
            .context
            .insert(provider.create_context(preferred_rate)?);
        session.settings.sample_rate = context.sample_rate();
        if session.settings.sample_rate == 0 {
            return Err(MonitorError::Platform(
                "analysis context reported a zero sample rate".to_string(),
            ));
        }

        let gain = session.gain.insert(context.create_gain(sensitivity)?);
        let node = context.create_transform(&TransformSettings::from(analyser))?;
        let transform = session.transform.insert(SpectralTransform::new(node));
        session.settings.bin_count = transform.bin_count();

        if let Some(stream) = session.stream.as_deref_mut() {
            context.connect(stream, &mut **gain, transform.node_mut())?;
        }

        tracing::info!(
            sample_rate = session.settings.sample_rate,
            bin_count = session.settings.bin_count,
            smoothing = session.settings.smoothing,
            "analysis session opened"
        );
        Ok(session)
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
            && self.gain.is_some()
            && self.transform.is_some()
            && self.context.is_some()
    }

    /// Pulls one spectrum snapshot from the transform.
    pub fn capture(&mut self) -> Result<SpectrumSnapshot> {
        match self.transform.as_mut() {
            Some(transform) => transform.capture(),
            None => Err(MonitorError::InvalidInput("analysis session has been released")),
        }
    }

    /// Updates the live gain stage without rebuilding the graph.
    pub fn set_gain(&mut self, gain: f32) {
        if let Some(node) = self.gain.as_mut() {
            node.set_gain(gain);
        }
        self.settings.sensitivity = gain;
    }

    pub fn gain(&self) -> Option<f32> {
        self.gain.as_ref().map(|node| node.gain())
    }

    /// Releases every resource. Calling it again is a no-op.
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop_all_tracks();
            tracing::debug!("capture tracks stopped");
        }
        if let Some(mut gain) = self.gain.take() {
            gain.disconnect();
            tracing::debug!("gain stage disconnected");
        }
        if let Some(mut transform) = self.transform.take() {
            transform.disconnect();
            tracing::debug!("transform disconnected");
        }
        if let Some(mut context) = self.context.take() {
            context.close();
            tracing::debug!("analysis context closed");
        }
    }
}

impl Drop for AnalysisSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for AnalysisSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisSession")
            .field("settings", &self.settings)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeFailure, FakeProvider, FakeStream};

    const RELEASE_ORDER: [&str; 4] = [
        "stream.stop",
        "gain.disconnect",
        "transform.disconnect",
        "context.close",
    ];

    fn released(provider: &FakeProvider) -> Vec<&'static str> {
        provider
            .log
            .events()
            .into_iter()
            .filter(|event| RELEASE_ORDER.contains(event))
            .collect()
    }

    #[test]
    fn opens_and_wires_the_graph() {
        let mut provider = FakeProvider::new(44_100);
        let stream = FakeStream::boxed(&provider.log);
        let config = MonitorConfig::enhanced();
        let session = AnalysisSession::open(&mut provider, stream, &config, 2.0).unwrap();

        assert!(session.is_open());
        assert_eq!(session.settings().sample_rate, 44_100);
        assert_eq!(session.settings().bin_count, 4096);
        assert_eq!(session.gain(), Some(2.0));
        assert_eq!(
            provider.log.events(),
            vec!["stream.open", "context.open", "gain.open", "transform.open", "connect"]
        );
    }

    #[test]
    fn release_runs_in_fixed_order_once() {
        let mut provider = FakeProvider::new(48_000);
        let stream = FakeStream::boxed(&provider.log);
        let config = MonitorConfig::baseline();
        let mut session = AnalysisSession::open(&mut provider, stream, &config, 1.0).unwrap();

        session.release();
        session.release();
        drop(session);
        assert_eq!(released(&provider), RELEASE_ORDER.to_vec());
    }

    #[test]
    fn drop_releases_everything() {
        let mut provider = FakeProvider::new(48_000);
        let stream = FakeStream::boxed(&provider.log);
        let config = MonitorConfig::baseline();
        {
            let _session = AnalysisSession::open(&mut provider, stream, &config, 1.0).unwrap();
        }
        assert_eq!(released(&provider), RELEASE_ORDER.to_vec());
    }

    #[test]
    fn partial_open_releases_what_was_acquired() {
        for (failure, expected) in [
            (FakeFailure::Context, vec!["stream.stop"]),
            (FakeFailure::Gain, vec!["stream.stop", "context.close"]),
            (
                FakeFailure::Transform,
                vec!["stream.stop", "gain.disconnect", "context.close"],
            ),
            (FakeFailure::Connect, RELEASE_ORDER.to_vec()),
        ] {
            let mut provider = FakeProvider::failing(48_000, failure);
            let stream = FakeStream::boxed(&provider.log);
            let config = MonitorConfig::baseline();
            let result = AnalysisSession::open(&mut provider, stream, &config, 1.0);
            assert!(result.is_err(), "{failure:?} should fail");
            assert_eq!(released(&provider), expected, "{failure:?}");
        }
    }

    #[test]
    fn zero_rate_context_is_refused() {
        let mut provider = FakeProvider::new(0);
        let stream = FakeStream::boxed(&provider.log);
        let config = MonitorConfig::baseline();
        let result = AnalysisSession::open(&mut provider, stream, &config, 1.0);
        assert!(matches!(result, Err(MonitorError::Platform(_))));
        assert_eq!(released(&provider), vec!["stream.stop", "context.close"]);
    }

    #[test]
    fn released_session_cannot_capture() {
        let mut provider = FakeProvider::new(48_000);
        let stream = FakeStream::boxed(&provider.log);
        let config = MonitorConfig::baseline();
        let mut session = AnalysisSession::open(&mut provider, stream, &config, 1.0).unwrap();
        assert!(session.capture().is_ok());
        session.release();
        assert!(!session.is_open());
        assert!(session.capture().is_err());
    }

    #[test]
    fn gain_updates_reach_the_node() {
        let mut provider = FakeProvider::new(48_000);
        let stream = FakeStream::boxed(&provider.log);
        let config = MonitorConfig::baseline();
        let mut session = AnalysisSession::open(&mut provider, stream, &config, 1.0).unwrap();
        session.set_gain(3.5);
        assert_eq!(provider.gain.get(), 3.5);
        assert_eq!(session.settings().sensitivity, 3.5);
    }
}
