use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    capture::{CaptureProvider, CaptureStream},
    config::{CaptureConstraints, MonitorConfig, MIN_SENSITIVITY},
    detection::{find_peak, ThresholdClassifier},
    session::{AnalysisSession, SessionSettings},
    spectrum::SpectrumSnapshot,
    MonitorError, Result,
};

/// Lifecycle of the acquisition session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    /// Waiting for the platform to grant the capture stream.
    Starting,
    Active,
    Stopping,
    /// The last start attempt failed; the message is in the published state.
    Failed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot of everything presentation code needs.
///
/// `spectrum` and `peak_frequency` are present exactly while `is_analyzing`
/// is true, and `is_high_frequency` is never set outside an active session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisState {
    pub is_analyzing: bool,
    #[serde(rename = "frequencyData")]
    pub spectrum: Option<SpectrumSnapshot>,
    pub peak_frequency: Option<f32>,
    pub is_high_frequency: bool,
    /// Mean raw magnitude of the latest snapshot, `0..=255`.
    #[serde(rename = "audioLevel")]
    pub signal_level: f32,
    pub sensitivity: f32,
    pub error: Option<String>,
    /// Increases by one with every publication.
    pub sequence: u64,
}

impl AnalysisState {
    pub fn idle(sensitivity: f32) -> Self {
        Self {
            is_analyzing: false,
            spectrum: None,
            peak_frequency: None,
            is_high_frequency: false,
            signal_level: 0.0,
            sensitivity,
            error: None,
            sequence: 0,
        }
    }

    /// Checks the presence invariants between the published fields.
    pub fn is_consistent(&self) -> bool {
        let derived_present = self.spectrum.is_some() && self.peak_frequency.is_some();
        let derived_absent = self.spectrum.is_none() && self.peak_frequency.is_none();
        if self.is_analyzing {
            derived_present
        } else {
            derived_absent && !self.is_high_frequency && self.signal_level == 0.0
        }
    }

    fn clear_derived(&mut self) {
        self.is_analyzing = false;
        self.spectrum = None;
        self.peak_frequency = None;
        self.is_high_frequency = false;
        self.signal_level = 0.0;
    }
}

/// Proof that a start attempt is in flight. Hand it back to
/// [`FrequencyMonitor::complete_start`] together with the platform's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTicket {
    generation: u64,
    constraints: CaptureConstraints,
}

impl StartTicket {
    /// Stream configuration to request from the platform.
    pub fn constraints(&self) -> &CaptureConstraints {
        &self.constraints
    }
}

/// Handle for the next scheduled sampling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameToken {
    generation: u64,
    tick: u64,
}

impl FrameToken {
    pub fn tick(&self) -> u64 {
        self.tick
    }
}

/// What happened when a frame was delivered to the sampling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A new state was published and the next tick scheduled.
    Published,
    /// The snapshot could not be read; nothing was published but the loop
    /// keeps running.
    Skipped,
    /// The token was stale or the session is no longer active.
    Cancelled,
}

/// Identifies a registered state subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Subscriber = Box<dyn FnMut(&AnalysisState)>;

/// Acquisition session manager and frame-driven sampling loop.
///
/// Everything runs on the caller's thread. The host asks for the pending
/// [`FrameToken`] after each tick and delivers it back through
/// [`run_frame`](Self::run_frame) on its next display refresh; only the most
/// recently scheduled token of the live session is honoured.
pub struct FrequencyMonitor<P: CaptureProvider> {
    provider: P,
    config: MonitorConfig,
    classifier: ThresholdClassifier,
    phase: SessionPhase,
    session: Option<AnalysisSession>,
    generation: u64,
    pending_start: Option<u64>,
    stop_queued: bool,
    scheduled: Option<FrameToken>,
    sensitivity: f32,
    state: AnalysisState,
    next_subscriber: u64,
    subscribers: Vec<(SubscriberId, Subscriber)>,
}

impl<P: CaptureProvider> FrequencyMonitor<P> {
    pub fn new(provider: P, config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let sensitivity = config.sensitivity;
        Ok(Self {
            provider,
            classifier: ThresholdClassifier::from_settings(&config.detection),
            config,
            phase: SessionPhase::Idle,
            session: None,
            generation: 0,
            pending_start: None,
            stop_queued: false,
            scheduled: None,
            sensitivity,
            state: AnalysisState::idle(sensitivity),
            next_subscriber: 0,
            subscribers: Vec::new(),
        })
    }

    pub fn state(&self) -> &AnalysisState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_analyzing(&self) -> bool {
        self.state.is_analyzing
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn classifier(&self) -> &ThresholdClassifier {
        &self.classifier
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// Settings of the open session, if any.
    pub fn session_settings(&self) -> Option<&SessionSettings> {
        self.session.as_ref().map(AnalysisSession::settings)
    }

    /// Registers a callback invoked after every publication.
    pub fn subscribe(&mut self, subscriber: impl FnMut(&AnalysisState) + 'static) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber);
        self.next_subscriber += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    /// Requests a stream from the provider and opens the analysis session.
    ///
    /// Calling it while already active is a no-op; the existing session is
    /// kept and no second stream is opened.
    pub fn start(&mut self) -> Result<()> {
        if self.phase == SessionPhase::Active {
            tracing::debug!("start ignored, analysis already active");
            return Ok(());
        }

        let ticket = self.begin_start()?;
        let stream = self.provider.request_stream(ticket.constraints());
        self.complete_start(ticket, stream)
    }

    /// First half of [`start`](Self::start) for hosts whose permission
    /// prompt resolves later.
    pub fn begin_start(&mut self) -> Result<StartTicket> {
        match self.phase {
            SessionPhase::Idle | SessionPhase::Failed => {}
            phase => {
                return Err(MonitorError::InvalidTransition {
                    operation: "start",
                    phase,
                })
            }
        }

        self.generation += 1;
        self.pending_start = Some(self.generation);
        self.stop_queued = false;
        self.phase = SessionPhase::Starting;
        self.state.error = None;
        tracing::info!(generation = self.generation, "requesting capture stream");
        self.publish();

        Ok(StartTicket {
            generation: self.generation,
            constraints: self.config.capture.clone(),
        })
    }

    /// Second half of [`start`](Self::start): consumes the platform's answer
    /// to the stream request issued for `ticket`.
    pub fn complete_start(
        &mut self,
        ticket: StartTicket,
        stream: Result<Box<dyn CaptureStream>>,
    ) -> Result<()> {
        if self.phase != SessionPhase::Starting || self.pending_start != Some(ticket.generation) {
            if let Ok(mut stream) = stream {
                stream.stop_all_tracks();
            }
            return Err(MonitorError::InvalidTransition {
                operation: "complete start",
                phase: self.phase,
            });
        }
        self.pending_start = None;

        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                self.stop_queued = false;
                self.fail(&err);
                return Err(err);
            }
        };

        if self.stop_queued {
            self.stop_queued = false;
            let mut stream = stream;
            stream.stop_all_tracks();
            self.phase = SessionPhase::Idle;
            self.state.clear_derived();
            tracing::info!("start settled after stop was requested, stream released");
            self.publish();
            return Ok(());
        }

        let session =
            match AnalysisSession::open(&mut self.provider, stream, &self.config, self.sensitivity) {
                Ok(session) => session,
                Err(err) => {
                    self.fail(&err);
                    return Err(err);
                }
            };

        self.session = Some(session);
        self.phase = SessionPhase::Active;
        self.state.is_analyzing = true;
        self.state.sensitivity = self.sensitivity;

        // The first tick runs inline so the published state never shows an
        // active session without a spectrum.
        let first = FrameToken {
            generation: ticket.generation,
            tick: 0,
        };
        self.scheduled = Some(first);
        self.run_frame(first);
        Ok(())
    }

    /// Tears the session down and returns to idle.
    ///
    /// A no-op when idle. While a start is in flight the stop is queued and
    /// applied once the start settles.
    pub fn stop(&mut self) {
        match self.phase {
            SessionPhase::Idle | SessionPhase::Stopping => return,
            SessionPhase::Starting => {
                tracing::warn!("stop requested while starting, deferring until start settles");
                self.stop_queued = true;
                return;
            }
            SessionPhase::Active | SessionPhase::Failed => {}
        }

        self.phase = SessionPhase::Stopping;
        self.scheduled = None;
        if let Some(mut session) = self.session.take() {
            session.release();
        }
        self.state.clear_derived();
        self.phase = SessionPhase::Idle;
        tracing::info!("analysis stopped");
        self.publish();
    }

    /// Changes the gain applied ahead of the transform and the boost used by
    /// peak detection. Takes effect on the live session immediately.
    ///
    /// Returns the value actually applied; non-positive values are raised to
    /// [`MIN_SENSITIVITY`].
    pub fn adjust_sensitivity(&mut self, value: f32) -> Result<f32> {
        if !value.is_finite() {
            return Err(MonitorError::InvalidSensitivity(value));
        }

        let applied = value.max(MIN_SENSITIVITY);
        self.sensitivity = applied;
        if let Some(session) = self.session.as_mut() {
            session.set_gain(applied);
        }
        self.state.sensitivity = applied;
        tracing::debug!(sensitivity = applied, "sensitivity adjusted");
        self.publish();
        Ok(applied)
    }

    /// Token the host must deliver on its next display refresh.
    pub fn next_frame(&self) -> Option<FrameToken> {
        self.scheduled
    }

    /// Runs one sampling tick for `token` and schedules the following one.
    pub fn run_frame(&mut self, token: FrameToken) -> TickOutcome {
        if self.phase != SessionPhase::Active || self.scheduled != Some(token) {
            return TickOutcome::Cancelled;
        }
        self.scheduled = None;

        let outcome = self.tick();
        if self.phase == SessionPhase::Active {
            self.scheduled = Some(FrameToken {
                generation: token.generation,
                tick: token.tick + 1,
            });
        }
        outcome
    }

    /// Delivers the pending frame, if any.
    pub fn pump(&mut self) -> TickOutcome {
        match self.scheduled {
            Some(token) => self.run_frame(token),
            None => TickOutcome::Cancelled,
        }
    }

    fn tick(&mut self) -> TickOutcome {
        let Some(session) = self.session.as_mut() else {
            return TickOutcome::Cancelled;
        };

        let snapshot = match session.capture() {
            Ok(snapshot) => snapshot,
            Err(err) if self.state.spectrum.is_some() => {
                tracing::warn!(error = %err, "spectrum read failed, skipping tick");
                return TickOutcome::Skipped;
            }
            Err(err) => {
                tracing::warn!(error = %err, "first spectrum read failed, publishing silence");
                SpectrumSnapshot::zeroed(session.settings().bin_count)
            }
        };

        let sample_rate = session.settings().sample_rate;
        let reading = find_peak(&snapshot, sample_rate, self.sensitivity);
        let is_high = self.classifier.is_high_frequency(&reading);
        if is_high && !self.state.is_high_frequency {
            tracing::info!(peak_hz = reading.frequency_hz, "high frequency detected");
        }

        self.state.spectrum = Some(snapshot);
        self.state.peak_frequency = Some(reading.frequency_hz);
        self.state.is_high_frequency = is_high;
        self.state.signal_level = reading.average_level;
        self.publish();
        TickOutcome::Published
    }

    fn fail(&mut self, err: &MonitorError) {
        if let Some(mut session) = self.session.take() {
            session.release();
        }
        self.scheduled = None;
        self.phase = SessionPhase::Failed;
        self.state.clear_derived();
        self.state.error = Some(err.user_message());
        tracing::info!(error = %err, "audio analysis failed to start");
        self.publish();
    }

    fn publish(&mut self) {
        self.state.sequence += 1;
        for (_, subscriber) in &mut self.subscribers {
            subscriber(&self.state);
        }
    }
}

impl<P: CaptureProvider> Drop for FrequencyMonitor<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<P: CaptureProvider> fmt::Debug for FrequencyMonitor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrequencyMonitor")
            .field("phase", &self.phase)
            .field("sensitivity", &self.sensitivity)
            .field("session", &self.session)
            .field("scheduled", &self.scheduled)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
