//! Built-in capture provider fed by deterministic signal generators.
//!
//! Every call to [`TransformNode::read_magnitudes`] advances the signal by one
//! display frame (`sample_rate / frame_rate` samples), runs it through the
//! gain stage and into a [`SpectrumAnalyser`].

use std::{cell::RefCell, f32::consts::TAU, fmt, rc::Rc};

use crate::{
    analyser::SpectrumAnalyser,
    capture::{
        AnalysisContext, CaptureProvider, CaptureStream, GainNode, TransformNode,
        TransformSettings,
    },
    config::{CaptureConstraints, DEFAULT_FRAME_RATE},
    MonitorError, Result,
};

/// Produces time-domain samples for the synthetic microphone.
pub trait SignalSource {
    fn fill(&mut self, sample_rate: u32, out: &mut [f32]);
}

/// Pure sine tone with a continuous phase across frames.
#[derive(Debug, Clone)]
pub struct Tone {
    pub frequency_hz: f32,
    pub amplitude: f32,
    phase: f32,
}

impl Tone {
    pub fn new(frequency_hz: f32, amplitude: f32) -> Self {
        Self {
            frequency_hz,
            amplitude,
            phase: 0.0,
        }
    }
}

impl SignalSource for Tone {
    fn fill(&mut self, sample_rate: u32, out: &mut [f32]) {
        let step = TAU * self.frequency_hz / sample_rate.max(1) as f32;
        for sample in out.iter_mut() {
            *sample = self.amplitude * self.phase.sin();
            self.phase = (self.phase + step) % TAU;
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Silence;

impl SignalSource for Silence {
    fn fill(&mut self, _sample_rate: u32, out: &mut [f32]) {
        out.fill(0.0);
    }
}

/// Sum of several sources.
#[derive(Default)]
pub struct Mix {
    sources: Vec<Box<dyn SignalSource>>,
    buffer: Vec<f32>,
}

impl Mix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: impl SignalSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl SignalSource for Mix {
    fn fill(&mut self, sample_rate: u32, out: &mut [f32]) {
        out.fill(0.0);
        self.buffer.resize(out.len(), 0.0);
        for source in &mut self.sources {
            source.fill(sample_rate, &mut self.buffer);
            for (sum, sample) in out.iter_mut().zip(&self.buffer) {
                *sum += *sample;
            }
        }
    }
}

impl fmt::Debug for Mix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mix")
            .field("sources", &self.sources.len())
            .finish()
    }
}

/// Failure the provider simulates instead of granting a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedFailure {
    PermissionDenied,
    DeviceUnavailable,
    PlatformUnsupported,
    /// The stream is granted but the analysis context cannot be opened.
    ContextUnavailable,
}

type SharedSource = Rc<RefCell<Box<dyn SignalSource>>>;

struct Bus {
    source: SharedSource,
    live: bool,
}

struct Graph {
    bus: Option<Rc<RefCell<Bus>>>,
    sample_rate: u32,
    samples_per_frame: usize,
    gain: f32,
    connected: bool,
    closed: bool,
}

/// [`CaptureProvider`] that synthesises its microphone input.
pub struct SyntheticProvider {
    source: SharedSource,
    sample_rate: u32,
    frame_rate: u32,
    failure: Option<SimulatedFailure>,
    granted: Option<Rc<RefCell<Bus>>>,
}

impl SyntheticProvider {
    pub fn new(source: impl SignalSource + 'static) -> Self {
        let source: Box<dyn SignalSource> = Box::new(source);
        Self {
            source: Rc::new(RefCell::new(source)),
            sample_rate: 48_000,
            frame_rate: DEFAULT_FRAME_RATE,
            failure: None,
            granted: None,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate.max(1);
        self
    }

    /// Makes subsequent start attempts fail with `failure`.
    pub fn fail_with(&mut self, failure: Option<SimulatedFailure>) {
        self.failure = failure;
    }

    /// Swaps the signal heard by current and future streams.
    pub fn set_source(&mut self, source: impl SignalSource + 'static) {
        *self.source.borrow_mut() = Box::new(source);
    }

    /// True while a granted stream still has live tracks.
    pub fn has_live_stream(&self) -> bool {
        self.granted
            .as_ref()
            .map(|bus| bus.borrow().live)
            .unwrap_or(false)
    }
}

impl fmt::Debug for SyntheticProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntheticProvider")
            .field("sample_rate", &self.sample_rate)
            .field("frame_rate", &self.frame_rate)
            .field("failure", &self.failure)
            .finish()
    }
}

impl CaptureProvider for SyntheticProvider {
    fn request_stream(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>> {
        match self.failure {
            Some(SimulatedFailure::PermissionDenied) => return Err(MonitorError::PermissionDenied),
            Some(SimulatedFailure::DeviceUnavailable) => {
                return Err(MonitorError::DeviceUnavailable)
            }
            Some(SimulatedFailure::PlatformUnsupported) => {
                return Err(MonitorError::PlatformUnsupported)
            }
            _ => {}
        }

        if let Some(rate) = constraints.sample_rate {
            self.sample_rate = rate;
        }
        let bus = Rc::new(RefCell::new(Bus {
            source: self.source.clone(),
            live: true,
        }));
        self.granted = Some(bus.clone());
        Ok(Box::new(SyntheticStream {
            bus,
            sample_rate: self.sample_rate,
        }))
    }

    fn create_context(&mut self, sample_rate: Option<u32>) -> Result<Box<dyn AnalysisContext>> {
        if self.failure == Some(SimulatedFailure::ContextUnavailable) {
            return Err(MonitorError::Platform(
                "analysis context could not be created".into(),
            ));
        }

        let sample_rate = sample_rate.unwrap_or(self.sample_rate);
        let samples_per_frame = (sample_rate / self.frame_rate).max(1) as usize;
        Ok(Box::new(SyntheticContext {
            graph: Rc::new(RefCell::new(Graph {
                bus: self.granted.clone(),
                sample_rate,
                samples_per_frame,
                gain: 1.0,
                connected: false,
                closed: false,
            })),
        }))
    }
}

struct SyntheticStream {
    bus: Rc<RefCell<Bus>>,
    sample_rate: u32,
}

impl CaptureStream for SyntheticStream {
    fn sample_rate(&self) -> Option<u32> {
        Some(self.sample_rate)
    }

    fn stop_all_tracks(&mut self) {
        self.bus.borrow_mut().live = false;
    }
}

struct SyntheticContext {
    graph: Rc<RefCell<Graph>>,
}

impl AnalysisContext for SyntheticContext {
    fn sample_rate(&self) -> u32 {
        self.graph.borrow().sample_rate
    }

    fn create_transform(&mut self, settings: &TransformSettings) -> Result<Box<dyn TransformNode>> {
        Ok(Box::new(SyntheticTransform {
            graph: self.graph.clone(),
            analyser: SpectrumAnalyser::new(*settings)?,
            frame: Vec::new(),
        }))
    }

    fn create_gain(&mut self, initial_gain: f32) -> Result<Box<dyn GainNode>> {
        self.graph.borrow_mut().gain = initial_gain;
        Ok(Box::new(SyntheticGain {
            graph: self.graph.clone(),
        }))
    }

    fn connect(
        &mut self,
        _stream: &mut dyn CaptureStream,
        _gain: &mut dyn GainNode,
        _transform: &mut dyn TransformNode,
    ) -> Result<()> {
        let mut graph = self.graph.borrow_mut();
        if graph.closed {
            return Err(MonitorError::Platform("analysis context is closed".into()));
        }
        if graph.bus.is_none() {
            return Err(MonitorError::Platform(
                "no capture stream has been granted".into(),
            ));
        }
        graph.connected = true;
        Ok(())
    }

    fn close(&mut self) {
        let mut graph = self.graph.borrow_mut();
        graph.closed = true;
        graph.connected = false;
    }
}

struct SyntheticGain {
    graph: Rc<RefCell<Graph>>,
}

impl GainNode for SyntheticGain {
    fn gain(&self) -> f32 {
        self.graph.borrow().gain
    }

    fn set_gain(&mut self, gain: f32) {
        self.graph.borrow_mut().gain = gain;
    }

    fn disconnect(&mut self) {
        self.graph.borrow_mut().connected = false;
    }
}

struct SyntheticTransform {
    graph: Rc<RefCell<Graph>>,
    analyser: SpectrumAnalyser,
    frame: Vec<f32>,
}

impl TransformNode for SyntheticTransform {
    fn bin_count(&self) -> usize {
        self.analyser.bin_count()
    }

    fn read_magnitudes(&mut self, out: &mut [u8]) -> Result<()> {
        let graph = self.graph.borrow();
        if graph.closed {
            return Err(MonitorError::Platform("analysis context is closed".into()));
        }

        if graph.connected {
            if let Some(bus) = &graph.bus {
                let bus = bus.borrow();
                if bus.live {
                    self.frame.resize(graph.samples_per_frame, 0.0);
                    bus.source
                        .borrow_mut()
                        .fill(graph.sample_rate, &mut self.frame);
                    for sample in &mut self.frame {
                        *sample *= graph.gain;
                    }
                    self.analyser.push_samples(&self.frame);
                }
            }
        }

        self.analyser.byte_frequency_data(out)
    }

    fn disconnect(&mut self) {
        self.graph.borrow_mut().connected = false;
    }
}
