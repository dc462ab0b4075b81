//! Scripted capture provider used by the unit tests.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};

use crate::{
    capture::{
        AnalysisContext, CaptureProvider, CaptureStream, GainNode, TransformNode,
        TransformSettings,
    },
    config::CaptureConstraints,
    MonitorError, Result,
};

/// Ordered record of every acquire/release call.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventLog(Rc<RefCell<Vec<&'static str>>>);

impl EventLog {
    pub(crate) fn push(&self, event: &'static str) {
        self.0.borrow_mut().push(event);
    }

    pub(crate) fn events(&self) -> Vec<&'static str> {
        self.0.borrow().clone()
    }

    pub(crate) fn count(&self, event: &str) -> usize {
        self.0.borrow().iter().filter(|e| **e == event).count()
    }

    pub(crate) fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ScriptedRead {
    Frame(Vec<u8>),
    Fail,
}

type Script = Rc<RefCell<VecDeque<ScriptedRead>>>;

/// Transform node replaying a fixed list of reads, then silence.
#[derive(Debug)]
pub(crate) struct ScriptedTransform {
    bin_count: usize,
    script: Script,
    log: EventLog,
}

impl ScriptedTransform {
    pub(crate) fn new(bin_count: usize, frames: Vec<Vec<u8>>) -> Self {
        Self {
            bin_count,
            script: Rc::new(RefCell::new(
                frames.into_iter().map(ScriptedRead::Frame).collect(),
            )),
            log: EventLog::default(),
        }
    }
}

impl TransformNode for ScriptedTransform {
    fn bin_count(&self) -> usize {
        self.bin_count
    }

    fn read_magnitudes(&mut self, out: &mut [u8]) -> Result<()> {
        match self.script.borrow_mut().pop_front() {
            Some(ScriptedRead::Frame(frame)) => {
                if frame.len() != out.len() {
                    return Err(MonitorError::InvalidInput("scripted frame has wrong length"));
                }
                out.copy_from_slice(&frame);
                Ok(())
            }
            Some(ScriptedRead::Fail) => Err(MonitorError::Platform("read failed".into())),
            None => {
                out.fill(0);
                Ok(())
            }
        }
    }

    fn disconnect(&mut self) {
        self.log.push("transform.disconnect");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FakeFailure {
    Permission,
    Device,
    Context,
    Gain,
    Transform,
    Connect,
}

/// Provider whose transform replays scripted spectra.
#[derive(Debug, Clone)]
pub(crate) struct FakeProvider {
    pub(crate) sample_rate: u32,
    pub(crate) log: EventLog,
    pub(crate) failure: Option<FakeFailure>,
    pub(crate) gain: Rc<Cell<f32>>,
    pub(crate) streams_requested: Rc<Cell<usize>>,
    script: Script,
}

impl FakeProvider {
    pub(crate) fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            log: EventLog::default(),
            failure: None,
            gain: Rc::new(Cell::new(0.0)),
            streams_requested: Rc::new(Cell::new(0)),
            script: Script::default(),
        }
    }

    pub(crate) fn failing(sample_rate: u32, failure: FakeFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::new(sample_rate)
        }
    }

    pub(crate) fn push_frame(&self, frame: Vec<u8>) {
        self.script.borrow_mut().push_back(ScriptedRead::Frame(frame));
    }

    pub(crate) fn push_failure(&self) {
        self.script.borrow_mut().push_back(ScriptedRead::Fail);
    }

    fn check(&self, failure: FakeFailure) -> Result<()> {
        if self.failure == Some(failure) {
            return Err(match failure {
                FakeFailure::Permission => MonitorError::PermissionDenied,
                FakeFailure::Device => MonitorError::DeviceUnavailable,
                _ => MonitorError::Platform(format!("{failure:?} failed")),
            });
        }
        Ok(())
    }
}

impl CaptureProvider for FakeProvider {
    fn request_stream(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>> {
        self.streams_requested.set(self.streams_requested.get() + 1);
        assert_eq!(constraints.channel_count, 1);
        self.check(FakeFailure::Permission)?;
        self.check(FakeFailure::Device)?;
        self.log.push("stream.open");
        Ok(Box::new(FakeStream {
            log: self.log.clone(),
            stopped: false,
        }))
    }

    fn create_context(&mut self, _sample_rate: Option<u32>) -> Result<Box<dyn AnalysisContext>> {
        self.check(FakeFailure::Context)?;
        self.log.push("context.open");
        Ok(Box::new(FakeContext {
            provider: self.clone(),
        }))
    }
}

pub(crate) struct FakeStream {
    log: EventLog,
    stopped: bool,
}

impl FakeStream {
    pub(crate) fn boxed(log: &EventLog) -> Box<dyn CaptureStream> {
        log.push("stream.open");
        Box::new(Self {
            log: log.clone(),
            stopped: false,
        })
    }
}

impl CaptureStream for FakeStream {
    fn stop_all_tracks(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.log.push("stream.stop");
        }
    }
}

struct FakeContext {
    provider: FakeProvider,
}

impl AnalysisContext for FakeContext {
    fn sample_rate(&self) -> u32 {
        self.provider.sample_rate
    }

    fn create_transform(&mut self, settings: &TransformSettings) -> Result<Box<dyn TransformNode>> {
        self.provider.check(FakeFailure::Transform)?;
        self.provider.log.push("transform.open");
        Ok(Box::new(ScriptedTransform {
            bin_count: settings.fft_size / 2,
            script: self.provider.script.clone(),
            log: self.provider.log.clone(),
        }))
    }

    fn create_gain(&mut self, initial_gain: f32) -> Result<Box<dyn GainNode>> {
        self.provider.check(FakeFailure::Gain)?;
        self.provider.log.push("gain.open");
        self.provider.gain.set(initial_gain);
        Ok(Box::new(FakeGain {
            value: self.provider.gain.clone(),
            log: self.provider.log.clone(),
        }))
    }

    fn connect(
        &mut self,
        _stream: &mut dyn CaptureStream,
        _gain: &mut dyn GainNode,
        _transform: &mut dyn TransformNode,
    ) -> Result<()> {
        self.provider.check(FakeFailure::Connect)?;
        self.provider.log.push("connect");
        Ok(())
    }

    fn close(&mut self) {
        self.provider.log.push("context.close");
    }
}

struct FakeGain {
    value: Rc<Cell<f32>>,
    log: EventLog,
}

impl GainNode for FakeGain {
    fn gain(&self) -> f32 {
        self.value.get()
    }

    fn set_gain(&mut self, gain: f32) {
        self.value.set(gain);
    }

    fn disconnect(&mut self) {
        self.log.push("gain.disconnect");
    }
}
