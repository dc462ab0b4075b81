//! Capability interface for the host audio platform.
//!
//! The monitor never talks to hardware directly. A [`CaptureProvider`] hands
//! out the stream, analysis context and processing nodes, and the session
//! wires them together as `capture -> gain -> transform`.

use crate::{config::CaptureConstraints, Result};

/// Entry point into the host audio platform.
pub trait CaptureProvider {
    /// Asks the platform for a microphone stream. This is the step that may
    /// prompt the user for permission.
    fn request_stream(&mut self, constraints: &CaptureConstraints)
        -> Result<Box<dyn CaptureStream>>;

    /// Opens an analysis context that will host the processing graph.
    fn create_context(&mut self, sample_rate: Option<u32>) -> Result<Box<dyn AnalysisContext>>;
}

/// A live capture stream holding one or more hardware tracks.
pub trait CaptureStream {
    /// Sample rate the device actually delivers, when the platform reports it.
    fn sample_rate(&self) -> Option<u32> {
        None
    }

    /// Stops every track. Must be idempotent.
    fn stop_all_tracks(&mut self);
}

/// Processing graph owner. Closing it invalidates all nodes it created.
pub trait AnalysisContext {
    fn sample_rate(&self) -> u32;

    fn create_transform(&mut self, settings: &TransformSettings) -> Result<Box<dyn TransformNode>>;

    fn create_gain(&mut self, initial_gain: f32) -> Result<Box<dyn GainNode>>;

    /// Routes `stream` through `gain` into `transform`.
    fn connect(
        &mut self,
        stream: &mut dyn CaptureStream,
        gain: &mut dyn GainNode,
        transform: &mut dyn TransformNode,
    ) -> Result<()>;

    /// Closes the context. Must be idempotent.
    fn close(&mut self);
}

/// Time-to-frequency node producing byte magnitudes.
pub trait TransformNode {
    /// `fft_size / 2`.
    fn bin_count(&self) -> usize;

    /// Fills `out` (of length [`bin_count`](Self::bin_count)) with the
    /// current smoothed magnitudes.
    fn read_magnitudes(&mut self, out: &mut [u8]) -> Result<()>;

    fn disconnect(&mut self);
}

/// Variable gain stage between the source and the transform.
pub trait GainNode {
    fn gain(&self) -> f32;

    fn set_gain(&mut self, gain: f32);

    fn disconnect(&mut self);
}

/// Parameters handed to [`AnalysisContext::create_transform`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformSettings {
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl From<&crate::config::AnalyserSettings> for TransformSettings {
    fn from(value: &crate::config::AnalyserSettings) -> Self {
        Self {
            fft_size: value.fft_size,
            smoothing: value.smoothing,
            min_decibels: value.min_decibels,
            max_decibels: value.max_decibels,
        }
    }
}
