//! Core library for the Ultrasonic Monitor.
//!
//! The crate turns a microphone stream into a continuously updated
//! [`AnalysisState`]: byte spectrum, dominant frequency, mean signal level and
//! a high frequency alert raised above 20 kHz. Audio hardware is reached only
//! through the [`CaptureProvider`] capability so every stage can run against
//! synthetic or scripted input.

pub mod alert;
pub mod analyser;
pub mod capture;
pub mod config;
pub mod detection;
pub mod error;
pub mod monitor;
pub mod session;
pub mod spectrum;
pub mod synthetic;
pub mod timeline;

#[cfg(test)]
pub(crate) mod fake;

pub use alert::{format_frequency, meter_fraction, AlertEvent, AlertTracker};
pub use analyser::SpectrumAnalyser;
pub use capture::{
    AnalysisContext, CaptureProvider, CaptureStream, GainNode, TransformNode, TransformSettings,
};
pub use config::{
    AnalyserSettings, CaptureConstraints, DetectionSettings, MonitorConfig, Variant,
    HIGH_FREQ_THRESHOLD_HZ, MIN_SENSITIVITY, MIN_SIGNAL_LEVEL,
};
pub use detection::{bin_frequency, find_peak, DetectionPolicy, PeakReading, ThresholdClassifier};
pub use error::{MonitorError, Result};
pub use monitor::{
    AnalysisState, FrameToken, FrequencyMonitor, SessionPhase, StartTicket, SubscriberId,
    TickOutcome,
};
pub use session::{AnalysisSession, SessionSettings};
pub use spectrum::{SpectralTransform, SpectrumSnapshot};
pub use synthetic::{Mix, SignalSource, Silence, SimulatedFailure, SyntheticProvider, Tone};
pub use timeline::FrameClock;
