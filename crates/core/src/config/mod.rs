use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{detection::DetectionPolicy, MonitorError, Result};

/// Peaks above this frequency raise the high frequency alert.
pub const HIGH_FREQ_THRESHOLD_HZ: f32 = 20_000.0;
/// Mean magnitude a spectrum must exceed before a gated detector trusts its peak.
pub const MIN_SIGNAL_LEVEL: f32 = 10.0;
/// Smallest gain accepted by the sensitivity control.
pub const MIN_SENSITIVITY: f32 = 0.01;
/// Refresh cadence assumed when the host does not report one.
pub const DEFAULT_FRAME_RATE: u32 = 60;

const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32_768;

/// The two shipped tunings of the analyser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Coarse, heavily smoothed transform that alerts on the peak alone.
    #[default]
    Baseline,
    /// Fine, responsive transform with a boosted gain and a minimum level guard.
    Enhanced,
}

/// Top-level configuration structure for the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub analyser: AnalyserSettings,
    pub detection: DetectionSettings,
    pub capture: CaptureConstraints,
    /// Initial gain applied between the capture source and the transform.
    pub sensitivity: f32,
    /// Display refresh rate used to pace sampling ticks.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::for_variant(Variant::default())
    }
}

impl MonitorConfig {
    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Baseline => Self {
                analyser: AnalyserSettings {
                    fft_size: 2048,
                    smoothing: 0.8,
                    min_decibels: -100.0,
                    max_decibels: -30.0,
                },
                detection: DetectionSettings {
                    threshold_hz: HIGH_FREQ_THRESHOLD_HZ,
                    policy: DetectionPolicy::PeakOnly,
                },
                capture: CaptureConstraints::default(),
                sensitivity: 1.0,
                frame_rate: DEFAULT_FRAME_RATE,
            },
            Variant::Enhanced => Self {
                analyser: AnalyserSettings {
                    fft_size: 8192,
                    smoothing: 0.3,
                    min_decibels: -90.0,
                    max_decibels: -10.0,
                },
                detection: DetectionSettings {
                    threshold_hz: HIGH_FREQ_THRESHOLD_HZ,
                    policy: DetectionPolicy::SignalGated {
                        min_level: MIN_SIGNAL_LEVEL,
                    },
                },
                capture: CaptureConstraints::default(),
                sensitivity: 1.5,
                frame_rate: DEFAULT_FRAME_RATE,
            },
        }
    }

    pub fn baseline() -> Self {
        Self::for_variant(Variant::Baseline)
    }

    pub fn enhanced() -> Self {
        Self::for_variant(Variant::Enhanced)
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.analyser.validate()?;
        if !self.detection.threshold_hz.is_finite() || self.detection.threshold_hz < 0.0 {
            return Err(MonitorError::InvalidInput(
                "detection threshold must be a non-negative frequency",
            ));
        }
        if let DetectionPolicy::SignalGated { min_level } = self.detection.policy {
            if !(0.0..=255.0).contains(&min_level) {
                return Err(MonitorError::InvalidInput(
                    "minimum signal level must lie within 0..=255",
                ));
            }
        }
        if !self.sensitivity.is_finite() || self.sensitivity <= 0.0 {
            return Err(MonitorError::InvalidSensitivity(self.sensitivity));
        }
        if self.frame_rate == 0 {
            return Err(MonitorError::InvalidInput("frame rate must be positive"));
        }
        if self.capture.sample_rate == Some(0) {
            return Err(MonitorError::InvalidInput("capture sample rate must be positive"));
        }
        if self.capture.channel_count == 0 {
            return Err(MonitorError::InvalidInput("capture needs at least one channel"));
        }
        Ok(())
    }
}

/// Parameters of the time-to-frequency transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyserSettings {
    pub fft_size: usize,
    /// Exponential smoothing weight in `0.0..=1.0`; lower reacts faster.
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl AnalyserSettings {
    /// Number of magnitude bins produced per snapshot.
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two()
            || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(MonitorError::InvalidInput(
                "fft size must be a power of two between 32 and 32768",
            ));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(MonitorError::InvalidInput(
                "smoothing constant must lie within 0.0..=1.0",
            ));
        }
        if !(self.min_decibels < self.max_decibels) {
            return Err(MonitorError::InvalidInput(
                "min decibels must be below max decibels",
            ));
        }
        Ok(())
    }
}

/// Threshold decision parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionSettings {
    pub threshold_hz: f32,
    pub policy: DetectionPolicy,
}

/// Stream request handed to the capture provider. Every platform noise
/// shaping stage is disabled by default so ultrasonic content survives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub sample_rate: Option<u32>,
    pub channel_count: u16,
    pub echo_cancellation: bool,
    pub auto_gain_control: bool,
    pub noise_suppression: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            sample_rate: Some(48_000),
            channel_count: 1,
            echo_cancellation: false,
            auto_gain_control: false,
            noise_suppression: false,
        }
    }
}

fn default_frame_rate() -> u32 {
    DEFAULT_FRAME_RATE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        MonitorConfig::baseline().validate().unwrap();
        MonitorConfig::enhanced().validate().unwrap();
        assert_eq!(MonitorConfig::baseline().analyser.bin_count(), 1024);
        assert_eq!(MonitorConfig::enhanced().analyser.bin_count(), 4096);
    }

    #[test]
    fn presets_match_their_variant() {
        let baseline = MonitorConfig::baseline();
        assert_eq!(baseline.analyser.fft_size, 2048);
        assert_eq!(baseline.analyser.smoothing, 0.8);
        assert_eq!(baseline.sensitivity, 1.0);
        assert_eq!(baseline.detection.threshold_hz, HIGH_FREQ_THRESHOLD_HZ);
        assert_eq!(baseline.detection.policy, DetectionPolicy::PeakOnly);

        let enhanced = MonitorConfig::enhanced();
        assert_eq!(enhanced.analyser.fft_size, 8192);
        assert_eq!(enhanced.analyser.smoothing, 0.3);
        assert_eq!(enhanced.sensitivity, 1.5);
        assert_eq!(enhanced.detection.threshold_hz, HIGH_FREQ_THRESHOLD_HZ);
        assert_eq!(
            enhanced.detection.policy,
            DetectionPolicy::SignalGated {
                min_level: MIN_SIGNAL_LEVEL
            }
        );
    }

    #[test]
    fn capture_disables_noise_shaping() {
        let capture = CaptureConstraints::default();
        assert_eq!(capture.channel_count, 1);
        assert!(!capture.echo_cancellation);
        assert!(!capture.auto_gain_control);
        assert!(!capture.noise_suppression);
    }

    #[test]
    fn round_trips_through_json() {
        let config = MonitorConfig::enhanced();
        let json = config.to_json_pretty().unwrap();
        let parsed = MonitorConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn frame_rate_defaults_when_missing() {
        let mut value = serde_json::to_value(MonitorConfig::baseline()).unwrap();
        value.as_object_mut().unwrap().remove("frame_rate");
        let parsed = MonitorConfig::from_json_str(&value.to_string()).unwrap();
        assert_eq!(parsed.frame_rate, DEFAULT_FRAME_RATE);
    }

    #[test]
    fn rejects_bad_transform_settings() {
        let mut config = MonitorConfig::baseline();
        config.analyser.fft_size = 1000;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::baseline();
        config.analyser.smoothing = 1.5;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::baseline();
        config.analyser.min_decibels = -10.0;
        config.analyser.max_decibels = -20.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_a_zero_sample_rate() {
        let mut config = MonitorConfig::baseline();
        config.capture.sample_rate = Some(0);
        assert!(matches!(
            config.validate(),
            Err(MonitorError::InvalidInput(_))
        ));

        let mut value = serde_json::to_value(MonitorConfig::baseline()).unwrap();
        value["capture"]["sample_rate"] = serde_json::json!(0);
        assert!(MonitorConfig::from_json_str(&value.to_string()).is_err());

        config.capture.sample_rate = None;
        config.validate().unwrap();
    }

    #[test]
    fn rejects_non_positive_sensitivity() {
        let mut config = MonitorConfig::baseline();
        config.sensitivity = 0.0;
        assert!(matches!(
            config.validate(),
            Err(MonitorError::InvalidSensitivity(_))
        ));
    }
}
