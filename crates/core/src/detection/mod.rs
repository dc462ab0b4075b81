use serde::{Deserialize, Serialize};

use crate::config::{DetectionSettings, HIGH_FREQ_THRESHOLD_HZ, MIN_SIGNAL_LEVEL};

/// Result of scanning a single spectrum snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PeakReading {
    /// Index of the winning bin.
    pub bin: usize,
    pub frequency_hz: f32,
    /// Arithmetic mean of the raw (unboosted) bin magnitudes.
    pub average_level: f32,
}

/// Scans `spectrum` for its dominant bin.
///
/// Every magnitude is multiplied by `sensitivity` before comparison. The
/// first bin to reach the maximum wins; later bins must be strictly greater
/// to replace it, so uniform scaling never changes the winner. The bin index
/// is mapped linearly onto `0..nyquist`. An empty or all-zero spectrum
/// yields bin 0 at 0 Hz.
pub fn find_peak(spectrum: &[u8], sample_rate: u32, sensitivity: f32) -> PeakReading {
    if spectrum.is_empty() {
        return PeakReading::default();
    }

    let mut peak_bin = 0;
    let mut peak_value = 0.0_f32;
    let mut total = 0_u64;

    for (index, &magnitude) in spectrum.iter().enumerate() {
        total += u64::from(magnitude);
        let boosted = f32::from(magnitude) * sensitivity;
        if boosted > peak_value {
            peak_value = boosted;
            peak_bin = index;
        }
    }

    PeakReading {
        bin: peak_bin,
        frequency_hz: bin_frequency(peak_bin, spectrum.len(), sample_rate),
        average_level: total as f32 / spectrum.len() as f32,
    }
}

/// Centre frequency assigned to `bin` in a spectrum of `bin_count` bins.
pub fn bin_frequency(bin: usize, bin_count: usize, sample_rate: u32) -> f32 {
    if bin_count == 0 {
        return 0.0;
    }
    (bin as f32 * sample_rate as f32) / (2.0 * bin_count as f32)
}

/// Whether the classifier requires a minimum signal level before alerting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionPolicy {
    /// Alert on the peak frequency alone.
    PeakOnly,
    /// Alert only when the mean magnitude also exceeds `min_level`, which
    /// keeps noise-floor peaks in near-silent spectra from triggering.
    SignalGated { min_level: f32 },
}

impl DetectionPolicy {
    pub fn gated() -> Self {
        Self::SignalGated {
            min_level: MIN_SIGNAL_LEVEL,
        }
    }
}

/// Stateless mapping from a [`PeakReading`] to the alert flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdClassifier {
    threshold_hz: f32,
    policy: DetectionPolicy,
}

impl Default for ThresholdClassifier {
    fn default() -> Self {
        Self::new(HIGH_FREQ_THRESHOLD_HZ, DetectionPolicy::PeakOnly)
    }
}

impl ThresholdClassifier {
    pub fn new(threshold_hz: f32, policy: DetectionPolicy) -> Self {
        Self {
            threshold_hz,
            policy,
        }
    }

    pub fn from_settings(settings: &DetectionSettings) -> Self {
        Self::new(settings.threshold_hz, settings.policy)
    }

    pub fn threshold_hz(&self) -> f32 {
        self.threshold_hz
    }

    pub fn policy(&self) -> DetectionPolicy {
        self.policy
    }

    pub fn is_high_frequency(&self, reading: &PeakReading) -> bool {
        let above = reading.frequency_hz > self.threshold_hz;
        match self.policy {
            DetectionPolicy::PeakOnly => above,
            DetectionPolicy::SignalGated { min_level } => {
                above && reading.average_level > min_level
            }
        }
    }
}
