use serde::{Deserialize, Serialize};

use crate::AnalysisState;

/// Upper end of the frequency meter scale.
pub const METER_MAX_HZ: f32 = 22_000.0;

/// One transition of the alert flag from clear to raised.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub sequence: u64,
    pub peak_frequency_hz: f32,
}

/// Consumer-side history of high frequency alerts.
///
/// The classifier itself is stateless; this tracker only counts rising edges
/// of [`AnalysisState::is_high_frequency`] as they are published.
#[derive(Debug, Clone, Default)]
pub struct AlertTracker {
    count: u64,
    active: bool,
    last: Option<AlertEvent>,
}

impl AlertTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a published state. Returns the event when a new alert begins.
    pub fn observe(&mut self, state: &AnalysisState) -> Option<AlertEvent> {
        let raised = state.is_high_frequency;
        let was_active = std::mem::replace(&mut self.active, raised);
        if !raised || was_active {
            return None;
        }

        let event = AlertEvent {
            sequence: state.sequence,
            peak_frequency_hz: state.peak_frequency.unwrap_or_default(),
        };
        self.count += 1;
        self.last = Some(event);
        Some(event)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last_event(&self) -> Option<&AlertEvent> {
        self.last.as_ref()
    }

    pub fn clear_history(&mut self) {
        self.count = 0;
        self.last = None;
    }
}

/// Formats a peak frequency for display, e.g. `"23.4 kHz"` or `"440 Hz"`.
pub fn format_frequency(frequency_hz: Option<f32>) -> String {
    match frequency_hz {
        Some(hz) if hz >= 1_000.0 => format!("{:.1} kHz", hz / 1_000.0),
        Some(hz) if hz > 0.0 => format!("{hz:.0} Hz"),
        _ => "---".to_string(),
    }
}

/// Position of `frequency_hz` on the meter scale, `0.0..=1.0`.
pub fn meter_fraction(frequency_hz: Option<f32>) -> f32 {
    frequency_hz
        .map(|hz| (hz / METER_MAX_HZ).clamp(0.0, 1.0))
        .unwrap_or(0.0)
}
