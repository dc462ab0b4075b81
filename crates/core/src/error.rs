use crate::monitor::SessionPhase;

/// Result alias that carries the custom [`MonitorError`] type.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The user (or the host policy) refused microphone access.
    #[error("microphone permission was denied")]
    PermissionDenied,
    /// No capture device is present or the device vanished during the handshake.
    #[error("no audio input device is available")]
    DeviceUnavailable,
    /// The host has no capture API at all.
    #[error("audio capture is not supported on this platform")]
    PlatformUnsupported,
    /// Any other failure reported by the capture provider.
    #[error("audio platform error: {0}")]
    Platform(String),
    /// An operation was requested from a state that does not allow it.
    #[error("cannot {operation} while the session is {phase}")]
    InvalidTransition {
        operation: &'static str,
        phase: SessionPhase,
    },
    #[error("sensitivity must be a finite number, got {0}")]
    InvalidSensitivity(f32),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("fft failed: {0}")]
    Fft(#[from] realfft::FftError),
}

impl MonitorError {
    /// Returns true for failures raised while acquiring the capture stream.
    pub fn is_capture_failure(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied
                | Self::DeviceUnavailable
                | Self::PlatformUnsupported
                | Self::Platform(_)
        )
    }

    /// Human readable message published to consumers through
    /// [`AnalysisState::error`](crate::AnalysisState::error).
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied => {
                "Unable to access microphone. Please ensure microphone permissions are granted."
                    .to_string()
            }
            Self::DeviceUnavailable => {
                "No microphone was found. Connect an input device and try again.".to_string()
            }
            Self::PlatformUnsupported => {
                "Audio capture is not supported in this environment.".to_string()
            }
            other => format!("Unable to start audio analysis: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_errors_use_the_microphone_wording() {
        let message = MonitorError::PermissionDenied.user_message();
        assert!(message.contains("microphone permissions"));
    }

    #[test]
    fn transition_errors_name_the_phase() {
        let err = MonitorError::InvalidTransition {
            operation: "start",
            phase: SessionPhase::Starting,
        };
        assert_eq!(format!("{err}"), "cannot start while the session is starting");
        assert!(!err.is_capture_failure());
    }

    #[test]
    fn platform_errors_keep_their_detail() {
        let err = MonitorError::Platform("device busy".into());
        assert!(err.is_capture_failure());
        assert!(err.user_message().contains("device busy"));
    }
}
