use crate::models::ScanState;
use thiserror::Error;

/// Errors surfaced by the scanning pipeline.
///
/// Transient per-tick decode misses are not errors and never show up here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("camera access was denied")]
    PermissionDenied,

    #[error("no camera satisfies the requested constraints")]
    DeviceUnavailable,

    #[error("render target `{0}` is not mounted")]
    TargetMissing(String),

    #[error("manual code is empty")]
    EmptyInput,

    #[error("decoder could not be activated: {0}")]
    DecoderUnavailable(String),

    #[error("a scan session is already in progress")]
    SessionBusy,

    #[error("session in state {0:?} cannot be retried")]
    NotRetryable(ScanState),

    #[error("session already produced a code")]
    SessionClosed,
}

impl ScanError {
    /// Message shown inline next to the retry and manual-entry controls.
    pub fn user_message(&self) -> &'static str {
        match self {
            ScanError::PermissionDenied => {
                "Camera access was denied. Allow camera access and try again, or type the code."
            }
            ScanError::DeviceUnavailable => {
                "No suitable camera was found. Try again or type the code."
            }
            ScanError::TargetMissing(_) => {
                "The scanner view is not ready. Try again or type the code."
            }
            ScanError::EmptyInput => "Enter a code before confirming.",
            ScanError::DecoderUnavailable(_) => {
                "The code reader could not start. Try again or type the code."
            }
            ScanError::SessionBusy => "A scan is already running.",
            ScanError::NotRetryable(_) => "There is nothing to retry.",
            ScanError::SessionClosed => "A code was already captured for this scan.",
        }
    }

    /// Whether the UI should offer the retry affordance.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScanError::PermissionDenied
                | ScanError::DeviceUnavailable
                | ScanError::TargetMissing(_)
                | ScanError::DecoderUnavailable(_)
        )
    }

    /// Programming-usage errors are logged louder than user-facing ones.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, ScanError::TargetMissing(_))
    }
}
