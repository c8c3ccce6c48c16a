//! Registry error types
//!
//! Error types for client and source admission.

use crate::stats::LimitHit;

/// Why a client was not handed off to a fan-out target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    /// Target is disabled, not running or gone
    Disabled,
    /// Server client count is at its ceiling
    TooManyClients,
    /// Server aggregate bitrate would reach its ceiling
    Bandwidth,
    /// The program already has a live source attached
    SourceBusy,
}

impl From<LimitHit> for AdmissionError {
    fn from(hit: LimitHit) -> Self {
        match hit {
            LimitHit::Connections => AdmissionError::TooManyClients,
            LimitHit::Bitrate => AdmissionError::Bandwidth,
        }
    }
}

impl std::fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdmissionError::Disabled => write!(f, "Target disabled"),
            AdmissionError::TooManyClients => write!(f, "Too many clients"),
            AdmissionError::Bandwidth => write!(f, "Bandwidth limit reached"),
            AdmissionError::SourceBusy => write!(f, "Source already connected"),
        }
    }
}

impl std::error::Error for AdmissionError {}
