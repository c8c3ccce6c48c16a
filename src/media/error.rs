//! Container parse errors

use thiserror::Error;

use super::atoms::BoxType;

/// Failure to parse an ISOBMFF container
#[derive(Debug, Error)]
pub enum ParseError {
    /// A required box is absent
    #[error("missing required box: {0}")]
    MissingBox(&'static str),

    /// A box is present but malformed
    #[error("invalid {box_type} box: {reason}")]
    InvalidBox { box_type: BoxType, reason: String },

    /// Ran past the end of a box payload
    #[error("buffer underflow: need {need} bytes, have {have}")]
    Underflow { need: usize, have: usize },

    /// A box is larger than the engine is willing to buffer
    #[error("box {box_type} of {size} bytes exceeds the buffering limit")]
    TooLarge { box_type: BoxType, size: u64 },

    /// Levels of one track type disagree on their fragment timeline
    #[error("fragment timeline mismatch: {0}")]
    TimelineMismatch(String),
}

impl ParseError {
    pub fn invalid(box_type: BoxType, reason: impl Into<String>) -> Self {
        ParseError::InvalidBox {
            box_type,
            reason: reason.into(),
        }
    }
}
