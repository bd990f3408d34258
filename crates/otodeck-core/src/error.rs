//! Error types for decoding, deck control, and bus composition

use std::fmt;

use thiserror::Error;

use crate::types::StreamFormat;

/// Errors raised while opening or decoding a source
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The source could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The identifier does not name something the opener understands
    #[error("Invalid source identifier: {0}")]
    InvalidSourceId(String),

    /// Container or codec not supported
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The container holds no decodable audio track
    #[error("No audio track found")]
    NoAudioTrack,

    /// The stream does not declare its sample rate
    #[error("Unknown sample rate")]
    UnknownSampleRate,

    /// Decoding produced zero frames
    #[error("Source contains no audio frames")]
    Empty,
}

/// Deck parameter named in an [`DeckError::InvalidParameter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    Gain,
    Speed,
    PositionSeconds,
    PositionFraction,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Parameter::Gain => "gain",
            Parameter::Speed => "speed",
            Parameter::PositionSeconds => "position (seconds)",
            Parameter::PositionFraction => "position fraction",
        };
        f.write_str(name)
    }
}

/// Errors returned by deck control calls
///
/// Neither variant touches the render path: the deck keeps producing audio
/// from its last good state.
#[derive(Error, Debug)]
pub enum DeckError {
    /// The source could not be opened; the deck is unchanged
    #[error("Failed to load {source_id}: {reason}")]
    LoadFailure {
        source_id: String,
        #[source]
        reason: DecodeError,
    },

    /// Value outside the documented range; nothing was changed
    #[error("Invalid {parameter}: {value} (expected {expected})")]
    InvalidParameter {
        parameter: Parameter,
        value: f64,
        expected: &'static str,
    },
}

impl DeckError {
    pub(crate) fn invalid(parameter: Parameter, value: f64, expected: &'static str) -> Self {
        DeckError::InvalidParameter {
            parameter,
            value,
            expected,
        }
    }
}

/// Errors returned while composing a mix bus
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MixError {
    /// Input renders at a different rate or width than the bus
    #[error("Configuration mismatch: bus is {expected}, input is {found}")]
    ConfigurationMismatch {
        expected: StreamFormat,
        found: StreamFormat,
    },

    /// Inputs are fixed once the first block has been rendered
    #[error("Cannot add inputs after rendering has started")]
    PipelineStarted,
}

pub type DeckResult<T> = Result<T, DeckError>;

pub type MixResult<T> = Result<T, MixError>;
