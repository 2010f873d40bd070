//! Error types for the note transcription pipeline

use std::fmt;

/// Custom error type for vocal-to-MIDI processing
#[derive(Debug, Clone)]
pub enum TranscribeError {
    /// E001: Invalid audio format (e.g., more than two channels)
    InvalidAudioFormat(String),
    /// E002: Unsupported sample rate
    UnsupportedSampleRate(u32),
    /// E003: Configuration validation failed
    ConfigValidationFailed(String),
    /// E004: Invalid configuration parameter
    InvalidConfigParameter(String),
    /// E005: Audio file I/O error
    AudioFileError(String),
    /// E006: Input validation error (mismatched frame arrays, empty chunks)
    InputValidationError(String),
    /// E007: MIDI export error
    MidiExportError(String),
    /// E008: Analysis export error
    AnalysisExportError(String),
    /// E009: Acoustic model inference error
    ModelInferenceError(String),
}

impl fmt::Display for TranscribeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscribeError::InvalidAudioFormat(msg) => {
                write!(f, "E001: Invalid audio format - {}", msg)
            }
            TranscribeError::UnsupportedSampleRate(sr) => {
                write!(f, "E002: Unsupported sample rate {} Hz", sr)
            }
            TranscribeError::ConfigValidationFailed(msg) => {
                write!(f, "E003: Configuration validation failed - {}", msg)
            }
            TranscribeError::InvalidConfigParameter(msg) => {
                write!(f, "E004: Invalid configuration parameter - {}", msg)
            }
            TranscribeError::AudioFileError(msg) => {
                write!(f, "E005: Audio file I/O error - {}", msg)
            }
            TranscribeError::InputValidationError(msg) => {
                write!(f, "E006: Input validation error - {}", msg)
            }
            TranscribeError::MidiExportError(msg) => {
                write!(f, "E007: MIDI export error - {}", msg)
            }
            TranscribeError::AnalysisExportError(msg) => {
                write!(f, "E008: Analysis export error - {}", msg)
            }
            TranscribeError::ModelInferenceError(msg) => {
                write!(f, "E009: Model inference error - {}", msg)
            }
        }
    }
}

impl std::error::Error for TranscribeError {}

impl From<std::io::Error> for TranscribeError {
    fn from(err: std::io::Error) -> Self {
        TranscribeError::AudioFileError(format!("File I/O error: {}", err))
    }
}

impl From<hound::Error> for TranscribeError {
    fn from(err: hound::Error) -> Self {
        TranscribeError::AudioFileError(err.to_string())
    }
}

impl From<serde_json::Error> for TranscribeError {
    fn from(err: serde_json::Error) -> Self {
        TranscribeError::AnalysisExportError(format!("JSON serialization error: {}", err))
    }
}

/// Result type alias for transcription operations
pub type Result<T> = std::result::Result<T, TranscribeError>;
