//! Error types for the live voice pipeline

use thiserror::Error;

/// Result type alias for voice pipeline operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors raised by the voice pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoiceError {
    /// Missing credential or invalid settings; raised before any session attempt
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Opening the remote stream failed, or the transport broke mid-session
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed inbound audio payload
    #[error("Decode error: {0}")]
    Decode(String),

    /// Microphone permission denied, device missing, or a playback context failure
    #[error("Audio device error: {0}")]
    Device(String),

    #[error("A voice session is already active")]
    SessionActive,

    #[error("Session stopped before it finished opening")]
    Cancelled,
}

impl VoiceError {
    /// Short machine-friendly category, used in logs and API responses
    pub fn kind(&self) -> &'static str {
        match self {
            VoiceError::Configuration(_) => "configuration",
            VoiceError::Connection(_) => "connection",
            VoiceError::Decode(_) => "decode",
            VoiceError::Device(_) => "device",
            VoiceError::SessionActive => "session_active",
            VoiceError::Cancelled => "cancelled",
        }
    }
}

impl From<base64::DecodeError> for VoiceError {
    fn from(err: base64::DecodeError) -> Self {
        VoiceError::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for VoiceError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        VoiceError::Connection(err.to_string())
    }
}

impl From<hound::Error> for VoiceError {
    fn from(err: hound::Error) -> Self {
        VoiceError::Device(err.to_string())
    }
}

#[cfg(feature = "device")]
impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        VoiceError::Device(err.to_string())
    }
}

#[cfg(feature = "device")]
impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoiceError::Device(err.to_string())
    }
}

#[cfg(feature = "device")]
impl From<cpal::DefaultStreamConfigError> for VoiceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        VoiceError::Device(err.to_string())
    }
}
