use thiserror::Error;

/// Errors produced by the live voice session.
///
/// Device and permission failures are recoverable: the session degrades to a
/// voice-disabled state instead of tearing down. Transport failures terminate
/// the session through the `Error` status with full resource teardown.
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Microphone access denied")]
    PermissionDenied,
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Malformed payload: {0}")]
    Decode(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Session is not connected")]
    NotConnected,
    #[error("A session is already active")]
    AlreadyConnected,
}

impl VoiceError {
    /// Whether the session can stay up (voice-disabled) after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VoiceError::PermissionDenied | VoiceError::DeviceUnavailable(_)
        )
    }
}
