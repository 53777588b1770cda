/// Error types for voice allocation and audio output
use std::fmt;

/// Error returned when a voice cannot be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceError {
    /// Every slot in the pool holds an active voice; the new voice was dropped
    Overflow { pitch: i32 },
    /// The generator was halted after an output failure and refuses new voices
    Halted,
}

impl fmt::Display for VoiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceError::Overflow { pitch } => {
                write!(f, "Voice pool full, dropped voice for pitch {}", pitch)
            }
            VoiceError::Halted => write!(f, "Generator halted, not accepting new voices"),
        }
    }
}

impl std::error::Error for VoiceError {}

/// Error type for audio output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// No audio device available
    NoDevice,
    /// Failed to query or configure the audio device
    DeviceInit(String),
    /// Failed to create the output stream
    StreamCreate(String),
    /// Playback failed while rendering samples
    Playback(String),
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::NoDevice => write!(f, "No audio device available"),
            AudioError::DeviceInit(msg) => write!(f, "Device init error: {}", msg),
            AudioError::StreamCreate(msg) => write!(f, "Stream create error: {}", msg),
            AudioError::Playback(msg) => write!(f, "Playback error: {}", msg),
        }
    }
}

impl std::error::Error for AudioError {}

/// Any error surfaced by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Voice(VoiceError),
    Audio(AudioError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Voice(e) => fmt::Display::fmt(e, f),
            Error::Audio(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Voice(e) => Some(e),
            Error::Audio(e) => Some(e),
        }
    }
}

impl From<VoiceError> for Error {
    fn from(e: VoiceError) -> Self {
        Error::Voice(e)
    }
}

impl From<AudioError> for Error {
    fn from(e: AudioError) -> Self {
        Error::Audio(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err: Error = VoiceError::Overflow { pitch: 72 }.into();
        assert_eq!(err.to_string(), "Voice pool full, dropped voice for pitch 72");

        let err: Error = AudioError::Playback("underrun".into()).into();
        assert_eq!(err.to_string(), "Playback error: underrun");
        assert!(std::error::Error::source(&err).is_some());
    }
}
