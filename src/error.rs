use thiserror::Error;

/// Why a listening session could not be started.
///
/// Silence and low-confidence input are not errors: they show up as a
/// reading with `frequency_hz == 0` and confidence 0.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("audio input device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A stop was requested while the device was still being acquired.
    #[error("session start cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SessionError {
    /// Classify a backend error message. cpal surfaces OS permission refusals
    /// as backend-specific strings, so this is the only place we can tell
    /// them apart from a missing device.
    pub fn from_backend(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
        {
            SessionError::PermissionDenied
        } else {
            SessionError::DeviceUnavailable(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_permission_message() {
        assert_eq!(
            SessionError::from_backend("Access denied by the OS"),
            SessionError::PermissionDenied
        );
        assert_eq!(
            SessionError::from_backend("Permission to use microphone refused"),
            SessionError::PermissionDenied
        );
    }

    #[test]
    fn backend_other_message_is_unavailable() {
        let err = SessionError::from_backend("device disconnected");
        assert!(matches!(err, SessionError::DeviceUnavailable(ref m) if m == "device disconnected"));
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            SessionError::DeviceUnavailable("no input".into()).to_string(),
            "audio input device unavailable: no input"
        );
        assert_eq!(SessionError::Cancelled.to_string(), "session start cancelled");
    }
}
