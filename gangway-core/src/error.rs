//! Error types for the gangway core.

use std::{error::Error, fmt, io};

/// Error type for gangway core operations.
#[derive(Debug)]
pub enum GangwayError {
    /// An underlying I/O error.
    Io(io::Error),
    /// A fatal configuration problem, such as an unresolvable home directory
    /// or a rejected client registration. Never retried.
    Config(String),
    /// A network or protocol failure talking to the provider.
    Transport(String),
    /// The provider terminally refused the device authorization.
    AuthDenied(String),
    /// The device authorization was not approved within the absolute timeout.
    AuthTimedOut,
    /// The governing cancellation signal fired.
    Cancelled,
    /// Account or role discovery failed; no partial catalog is available.
    Discovery(String),
}

impl fmt::Display for GangwayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Config(message) => write!(f, "{message}"),
            Self::Transport(message) => write!(f, "{message}"),
            Self::AuthDenied(message) => write!(f, "{message}"),
            Self::AuthTimedOut => write!(f, "authorization timed out after 5 minutes"),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::Discovery(message) => write!(f, "{message}"),
        }
    }
}

impl Error for GangwayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for GangwayError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<reqwest::Error> for GangwayError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

/// Convenience result type for gangway core.
pub type Result<T> = std::result::Result<T, GangwayError>;

#[cfg(test)]
mod tests {
    use super::GangwayError;
    use std::io;

    #[test]
    fn io_error_formats_message() {
        let error = GangwayError::Io(io::Error::other("boom"));
        assert_eq!(format!("{error}"), "io error: boom");
    }

    #[test]
    fn timeout_and_cancel_have_fixed_messages() {
        assert_eq!(
            format!("{}", GangwayError::AuthTimedOut),
            "authorization timed out after 5 minutes"
        );
        assert_eq!(format!("{}", GangwayError::Cancelled), "operation cancelled");
    }

    #[test]
    fn from_io_error_maps_variant() {
        let error: GangwayError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        match error {
            GangwayError::Io(inner) => {
                assert_eq!(inner.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected Io variant, got {other:?}"),
        }
    }
}
