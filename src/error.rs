//! Error types for SoftGlue-IO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// SoftGlue-IO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Socket read or write did not complete within the configured timeout
    #[error("Communication timeout")]
    Timeout,

    /// Peer closed the connection
    #[error("Connection closed by device")]
    ConnectionClosed,

    /// Fewer bytes arrived than the exchange requires
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Bytes requested
        expected: usize,
        /// Bytes received before the stream ended
        actual: usize,
    },

    /// Device answered with something that is not a valid response
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Boundary write rejected (channel or slot out of range)
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration file could not be parsed or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Frame serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Background thread could not be started
    #[error("Failed to spawn {0} thread")]
    ThreadSpawn(&'static str),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error means the device socket is no longer usable.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Timeout
                | Error::ConnectionClosed
                | Error::ShortRead { .. }
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_failure_classification() {
        assert!(Error::Timeout.is_link_failure());
        assert!(
            Error::ShortRead {
                expected: 10,
                actual: 3
            }
            .is_link_failure()
        );
        assert!(!Error::InvalidResponse("abc".to_string()).is_link_failure());
        assert!(!Error::InvalidParameter("channel 9".to_string()).is_link_failure());
    }

    #[test]
    fn test_short_read_message() {
        let e = Error::ShortRead {
            expected: 400_000,
            actual: 12,
        };
        assert_eq!(e.to_string(), "Short read: expected 400000 bytes, got 12");
    }
}
