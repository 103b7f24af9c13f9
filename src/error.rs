//! Error types for upcrypt

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for upcrypt
#[derive(Error, Debug)]
pub enum Error {
    // Crypto errors
    #[error("Cryptographic configuration error: {0}")]
    Configuration(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Truncated initialisation vector: expected {expected} bytes, got {got}")]
    TruncatedIv { expected: usize, got: usize },

    // Item errors
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error came from reading or writing the underlying storage
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_) | Error::TruncatedIv { .. })
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(inner) => inner,
            Error::TruncatedIv { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, e),
            Error::Unsupported(_) => io::Error::new(io::ErrorKind::Unsupported, e),
            Error::InvalidKey(_) => io::Error::new(io::ErrorKind::InvalidInput, e),
            other => io::Error::other(other),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_classification() {
        let truncated = Error::TruncatedIv { expected: 16, got: 3 };
        assert!(truncated.is_io());
        assert!(Error::Io(io::Error::other("disk")).is_io());
        assert!(!Error::Unsupported("nope".to_string()).is_io());
    }

    #[test]
    fn test_into_io_error_kind() {
        let err: io::Error = Error::TruncatedIv { expected: 16, got: 0 }.into();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err: io::Error = Error::Unsupported("store_location".to_string()).into();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);

        let err: io::Error = Error::Config("bad file".to_string()).into();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert!(err.to_string().contains("bad file"));
    }
}
