//! Application-wide error types.

use std::io;

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Archive not found: {identifier}")]
    ArchiveNotFound { identifier: String },

    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read archive output: {0}")]
    Read(#[source] io::Error),

    #[error("Failed to write archive chunk: {0}")]
    Write(#[source] io::Error),

    #[error("Download was cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(identifier: impl Into<String>) -> Self {
        Self::ArchiveNotFound {
            identifier: identifier.into(),
        }
    }

    pub fn launch(program: impl Into<String>, source: io::Error) -> Self {
        Self::Launch {
            program: program.into(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether this error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this error happened after the response started streaming.
    pub fn is_stream_error(&self) -> bool {
        matches!(self, Self::Read(_) | Self::Write(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Cancelled.is_stream_error());

        let write = Error::Write(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(write.is_stream_error());
        assert!(!write.is_cancelled());

        assert!(!Error::not_found("abc").is_stream_error());
    }

    #[test]
    fn test_launch_error_message() {
        let err = Error::launch("zip", io::Error::from(io::ErrorKind::NotFound));
        assert!(err.to_string().starts_with("Failed to launch zip"));
    }
}
