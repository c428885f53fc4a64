use std::path::PathBuf;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
pub type VcrResult<T, E = VcrError> = Result<T, E>;

#[derive(Error, Debug)]
pub enum VcrError {
    #[error("cassette not found: {}", .path.display())]
    CassetteNotFound { path: PathBuf },
    #[error("no matching interaction for {method}, available methods: {available:?}")]
    NoMatchingInteraction { method: String, available: Vec<String> },
    #[error("recording disabled but no matching interaction for: {method}")]
    RecordingDisabled { method: String },

    #[error("{message}: {source}")]
    Serialization {
        message: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to write cassette {}: {source}", .path.display())]
    CassetteWrite {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("invalid grpc frame: {0}")]
    InvalidFrame(String),
    #[error("invalid method path {0:?}")]
    InvalidMethod(String),
    #[error(transparent)]
    InvalidRecordMode(#[from] crate::record_mode::ParseRecordModeError),
    #[error(transparent)]
    Descriptor(#[from] prost_reflect::DescriptorError),

    #[error("failed to collect body: {0}")]
    Body(#[source] BoxError),
    #[error("failed to build runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error(transparent)]
    Transport(#[from] tonic::Status),
}
impl VcrError {
    pub fn serialization<E: Into<BoxError>>(message: impl Into<String>, source: E) -> Self {
        Self::Serialization { message: message.into(), source: source.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_method() {
        let err = VcrError::RecordingDisabled { method: "/users.Users/GetUser".to_string() };
        assert_eq!(err.to_string(), "recording disabled but no matching interaction for: /users.Users/GetUser");

        let err = VcrError::NoMatchingInteraction {
            method: "/users.Users/GetUser".to_string(),
            available: vec!["/users.Users/ListUsers".to_string()],
        };
        assert!(err.to_string().contains("/users.Users/ListUsers"));
    }

    #[test]
    fn test_serialization_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::InvalidData, "broken");
        let err = VcrError::serialization("failed to parse cassette", io);
        assert_eq!(err.to_string(), "failed to parse cassette: broken");
        assert!(std::error::Error::source(&err).is_some());
    }
}
