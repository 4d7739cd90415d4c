//! Error types for Disha.
//!
//! Two layers are exposed to callers:
//! - [`Error`]: request-level failure of a single call, mapped onto the
//!   numeric [`ErrorCode`] carried by [`Status`].
//! - Task-level outcomes live in [`crate::navigation::NavStatus`] and are
//!   never reported through this type.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::EngineError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Request-level error codes.
///
/// The first five values match the robot SDK's wire values; the domain codes
/// follow them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    Ok = 0,
    ServiceNotReady = 1,
    Timeout = 2,
    InternalError = 3,
    ServiceError = 4,
    InvalidState = 5,
    InvalidArgument = 6,
    NotFound = 7,
}

impl ErrorCode {
    /// Upper-case name, as printed by the SDK tooling.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Ok => "OK",
            ErrorCode::ServiceNotReady => "SERVICE_NOT_READY",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ServiceError => "SERVICE_ERROR",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::NotFound => "NOT_FOUND",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Disha error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Session not initialized, or already shut down
    #[error("Service not ready: {0}")]
    ServiceNotReady(String),

    /// Caller-side wait elapsed; the operation may still complete
    #[error("Timed out after {timeout_ms}ms waiting for {operation}")]
    Timeout {
        /// Operation that was waited on
        operation: &'static str,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// Operation not allowed in the current mode or task state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Malformed or unknown argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Named entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Engine unreachable or refused the request
    #[error("Service error: {0}")]
    Service(String),

    /// Internal failure in this layer or the engine
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Map metadata (de)serialization error
    #[error("Map metadata error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Request-level code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ServiceNotReady(_) => ErrorCode::ServiceNotReady,
            Error::Timeout { .. } => ErrorCode::Timeout,
            Error::InvalidState(_) => ErrorCode::InvalidState,
            Error::InvalidArgument(_) | Error::Config(_) => ErrorCode::InvalidArgument,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::Service(_) => ErrorCode::ServiceError,
            Error::Internal(_) | Error::Io(_) | Error::Yaml(_) => ErrorCode::InternalError,
        }
    }
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Unreachable(msg) => Error::Service(format!("engine unreachable: {}", msg)),
            EngineError::Rejected(msg) => Error::Service(format!("engine rejected request: {}", msg)),
            EngineError::Internal(msg) => Error::Internal(format!("engine failure: {}", msg)),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Uniform request-level status: a code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: ErrorCode,
    pub message: String,
}

impl Status {
    /// Successful status with an empty message.
    pub fn ok() -> Self {
        Self {
            code: ErrorCode::Ok,
            message: String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == ErrorCode::Ok
    }

    /// Status of any call result.
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => Self::from(e),
        }
    }
}

impl From<&Error> for Status {
    fn from(e: &Error) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl From<Error> for Status {
    fn from(e: Error) -> Self {
        Status::from(&e)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_values() {
        assert_eq!(ErrorCode::Ok as u16, 0);
        assert_eq!(ErrorCode::ServiceNotReady as u16, 1);
        assert_eq!(ErrorCode::Timeout as u16, 2);
        assert_eq!(ErrorCode::InternalError as u16, 3);
        assert_eq!(ErrorCode::ServiceError as u16, 4);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::InvalidState("x".into()).code(),
            ErrorCode::InvalidState
        );
        assert_eq!(
            Error::Timeout {
                operation: "save_map",
                timeout_ms: 10
            }
            .code(),
            ErrorCode::Timeout
        );
        let io = std::io::Error::other("disk");
        assert_eq!(Error::from(io).code(), ErrorCode::InternalError);
    }

    #[test]
    fn test_engine_error_mapping() {
        let e: Error = EngineError::Unreachable("link down".into()).into();
        assert_eq!(e.code(), ErrorCode::ServiceError);
        let e: Error = EngineError::Internal("oom".into()).into();
        assert_eq!(e.code(), ErrorCode::InternalError);
    }

    #[test]
    fn test_status_from_result() {
        let ok: Result<u32> = Ok(3);
        assert!(Status::from_result(&ok).is_ok());

        let err: Result<u32> = Err(Error::NotFound("office".into()));
        let status = Status::from_result(&err);
        assert_eq!(status.code, ErrorCode::NotFound);
        assert!(status.message.contains("office"));
        assert_eq!(status.to_string(), "NOT_FOUND: Not found: office");
    }
}
