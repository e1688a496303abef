//! Error types for Tideway
//!
//! This module defines the root error type, the per-domain error enums, the
//! request-path error taxonomy used by the dispatcher, and the Kafka wire
//! error codes those errors map to.

use thiserror::Error;

mod dispatch;
mod domain;
mod error_code;

pub use dispatch::{
    DecodeError, FrameError, HandlerError, HandlerResult, ResolveError, Severity, TransportError,
};
pub use domain::{ConfigError, ProtocolError, ServerError};
pub use error_code::ErrorCode;

/// Result type alias for Tideway operations
pub type Result<T> = std::result::Result<T, TidewayError>;

/// Main error type for Tideway
#[derive(Error, Debug)]
pub enum TidewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TidewayError {
    /// Create a protocol error with context
    ///
    /// # Example
    /// ```ignore
    /// TidewayError::protocol("encode", "buffer overflow")
    /// // produces: "Protocol error: encode: buffer overflow"
    /// ```
    pub fn protocol(operation: &str, detail: impl Into<String>) -> Self {
        TidewayError::Protocol(ProtocolError::operation(operation, detail))
    }

    /// Create a configuration error from a message string
    pub fn config_msg(msg: impl Into<String>) -> Self {
        TidewayError::Config(ConfigError::Message(msg.into()))
    }

    /// Create an invalid-value configuration error
    pub fn invalid_config(field: &str, reason: impl Into<String>) -> Self {
        TidewayError::Config(ConfigError::invalid_value(field, reason))
    }

    /// Create a server error with operation context
    pub fn server(operation: &str, detail: impl Into<String>) -> Self {
        TidewayError::Server(ServerError::operation(operation, detail))
    }

    /// Create a TLS setup error
    pub fn tls(detail: impl Into<String>) -> Self {
        TidewayError::Server(ServerError::tls(detail))
    }

    /// How far this error propagates when it happens on the request path
    pub fn severity(&self) -> Severity {
        match self {
            TidewayError::Handler(err) => err.severity(false),
            _ => Severity::ConnectionFatal,
        }
    }
}
