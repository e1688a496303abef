//! Errors raised while moving a request through a connection
//!
//! Every error here knows whether it costs the client its connection
//! ([`Severity::ConnectionFatal`]) or only the offending request
//! ([`Severity::RequestFatal`]). Request-fatal errors never leave the
//! dispatcher; they are turned into a correlated error response.

use std::io;

use thiserror::Error;

use super::ErrorCode;

/// How far an error propagates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The connection is closed
    ConnectionFatal,
    /// Only the request fails; it is answered with an error response
    RequestFatal,
}

impl Severity {
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Severity::ConnectionFatal)
    }
}

/// Failures of the underlying byte stream
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the stream. `read` bytes of the `expected` were received.
    #[error("end of stream after {read} of {expected} bytes")]
    EndOfStream { read: usize, expected: usize },
    #[error("transport shut down")]
    Shutdown,
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failures while reading or writing a length-delimited frame
#[derive(Debug, Error)]
pub enum FrameError {
    /// Clean close at a frame boundary
    #[error("end of stream")]
    EndOfStream,
    #[error("input shut down")]
    Shutdown,
    #[error("frame of {declared} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { declared: usize, max: usize },
    #[error("stream ended after {read} of {expected} frame bytes")]
    TruncatedStream { read: usize, expected: usize },
    #[error("frame I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Whether the stream ended without a protocol violation
    pub fn is_graceful(&self) -> bool {
        matches!(self, FrameError::EndOfStream | FrameError::Shutdown)
    }

    /// Whether the peer broke the framing contract
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            FrameError::FrameTooLarge { .. } | FrameError::TruncatedStream { .. }
        )
    }

    pub fn severity(&self) -> Severity {
        Severity::ConnectionFatal
    }
}

/// Failures looking a request up in the API registry
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unknown API key {api_key}")]
    UnknownApi { api_key: i16 },
    #[error("{name} (key {api_key}) does not support version {api_version}, supported {min}..={max}")]
    UnsupportedVersion {
        api_key: i16,
        name: &'static str,
        api_version: i16,
        min: i16,
        max: i16,
    },
}

impl ResolveError {
    /// Error code placed in the error response body
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ResolveError::UnknownApi { .. } => ErrorCode::InvalidRequest,
            ResolveError::UnsupportedVersion { .. } => ErrorCode::UnsupportedVersion,
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::RequestFatal
    }
}

/// A header or body that does not parse for a known, supported API version
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed request header: {0}")]
    Header(String),
    #[error("invalid client id: {0}")]
    ClientId(String),
    #[error("malformed {api} v{version} body: {detail}")]
    Body {
        api: &'static str,
        version: i16,
        detail: String,
    },
    #[error("{remaining} trailing bytes after {api} v{version} body")]
    TrailingBytes {
        api: &'static str,
        version: i16,
        remaining: usize,
    },
    #[error("corrupt {codec} payload: {detail}")]
    CorruptPayload { codec: &'static str, detail: String },
}

impl DecodeError {
    pub fn body(api: &'static str, version: i16, detail: impl ToString) -> Self {
        Self::Body {
            api,
            version,
            detail: detail.to_string(),
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::ConnectionFatal
    }
}

/// Failures reported by an API handler
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Business-logic failure, answered with `code`
    #[error("handler failed ({code:?}): {message}")]
    Failed { code: ErrorCode, message: String },
    /// The handler or admission control ran out of capacity
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl HandlerError {
    /// Failure answered with `UNKNOWN_SERVER_ERROR`
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            code: ErrorCode::UnknownServerError,
            message: message.into(),
        }
    }

    pub fn with_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Failed {
            code,
            message: message.into(),
        }
    }

    pub fn exhausted(message: impl Into<String>) -> Self {
        Self::ResourceExhausted(message.into())
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            HandlerError::Failed { code, .. } => *code,
            HandlerError::ResourceExhausted(_) => ErrorCode::RequestTimedOut,
        }
    }

    /// Exhaustion tears the connection down only when `exhaustion_fatal` is set
    pub fn severity(&self, exhaustion_fatal: bool) -> Severity {
        match self {
            HandlerError::ResourceExhausted(_) if exhaustion_fatal => Severity::ConnectionFatal,
            _ => Severity::RequestFatal,
        }
    }
}

/// Result returned by API handlers
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;
