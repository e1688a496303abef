//! Domain-specific error types for Tideway

use thiserror::Error;

/// Structured protocol error domain
#[derive(Debug, Error, Clone)]
pub enum ProtocolError {
    #[error("{operation}: {detail}")]
    Operation { operation: String, detail: String },
    #[error("invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },
    #[error("{0}")]
    Message(String),
}

impl ProtocolError {
    pub fn operation(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Operation {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<String> for ProtocolError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<&str> for ProtocolError {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

/// Structured configuration error domain
#[derive(Debug, Error, Clone)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("failed to read {path}: {detail}")]
    Read { path: String, detail: String },
    #[error("failed to parse {path}: {detail}")]
    Parse { path: String, detail: String },
    #[error("{0}")]
    Message(String),
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn read(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Read {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub fn parse(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

impl From<String> for ConfigError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<&str> for ConfigError {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

/// Structured server error domain
#[derive(Debug, Error, Clone)]
pub enum ServerError {
    #[error("{operation}: {detail}")]
    Operation { operation: String, detail: String },
    #[error("failed to bind {addr}: {detail}")]
    Bind { addr: String, detail: String },
    #[error("TLS: {0}")]
    Tls(String),
    #[error("{0}")]
    Message(String),
}

impl ServerError {
    pub fn operation(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Operation {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    pub fn bind(addr: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Bind {
            addr: addr.into(),
            detail: detail.into(),
        }
    }

    pub fn tls(detail: impl Into<String>) -> Self {
        Self::Tls(detail.into())
    }
}

impl From<String> for ServerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<&str> for ServerError {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_builders() {
        let err = ProtocolError::operation("encode", "buffer overflow");
        assert_eq!(err.to_string(), "encode: buffer overflow");

        let err = ProtocolError::invalid_field("client_id", "too long");
        assert_eq!(err.to_string(), "invalid client_id: too long");
    }

    #[test]
    fn test_config_error_builders() {
        let err = ConfigError::invalid_value("execution_slots", "must be > 0");
        assert_eq!(
            err.to_string(),
            "invalid value for execution_slots: must be > 0"
        );

        let err = ConfigError::parse("tideway.toml", "expected table");
        assert_eq!(err.to_string(), "failed to parse tideway.toml: expected table");
    }

    #[test]
    fn test_server_error_from_str() {
        let err: ServerError = "listener closed".into();
        assert_eq!(err.to_string(), "listener closed");
        assert_eq!(ServerError::tls("no key").to_string(), "TLS: no key");
    }
}
