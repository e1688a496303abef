//! TLS configuration for Tideway
//!
//! Describes where the listener's key material lives. Loading it is the job
//! of [`crate::server::tls::build_credentials`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

/// PEM encoded private key and certificate chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyCert {
    /// Path to private key file (PEM format)
    pub key_file: PathBuf,
    /// Path to certificate chain file (PEM format)
    pub cert_file: PathBuf,
}

/// TLS configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TlsConfig {
    /// Enable TLS (default: false)
    pub enabled: bool,
    /// Server key and certificate
    pub key_cert: Option<KeyCert>,
    /// CA bundle used to verify client certificates (PEM format)
    pub truststore_file: Option<PathBuf>,
    /// Reject clients that do not present a certificate (mTLS)
    pub require_client_auth: bool,
}

impl TlsConfig {
    /// Check that the settings can produce credentials.
    ///
    /// Client authentication needs a truststore to verify against.
    pub fn validate(&self) -> Result<()> {
        if self.require_client_auth && self.truststore_file.is_none() {
            return Err(ConfigError::invalid_value(
                "tls.require_client_auth",
                "client authentication requires tls.truststore_file",
            )
            .into());
        }
        Ok(())
    }
}
