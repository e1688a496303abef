//! Configuration for the Tideway broker
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then command-line arguments and `TIDEWAY_*` environment variables.
//!
//! ## Example Configuration
//!
//! ```toml
//! listen_addr = "0.0.0.0:9092"
//! advertised_addr = "broker-1.internal:9092"
//! node_id = 1
//! log_level = "info"
//!
//! [dispatch]
//! max_frame_bytes = 1048576
//! max_in_flight_per_connection = 10
//! execution_slots = 128
//! compression = "none"
//!
//! [shutdown]
//! drain_grace_ms = 5000
//!
//! [tls]
//! enabled = false
//! ```

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

mod args;
pub mod defaults;
mod dispatch;
mod tcp;
mod tls;

pub use args::{LogFormat, ServerArgs};
pub use dispatch::{DispatchConfig, ShutdownConfig};
pub use tcp::TcpConfig;
pub use tls::{KeyCert, TlsConfig};

use crate::error::{ConfigError, Result};
use defaults::{DEFAULT_LISTEN_SOCKET_ADDR, DEFAULT_LOG_LEVEL, DEFAULT_NODE_ID};

/// Complete broker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the Kafka listener binds to
    pub listen_addr: SocketAddr,

    /// Address clients are told to connect to (host:port).
    /// Falls back to `listen_addr`.
    pub advertised_addr: Option<String>,

    /// Id of this broker
    pub node_id: i32,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    pub tls: TlsConfig,

    pub tcp: TcpConfig,

    pub dispatch: DispatchConfig,

    pub shutdown: ShutdownConfig,

    /// Address of the Prometheus scrape endpoint; disabled when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_SOCKET_ADDR,
            advertised_addr: None,
            node_id: DEFAULT_NODE_ID,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            tls: TlsConfig::default(),
            tcp: TcpConfig::default(),
            dispatch: DispatchConfig::default(),
            shutdown: ShutdownConfig::default(),
            metrics_addr: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::read(path.display().to_string(), e.to_string()))?;

        let config: ServerConfig = toml::from_str(&contents)
            .map_err(|e| ConfigError::parse(path.display().to_string(), e.to_string()))?;
        Ok(config)
    }

    /// Build the configuration from command-line arguments, reading the
    /// configuration file they point at first.
    pub fn from_args(args: ServerArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(addr) = &args.listen_addr {
            config.listen_addr = addr.parse().map_err(|e| {
                ConfigError::invalid_value("listen_addr", format!("'{}': {}", addr, e))
            })?;
        }
        if args.advertised_addr.is_some() {
            config.advertised_addr = args.advertised_addr;
        }
        if let Some(node_id) = args.node_id {
            config.node_id = node_id;
        }
        if args.log_level != DEFAULT_LOG_LEVEL || args.config.is_none() {
            config.log_level = args.log_level;
        }

        let dispatch = &mut config.dispatch;
        if let Some(v) = args.max_frame_bytes {
            dispatch.max_frame_bytes = v;
        }
        if let Some(v) = args.max_in_flight {
            dispatch.max_in_flight_per_connection = v;
        }
        if let Some(v) = args.execution_slots {
            dispatch.execution_slots = v;
        }
        if args.admission_queue_limit.is_some() {
            dispatch.admission_queue_limit = args.admission_queue_limit;
        }
        if let Some(codec) = args.compression {
            dispatch.compression = codec;
        }
        if let Some(ms) = args.drain_grace_ms {
            config.shutdown.drain_grace_ms = ms;
        }
        if let Some(addr) = &args.metrics_addr {
            config.metrics_addr = Some(addr.parse().map_err(|e| {
                ConfigError::invalid_value("metrics_addr", format!("'{}': {}", addr, e))
            })?);
        }

        if args.tls_enabled {
            config.tls.enabled = true;
        }
        match (args.tls_key, args.tls_cert) {
            (Some(key_file), Some(cert_file)) => {
                config.tls.key_cert = Some(KeyCert {
                    key_file,
                    cert_file,
                });
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::invalid_value(
                    "tls",
                    "--tls-key and --tls-cert must be given together",
                )
                .into())
            }
        }
        if args.tls_truststore.is_some() {
            config.tls.truststore_file = args.tls_truststore;
        }
        if args.tls_require_client_auth {
            config.tls.require_client_auth = true;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        self.dispatch.validate()?;
        self.tls.validate()?;
        if let Some(addr) = &self.advertised_addr {
            parse_host_port(addr)?;
        }
        Ok(())
    }

    /// Host and port handed to clients, e.g. in FindCoordinator responses
    pub fn advertised_host_port(&self) -> Result<(String, i32)> {
        match &self.advertised_addr {
            Some(addr) => parse_host_port(addr),
            None => Ok((
                self.listen_addr.ip().to_string(),
                i32::from(self.listen_addr.port()),
            )),
        }
    }
}

fn parse_host_port(addr: &str) -> Result<(String, i32)> {
    let invalid = |reason: &str| {
        ConfigError::invalid_value("advertised_addr", format!("'{}': {}", addr, reason))
    };
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| invalid("expected host:port"))?;
    if host.is_empty() {
        return Err(invalid("empty host").into());
    }
    let port: u16 = port.parse().map_err(|_| invalid("invalid port"))?;
    Ok((host.to_string(), i32::from(port)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::compression::CompressionCodec;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr.port(), 9092);
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
listen_addr = "127.0.0.1:19092"
node_id = 3

[dispatch]
execution_slots = 16
compression = "lz4"

[shutdown]
drain_grace_ms = 250
"#
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:19092".parse().unwrap());
        assert_eq!(config.node_id, 3);
        assert_eq!(config.dispatch.execution_slots, 16);
        assert_eq!(config.dispatch.compression, CompressionCodec::Lz4);
        assert_eq!(config.dispatch.max_in_flight_per_connection, 10);
        assert_eq!(config.shutdown.drain_grace_ms, 250);
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen_addr = 42").unwrap();
        let err = ServerConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn test_args_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[dispatch]\nexecution_slots = 16").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let args = ServerArgs::parse_from([
            "tideway",
            "--config",
            path.as_str(),
            "--execution-slots",
            "4",
            "--node-id",
            "7",
        ]);
        let config = ServerConfig::from_args(args).unwrap();
        assert_eq!(config.dispatch.execution_slots, 4);
        assert_eq!(config.node_id, 7);
    }

    #[test]
    fn test_args_reject_half_key_pair() {
        let args = ServerArgs::parse_from(["tideway", "--tls-key", "/tmp/server.key"]);
        assert!(ServerConfig::from_args(args).is_err());
    }

    #[test]
    fn test_advertised_host_port() {
        let mut config = ServerConfig {
            listen_addr: "127.0.0.1:9092".parse().unwrap(),
            ..Default::default()
        };
        assert_eq!(
            config.advertised_host_port().unwrap(),
            ("127.0.0.1".to_string(), 9092)
        );

        config.advertised_addr = Some("broker-1.internal:19092".to_string());
        assert_eq!(
            config.advertised_host_port().unwrap(),
            ("broker-1.internal".to_string(), 19092)
        );

        config.advertised_addr = Some("no-port".to_string());
        assert!(config.validate().is_err());
    }
}
