//! Command-line arguments for the Tideway broker
//!
//! This module defines the CLI arguments structure using clap. Every value
//! that is given overrides the configuration file.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use super::defaults::{DEFAULT_LOG_FORMAT, DEFAULT_LOG_LEVEL};
use crate::protocol::compression::CompressionCodec;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    Text,
    /// One JSON object per event
    Json,
}

/// Command-line arguments for the Tideway broker
#[derive(Parser, Debug, Clone)]
#[command(name = "tideway")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Kafka-compatible connection and request dispatch core")]
pub struct ServerArgs {
    /// Path to configuration file (TOML format)
    #[arg(short, long, env = "TIDEWAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on for the Kafka protocol
    #[arg(long, env = "TIDEWAY_LISTEN_ADDR")]
    pub listen_addr: Option<String>,

    /// Address advertised to clients (host:port)
    #[arg(long, env = "TIDEWAY_ADVERTISED_ADDR")]
    pub advertised_addr: Option<String>,

    /// Broker node id
    #[arg(long, env = "TIDEWAY_NODE_ID")]
    pub node_id: Option<i32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TIDEWAY_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "TIDEWAY_LOG_FORMAT", value_enum, default_value = DEFAULT_LOG_FORMAT)]
    pub log_format: LogFormat,

    /// Maximum frame size in bytes
    #[arg(long, env = "TIDEWAY_MAX_FRAME_BYTES")]
    pub max_frame_bytes: Option<usize>,

    /// Requests a connection may have in flight
    #[arg(long, env = "TIDEWAY_MAX_IN_FLIGHT")]
    pub max_in_flight: Option<usize>,

    /// Execution slots shared by all connections
    #[arg(long, env = "TIDEWAY_EXECUTION_SLOTS")]
    pub execution_slots: Option<usize>,

    /// Handler invocations allowed to wait for a slot before rejection
    #[arg(long, env = "TIDEWAY_ADMISSION_QUEUE_LIMIT")]
    pub admission_queue_limit: Option<usize>,

    /// Grace period for draining in-flight handlers, in milliseconds
    #[arg(long, env = "TIDEWAY_DRAIN_GRACE_MS")]
    pub drain_grace_ms: Option<u64>,

    /// Body compression codec (none, snappy, lz4)
    #[arg(long, env = "TIDEWAY_COMPRESSION")]
    pub compression: Option<CompressionCodec>,

    /// Enable TLS
    #[arg(long, env = "TIDEWAY_TLS_ENABLED")]
    pub tls_enabled: bool,

    /// Path to TLS certificate chain (PEM)
    #[arg(long, env = "TIDEWAY_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key (PEM)
    #[arg(long, env = "TIDEWAY_TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// Path to CA bundle used to verify client certificates (PEM)
    #[arg(long, env = "TIDEWAY_TLS_TRUSTSTORE")]
    pub tls_truststore: Option<PathBuf>,

    /// Require clients to present a certificate
    #[arg(long, env = "TIDEWAY_TLS_REQUIRE_CLIENT_AUTH")]
    pub tls_require_client_auth: bool,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "TIDEWAY_METRICS_ADDR")]
    pub metrics_addr: Option<String>,
}
