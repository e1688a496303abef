//! Default constants for Tideway configuration
//!
//! These constants define the default values used throughout the configuration
//! system when no explicit value is provided.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Default listen address for the Kafka protocol
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9092";

/// Default Kafka socket address (const, no parsing needed)
pub(crate) const DEFAULT_LISTEN_SOCKET_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 9092);

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log output format ("text" or "json")
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Default broker node id
pub const DEFAULT_NODE_ID: i32 = 0;

/// Default maximum frame size in bytes (1 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Absolute ceiling on the frame size, whatever the configuration says (256 MiB)
pub const HARD_MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Default number of requests a single connection may have in flight
pub const DEFAULT_MAX_IN_FLIGHT_PER_CONNECTION: usize = 10;

/// Default size of the execution slot pool shared by all connections
pub const DEFAULT_EXECUTION_SLOTS: usize = 128;

/// Default policy for handlers reporting resource exhaustion
pub const DEFAULT_HANDLER_EXHAUSTION_FATAL: bool = false;

/// Default grace period for draining in-flight handlers on shutdown
pub const DEFAULT_DRAIN_GRACE_MS: u64 = 5000;

/// Default TCP_NODELAY setting
pub const DEFAULT_TCP_NODELAY: bool = true;

/// Default TCP keepalive enabled state
pub const DEFAULT_TCP_KEEPALIVE_ENABLED: bool = true;

/// Default TCP keepalive idle time in seconds
pub const DEFAULT_TCP_KEEPALIVE_IDLE_SECS: u32 = 60;

/// Default TCP keepalive probe interval in seconds
pub const DEFAULT_TCP_KEEPALIVE_INTERVAL_SECS: u32 = 10;

/// Default TCP keepalive probe count
pub const DEFAULT_TCP_KEEPALIVE_RETRIES: u32 = 3;

/// Default TCP receive buffer size in bytes (0 = OS default)
pub const DEFAULT_TCP_RECV_BUFFER_SIZE: u32 = 256 * 1024;

/// Default TCP send buffer size in bytes (0 = OS default)
pub const DEFAULT_TCP_SEND_BUFFER_SIZE: u32 = 256 * 1024;
