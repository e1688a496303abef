//! TCP socket configuration
//!
//! Options applied to every accepted socket before the connection is handed
//! to the dispatcher.
//!
//! # Example
//!
//! ```
//! use tideway::config::TcpConfig;
//!
//! let config = TcpConfig {
//!     nodelay: true,
//!     keepalive_enabled: true,
//!     keepalive_idle_secs: 60,
//!     keepalive_interval_secs: 10,
//!     keepalive_retries: 3,
//!     recv_buffer_size: 0,
//!     send_buffer_size: 0,
//! };
//! assert!(config.uses_os_default_buffers());
//! ```

use serde::{Deserialize, Serialize};

use super::defaults::{
    DEFAULT_TCP_KEEPALIVE_ENABLED, DEFAULT_TCP_KEEPALIVE_IDLE_SECS,
    DEFAULT_TCP_KEEPALIVE_INTERVAL_SECS, DEFAULT_TCP_KEEPALIVE_RETRIES, DEFAULT_TCP_NODELAY,
    DEFAULT_TCP_RECV_BUFFER_SIZE, DEFAULT_TCP_SEND_BUFFER_SIZE,
};

/// TCP socket configuration for accepted connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TcpConfig {
    /// Disable Nagle's algorithm
    pub nodelay: bool,

    /// Enable TCP keepalive
    pub keepalive_enabled: bool,

    /// TCP keepalive idle time in seconds (time before first keepalive probe)
    pub keepalive_idle_secs: u32,

    /// TCP keepalive interval in seconds (time between keepalive probes)
    pub keepalive_interval_secs: u32,

    /// TCP keepalive retry count (number of failed probes before closing connection)
    pub keepalive_retries: u32,

    /// TCP receive buffer size in bytes (SO_RCVBUF)
    /// Set to 0 to use OS default
    pub recv_buffer_size: u32,

    /// TCP send buffer size in bytes (SO_SNDBUF)
    /// Set to 0 to use OS default
    pub send_buffer_size: u32,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            nodelay: DEFAULT_TCP_NODELAY,
            keepalive_enabled: DEFAULT_TCP_KEEPALIVE_ENABLED,
            keepalive_idle_secs: DEFAULT_TCP_KEEPALIVE_IDLE_SECS,
            keepalive_interval_secs: DEFAULT_TCP_KEEPALIVE_INTERVAL_SECS,
            keepalive_retries: DEFAULT_TCP_KEEPALIVE_RETRIES,
            recv_buffer_size: DEFAULT_TCP_RECV_BUFFER_SIZE,
            send_buffer_size: DEFAULT_TCP_SEND_BUFFER_SIZE,
        }
    }
}

impl TcpConfig {
    /// Check if the configuration uses OS default buffer sizes
    pub fn uses_os_default_buffers(&self) -> bool {
        self.recv_buffer_size == 0 && self.send_buffer_size == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TcpConfig::default();
        assert!(config.nodelay);
        assert!(config.keepalive_enabled);
        assert_eq!(config.keepalive_idle_secs, 60);
        assert_eq!(config.keepalive_interval_secs, 10);
        assert_eq!(config.keepalive_retries, 3);
        assert_eq!(config.recv_buffer_size, 256 * 1024);
        assert_eq!(config.send_buffer_size, 256 * 1024);
    }

    #[test]
    fn test_uses_os_default_buffers() {
        assert!(!TcpConfig::default().uses_os_default_buffers());

        let os_default = TcpConfig {
            recv_buffer_size: 0,
            send_buffer_size: 0,
            ..Default::default()
        };
        assert!(os_default.uses_os_default_buffers());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: TcpConfig = toml::from_str("nodelay = false").unwrap();
        assert!(!config.nodelay);
        assert_eq!(config.keepalive_retries, DEFAULT_TCP_KEEPALIVE_RETRIES);
    }
}
