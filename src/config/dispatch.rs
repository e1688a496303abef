//! Request dispatch and shutdown configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::defaults::{
    DEFAULT_DRAIN_GRACE_MS, DEFAULT_EXECUTION_SLOTS, DEFAULT_HANDLER_EXHAUSTION_FATAL,
    DEFAULT_MAX_FRAME_BYTES, DEFAULT_MAX_IN_FLIGHT_PER_CONNECTION, HARD_MAX_FRAME_BYTES,
};
use crate::error::{ConfigError, Result};
use crate::protocol::compression::CompressionCodec;

/// Limits and policies for the per-connection request dispatcher
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Largest frame accepted from a client, in bytes.
    /// Never larger than [`HARD_MAX_FRAME_BYTES`].
    pub max_frame_bytes: usize,

    /// Requests a single connection may have decoded but not yet answered.
    /// The reader stops pulling frames off the socket while the window is full.
    pub max_in_flight_per_connection: usize,

    /// Size of the execution slot pool shared by every connection
    pub execution_slots: usize,

    /// How many handler invocations may wait for a slot before new ones are
    /// rejected with `REQUEST_TIMED_OUT`. `None` waits without limit.
    pub admission_queue_limit: Option<usize>,

    /// Close the connection when a handler reports resource exhaustion
    pub handler_exhaustion_fatal: bool,

    /// Body transform applied to every request and response
    pub compression: CompressionCodec,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            max_in_flight_per_connection: DEFAULT_MAX_IN_FLIGHT_PER_CONNECTION,
            execution_slots: DEFAULT_EXECUTION_SLOTS,
            admission_queue_limit: None,
            handler_exhaustion_fatal: DEFAULT_HANDLER_EXHAUSTION_FATAL,
            compression: CompressionCodec::None,
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::invalid_value("dispatch.max_frame_bytes", "must be > 0").into());
        }
        if self.max_frame_bytes > HARD_MAX_FRAME_BYTES {
            return Err(ConfigError::invalid_value(
                "dispatch.max_frame_bytes",
                format!("must not exceed {} bytes", HARD_MAX_FRAME_BYTES),
            )
            .into());
        }
        if self.max_in_flight_per_connection == 0 {
            return Err(ConfigError::invalid_value(
                "dispatch.max_in_flight_per_connection",
                "must be > 0",
            )
            .into());
        }
        if self.execution_slots == 0 {
            return Err(ConfigError::invalid_value("dispatch.execution_slots", "must be > 0").into());
        }
        Ok(())
    }

    /// Frame limit with the hard ceiling applied
    pub fn effective_max_frame_bytes(&self) -> usize {
        self.max_frame_bytes.min(HARD_MAX_FRAME_BYTES)
    }
}

/// Connection shutdown behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long in-flight handlers may keep running once a connection closes
    pub drain_grace_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_grace_ms: DEFAULT_DRAIN_GRACE_MS,
        }
    }
}

impl ShutdownConfig {
    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}
