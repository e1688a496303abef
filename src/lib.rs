#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Tideway
//!
//! Connection lifecycle and versioned Kafka protocol dispatch for a
//! streaming broker.
//!
//! Tideway accepts client connections, reads length-prefixed request frames,
//! resolves each against a registry of supported APIs and versions, decodes
//! the body with the matching version's codec and hands it to an
//! [`ApiHandler`]. Responses go back in request order even when handlers
//! finish out of order.
//!
//! ## Running the Server
//!
//! ```bash
//! # Run with defaults (listens on 0.0.0.0:9092)
//! $ ./tideway
//!
//! # Run with TLS enabled
//! $ ./tideway --tls-enabled --tls-cert server.crt --tls-key server.key
//! ```
//!
//! ## Library Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tideway::server::{ServerProbe, StandaloneHandler};
//! use tideway::{Server, ServerConfig};
//!
//! # async fn run() -> tideway::Result<()> {
//! let config = ServerConfig::default();
//! let handler = Arc::new(StandaloneHandler::new(0, "localhost", 9092));
//! let server = Server::new(config, handler, Arc::new(ServerProbe::new())).await?;
//! let listener = server.bind().await?;
//! server.serve(listener).await?;
//! # Ok(())
//! # }
//! ```

// Deny .unwrap() in production code to prevent panics in a network service.
// Test code is exempt via #[cfg(test)] and --cfg test.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod config;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod transport;

pub use config::{ServerArgs, ServerConfig};
pub use error::{ErrorCode, Result, TidewayError};
pub use protocol::{ApiHandler, CloseReason, Dispatcher, RequestContext};
pub use server::{Connection, ConnectionRegistry, Probe, Server, ServerProbe, ShutdownHandle};
