//! Listening endpoint
//!
//! Accepts TCP connections, optionally negotiates TLS, registers each
//! connection and hands it to the shared [`Dispatcher`]. Shutdown stops the
//! accept loop and shuts down the input of every registered connection,
//! which then drain and close on their own.

pub mod connection;
pub mod probe;
pub mod registry;
pub mod standalone;
pub mod tls;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::config::{ServerConfig, TcpConfig};
use crate::error::{Result, ServerError};
use crate::protocol::{self, ApiHandler, CloseReason, DispatchSettings, Dispatcher, ExecutionSlots};

pub use connection::Connection;
pub use probe::{NoopProbe, Probe, ProbeSnapshot, ServerProbe};
pub use registry::{ConnectionId, ConnectionInfo, ConnectionRegistry, Registration};
pub use standalone::StandaloneHandler;
pub use tls::{build_credentials, TlsCredentials};

/// The Kafka protocol listener
pub struct Server {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    registry: ConnectionRegistry,
    probe: Arc<dyn Probe>,
    tls: Option<TlsAcceptor>,
    stopping: Arc<watch::Sender<bool>>,
}

impl Server {
    /// Validate `config`, load TLS credentials and build the dispatcher.
    ///
    /// The API registry is initialized here, before anything is accepted.
    pub async fn new(
        config: ServerConfig,
        handler: Arc<dyn ApiHandler>,
        probe: Arc<dyn Probe>,
    ) -> Result<Self> {
        config.validate()?;

        let tls = match tls::build_credentials(&config.tls).await? {
            Some(credentials) => Some(credentials.acceptor()?),
            None => None,
        };

        let apis = protocol::registry();
        debug!(apis = apis.len(), "API registry initialized");

        let slots = Arc::new(ExecutionSlots::new(
            config.dispatch.execution_slots,
            config.dispatch.admission_queue_limit,
        ));
        let settings = DispatchSettings::from_config(&config.dispatch, &config.shutdown);
        let dispatcher = Arc::new(Dispatcher::new(handler, slots, probe.clone(), settings));
        let (stopping, _) = watch::channel(false);

        Ok(Self {
            config,
            dispatcher,
            registry: ConnectionRegistry::new(),
            probe,
            tls,
            stopping: Arc::new(stopping),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            stopping: self.stopping.clone(),
            registry: self.registry.clone(),
        }
    }

    /// Bind the configured listen address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.listen_addr;
        TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::bind(addr.to_string(), e.to_string()).into())
    }

    /// Accept connections on `listener` until shutdown is requested
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, tls = self.tls.is_some(), "Listening for Kafka clients");

        let mut stopping = self.stopping.subscribe();
        loop {
            tokio::select! {
                biased;
                _ = stopping.wait_for(|stopping| *stopping) => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.accept(stream, peer),
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
            }
        }

        info!(live = self.registry.len(), "Stopped accepting connections");
        Ok(())
    }

    fn accept(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = configure_tcp_socket(&stream, &self.config.tcp) {
            warn!(peer = %peer, error = %e, "Failed to configure TCP socket options");
        }

        let dispatcher = self.dispatcher.clone();
        let registry = self.registry.clone();
        let probe = self.probe.clone();
        let stopping = self.stopping.clone();
        let tls = self.tls.clone();

        tokio::spawn(async move {
            let start = Instant::now();
            let reason = match tls {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        debug!(peer = %peer, "TLS handshake completed");
                        serve_connection(dispatcher, tls_stream, &registry, peer, probe, &stopping)
                            .await
                    }
                    Err(e) => {
                        warn!(peer = %peer, error = %e, "TLS handshake failed");
                        return;
                    }
                },
                None => {
                    serve_connection(dispatcher, stream, &registry, peer, probe, &stopping).await
                }
            };

            if reason.is_graceful() {
                info!(
                    peer = %peer,
                    duration_secs = start.elapsed().as_secs(),
                    "Client disconnected"
                );
            } else {
                warn!(
                    peer = %peer,
                    reason = %reason,
                    duration_secs = start.elapsed().as_secs(),
                    "Client disconnected with error"
                );
            }
        });
    }

    /// Wait until every connection has closed. Returns false on timeout.
    pub async fn wait_for_connections(&self, timeout: Duration) -> bool {
        wait_until_empty(&self.registry, timeout).await
    }
}

async fn serve_connection<S>(
    dispatcher: Arc<Dispatcher>,
    stream: S,
    registry: &ConnectionRegistry,
    peer: SocketAddr,
    probe: Arc<dyn Probe>,
    stopping: &watch::Sender<bool>,
) -> CloseReason
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (connection, reader) = Connection::create(stream, registry, Some(peer), probe);
    // Registered after the shutdown broadcast went out
    if *stopping.borrow() {
        connection.shutdown_input();
    }
    dispatcher.run(connection, reader).await
}

async fn wait_until_empty(registry: &ConnectionRegistry, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, registry.wait_until_empty())
        .await
        .is_ok()
}

/// Stops a running [`Server`]. Cheap to clone.
#[derive(Clone)]
pub struct ShutdownHandle {
    stopping: Arc<watch::Sender<bool>>,
    registry: ConnectionRegistry,
}

impl ShutdownHandle {
    /// Stop accepting and shut down the input of every live connection.
    ///
    /// Returns how many connections were told to close. Calling it again
    /// only reaches connections that registered since.
    pub fn shutdown(&self) -> usize {
        self.stopping.send_replace(true);
        let closed = self.registry.shutdown_all();
        info!(connections = closed, "Shutdown broadcast to live connections");
        closed
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.stopping.borrow()
    }

    /// Wait until every connection has closed. Returns false on timeout.
    pub async fn wait_for_connections(&self, timeout: Duration) -> bool {
        wait_until_empty(&self.registry, timeout).await
    }
}

/// Apply `tcp_config` to an accepted socket
fn configure_tcp_socket(stream: &TcpStream, tcp_config: &TcpConfig) -> Result<()> {
    use socket2::SockRef;

    stream.set_nodelay(tcp_config.nodelay)?;

    // SockRef borrows the socket without taking ownership
    let sock_ref = SockRef::from(stream);

    if tcp_config.keepalive_enabled {
        #[allow(unused_mut)]
        let mut keepalive = socket2::TcpKeepalive::new()
            .with_time(Duration::from_secs(tcp_config.keepalive_idle_secs as u64))
            .with_interval(Duration::from_secs(
                tcp_config.keepalive_interval_secs as u64,
            ));

        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            keepalive = keepalive.with_retries(tcp_config.keepalive_retries);
        }

        sock_ref.set_tcp_keepalive(&keepalive)?;
    }

    if tcp_config.recv_buffer_size > 0 {
        sock_ref.set_recv_buffer_size(tcp_config.recv_buffer_size as usize)?;
    }
    if tcp_config.send_buffer_size > 0 {
        sock_ref.set_send_buffer_size(tcp_config.send_buffer_size as usize)?;
    }

    Ok(())
}
