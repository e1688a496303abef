//! Per-connection request dispatcher
//!
//! The read loop of one connection: read a frame, resolve its API and
//! version, decode the body, and hand the request to a handler task. Handler
//! tasks run concurrently (bounded by the connection's in-flight window and
//! the shared execution slots) and submit their responses to the
//! connection's [`Pipeline`], which releases them to a single writer task in
//! arrival order.
//!
//! Errors are split by [`Severity`](crate::error::Severity). Unknown APIs,
//! unsupported versions and handler failures are answered with an error
//! response and the connection keeps going. Framing violations, malformed
//! bodies and write failures close it.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use super::api::{registry, ApiDescriptor, ApiHandler, ApiRegistry, Request, RequestContext, Response};
use super::compression::{compress, decompress, CompressionCodec};
use super::frame::{read_frame, RequestFrame, ResponseFrame};
use super::pipeline::{InFlightPermit, Pipeline, ResponseEnvelope, WindowCloser};
use super::slots::ExecutionSlots;
use crate::config::{DispatchConfig, ShutdownConfig};
use crate::error::{
    DecodeError, FrameError, HandlerError, HandlerResult, TidewayError, TransportError,
};
use crate::server::connection::Connection;
use crate::server::probe::Probe;
use crate::transport::{InputHandle, TransportReader};

/// Knobs that apply to every connection a dispatcher drives
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub max_frame_bytes: usize,
    pub max_in_flight: usize,
    pub handler_exhaustion_fatal: bool,
    pub compression: CompressionCodec,
    /// How long a closing connection waits for in-flight handlers
    pub drain_grace: Duration,
}

impl DispatchSettings {
    pub fn from_config(dispatch: &DispatchConfig, shutdown: &ShutdownConfig) -> Self {
        Self {
            max_frame_bytes: dispatch.effective_max_frame_bytes(),
            max_in_flight: dispatch.max_in_flight_per_connection,
            handler_exhaustion_fatal: dispatch.handler_exhaustion_fatal,
            compression: dispatch.compression,
            drain_grace: shutdown.drain_grace(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default(), &ShutdownConfig::default())
    }
}

/// Why a connection's dispatch loop ended
#[derive(Debug)]
pub enum CloseReason {
    /// The peer closed its write side between frames
    PeerClosed,
    /// Input was shut down from outside (server shutdown)
    Shutdown,
    Frame(FrameError),
    Decode(DecodeError),
    /// A handler reported exhaustion and the server treats that as fatal
    ResourceExhausted(HandlerError),
    Encode(String),
    WriteFailed(TransportError),
}

impl CloseReason {
    /// Graceful closes drain in-flight handlers; the rest abandon them
    pub fn is_graceful(&self) -> bool {
        matches!(self, CloseReason::PeerClosed | CloseReason::Shutdown)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => f.write_str("peer closed"),
            CloseReason::Shutdown => f.write_str("shutdown"),
            CloseReason::Frame(e) => write!(f, "frame error: {}", e),
            CloseReason::Decode(e) => write!(f, "decode error: {}", e),
            CloseReason::ResourceExhausted(e) => write!(f, "resource exhausted: {}", e),
            CloseReason::Encode(e) => write!(f, "encode error: {}", e),
            CloseReason::WriteFailed(e) => write!(f, "write failed: {}", e),
        }
    }
}

/// First fatal error raised off the read loop, plus the means to stop it
struct Teardown {
    reason: Mutex<Option<CloseReason>>,
    input: InputHandle,
    window: WindowCloser,
}

impl Teardown {
    fn new(input: InputHandle, window: WindowCloser) -> Self {
        Self {
            reason: Mutex::new(None),
            input,
            window,
        }
    }

    /// Record `reason` (the first one wins), stop admitting requests and
    /// stop the read loop
    fn fail(&self, reason: CloseReason) {
        {
            let mut slot = self.reason.lock();
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.window.close();
        let _ = self.input.shutdown();
    }

    fn take(&self) -> Option<CloseReason> {
        self.reason.lock().take()
    }
}

/// Drives the request/response cycle of every connection it is given
pub struct Dispatcher {
    registry: &'static ApiRegistry,
    handler: Arc<dyn ApiHandler>,
    slots: Arc<ExecutionSlots>,
    probe: Arc<dyn Probe>,
    settings: DispatchSettings,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("apis", &self.registry.len())
            .field("slots", &self.slots)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(
        handler: Arc<dyn ApiHandler>,
        slots: Arc<ExecutionSlots>,
        probe: Arc<dyn Probe>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry: registry(),
            handler,
            slots,
            probe,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Serve `connection` until it closes.
    ///
    /// `reader` must be the read half returned alongside `connection` by
    /// [`Connection::create`]. Returns once every response that will be
    /// written has been written and the connection is shut down.
    #[tracing::instrument(
        name = "connection",
        skip_all,
        fields(connection_id = %connection.id(), peer = ?connection.peer_addr())
    )]
    pub async fn run<S>(
        self: Arc<Self>,
        connection: Connection<S>,
        mut reader: TransportReader<ReadHalf<S>>,
    ) -> CloseReason
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let connection_id = connection.id();
        let peer_addr = connection.peer_addr();
        let input = connection.input_handle();
        let (pipeline, responses) = Pipeline::new(self.settings.max_in_flight);
        let pipeline = Arc::new(pipeline);
        let teardown = Arc::new(Teardown::new(input.clone(), pipeline.closer()));
        let writer = tokio::spawn(write_responses(connection, responses, teardown.clone()));
        let mut tasks = JoinSet::new();

        let reason = loop {
            while let Some(finished) = tasks.try_join_next() {
                log_task_exit(finished);
            }

            let payload = match read_frame(&mut reader, self.settings.max_frame_bytes).await {
                Ok(payload) => payload,
                Err(FrameError::EndOfStream) => break CloseReason::PeerClosed,
                Err(FrameError::Shutdown) => break teardown.take().unwrap_or(CloseReason::Shutdown),
                Err(e) => {
                    if e.is_protocol_violation() {
                        self.probe.protocol_violation();
                    }
                    break CloseReason::Frame(e);
                }
            };

            let RequestFrame { header, body } = match RequestFrame::parse(payload) {
                Ok(frame) => frame,
                Err(e) => {
                    self.probe.protocol_violation();
                    break CloseReason::Decode(e);
                }
            };
            self.probe.request_received(header.api_key);
            trace!(
                api_key = header.api_key,
                api_version = header.api_version,
                correlation_id = header.correlation_id,
                "Request received"
            );

            let (permit, seq) = tokio::select! {
                biased;
                _ = input.wait_for_shutdown() => {
                    break teardown.take().unwrap_or(CloseReason::Shutdown);
                }
                acquired = pipeline.acquire_permit() => match acquired {
                    Some(acquired) => acquired,
                    None => break teardown.take().unwrap_or(CloseReason::Shutdown),
                },
            };

            let descriptor = match self.registry.resolve(header.api_key, header.api_version) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    debug!(
                        api_key = header.api_key,
                        api_version = header.api_version,
                        correlation_id = header.correlation_id,
                        error = %err,
                        "Rejecting request"
                    );
                    self.probe.request_rejected(header.api_key, err.error_code());
                    match compress(self.registry.error_body(&err), self.settings.compression) {
                        Ok(body) => {
                            let frame = ResponseFrame::new(header.correlation_id, body);
                            pipeline.submit(seq, frame, permit);
                            continue;
                        }
                        Err(e) => break CloseReason::Encode(e.to_string()),
                    }
                }
            };

            let request = match decompress(body, self.settings.compression)
                .and_then(|body| descriptor.decode_request(body, header.api_version))
            {
                Ok(request) => request,
                Err(e) => {
                    warn!(
                        api_key = header.api_key,
                        api_version = header.api_version,
                        correlation_id = header.correlation_id,
                        error = %e,
                        "Malformed request body"
                    );
                    self.probe.protocol_violation();
                    break CloseReason::Decode(e);
                }
            };

            let task = HandlerTask {
                dispatcher: self.clone(),
                descriptor,
                pipeline: pipeline.clone(),
                teardown: teardown.clone(),
                ctx: RequestContext {
                    connection_id,
                    peer_addr,
                    api_key: header.api_key,
                    api_version: header.api_version,
                    correlation_id: header.correlation_id,
                    client_id: header.client_id,
                },
                request,
                seq,
                permit,
                received_at: Instant::now(),
            };
            tasks.spawn(task.run());
        };

        if reason.is_graceful() {
            debug!(reason = %reason, in_flight = tasks.len(), "Draining in-flight requests");
            let drain = async {
                while let Some(finished) = tasks.join_next().await {
                    log_task_exit(finished);
                }
            };
            if tokio::time::timeout(self.settings.drain_grace, drain).await.is_err() {
                warn!(
                    abandoned = tasks.len(),
                    grace_ms = self.settings.drain_grace.as_millis() as u64,
                    "Drain grace elapsed, abandoning in-flight requests"
                );
                tasks.shutdown().await;
            }
        } else {
            info!(reason = %reason, "Closing connection");
            tasks.shutdown().await;
        }

        // Last sender goes with the pipeline, which lets the writer finish
        drop(pipeline);
        if let Err(e) = writer.await {
            warn!(error = %e, "Response writer task failed");
        }
        debug!(reason = %reason, "Connection closed");
        reason
    }
}

fn log_task_exit(finished: Result<(), tokio::task::JoinError>) {
    if let Err(e) = finished {
        if e.is_panic() {
            warn!(error = %e, "Handler task panicked");
        }
    }
}

/// Sole writer of a connection: writes released responses one at a time
async fn write_responses<S>(
    mut connection: Connection<S>,
    mut responses: mpsc::UnboundedReceiver<ResponseEnvelope>,
    teardown: Arc<Teardown>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    while let Some(envelope) = responses.recv().await {
        let seq = envelope.seq;
        let correlation_id = envelope.frame.correlation_id;
        // The in-flight permit rides in the envelope until the write is done
        if let Err(e) = connection.write_frame(envelope.frame).await {
            warn!(seq, correlation_id, error = %e, "Failed to write response");
            teardown.fail(CloseReason::WriteFailed(e));
            break;
        }
        trace!(seq, correlation_id, "Response written");
    }
    connection.shutdown().await;
}

/// One admitted request on its way to a response
struct HandlerTask {
    dispatcher: Arc<Dispatcher>,
    descriptor: &'static ApiDescriptor,
    pipeline: Arc<Pipeline>,
    teardown: Arc<Teardown>,
    ctx: RequestContext,
    request: Request,
    seq: u64,
    permit: InFlightPermit,
    received_at: Instant,
}

impl HandlerTask {
    async fn run(self) {
        let HandlerTask {
            dispatcher,
            descriptor,
            pipeline,
            teardown,
            ctx,
            request,
            seq,
            permit,
            received_at,
        } = self;
        let probe = dispatcher.probe.as_ref();
        let settings = &dispatcher.settings;

        let response = match dispatcher.execute(descriptor, &ctx, &request).await {
            Ok(response) => {
                probe.request_completed(ctx.api_key, received_at.elapsed());
                response
            }
            Err((err, admitted)) => {
                let fatal_exhaustion = settings.handler_exhaustion_fatal && admitted;
                if err.severity(fatal_exhaustion).is_connection_fatal() {
                    warn!(
                        api = descriptor.name,
                        correlation_id = ctx.correlation_id,
                        error = %err,
                        "Handler exhausted resources, closing connection"
                    );
                    teardown.fail(CloseReason::ResourceExhausted(err));
                    return;
                }

                debug!(
                    api = descriptor.name,
                    api_version = ctx.api_version,
                    correlation_id = ctx.correlation_id,
                    error = %err,
                    "Answering with error response"
                );
                probe.handler_failed(ctx.api_key);
                probe.request_rejected(ctx.api_key, err.error_code());
                match descriptor.error_response(&request, err.error_code(), ctx.api_version) {
                    Ok(response) => response,
                    Err(e) => {
                        teardown.fail(CloseReason::Encode(e.to_string()));
                        return;
                    }
                }
            }
        };

        let body = descriptor
            .encode_response(&response, ctx.api_version)
            .map_err(TidewayError::from)
            .and_then(|body| compress(body, settings.compression));
        match body {
            Ok(body) => pipeline.submit(seq, ResponseFrame::new(ctx.correlation_id, body), permit),
            Err(e) => {
                warn!(
                    api = descriptor.name,
                    api_version = ctx.api_version,
                    error = %e,
                    "Failed to encode response"
                );
                teardown.fail(CloseReason::Encode(e.to_string()));
            }
        }
    }
}

impl Dispatcher {
    /// Run the handler under an execution slot.
    ///
    /// The flag on the error says whether the request had been admitted;
    /// admission rejections never close the connection.
    async fn execute(
        &self,
        descriptor: &ApiDescriptor,
        ctx: &RequestContext,
        request: &Request,
    ) -> Result<Response, (HandlerError, bool)> {
        let slot = self
            .slots
            .acquire(self.probe.as_ref())
            .await
            .map_err(|rejected| (rejected, false))?;
        if slot.was_deferred() {
            trace!(api = descriptor.name, "Admission deferred until a slot freed");
        }
        let result = self.invoke(descriptor, ctx, request).await;
        drop(slot);
        result.map_err(|err| (err, true))
    }

    async fn invoke(
        &self,
        descriptor: &ApiDescriptor,
        ctx: &RequestContext,
        request: &Request,
    ) -> HandlerResult<Response> {
        AssertUnwindSafe(descriptor.handle(self.handler.as_ref(), ctx, request))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(HandlerError::failed(format!("{} handler panicked", descriptor.name)))
            })
    }
}
