//! Shared fixtures for Tideway integration tests
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```
//!
//! - `TestClient`: speaks the wire protocol over any byte stream
//! - `start_dispatch`: one dispatcher-driven connection over an in-memory pipe
//! - Test handlers with controllable latency and failures

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use kafka_protocol::messages::*;
use kafka_protocol::protocol::StrBytes;
use rand::Rng;
use tideway::error::{ErrorCode, HandlerError, HandlerResult};
use tideway::protocol::api::{registry, ApiHandler, Request, RequestContext, Response};
use tideway::protocol::frame::{encode_request_frame, RequestHeader, ResponseFrame};
use tideway::protocol::{CloseReason, DispatchSettings, Dispatcher, ExecutionSlots};
use tideway::server::{Connection, ConnectionRegistry, ServerProbe};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

pub const CLIENT_ID: &str = "tideway-test";

// ============================================================================
// Client
// ============================================================================

/// Minimal wire-level client
pub struct TestClient<S> {
    stream: S,
}

impl<S> TestClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Encode `request` for `version` and send it without waiting
    pub async fn send(&mut self, version: i16, correlation_id: i32, request: &Request) {
        let descriptor = registry().get(request.api_key()).unwrap();
        let body = descriptor.encode_request(request, version).unwrap();
        self.send_body(request.api_key(), version, correlation_id, &body)
            .await;
    }

    /// Send an already encoded body under a header of our choosing
    pub async fn send_body(&mut self, api_key: i16, version: i16, correlation_id: i32, body: &[u8]) {
        let header = RequestHeader::new(api_key, version, correlation_id).with_client_id(CLIENT_ID);
        let frame = encode_request_frame(&header, body);
        self.stream.write_all(&frame).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    /// Next response frame, or `None` once the server closed the stream
    pub async fn read_frame(&mut self) -> Option<ResponseFrame> {
        let mut prefix = [0u8; 4];
        if self.stream.read_exact(&mut prefix).await.is_err() {
            return None;
        }
        let mut payload = vec![0u8; u32::from_be_bytes(prefix) as usize];
        self.stream.read_exact(&mut payload).await.ok()?;
        Some(ResponseFrame::parse(Bytes::from(payload)).unwrap())
    }

    /// Read the next response and decode it as `api_key` at `version`
    pub async fn read_response(&mut self, api_key: i16, version: i16) -> (i32, Response) {
        let frame = self.read_frame().await.expect("connection closed");
        let response = registry()
            .get(api_key)
            .unwrap()
            .decode_response(frame.body, version)
            .unwrap();
        (frame.correlation_id, response)
    }

    /// Send one request and wait for its response
    pub async fn call(&mut self, version: i16, correlation_id: i32, request: Request) -> Response {
        self.send(version, correlation_id, &request).await;
        let (corr, response) = self.read_response(request.api_key(), version).await;
        assert_eq!(corr, correlation_id);
        response
    }

    /// True once the server has closed its side
    pub async fn is_closed(&mut self) -> bool {
        let mut buf = [0u8; 1];
        matches!(
            tokio::time::timeout(Duration::from_secs(5), self.stream.read(&mut buf)).await,
            Ok(Ok(0)) | Ok(Err(_))
        )
    }

    pub async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

// ============================================================================
// In-memory dispatch harness
// ============================================================================

pub struct Harness {
    pub client: TestClient<DuplexStream>,
    pub probe: Arc<ServerProbe>,
    pub registry: ConnectionRegistry,
    pub run: JoinHandle<CloseReason>,
}

impl Harness {
    /// Close the client side and wait for the dispatcher to finish
    pub async fn finish(mut self) -> (CloseReason, Arc<ServerProbe>) {
        self.client.close().await;
        let reason = tokio::time::timeout(Duration::from_secs(10), self.run)
            .await
            .expect("dispatcher did not finish")
            .unwrap();
        (reason, self.probe)
    }

    /// Wait for the dispatcher to finish on its own
    pub async fn closed(self) -> (CloseReason, Arc<ServerProbe>, TestClient<DuplexStream>) {
        let reason = tokio::time::timeout(Duration::from_secs(10), self.run)
            .await
            .expect("dispatcher did not finish")
            .unwrap();
        (reason, self.probe, self.client)
    }
}

pub fn settings() -> DispatchSettings {
    DispatchSettings {
        drain_grace: Duration::from_secs(5),
        ..DispatchSettings::default()
    }
}

pub fn start_dispatch(handler: Arc<dyn ApiHandler>, settings: DispatchSettings) -> Harness {
    start_dispatch_with_slots(handler, settings, ExecutionSlots::new(16, None))
}

pub fn start_dispatch_with_slots(
    handler: Arc<dyn ApiHandler>,
    settings: DispatchSettings,
    slots: ExecutionSlots,
) -> Harness {
    let registry = ConnectionRegistry::new();
    let probe = Arc::new(ServerProbe::new());
    let (client, server) = tokio::io::duplex(256 * 1024);
    let (connection, reader) = Connection::create(
        server,
        &registry,
        "127.0.0.1:40000".parse().ok(),
        probe.clone(),
    );
    let dispatcher = Arc::new(Dispatcher::new(
        handler,
        Arc::new(slots),
        probe.clone(),
        settings,
    ));
    let run = tokio::spawn(dispatcher.run(connection, reader));
    Harness {
        client: TestClient::new(client),
        probe,
        registry,
        run,
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn group_id(name: &str) -> GroupId {
    GroupId(StrBytes::from_string(name.to_string()))
}

pub fn describe_groups(names: &[&str]) -> Request {
    Request::DescribeGroups(
        DescribeGroupsRequest::default().with_groups(names.iter().map(|n| group_id(n)).collect()),
    )
}

pub fn heartbeat(group: &str, generation_id: i32) -> Request {
    Request::Heartbeat(
        HeartbeatRequest::default()
            .with_group_id(group_id(group))
            .with_generation_id(generation_id)
            .with_member_id(StrBytes::from_static_str("member-1")),
    )
}

pub fn list_groups() -> Request {
    Request::ListGroups(ListGroupsRequest::default())
}

pub fn leave_group(group: &str) -> Request {
    Request::LeaveGroup(
        LeaveGroupRequest::default()
            .with_group_id(group_id(group))
            .with_member_id(StrBytes::from_static_str("member-1")),
    )
}

pub fn api_versions() -> Request {
    Request::ApiVersions(ApiVersionsRequest::default())
}

pub fn encode_error_code(code: ErrorCode) -> Bytes {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&code.as_i16().to_be_bytes());
    buf.freeze()
}

// ============================================================================
// Handlers
// ============================================================================

/// Answers ListGroups after a random delay, and Heartbeat after a delay
/// that shrinks as the generation id grows
pub struct JitterHandler {
    pub max_delay_ms: u64,
}

#[async_trait]
impl ApiHandler for JitterHandler {
    async fn list_groups(
        &self,
        _ctx: &RequestContext,
        _request: &ListGroupsRequest,
    ) -> HandlerResult<ListGroupsResponse> {
        let delay = rand::thread_rng().gen_range(0..=self.max_delay_ms);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(ListGroupsResponse::default())
    }

    async fn heartbeat(
        &self,
        _ctx: &RequestContext,
        request: &HeartbeatRequest,
    ) -> HandlerResult<HeartbeatResponse> {
        // Earlier generations finish later
        let delay = 100u64.saturating_sub(request.generation_id as u64 * 10);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(HeartbeatResponse::default())
    }
}

/// Fails in every way a handler can
pub struct FailingHandler;

#[async_trait]
impl ApiHandler for FailingHandler {
    async fn describe_groups(
        &self,
        _ctx: &RequestContext,
        _request: &DescribeGroupsRequest,
    ) -> HandlerResult<DescribeGroupsResponse> {
        Err(HandlerError::with_code(
            ErrorCode::NotCoordinator,
            "coordinator moved",
        ))
    }

    async fn heartbeat(
        &self,
        _ctx: &RequestContext,
        _request: &HeartbeatRequest,
    ) -> HandlerResult<HeartbeatResponse> {
        panic!("heartbeat handler blew up");
    }

    async fn leave_group(
        &self,
        _ctx: &RequestContext,
        _request: &LeaveGroupRequest,
    ) -> HandlerResult<LeaveGroupResponse> {
        Err(HandlerError::exhausted("member table full"))
    }
}

/// Holds every ListGroups request for `delay`
pub struct SlowHandler {
    pub delay: Duration,
}

#[async_trait]
impl ApiHandler for SlowHandler {
    async fn list_groups(
        &self,
        _ctx: &RequestContext,
        _request: &ListGroupsRequest,
    ) -> HandlerResult<ListGroupsResponse> {
        tokio::time::sleep(self.delay).await;
        Ok(ListGroupsResponse::default())
    }
}
