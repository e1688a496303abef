//! The seam between the dispatcher and broker business logic

use std::net::SocketAddr;

use async_trait::async_trait;
use kafka_protocol::messages::{
    DescribeGroupsRequest, DescribeGroupsResponse, FindCoordinatorRequest,
    FindCoordinatorResponse, HeartbeatRequest, HeartbeatResponse, LeaveGroupRequest,
    LeaveGroupResponse, ListGroupsRequest, ListGroupsResponse,
};

use crate::error::{ErrorCode, HandlerError, HandlerResult};
use crate::server::registry::ConnectionId;

/// What a handler knows about the request it is serving
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub connection_id: ConnectionId,
    pub peer_addr: Option<SocketAddr>,
    pub api_key: i16,
    pub api_version: i16,
    pub correlation_id: i32,
    pub client_id: Option<String>,
}

/// Business logic behind the group coordination APIs.
///
/// Requests arrive already decoded for `ctx.api_version`, and the response
/// is encoded for that same version, so a handler must only populate fields
/// that exist in it. A returned [`HandlerError`] is answered with the API's
/// error response; it never closes the connection unless it reports
/// resource exhaustion and the server is configured to treat that as fatal.
///
/// Every method defaults to `COORDINATOR_NOT_AVAILABLE`.
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    async fn find_coordinator(
        &self,
        _ctx: &RequestContext,
        _request: &FindCoordinatorRequest,
    ) -> HandlerResult<FindCoordinatorResponse> {
        Err(not_available("FindCoordinator"))
    }

    async fn heartbeat(
        &self,
        _ctx: &RequestContext,
        _request: &HeartbeatRequest,
    ) -> HandlerResult<HeartbeatResponse> {
        Err(not_available("Heartbeat"))
    }

    async fn leave_group(
        &self,
        _ctx: &RequestContext,
        _request: &LeaveGroupRequest,
    ) -> HandlerResult<LeaveGroupResponse> {
        Err(not_available("LeaveGroup"))
    }

    async fn list_groups(
        &self,
        _ctx: &RequestContext,
        _request: &ListGroupsRequest,
    ) -> HandlerResult<ListGroupsResponse> {
        Err(not_available("ListGroups"))
    }

    async fn describe_groups(
        &self,
        _ctx: &RequestContext,
        _request: &DescribeGroupsRequest,
    ) -> HandlerResult<DescribeGroupsResponse> {
        Err(not_available("DescribeGroups"))
    }
}

fn not_available(api: &str) -> HandlerError {
    HandlerError::with_code(
        ErrorCode::CoordinatorNotAvailable,
        format!("{} is not served by this handler", api),
    )
}
