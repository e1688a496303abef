//! Handler for a broker running without a group coordinator
//!
//! This node reports itself as the coordinator of every group, knows no
//! groups, and rejects membership operations from unknown members.

use async_trait::async_trait;
use kafka_protocol::messages::{
    BrokerId, DescribeGroupsRequest, DescribeGroupsResponse, FindCoordinatorRequest,
    FindCoordinatorResponse, HeartbeatRequest, HeartbeatResponse, LeaveGroupRequest,
    LeaveGroupResponse, ListGroupsRequest, ListGroupsResponse,
};
use kafka_protocol::protocol::StrBytes;
use tracing::debug;

use crate::error::{ErrorCode, HandlerResult};
use crate::protocol::api::{make_dead_described_group, ApiHandler, RequestContext};

#[derive(Debug, Clone)]
pub struct StandaloneHandler {
    node_id: i32,
    host: String,
    port: i32,
}

impl StandaloneHandler {
    /// `host` and `port` are what clients are told to connect to
    pub fn new(node_id: i32, host: impl Into<String>, port: i32) -> Self {
        Self {
            node_id,
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl ApiHandler for StandaloneHandler {
    async fn find_coordinator(
        &self,
        ctx: &RequestContext,
        request: &FindCoordinatorRequest,
    ) -> HandlerResult<FindCoordinatorResponse> {
        debug!(
            correlation_id = ctx.correlation_id,
            key = %request.key.as_str(),
            key_type = request.key_type,
            "FindCoordinator"
        );
        Ok(FindCoordinatorResponse::default()
            .with_error_code(ErrorCode::None.as_i16())
            .with_node_id(BrokerId::from(self.node_id))
            .with_host(StrBytes::from_string(self.host.clone()))
            .with_port(self.port))
    }

    async fn heartbeat(
        &self,
        _ctx: &RequestContext,
        _request: &HeartbeatRequest,
    ) -> HandlerResult<HeartbeatResponse> {
        Ok(HeartbeatResponse::default().with_error_code(ErrorCode::UnknownMemberId.as_i16()))
    }

    async fn leave_group(
        &self,
        _ctx: &RequestContext,
        _request: &LeaveGroupRequest,
    ) -> HandlerResult<LeaveGroupResponse> {
        Ok(LeaveGroupResponse::default().with_error_code(ErrorCode::UnknownMemberId.as_i16()))
    }

    async fn list_groups(
        &self,
        _ctx: &RequestContext,
        _request: &ListGroupsRequest,
    ) -> HandlerResult<ListGroupsResponse> {
        Ok(ListGroupsResponse::default()
            .with_error_code(ErrorCode::None.as_i16())
            .with_groups(Vec::new()))
    }

    async fn describe_groups(
        &self,
        _ctx: &RequestContext,
        request: &DescribeGroupsRequest,
    ) -> HandlerResult<DescribeGroupsResponse> {
        let groups = request
            .groups
            .iter()
            .cloned()
            .map(make_dead_described_group)
            .collect();
        Ok(DescribeGroupsResponse::default().with_groups(groups))
    }
}
