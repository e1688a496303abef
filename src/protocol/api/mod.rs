//! Versioned Kafka APIs served by the dispatcher
//!
//! Each submodule binds one API key to its request/response message types,
//! its supported version range, the handler method that serves it and the
//! error response it answers with when that handler fails. The registry
//! turns those bindings into one immutable descriptor table.

use futures_util::future::BoxFuture;
use kafka_protocol::messages::{
    ApiVersionsRequest, ApiVersionsResponse, DescribeGroupsRequest, DescribeGroupsResponse,
    FindCoordinatorRequest, FindCoordinatorResponse, HeartbeatRequest, HeartbeatResponse,
    LeaveGroupRequest, LeaveGroupResponse, ListGroupsRequest, ListGroupsResponse,
};
use kafka_protocol::protocol::{Decodable, Encodable};

use crate::error::{ErrorCode, HandlerResult};

pub mod api_versions;
pub mod describe_groups;
pub mod find_coordinator;
mod handler;
pub mod heartbeat;
pub mod leave_group;
pub mod list_groups;
mod registry;

pub use describe_groups::{make_dead_described_group, make_empty_described_group, GroupState};
pub use handler::{ApiHandler, RequestContext};
pub use registry::{registry, ApiDescriptor, ApiRegistry, HandleFn};

/// A decoded request body
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ApiVersions(ApiVersionsRequest),
    FindCoordinator(FindCoordinatorRequest),
    Heartbeat(HeartbeatRequest),
    LeaveGroup(LeaveGroupRequest),
    ListGroups(ListGroupsRequest),
    DescribeGroups(DescribeGroupsRequest),
}

impl Request {
    pub fn api_key(&self) -> i16 {
        match self {
            Request::ApiVersions(_) => api_versions::ApiVersionsApi::KEY,
            Request::FindCoordinator(_) => find_coordinator::FindCoordinatorApi::KEY,
            Request::Heartbeat(_) => heartbeat::HeartbeatApi::KEY,
            Request::LeaveGroup(_) => leave_group::LeaveGroupApi::KEY,
            Request::ListGroups(_) => list_groups::ListGroupsApi::KEY,
            Request::DescribeGroups(_) => describe_groups::DescribeGroupsApi::KEY,
        }
    }
}

/// A response body waiting to be encoded
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    ApiVersions(ApiVersionsResponse),
    FindCoordinator(FindCoordinatorResponse),
    Heartbeat(HeartbeatResponse),
    LeaveGroup(LeaveGroupResponse),
    ListGroups(ListGroupsResponse),
    DescribeGroups(DescribeGroupsResponse),
}

impl Response {
    pub fn api_key(&self) -> i16 {
        match self {
            Response::ApiVersions(_) => api_versions::ApiVersionsApi::KEY,
            Response::FindCoordinator(_) => find_coordinator::FindCoordinatorApi::KEY,
            Response::Heartbeat(_) => heartbeat::HeartbeatApi::KEY,
            Response::LeaveGroup(_) => leave_group::LeaveGroupApi::KEY,
            Response::ListGroups(_) => list_groups::ListGroupsApi::KEY,
            Response::DescribeGroups(_) => describe_groups::DescribeGroupsApi::KEY,
        }
    }
}

/// Static binding of one API key to its messages and behaviour
pub(crate) trait KafkaApi: 'static {
    const KEY: i16;
    const NAME: &'static str;
    const MIN_VERSION: i16;
    const MAX_VERSION: i16;

    type Request: Decodable + Encodable + Send + Sync + 'static;
    type Response: Decodable + Encodable + Send + Sync + 'static;

    fn wrap_request(request: Self::Request) -> Request;

    fn request(request: &Request) -> Option<&Self::Request>;

    fn wrap_response(response: Self::Response) -> Response;

    fn response(response: &Response) -> Option<&Self::Response>;

    fn handle<'a>(
        handler: &'a dyn ApiHandler,
        ctx: &'a RequestContext,
        request: &'a Self::Request,
    ) -> BoxFuture<'a, HandlerResult<Self::Response>>;

    /// Response carrying `code`, valid for `version`
    fn error_response(request: &Self::Request, code: ErrorCode, version: i16) -> Self::Response;
}
