//! DescribeGroups (key 15) and the group state vocabulary shared by handlers

use std::fmt;
use std::str::FromStr;

use futures_util::future::BoxFuture;
use kafka_protocol::messages::describe_groups_response::DescribedGroup;
use kafka_protocol::messages::{DescribeGroupsRequest, DescribeGroupsResponse, GroupId};
use kafka_protocol::protocol::StrBytes;
use serde::{Deserialize, Serialize};

use super::{ApiHandler, KafkaApi, Request, RequestContext, Response};
use crate::error::{ErrorCode, HandlerResult};

/// Consumer group lifecycle states as reported on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupState {
    Empty,
    PreparingRebalance,
    CompletingRebalance,
    Stable,
    Dead,
}

impl GroupState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupState::Empty => "Empty",
            GroupState::PreparingRebalance => "PreparingRebalance",
            GroupState::CompletingRebalance => "CompletingRebalance",
            GroupState::Stable => "Stable",
            GroupState::Dead => "Dead",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Empty" => Some(GroupState::Empty),
            "PreparingRebalance" => Some(GroupState::PreparingRebalance),
            "CompletingRebalance" => Some(GroupState::CompletingRebalance),
            "Stable" => Some(GroupState::Stable),
            "Dead" => Some(GroupState::Dead),
            _ => None,
        }
    }
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GroupState::from_name(s).ok_or_else(|| format!("unknown group state: {}", s))
    }
}

/// A described group carrying only an error code. State, protocol type and
/// protocol data are empty and there are no members.
pub fn make_empty_described_group(group_id: GroupId, code: ErrorCode) -> DescribedGroup {
    DescribedGroup::default()
        .with_error_code(code.as_i16())
        .with_group_id(group_id)
        .with_group_state(StrBytes::from_static_str(""))
        .with_protocol_type(StrBytes::from_static_str(""))
        .with_protocol_data(StrBytes::from_static_str(""))
        .with_members(Vec::new())
}

/// How a group that does not exist is described
pub fn make_dead_described_group(group_id: GroupId) -> DescribedGroup {
    make_empty_described_group(group_id, ErrorCode::None)
        .with_group_state(StrBytes::from_static_str(GroupState::Dead.as_str()))
}

pub struct DescribeGroupsApi;

impl KafkaApi for DescribeGroupsApi {
    const KEY: i16 = 15;
    const NAME: &'static str = "DescribeGroups";
    const MIN_VERSION: i16 = 0;
    const MAX_VERSION: i16 = 2;

    type Request = DescribeGroupsRequest;
    type Response = DescribeGroupsResponse;

    fn wrap_request(request: Self::Request) -> Request {
        Request::DescribeGroups(request)
    }

    fn request(request: &Request) -> Option<&Self::Request> {
        match request {
            Request::DescribeGroups(r) => Some(r),
            _ => None,
        }
    }

    fn wrap_response(response: Self::Response) -> Response {
        Response::DescribeGroups(response)
    }

    fn response(response: &Response) -> Option<&Self::Response> {
        match response {
            Response::DescribeGroups(r) => Some(r),
            _ => None,
        }
    }

    fn handle<'a>(
        handler: &'a dyn ApiHandler,
        ctx: &'a RequestContext,
        request: &'a Self::Request,
    ) -> BoxFuture<'a, HandlerResult<Self::Response>> {
        handler.describe_groups(ctx, request)
    }

    /// One empty entry per requested group, each carrying `code`
    fn error_response(request: &Self::Request, code: ErrorCode, _version: i16) -> Self::Response {
        let groups = request
            .groups
            .iter()
            .cloned()
            .map(|group| make_empty_described_group(group, code))
            .collect();
        DescribeGroupsResponse::default().with_groups(groups)
    }
}
