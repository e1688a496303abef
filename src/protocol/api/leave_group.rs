//! LeaveGroup (key 13)

use futures_util::future::BoxFuture;
use kafka_protocol::messages::{LeaveGroupRequest, LeaveGroupResponse};

use super::{ApiHandler, KafkaApi, Request, RequestContext, Response};
use crate::error::{ErrorCode, HandlerResult};

pub struct LeaveGroupApi;

impl KafkaApi for LeaveGroupApi {
    const KEY: i16 = 13;
    const NAME: &'static str = "LeaveGroup";
    const MIN_VERSION: i16 = 0;
    const MAX_VERSION: i16 = 2;

    type Request = LeaveGroupRequest;
    type Response = LeaveGroupResponse;

    fn wrap_request(request: Self::Request) -> Request {
        Request::LeaveGroup(request)
    }

    fn request(request: &Request) -> Option<&Self::Request> {
        match request {
            Request::LeaveGroup(r) => Some(r),
            _ => None,
        }
    }

    fn wrap_response(response: Self::Response) -> Response {
        Response::LeaveGroup(response)
    }

    fn response(response: &Response) -> Option<&Self::Response> {
        match response {
            Response::LeaveGroup(r) => Some(r),
            _ => None,
        }
    }

    fn handle<'a>(
        handler: &'a dyn ApiHandler,
        ctx: &'a RequestContext,
        request: &'a Self::Request,
    ) -> BoxFuture<'a, HandlerResult<Self::Response>> {
        handler.leave_group(ctx, request)
    }

    fn error_response(_request: &Self::Request, code: ErrorCode, _version: i16) -> Self::Response {
        LeaveGroupResponse::default().with_error_code(code.as_i16())
    }
}
