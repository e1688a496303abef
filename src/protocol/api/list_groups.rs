//! ListGroups (key 16)

use futures_util::future::BoxFuture;
use kafka_protocol::messages::{ListGroupsRequest, ListGroupsResponse};

use super::{ApiHandler, KafkaApi, Request, RequestContext, Response};
use crate::error::{ErrorCode, HandlerResult};

pub struct ListGroupsApi;

impl KafkaApi for ListGroupsApi {
    const KEY: i16 = 16;
    const NAME: &'static str = "ListGroups";
    const MIN_VERSION: i16 = 0;
    const MAX_VERSION: i16 = 2;

    type Request = ListGroupsRequest;
    type Response = ListGroupsResponse;

    fn wrap_request(request: Self::Request) -> Request {
        Request::ListGroups(request)
    }

    fn request(request: &Request) -> Option<&Self::Request> {
        match request {
            Request::ListGroups(r) => Some(r),
            _ => None,
        }
    }

    fn wrap_response(response: Self::Response) -> Response {
        Response::ListGroups(response)
    }

    fn response(response: &Response) -> Option<&Self::Response> {
        match response {
            Response::ListGroups(r) => Some(r),
            _ => None,
        }
    }

    fn handle<'a>(
        handler: &'a dyn ApiHandler,
        ctx: &'a RequestContext,
        request: &'a Self::Request,
    ) -> BoxFuture<'a, HandlerResult<Self::Response>> {
        handler.list_groups(ctx, request)
    }

    fn error_response(_request: &Self::Request, code: ErrorCode, _version: i16) -> Self::Response {
        ListGroupsResponse::default().with_error_code(code.as_i16())
    }
}
