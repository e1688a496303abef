//! FindCoordinator (key 10)

use futures_util::future::BoxFuture;
use kafka_protocol::messages::{BrokerId, FindCoordinatorRequest, FindCoordinatorResponse};
use kafka_protocol::protocol::StrBytes;

use super::{ApiHandler, KafkaApi, Request, RequestContext, Response};
use crate::error::{ErrorCode, HandlerResult};

pub struct FindCoordinatorApi;

impl KafkaApi for FindCoordinatorApi {
    const KEY: i16 = 10;
    const NAME: &'static str = "FindCoordinator";
    const MIN_VERSION: i16 = 0;
    const MAX_VERSION: i16 = 2;

    type Request = FindCoordinatorRequest;
    type Response = FindCoordinatorResponse;

    fn wrap_request(request: Self::Request) -> Request {
        Request::FindCoordinator(request)
    }

    fn request(request: &Request) -> Option<&Self::Request> {
        match request {
            Request::FindCoordinator(r) => Some(r),
            _ => None,
        }
    }

    fn wrap_response(response: Self::Response) -> Response {
        Response::FindCoordinator(response)
    }

    fn response(response: &Response) -> Option<&Self::Response> {
        match response {
            Response::FindCoordinator(r) => Some(r),
            _ => None,
        }
    }

    fn handle<'a>(
        handler: &'a dyn ApiHandler,
        ctx: &'a RequestContext,
        request: &'a Self::Request,
    ) -> BoxFuture<'a, HandlerResult<Self::Response>> {
        handler.find_coordinator(ctx, request)
    }

    // error_message exists from v1 but is nullable, so leaving it unset is
    // valid for every supported version.
    fn error_response(_request: &Self::Request, code: ErrorCode, _version: i16) -> Self::Response {
        FindCoordinatorResponse::default()
            .with_error_code(code.as_i16())
            .with_node_id(BrokerId::from(-1))
            .with_host(StrBytes::from_static_str(""))
            .with_port(-1)
    }
}
