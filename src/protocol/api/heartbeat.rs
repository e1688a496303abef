//! Heartbeat (key 12)

use futures_util::future::BoxFuture;
use kafka_protocol::messages::{HeartbeatRequest, HeartbeatResponse};

use super::{ApiHandler, KafkaApi, Request, RequestContext, Response};
use crate::error::{ErrorCode, HandlerResult};

pub struct HeartbeatApi;

impl KafkaApi for HeartbeatApi {
    const KEY: i16 = 12;
    const NAME: &'static str = "Heartbeat";
    const MIN_VERSION: i16 = 0;
    const MAX_VERSION: i16 = 2;

    type Request = HeartbeatRequest;
    type Response = HeartbeatResponse;

    fn wrap_request(request: Self::Request) -> Request {
        Request::Heartbeat(request)
    }

    fn request(request: &Request) -> Option<&Self::Request> {
        match request {
            Request::Heartbeat(r) => Some(r),
            _ => None,
        }
    }

    fn wrap_response(response: Self::Response) -> Response {
        Response::Heartbeat(response)
    }

    fn response(response: &Response) -> Option<&Self::Response> {
        match response {
            Response::Heartbeat(r) => Some(r),
            _ => None,
        }
    }

    fn handle<'a>(
        handler: &'a dyn ApiHandler,
        ctx: &'a RequestContext,
        request: &'a Self::Request,
    ) -> BoxFuture<'a, HandlerResult<Self::Response>> {
        handler.heartbeat(ctx, request)
    }

    fn error_response(_request: &Self::Request, code: ErrorCode, _version: i16) -> Self::Response {
        HeartbeatResponse::default().with_error_code(code.as_i16())
    }
}
