//! ApiVersions (key 18)
//!
//! Answered by the dispatcher itself from the registry, never by an
//! [`ApiHandler`].

use bytes::Bytes;
use futures_util::future::{self, BoxFuture, FutureExt};
use kafka_protocol::messages::api_versions_response::ApiVersion;
use kafka_protocol::messages::{ApiVersionsRequest, ApiVersionsResponse};

use super::registry::{encode_message, registry, ApiRegistry};
use super::{ApiHandler, KafkaApi, Request, RequestContext, Response};
use crate::error::{ErrorCode, HandlerResult, ProtocolError};

pub struct ApiVersionsApi;

impl KafkaApi for ApiVersionsApi {
    const KEY: i16 = 18;
    const NAME: &'static str = "ApiVersions";
    const MIN_VERSION: i16 = 0;
    const MAX_VERSION: i16 = 2;

    type Request = ApiVersionsRequest;
    type Response = ApiVersionsResponse;

    fn wrap_request(request: Self::Request) -> Request {
        Request::ApiVersions(request)
    }

    fn request(request: &Request) -> Option<&Self::Request> {
        match request {
            Request::ApiVersions(r) => Some(r),
            _ => None,
        }
    }

    fn wrap_response(response: Self::Response) -> Response {
        Response::ApiVersions(response)
    }

    fn response(response: &Response) -> Option<&Self::Response> {
        match response {
            Response::ApiVersions(r) => Some(r),
            _ => None,
        }
    }

    fn handle<'a>(
        _handler: &'a dyn ApiHandler,
        _ctx: &'a RequestContext,
        _request: &'a Self::Request,
    ) -> BoxFuture<'a, HandlerResult<Self::Response>> {
        future::ready(Ok(supported_versions(registry()))).boxed()
    }

    fn error_response(_request: &Self::Request, code: ErrorCode, _version: i16) -> Self::Response {
        ApiVersionsResponse::default().with_error_code(code.as_i16())
    }
}

/// One entry per registered API with its supported range
pub fn api_version_entries(registry: &ApiRegistry) -> Vec<ApiVersion> {
    registry
        .descriptors()
        .iter()
        .map(|d| {
            ApiVersion::default()
                .with_api_key(d.key)
                .with_min_version(d.min_version)
                .with_max_version(d.max_version)
        })
        .collect()
}

pub fn supported_versions(registry: &ApiRegistry) -> ApiVersionsResponse {
    ApiVersionsResponse::default()
        .with_error_code(ErrorCode::None.as_i16())
        .with_api_keys(api_version_entries(registry))
}

/// v0 body sent when a client asks for an ApiVersions version we lack.
/// Clients retry at the highest version listed in it.
pub(crate) fn unsupported_version_body(registry: &ApiRegistry) -> Result<Bytes, ProtocolError> {
    let response = ApiVersionsResponse::default()
        .with_error_code(ErrorCode::UnsupportedVersion.as_i16())
        .with_api_keys(api_version_entries(registry));
    encode_message(ApiVersionsApi::NAME, &response, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_versions_cover_registry() {
        let resp = supported_versions(registry());
        assert_eq!(resp.error_code, 0);
        let entry = resp.api_keys.iter().find(|v| v.api_key == 15).unwrap();
        assert_eq!((entry.min_version, entry.max_version), (0, 2));
        assert!(resp.api_keys.iter().any(|v| v.api_key == ApiVersionsApi::KEY));
    }

    #[test]
    fn test_error_response_carries_code() {
        let resp = ApiVersionsApi::error_response(
            &ApiVersionsRequest::default(),
            ErrorCode::RequestTimedOut,
            2,
        );
        assert_eq!(resp.error_code, 7);
        assert!(resp.api_keys.is_empty());
    }
}
