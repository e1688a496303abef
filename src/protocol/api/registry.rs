//! Immutable API descriptor table
//!
//! Built once per process from the [`KafkaApi`] bindings. Lookups are a
//! binary search over descriptors sorted by API key; every descriptor is
//! type-erased to plain function pointers so the dispatcher never needs to
//! know which message types sit behind a key.

use std::fmt;
use std::sync::OnceLock;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::future::{self, BoxFuture, FutureExt};
use kafka_protocol::protocol::{Decodable, Encodable};

use super::api_versions::{self, ApiVersionsApi};
use super::describe_groups::DescribeGroupsApi;
use super::find_coordinator::FindCoordinatorApi;
use super::heartbeat::HeartbeatApi;
use super::leave_group::LeaveGroupApi;
use super::list_groups::ListGroupsApi;
use super::{ApiHandler, KafkaApi, Request, RequestContext, Response};
use crate::error::{DecodeError, ErrorCode, HandlerError, HandlerResult, ProtocolError, ResolveError};

/// Type-erased handler entry point of a descriptor
pub type HandleFn = for<'a> fn(
    &'a dyn ApiHandler,
    &'a RequestContext,
    &'a Request,
) -> BoxFuture<'a, HandlerResult<Response>>;

type DecodeRequestFn = fn(Bytes, i16) -> Result<Request, DecodeError>;
type EncodeRequestFn = fn(&Request, i16) -> Result<Bytes, ProtocolError>;
type DecodeResponseFn = fn(Bytes, i16) -> Result<Response, DecodeError>;
type EncodeResponseFn = fn(&Response, i16) -> Result<Bytes, ProtocolError>;
type ErrorResponseFn = fn(&Request, ErrorCode, i16) -> Result<Response, ProtocolError>;

/// Everything the dispatcher needs to serve one API key
#[derive(Clone, Copy)]
pub struct ApiDescriptor {
    pub key: i16,
    pub name: &'static str,
    pub min_version: i16,
    pub max_version: i16,
    decode_request: DecodeRequestFn,
    encode_request: EncodeRequestFn,
    decode_response: DecodeResponseFn,
    encode_response: EncodeResponseFn,
    handle: HandleFn,
    error_response: ErrorResponseFn,
}

impl ApiDescriptor {
    fn of<A: KafkaApi>() -> Self {
        Self {
            key: A::KEY,
            name: A::NAME,
            min_version: A::MIN_VERSION,
            max_version: A::MAX_VERSION,
            decode_request: decode_request::<A>,
            encode_request: encode_request::<A>,
            decode_response: decode_response::<A>,
            encode_response: encode_response::<A>,
            handle: handle::<A>,
            error_response: error_response::<A>,
        }
    }

    pub fn supports(&self, version: i16) -> bool {
        (self.min_version..=self.max_version).contains(&version)
    }

    /// Decode a request body; the whole body must be consumed
    pub fn decode_request(&self, body: Bytes, version: i16) -> Result<Request, DecodeError> {
        (self.decode_request)(body, version)
    }

    pub fn encode_request(&self, request: &Request, version: i16) -> Result<Bytes, ProtocolError> {
        self.check_version(version)?;
        (self.encode_request)(request, version)
    }

    pub fn decode_response(&self, body: Bytes, version: i16) -> Result<Response, DecodeError> {
        (self.decode_response)(body, version)
    }

    /// Encode a response body for `version`
    pub fn encode_response(&self, response: &Response, version: i16) -> Result<Bytes, ProtocolError> {
        self.check_version(version)?;
        (self.encode_response)(response, version)
    }

    /// Invoke the handler method bound to this API
    pub fn handle<'a>(
        &self,
        handler: &'a dyn ApiHandler,
        ctx: &'a RequestContext,
        request: &'a Request,
    ) -> BoxFuture<'a, HandlerResult<Response>> {
        (self.handle)(handler, ctx, request)
    }

    /// Build the response this API answers with when its handler fails
    pub fn error_response(
        &self,
        request: &Request,
        code: ErrorCode,
        version: i16,
    ) -> Result<Response, ProtocolError> {
        (self.error_response)(request, code, version)
    }

    fn check_version(&self, version: i16) -> Result<(), ProtocolError> {
        if self.supports(version) {
            Ok(())
        } else {
            Err(ProtocolError::invalid_field(
                "api_version",
                format!(
                    "{} supports versions {}..={}, got {}",
                    self.name, self.min_version, self.max_version, version
                ),
            ))
        }
    }
}

impl fmt::Debug for ApiDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiDescriptor")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("min_version", &self.min_version)
            .field("max_version", &self.max_version)
            .finish()
    }
}

/// Lookup table of every API the dispatcher serves
#[derive(Debug)]
pub struct ApiRegistry {
    descriptors: Vec<ApiDescriptor>,
}

static REGISTRY: OnceLock<ApiRegistry> = OnceLock::new();

/// The process-wide registry, built on first use
pub fn registry() -> &'static ApiRegistry {
    REGISTRY.get_or_init(ApiRegistry::standard)
}

impl ApiRegistry {
    fn standard() -> Self {
        Self::from_descriptors(vec![
            ApiDescriptor::of::<ApiVersionsApi>(),
            ApiDescriptor::of::<FindCoordinatorApi>(),
            ApiDescriptor::of::<HeartbeatApi>(),
            ApiDescriptor::of::<LeaveGroupApi>(),
            ApiDescriptor::of::<ListGroupsApi>(),
            ApiDescriptor::of::<DescribeGroupsApi>(),
        ])
    }

    fn from_descriptors(mut descriptors: Vec<ApiDescriptor>) -> Self {
        descriptors.sort_by_key(|d| d.key);
        debug_assert!(
            descriptors.windows(2).all(|w| w[0].key != w[1].key),
            "duplicate api key in registry"
        );
        debug_assert!(descriptors.iter().all(|d| d.min_version <= d.max_version));
        Self { descriptors }
    }

    pub fn get(&self, api_key: i16) -> Option<&ApiDescriptor> {
        self.descriptors
            .binary_search_by_key(&api_key, |d| d.key)
            .ok()
            .map(|idx| &self.descriptors[idx])
    }

    /// Find the descriptor serving `api_key` at `api_version`
    pub fn resolve(&self, api_key: i16, api_version: i16) -> Result<&ApiDescriptor, ResolveError> {
        let descriptor = self.get(api_key).ok_or(ResolveError::UnknownApi { api_key })?;
        if !descriptor.supports(api_version) {
            return Err(ResolveError::UnsupportedVersion {
                api_key,
                name: descriptor.name,
                api_version,
                min: descriptor.min_version,
                max: descriptor.max_version,
            });
        }
        Ok(descriptor)
    }

    pub fn descriptors(&self) -> &[ApiDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Response body for a request that could not be resolved.
    ///
    /// Most APIs start their responses with an error code, so a bare code is
    /// what a client reads first. An ApiVersions request at an unknown
    /// version gets a full v0 response instead, listing what is supported.
    pub fn error_body(&self, err: &ResolveError) -> Bytes {
        match err {
            ResolveError::UnsupportedVersion { api_key, .. } if *api_key == ApiVersionsApi::KEY => {
                api_versions::unsupported_version_body(self)
                    .unwrap_or_else(|_| bare_error_code(err.error_code()))
            }
            _ => bare_error_code(err.error_code()),
        }
    }
}

fn bare_error_code(code: ErrorCode) -> Bytes {
    let mut buf = BytesMut::with_capacity(2);
    buf.put_i16(code.as_i16());
    buf.freeze()
}

pub(crate) fn encode_message<M: Encodable>(
    name: &str,
    message: &M,
    version: i16,
) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    message.encode(&mut buf, version).map_err(|e| {
        ProtocolError::operation(format!("encode {} v{}", name, version), e.to_string())
    })?;
    Ok(buf.freeze())
}

fn ensure_consumed(name: &'static str, version: i16, body: &Bytes) -> Result<(), DecodeError> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(DecodeError::TrailingBytes {
            api: name,
            version,
            remaining: body.len(),
        })
    }
}

fn decode_request<A: KafkaApi>(mut body: Bytes, version: i16) -> Result<Request, DecodeError> {
    let request = <A::Request as Decodable>::decode(&mut body, version)
        .map_err(|e| DecodeError::body(A::NAME, version, e))?;
    ensure_consumed(A::NAME, version, &body)?;
    Ok(A::wrap_request(request))
}

fn decode_response<A: KafkaApi>(mut body: Bytes, version: i16) -> Result<Response, DecodeError> {
    let response = <A::Response as Decodable>::decode(&mut body, version)
        .map_err(|e| DecodeError::body(A::NAME, version, e))?;
    ensure_consumed(A::NAME, version, &body)?;
    Ok(A::wrap_response(response))
}

fn encode_request<A: KafkaApi>(request: &Request, version: i16) -> Result<Bytes, ProtocolError> {
    let request = A::request(request).ok_or_else(|| mismatch::<A>("request", request.api_key()))?;
    encode_message(A::NAME, request, version)
}

fn encode_response<A: KafkaApi>(response: &Response, version: i16) -> Result<Bytes, ProtocolError> {
    let response =
        A::response(response).ok_or_else(|| mismatch::<A>("response", response.api_key()))?;
    encode_message(A::NAME, response, version)
}

fn handle<'a, A: KafkaApi>(
    handler: &'a dyn ApiHandler,
    ctx: &'a RequestContext,
    request: &'a Request,
) -> BoxFuture<'a, HandlerResult<Response>> {
    match A::request(request) {
        Some(request) => A::handle(handler, ctx, request)
            .map(|result| result.map(A::wrap_response))
            .boxed(),
        None => future::ready(Err(HandlerError::failed(format!(
            "api key {} routed to {}",
            request.api_key(),
            A::NAME
        ))))
        .boxed(),
    }
}

fn error_response<A: KafkaApi>(
    request: &Request,
    code: ErrorCode,
    version: i16,
) -> Result<Response, ProtocolError> {
    let request = A::request(request).ok_or_else(|| mismatch::<A>("request", request.api_key()))?;
    Ok(A::wrap_response(A::error_response(request, code, version)))
}

fn mismatch<A: KafkaApi>(kind: &str, got: i16) -> ProtocolError {
    ProtocolError::invalid_field(
        kind,
        format!("expected {} (key {}), got api key {}", A::NAME, A::KEY, got),
    )
}
