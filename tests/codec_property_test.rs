//! Property tests for the versioned codecs
//!
//! Bodies are generated per API and version, populating only the fields the
//! version carries, and must survive the registry's encode and decode
//! unchanged.

use bytes::Bytes;
use kafka_protocol::messages::describe_groups_response::{DescribedGroup, DescribedGroupMember};
use kafka_protocol::messages::list_groups_response::ListedGroup;
use kafka_protocol::messages::*;
use kafka_protocol::protocol::StrBytes;
use proptest::prelude::*;
use tideway::error::{DecodeError, ResolveError};
use tideway::protocol::api::{registry, Request, Response};

fn str_bytes() -> impl Strategy<Value = StrBytes> {
    "[a-z0-9._-]{0,24}".prop_map(StrBytes::from_string)
}

fn group_id() -> impl Strategy<Value = GroupId> {
    str_bytes().prop_map(GroupId)
}

fn opt_message(version: i16) -> BoxedStrategy<Option<StrBytes>> {
    if version >= 1 {
        proptest::option::of(str_bytes()).boxed()
    } else {
        Just(None).boxed()
    }
}

fn throttle(version: i16) -> BoxedStrategy<i32> {
    if version >= 1 {
        (0..10_000i32).boxed()
    } else {
        Just(0).boxed()
    }
}

fn blob() -> impl Strategy<Value = Bytes> {
    proptest::collection::vec(any::<u8>(), 0..32).prop_map(Bytes::from)
}

// ============================================================================
// Strategies per API
// ============================================================================

fn find_coordinator_request(version: i16) -> impl Strategy<Value = Request> {
    let key_type = if version >= 1 { (0..=1i8).boxed() } else { Just(0i8).boxed() };
    (str_bytes(), key_type).prop_map(|(key, key_type)| {
        Request::FindCoordinator(
            FindCoordinatorRequest::default()
                .with_key(key)
                .with_key_type(key_type),
        )
    })
}

fn find_coordinator_response(version: i16) -> impl Strategy<Value = Response> {
    (
        throttle(version),
        any::<i16>(),
        opt_message(version),
        any::<i32>(),
        str_bytes(),
        any::<i32>(),
    )
        .prop_map(|(throttle, code, message, node, host, port)| {
            Response::FindCoordinator(
                FindCoordinatorResponse::default()
                    .with_throttle_time_ms(throttle)
                    .with_error_code(code)
                    .with_error_message(message)
                    .with_node_id(BrokerId::from(node))
                    .with_host(host)
                    .with_port(port),
            )
        })
}

fn heartbeat_request() -> impl Strategy<Value = Request> {
    (group_id(), any::<i32>(), str_bytes()).prop_map(|(group, generation, member)| {
        Request::Heartbeat(
            HeartbeatRequest::default()
                .with_group_id(group)
                .with_generation_id(generation)
                .with_member_id(member),
        )
    })
}

fn leave_group_request() -> impl Strategy<Value = Request> {
    (group_id(), str_bytes()).prop_map(|(group, member)| {
        Request::LeaveGroup(
            LeaveGroupRequest::default()
                .with_group_id(group)
                .with_member_id(member),
        )
    })
}

fn listed_group() -> impl Strategy<Value = ListedGroup> {
    (group_id(), str_bytes()).prop_map(|(group, protocol_type)| {
        ListedGroup::default()
            .with_group_id(group)
            .with_protocol_type(protocol_type)
    })
}

fn list_groups_response(version: i16) -> impl Strategy<Value = Response> {
    (
        throttle(version),
        any::<i16>(),
        proptest::collection::vec(listed_group(), 0..8),
    )
        .prop_map(|(throttle, code, groups)| {
            Response::ListGroups(
                ListGroupsResponse::default()
                    .with_throttle_time_ms(throttle)
                    .with_error_code(code)
                    .with_groups(groups),
            )
        })
}

fn describe_groups_request() -> impl Strategy<Value = Request> {
    proptest::collection::vec(group_id(), 0..8).prop_map(|groups| {
        Request::DescribeGroups(DescribeGroupsRequest::default().with_groups(groups))
    })
}

fn member() -> impl Strategy<Value = DescribedGroupMember> {
    (str_bytes(), str_bytes(), str_bytes(), blob(), blob()).prop_map(
        |(member_id, client_id, client_host, metadata, assignment)| {
            DescribedGroupMember::default()
                .with_member_id(member_id)
                .with_client_id(client_id)
                .with_client_host(client_host)
                .with_member_metadata(metadata)
                .with_member_assignment(assignment)
        },
    )
}

fn described_group() -> impl Strategy<Value = DescribedGroup> {
    (
        any::<i16>(),
        group_id(),
        prop_oneof![
            Just("Empty"),
            Just("Stable"),
            Just("PreparingRebalance"),
            Just("CompletingRebalance"),
            Just("Dead"),
        ],
        str_bytes(),
        str_bytes(),
        proptest::collection::vec(member(), 0..4),
    )
        .prop_map(|(code, group, state, protocol_type, protocol, members)| {
            DescribedGroup::default()
                .with_error_code(code)
                .with_group_id(group)
                .with_group_state(StrBytes::from_static_str(state))
                .with_protocol_type(protocol_type)
                .with_protocol_data(protocol)
                .with_members(members)
        })
}

fn describe_groups_response(version: i16) -> impl Strategy<Value = Response> {
    (
        throttle(version),
        proptest::collection::vec(described_group(), 0..4),
    )
        .prop_map(|(throttle, groups)| {
            Response::DescribeGroups(
                DescribeGroupsResponse::default()
                    .with_throttle_time_ms(throttle)
                    .with_groups(groups),
            )
        })
}

fn error_only_response(version: i16, wrap: fn(i32, i16) -> Response) -> impl Strategy<Value = Response> {
    (throttle(version), any::<i16>()).prop_map(move |(throttle, code)| wrap(throttle, code))
}

fn heartbeat_response(throttle: i32, code: i16) -> Response {
    Response::Heartbeat(
        HeartbeatResponse::default()
            .with_throttle_time_ms(throttle)
            .with_error_code(code),
    )
}

fn leave_group_response(throttle: i32, code: i16) -> Response {
    Response::LeaveGroup(
        LeaveGroupResponse::default()
            .with_throttle_time_ms(throttle)
            .with_error_code(code),
    )
}

// ============================================================================
// Round trips
// ============================================================================

fn assert_request_round_trip(request: &Request, version: i16) -> Result<(), TestCaseError> {
    let descriptor = registry().get(request.api_key()).unwrap();
    let body = descriptor.encode_request(request, version).unwrap();
    let decoded = descriptor.decode_request(body, version).unwrap();
    prop_assert_eq!(&decoded, request);
    Ok(())
}

fn assert_response_round_trip(response: &Response, version: i16) -> Result<(), TestCaseError> {
    let descriptor = registry().get(response.api_key()).unwrap();
    let body = descriptor.encode_response(response, version).unwrap();
    let decoded = descriptor.decode_response(body, version).unwrap();
    prop_assert_eq!(&decoded, response);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn find_coordinator_round_trips(
        (version, request, response) in (0..=2i16).prop_flat_map(|v| {
            (Just(v), find_coordinator_request(v), find_coordinator_response(v))
        })
    ) {
        assert_request_round_trip(&request, version)?;
        assert_response_round_trip(&response, version)?;
    }

    #[test]
    fn heartbeat_round_trips(
        (version, request, response) in (0..=2i16).prop_flat_map(|v| {
            (Just(v), heartbeat_request(), error_only_response(v, heartbeat_response))
        })
    ) {
        assert_request_round_trip(&request, version)?;
        assert_response_round_trip(&response, version)?;
    }

    #[test]
    fn leave_group_round_trips(
        (version, request, response) in (0..=2i16).prop_flat_map(|v| {
            (Just(v), leave_group_request(), error_only_response(v, leave_group_response))
        })
    ) {
        assert_request_round_trip(&request, version)?;
        assert_response_round_trip(&response, version)?;
    }

    #[test]
    fn list_groups_round_trips(
        (version, response) in (0..=2i16).prop_flat_map(|v| (Just(v), list_groups_response(v)))
    ) {
        assert_request_round_trip(&Request::ListGroups(ListGroupsRequest::default()), version)?;
        assert_response_round_trip(&response, version)?;
    }

    #[test]
    fn describe_groups_round_trips(
        (version, request, response) in (0..=2i16).prop_flat_map(|v| {
            (Just(v), describe_groups_request(), describe_groups_response(v))
        })
    ) {
        assert_request_round_trip(&request, version)?;
        assert_response_round_trip(&response, version)?;
    }

    #[test]
    fn resolve_accepts_exactly_the_supported_range(api_key in -5i16..40, version in -3i16..12) {
        let apis = registry();
        match apis.resolve(api_key, version) {
            Ok(descriptor) => {
                prop_assert_eq!(descriptor.key, api_key);
                prop_assert!(descriptor.supports(version));
            }
            Err(ResolveError::UnsupportedVersion { min, max, .. }) => {
                prop_assert!(apis.get(api_key).is_some());
                prop_assert!(version < min || version > max);
            }
            Err(ResolveError::UnknownApi { .. }) => {
                prop_assert!(apis.get(api_key).is_none());
            }
        }
    }

    #[test]
    fn truncated_bodies_never_decode(
        (version, request) in (0..=2i16).prop_flat_map(|v| (Just(v), describe_groups_request())),
        cut in 1usize..8,
    ) {
        let descriptor = registry().get(15).unwrap();
        let body = descriptor.encode_request(&request, version).unwrap();
        prop_assume!(body.len() > cut);
        let truncated = body.slice(..body.len() - cut);
        let result = descriptor.decode_request(truncated, version);
        let malformed = matches!(result, Err(DecodeError::Body { .. }));
        prop_assert!(malformed, "truncated body decoded: {:?}", result);
    }
}

#[test]
fn api_versions_response_round_trips_every_version() {
    let descriptor = registry().get(18).unwrap();
    for version in descriptor.min_version..=descriptor.max_version {
        let response = Response::ApiVersions(
            tideway::protocol::api::api_versions::supported_versions(registry()),
        );
        let body = descriptor.encode_response(&response, version).unwrap();
        assert_eq!(descriptor.decode_response(body, version).unwrap(), response);
    }
}
