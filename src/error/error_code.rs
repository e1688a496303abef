//! Kafka wire error codes
//!
//! Only the codes this broker core can emit are listed. Values match the
//! numbers assigned by the Apache Kafka protocol so that stock clients can act
//! on them.

use serde::{Deserialize, Serialize};

/// Error code carried in Kafka response bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum ErrorCode {
    /// Unexpected server error
    UnknownServerError = -1,
    /// No error
    None = 0,
    /// The request timed out or could not be admitted in time
    RequestTimedOut = 7,
    /// The coordinator is not available
    CoordinatorNotAvailable = 15,
    /// This is not the correct coordinator
    NotCoordinator = 16,
    /// The configured group id is invalid
    InvalidGroupId = 24,
    /// The coordinator is not aware of this member
    UnknownMemberId = 25,
    /// The group is rebalancing
    RebalanceInProgress = 27,
    /// The version of the API is not supported
    UnsupportedVersion = 35,
    /// The request is malformed or names an unknown API
    InvalidRequest = 42,
    /// The group id does not exist
    GroupIdNotFound = 69,
}

impl ErrorCode {
    /// Returns true if a client may retry the request unchanged
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ErrorCode::RequestTimedOut
                | ErrorCode::CoordinatorNotAvailable
                | ErrorCode::NotCoordinator
        )
    }

    /// Convert to the i16 error code used on the wire
    pub fn as_i16(&self) -> i16 {
        *self as i16
    }

    /// Look up a known code. Unknown values yield `None`.
    pub fn from_i16(code: i16) -> Option<Self> {
        let code = match code {
            -1 => ErrorCode::UnknownServerError,
            0 => ErrorCode::None,
            7 => ErrorCode::RequestTimedOut,
            15 => ErrorCode::CoordinatorNotAvailable,
            16 => ErrorCode::NotCoordinator,
            24 => ErrorCode::InvalidGroupId,
            25 => ErrorCode::UnknownMemberId,
            27 => ErrorCode::RebalanceInProgress,
            35 => ErrorCode::UnsupportedVersion,
            42 => ErrorCode::InvalidRequest,
            69 => ErrorCode::GroupIdNotFound,
            _ => return None,
        };
        Some(code)
    }

    /// Whether this code reports success
    pub fn is_none(&self) -> bool {
        *self == ErrorCode::None
    }
}

impl From<ErrorCode> for i16 {
    fn from(code: ErrorCode) -> Self {
        code.as_i16()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_values() {
        assert_eq!(ErrorCode::None.as_i16(), 0);
        assert_eq!(ErrorCode::UnknownServerError.as_i16(), -1);
        assert_eq!(ErrorCode::UnsupportedVersion.as_i16(), 35);
        assert_eq!(ErrorCode::InvalidRequest.as_i16(), 42);
        assert_eq!(i16::from(ErrorCode::GroupIdNotFound), 69);
    }

    #[test]
    fn test_from_i16_round_trips_known_codes() {
        for code in [
            ErrorCode::UnknownServerError,
            ErrorCode::None,
            ErrorCode::RequestTimedOut,
            ErrorCode::CoordinatorNotAvailable,
            ErrorCode::NotCoordinator,
            ErrorCode::InvalidGroupId,
            ErrorCode::UnknownMemberId,
            ErrorCode::RebalanceInProgress,
            ErrorCode::UnsupportedVersion,
            ErrorCode::InvalidRequest,
            ErrorCode::GroupIdNotFound,
        ] {
            assert_eq!(ErrorCode::from_i16(code.as_i16()), Some(code));
        }
        assert_eq!(ErrorCode::from_i16(1000), None);
    }

    #[test]
    fn test_retriable() {
        assert!(ErrorCode::RequestTimedOut.is_retriable());
        assert!(ErrorCode::NotCoordinator.is_retriable());
        assert!(!ErrorCode::UnsupportedVersion.is_retriable());
        assert!(!ErrorCode::None.is_retriable());
    }
}
