//! Length-delimited frame codec
//!
//! ```text
//! frame    = u32 length (big endian) + length bytes
//! request  = i16 api_key, i16 api_version, i32 correlation_id,
//!            i16 client_id length (-1 = null) + client_id bytes, body
//! response = i32 correlation_id, body
//! ```
//!
//! Header layouts do not depend on the API version. Bodies are handed to the
//! API registry untouched.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::AsyncRead;
use tracing::warn;

use crate::error::{DecodeError, FrameError, TransportError};
use crate::transport::TransportReader;

/// Size of the frame length prefix
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Size of a request header without its client id
pub const REQUEST_HEADER_FIXED_BYTES: usize = 10;

/// Size of a response header
pub const RESPONSE_HEADER_BYTES: usize = 4;

/// Longest client id accepted in a request header
pub const MAX_CLIENT_ID_BYTES: usize = 256;

/// Read one frame payload.
///
/// Frames declaring more than `max_frame_bytes` are rejected before any of
/// their payload is read.
pub async fn read_frame<R>(
    reader: &mut TransportReader<R>,
    max_frame_bytes: usize,
) -> Result<Bytes, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
    reader.fill(&mut prefix).await.map_err(|e| match e {
        TransportError::EndOfStream { read: 0, .. } => FrameError::EndOfStream,
        other => frame_error(other),
    })?;

    let declared = u32::from_be_bytes(prefix) as usize;
    if declared > max_frame_bytes {
        warn!(
            declared,
            max = max_frame_bytes,
            "FrameTooLarge: rejecting frame without reading its payload"
        );
        return Err(FrameError::FrameTooLarge {
            declared,
            max: max_frame_bytes,
        });
    }

    reader.read_exact(declared).await.map_err(frame_error)
}

fn frame_error(err: TransportError) -> FrameError {
    match err {
        TransportError::EndOfStream { read, expected } => {
            FrameError::TruncatedStream { read, expected }
        }
        TransportError::Shutdown => FrameError::Shutdown,
        TransportError::Io(e) => FrameError::Io(e),
    }
}

/// Version-independent request header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    pub api_key: i16,
    pub api_version: i16,
    pub correlation_id: i32,
    pub client_id: Option<String>,
}

impl RequestHeader {
    pub fn new(api_key: i16, api_version: i16, correlation_id: i32) -> Self {
        Self {
            api_key,
            api_version,
            correlation_id,
            client_id: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Parse the header off the front of `payload`, leaving the body behind.
    pub fn decode(payload: &mut Bytes) -> Result<Self, DecodeError> {
        if payload.remaining() < REQUEST_HEADER_FIXED_BYTES {
            return Err(DecodeError::Header(format!(
                "need {} bytes, frame has {}",
                REQUEST_HEADER_FIXED_BYTES,
                payload.remaining()
            )));
        }
        let api_key = payload.get_i16();
        let api_version = payload.get_i16();
        let correlation_id = payload.get_i32();
        let client_id_len = payload.get_i16();

        let client_id = match client_id_len {
            -1 => None,
            len if len < 0 => {
                return Err(DecodeError::ClientId(format!("invalid length {}", len)));
            }
            len => {
                let len = len as usize;
                if len > MAX_CLIENT_ID_BYTES {
                    return Err(DecodeError::ClientId(format!(
                        "{} bytes exceeds limit of {}",
                        len, MAX_CLIENT_ID_BYTES
                    )));
                }
                if payload.remaining() < len {
                    return Err(DecodeError::ClientId(format!(
                        "declares {} bytes, {} remain",
                        len,
                        payload.remaining()
                    )));
                }
                let raw = payload.split_to(len);
                if !raw.iter().all(|b| (0x20..=0x7e).contains(b)) {
                    return Err(DecodeError::ClientId(
                        "contains non-printable characters".to_string(),
                    ));
                }
                // Printable ASCII is valid UTF-8
                Some(String::from_utf8_lossy(&raw).into_owned())
            }
        };

        Ok(Self {
            api_key,
            api_version,
            correlation_id,
            client_id,
        })
    }

    /// Client ids longer than the i16 length field can describe are cut to
    /// `i16::MAX` bytes.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i16(self.api_key);
        buf.put_i16(self.api_version);
        buf.put_i32(self.correlation_id);
        match &self.client_id {
            Some(client_id) => {
                let raw = client_id.as_bytes();
                let raw = &raw[..raw.len().min(i16::MAX as usize)];
                buf.put_i16(raw.len() as i16);
                buf.put_slice(raw);
            }
            None => buf.put_i16(-1),
        }
    }
}

/// A request frame split into header and body
#[derive(Debug, Clone)]
pub struct RequestFrame {
    pub header: RequestHeader,
    pub body: Bytes,
}

impl RequestFrame {
    pub fn parse(mut payload: Bytes) -> Result<Self, DecodeError> {
        let header = RequestHeader::decode(&mut payload)?;
        Ok(Self {
            header,
            body: payload,
        })
    }
}

/// Encode a complete request frame, length prefix included
pub fn encode_request_frame(header: &RequestHeader, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_BYTES + 64 + body.len());
    buf.put_u32(0);
    header.encode(&mut buf);
    buf.put_slice(body);
    let len = (buf.len() - LENGTH_PREFIX_BYTES) as u32;
    buf[..LENGTH_PREFIX_BYTES].copy_from_slice(&len.to_be_bytes());
    buf.freeze()
}

/// A response ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub correlation_id: i32,
    pub body: Bytes,
}

impl ResponseFrame {
    pub fn new(correlation_id: i32, body: Bytes) -> Self {
        Self {
            correlation_id,
            body,
        }
    }

    /// Total bytes on the wire, length prefix included
    pub fn wire_len(&self) -> usize {
        LENGTH_PREFIX_BYTES + RESPONSE_HEADER_BYTES + self.body.len()
    }

    /// Length prefix and header in one chunk, body in the other.
    ///
    /// Both chunks must go out in a single write.
    pub fn into_chunks(self) -> [Bytes; 2] {
        let mut head = BytesMut::with_capacity(LENGTH_PREFIX_BYTES + RESPONSE_HEADER_BYTES);
        head.put_u32((RESPONSE_HEADER_BYTES + self.body.len()) as u32);
        head.put_i32(self.correlation_id);
        [head.freeze(), self.body]
    }

    /// Parse a response payload (without its length prefix)
    pub fn parse(mut payload: Bytes) -> Result<Self, DecodeError> {
        if payload.remaining() < RESPONSE_HEADER_BYTES {
            return Err(DecodeError::Header(format!(
                "response needs {} bytes, frame has {}",
                RESPONSE_HEADER_BYTES,
                payload.remaining()
            )));
        }
        let correlation_id = payload.get_i32();
        Ok(Self {
            correlation_id,
            body: payload,
        })
    }
}
