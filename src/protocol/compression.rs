//! Payload transforms applied to request and response bodies
//!
//! When a connection negotiates a codec, the body that follows the request
//! header is decompressed before the API decoder sees it, and every response
//! body is compressed after encoding. The header and length prefix are never
//! transformed.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, Result, TidewayError};

/// Compression codec applied to message bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CompressionCodec {
    /// Bodies pass through unchanged
    #[default]
    None = 0,
    /// Raw snappy blocks
    Snappy = 1,
    /// LZ4 block with a little-endian size prefix
    Lz4 = 2,
}

impl CompressionCodec {
    /// Get codec name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Snappy => "snappy",
            Self::Lz4 => "lz4",
        }
    }

    /// Parse codec from string name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "snappy" => Some(Self::Snappy),
            "lz4" => Some(Self::Lz4),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl std::str::FromStr for CompressionCodec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown compression codec '{}'", s))
    }
}

/// Compress a body with `codec`
pub fn compress(data: Bytes, codec: CompressionCodec) -> Result<Bytes> {
    match codec {
        CompressionCodec::None => Ok(data),
        CompressionCodec::Snappy => snap::raw::Encoder::new()
            .compress_vec(&data)
            .map(Bytes::from)
            .map_err(|e| TidewayError::protocol("snappy compress", e.to_string())),
        CompressionCodec::Lz4 => Ok(Bytes::from(lz4_flex::compress_prepend_size(&data))),
    }
}

/// Decompress a body with `codec`. Corrupt input is a [`DecodeError`].
pub fn decompress(data: Bytes, codec: CompressionCodec) -> std::result::Result<Bytes, DecodeError> {
    match codec {
        CompressionCodec::None => Ok(data),
        CompressionCodec::Snappy => snap::raw::Decoder::new()
            .decompress_vec(&data)
            .map(Bytes::from)
            .map_err(|e| corrupt(codec, e)),
        CompressionCodec::Lz4 => lz4_flex::decompress_size_prepended(&data)
            .map(Bytes::from)
            .map_err(|e| corrupt(codec, e)),
    }
}

fn corrupt(codec: CompressionCodec, err: impl ToString) -> DecodeError {
    DecodeError::CorruptPayload {
        codec: codec.name(),
        detail: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Bytes {
        Bytes::from("describe-groups ".repeat(64))
    }

    #[test]
    fn test_none_is_identity() {
        let data = sample();
        let out = compress(data.clone(), CompressionCodec::None).unwrap();
        assert_eq!(out, data);
        assert_eq!(decompress(out, CompressionCodec::None).unwrap(), data);
    }

    #[test]
    fn test_snappy_shrinks_repetitive_input() {
        let data = sample();
        let compressed = compress(data.clone(), CompressionCodec::Snappy).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(
            decompress(compressed, CompressionCodec::Snappy).unwrap(),
            data
        );
    }

    #[test]
    fn test_lz4_restores_input() {
        let data = sample();
        let compressed = compress(data.clone(), CompressionCodec::Lz4).unwrap();
        assert_eq!(decompress(compressed, CompressionCodec::Lz4).unwrap(), data);
    }

    #[test]
    fn test_corrupt_payload_is_decode_error() {
        // Claims 16 bytes, then a literal run that runs past the input
        let lz4 = Bytes::from_static(&[0x10, 0x00, 0x00, 0x00, 0xff, 0x01]);
        let err = decompress(lz4, CompressionCodec::Lz4).unwrap_err();
        assert!(matches!(err, DecodeError::CorruptPayload { codec: "lz4", .. }));

        let snappy = Bytes::from_static(&[0x10, 0xff, 0xff]);
        let err = decompress(snappy, CompressionCodec::Snappy).unwrap_err();
        assert!(matches!(err, DecodeError::CorruptPayload { codec: "snappy", .. }));
    }

    #[test]
    fn test_codec_names() {
        assert_eq!(CompressionCodec::from_name("SNAPPY"), Some(CompressionCodec::Snappy));
        assert_eq!("lz4".parse::<CompressionCodec>(), Ok(CompressionCodec::Lz4));
        assert!("zstd".parse::<CompressionCodec>().is_err());
        assert_eq!(CompressionCodec::default().name(), "none");
    }
}
