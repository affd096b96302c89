//! Compressed run-log codec
//!
//! A stored log is one codec tag byte followed by the compressed bincode
//! encoding of the rows. The tag makes every blob self-describing, so a root
//! can switch compression without rewriting older runs.

use crate::run::Log;
use crate::{Error, Result};

/// zstd level for run logs; logs are written once and read by every query
const ZSTD_LEVEL: i32 = 3;

/// How a root compresses the logs it stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// lz4 block format; cheapest to write at the end of every run
    #[default]
    Lz4,
    /// zstd; smaller files for long logs
    Zstd,
}

impl Compression {
    /// Codec name, as used in bench ids and logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }

    const fn tag(self) -> u8 {
        match self {
            Self::Lz4 => 1,
            Self::Zstd => 2,
        }
    }

    const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Lz4),
            2 => Some(Self::Zstd),
            _ => None,
        }
    }

    fn pack(self, raw: &[u8], out: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::Lz4 => out.extend_from_slice(&lz4_flex::compress_prepend_size(raw)),
            Self::Zstd => {
                zstd::stream::copy_encode(raw, &mut *out, ZSTD_LEVEL)
                    .map_err(|e| Error::Codec(format!("zstd log encoding failed: {e}")))?;
            }
        }
        Ok(())
    }

    fn unpack(self, payload: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Lz4 => lz4_flex::decompress_size_prepended(payload)
                .map_err(|e| Error::Codec(format!("corrupt lz4 log: {e}"))),
            Self::Zstd => zstd::decode_all(payload)
                .map_err(|e| Error::Codec(format!("corrupt zstd log: {e}"))),
        }
    }
}

/// Encode a log as `tag || compress(bincode(log))`.
///
/// # Errors
/// Returns error if serialization or compression fails
pub fn encode_log(log: &Log, compression: Compression) -> Result<Vec<u8>> {
    let raw = bincode::serialize(log)?;
    let mut out = Vec::with_capacity(raw.len() / 2 + 1);
    out.push(compression.tag());
    compression.pack(&raw, &mut out)?;
    Ok(out)
}

/// Decode a blob produced by [`encode_log`].
///
/// # Errors
/// Returns error on an empty blob, unknown codec tag or corrupted payload
pub fn decode_log(bytes: &[u8]) -> Result<Log> {
    let (&tag, payload) = bytes
        .split_first()
        .ok_or_else(|| Error::Codec("empty log blob".to_string()))?;
    let compression =
        Compression::from_tag(tag).ok_or_else(|| Error::Codec(format!("unknown codec tag {tag}")))?;
    let raw = compression.unpack(payload)?;
    Ok(bincode::deserialize(&raw)?)
}
