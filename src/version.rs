//! Per-version SPDY header block settings

use crate::dictionary::{SPDY2_DICTIONARY, SPDY3_DICTIONARY};
use crate::error::{CodecError, WireError};
use crate::protocol::CodecProtocol;
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SPDY versions that carry gzip-compressed header blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpdyVersion {
    #[serde(rename = "spdy/2")]
    Spdy2,
    #[serde(rename = "spdy/3")]
    Spdy3,
    #[serde(rename = "spdy/3.1")]
    Spdy3_1,
}

impl SpdyVersion {
    pub fn settings(self) -> &'static VersionSettings {
        match self {
            SpdyVersion::Spdy2 => &SPDY2_SETTINGS,
            SpdyVersion::Spdy3 => &SPDY3_SETTINGS,
            SpdyVersion::Spdy3_1 => &SPDY3_1_SETTINGS,
        }
    }

    pub fn protocol(self) -> CodecProtocol {
        self.settings().protocol
    }
}

impl fmt::Display for SpdyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.protocol().as_str())
    }
}

impl FromStr for SpdyVersion {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CodecProtocol::parse(s)
            .and_then(|p| p.spdy_version())
            .ok_or_else(|| CodecError::UnsupportedProtocol(s.to_string()))
    }
}

/// Writes a size field at the start of the slice.
pub type WriteSizeFn = fn(&mut [u8], u32);

/// Reads a size field, advancing the cursor past it.
pub type ReadSizeFn = fn(&mut &[u8]) -> Result<u32, WireError>;

/// Static wire parameters of one SPDY version.
pub struct VersionSettings {
    pub version: SpdyVersion,
    pub protocol: CodecProtocol,
    pub dictionary: &'static [u8],
    /// Width in bytes of every count and length field
    pub size_width: usize,
    pub write_size: WriteSizeFn,
    pub read_size: ReadSizeFn,
}

impl VersionSettings {
    pub fn dictionary_size(&self) -> usize {
        self.dictionary.len()
    }
}

impl fmt::Debug for VersionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionSettings")
            .field("version", &self.version)
            .field("dictionary_size", &self.dictionary.len())
            .field("size_width", &self.size_width)
            .finish()
    }
}

fn write_size16(mut dst: &mut [u8], value: u32) {
    assert!(value <= u16::MAX as u32, "size {} overflows a 16-bit field", value);
    dst.put_u16(value as u16);
}

fn read_size16(src: &mut &[u8]) -> Result<u32, WireError> {
    if src.remaining() < 2 {
        return Err(WireError::Truncated);
    }
    Ok(src.get_u16() as u32)
}

fn write_size32(mut dst: &mut [u8], value: u32) {
    dst.put_u32(value);
}

fn read_size32(src: &mut &[u8]) -> Result<u32, WireError> {
    if src.remaining() < 4 {
        return Err(WireError::Truncated);
    }
    Ok(src.get_u32())
}

static SPDY2_SETTINGS: VersionSettings = VersionSettings {
    version: SpdyVersion::Spdy2,
    protocol: CodecProtocol::Spdy2,
    dictionary: SPDY2_DICTIONARY,
    size_width: 2,
    write_size: write_size16,
    read_size: read_size16,
};

static SPDY3_SETTINGS: VersionSettings = VersionSettings {
    version: SpdyVersion::Spdy3,
    protocol: CodecProtocol::Spdy3,
    dictionary: SPDY3_DICTIONARY,
    size_width: 4,
    write_size: write_size32,
    read_size: read_size32,
};

static SPDY3_1_SETTINGS: VersionSettings = VersionSettings {
    version: SpdyVersion::Spdy3_1,
    protocol: CodecProtocol::Spdy3_1,
    dictionary: SPDY3_DICTIONARY,
    size_width: 4,
    write_size: write_size32,
    read_size: read_size32,
};
