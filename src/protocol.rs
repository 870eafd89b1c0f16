//! Negotiated codec protocol identifiers

use crate::version::SpdyVersion;
use std::fmt;

/// Application protocol selected during connection negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecProtocol {
    Http1_1,
    Spdy2,
    Spdy3,
    Spdy3_1,
    Spdy3_1Hpack,
    Http2,
}

const ALL_PROTOCOLS: [CodecProtocol; 6] = [
    CodecProtocol::Http1_1,
    CodecProtocol::Spdy2,
    CodecProtocol::Spdy3,
    CodecProtocol::Spdy3_1,
    CodecProtocol::Spdy3_1Hpack,
    CodecProtocol::Http2,
];

impl CodecProtocol {
    /// Negotiation string for this protocol
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecProtocol::Http1_1 => "http/1.1",
            CodecProtocol::Spdy2 => "spdy/2",
            CodecProtocol::Spdy3 => "spdy/3",
            CodecProtocol::Spdy3_1 => "spdy/3.1",
            CodecProtocol::Spdy3_1Hpack => "spdy/3.1-hpack",
            CodecProtocol::Http2 => "http/2",
        }
    }

    /// Exact lookup of a negotiation string
    pub fn parse(s: &str) -> Option<Self> {
        ALL_PROTOCOLS.iter().copied().find(|p| p.as_str() == s)
    }

    pub fn is_valid_str(s: &str) -> bool {
        Self::parse(s).is_some()
    }

    /// Map a negotiated string to a protocol, falling back to HTTP/1.1 for
    /// anything unknown.
    pub fn from_negotiated(s: &str) -> Self {
        Self::parse(s).unwrap_or(CodecProtocol::Http1_1)
    }

    pub fn is_spdy(&self) -> bool {
        matches!(
            self,
            CodecProtocol::Spdy2
                | CodecProtocol::Spdy3
                | CodecProtocol::Spdy3_1
                | CodecProtocol::Spdy3_1Hpack
        )
    }

    /// Highest stream priority the protocol can express
    pub fn max_priority(&self) -> u8 {
        match self {
            CodecProtocol::Spdy2 => 3,
            CodecProtocol::Spdy3 | CodecProtocol::Spdy3_1 | CodecProtocol::Spdy3_1Hpack => 7,
            CodecProtocol::Http1_1 | CodecProtocol::Http2 => 0,
        }
    }

    /// SPDY version whose header blocks use gzip compression, if any.
    /// `spdy/3.1-hpack` compresses headers with HPACK and has none.
    pub fn spdy_version(&self) -> Option<SpdyVersion> {
        match self {
            CodecProtocol::Spdy2 => Some(SpdyVersion::Spdy2),
            CodecProtocol::Spdy3 => Some(SpdyVersion::Spdy3),
            CodecProtocol::Spdy3_1 => Some(SpdyVersion::Spdy3_1),
            _ => None,
        }
    }
}

impl fmt::Display for CodecProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
