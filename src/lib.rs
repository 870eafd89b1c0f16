// Header codec and its contract
pub mod codec;

// Connection-wide compression context and scratch storage
pub mod context;
pub mod scratch;
pub mod zstream;

// SPDY versions, dictionaries and the name/value wire format
pub mod dictionary;
pub mod protocol;
pub mod version;
pub mod wire;

// Header representations
pub mod header;

// Statistics hooks
pub mod stats;

pub mod config;
pub mod error;

// Re-export main types
pub use crate::codec::{GzipHeaderCodec, HeaderCodec, DEFAULT_MAX_UNCOMPRESSED, MAX_EXPANDED_HEADER_LINE_BYTES};
pub use crate::config::{CodecConfig, CodecConfigBuilder};
pub use crate::context::{CodecContext, ContextRegistry};
pub use crate::error::{CodecError, DecodeError, Result};
pub use crate::header::{DecodedHeader, DecodedHeaders, Header, HeaderCode, HeaderPiece};
pub use crate::protocol::CodecProtocol;
pub use crate::scratch::ScratchBuffer;
pub use crate::stats::{AtomicHeaderStats, CodecType, HeaderCodecStats, HeaderSize};
pub use crate::version::SpdyVersion;

pub use flate2::Compression;

pub mod prelude {
    pub use crate::codec::{GzipHeaderCodec, HeaderCodec};
    pub use crate::config::CodecConfig;
    pub use crate::context::{CodecContext, ContextRegistry};
    pub use crate::error::{CodecError, DecodeError};
    pub use crate::header::{DecodedHeaders, Header, HeaderCode};
    pub use crate::protocol::CodecProtocol;
    pub use crate::scratch::ScratchBuffer;
    pub use crate::version::SpdyVersion;
    pub use anyhow::Result;
    pub use flate2::Compression;
}
