//! Header codec error types

/// Errors produced while decoding a compressed header block.
///
/// Every variant is recoverable: the caller resets the stream or connection
/// that delivered the block, and the codec instance stays usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum DecodeError {
    #[error("inflate dictionary rejected")]
    InflateDictionary,

    #[error("bad header block encoding")]
    BadEncoding,

    #[error("header block too large")]
    HeadersTooLarge,

    #[error("empty header name")]
    EmptyHeaderName,

    #[error("empty header value")]
    EmptyHeaderValue,

    #[error("invalid header name")]
    InvalidHeaderValue,
}

/// Errors raised while configuring or constructing a codec.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No gzip header codec for protocol: {0}")]
    UnsupportedProtocol(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Failure reading the uncompressed name/value block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("header block truncated")]
    Truncated,
}

impl From<WireError> for DecodeError {
    fn from(_: WireError) -> Self {
        DecodeError::BadEncoding
    }
}
