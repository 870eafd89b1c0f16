//! Header compression statistics

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Compression scheme of a header codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CodecType {
    Gzip,
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecType::Gzip => f.write_str("gzip"),
        }
    }
}

/// Compressed and uncompressed size of one header block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSize {
    pub compressed: usize,
    pub uncompressed: usize,
}

/// Observer notified after every encode and decode.
pub trait HeaderCodecStats: Send + Sync {
    fn record_encode(&self, codec_type: CodecType, size: &HeaderSize);
    fn record_decode(&self, codec_type: CodecType, size: &HeaderSize);
    fn record_decode_error(&self, codec_type: CodecType);
    fn record_decode_too_large(&self, codec_type: CodecType);
}

/// Lock-free counters implementing [`HeaderCodecStats`].
#[derive(Debug, Default)]
pub struct AtomicHeaderStats {
    encodes: AtomicU64,
    encoded_compressed: AtomicU64,
    encoded_uncompressed: AtomicU64,
    decodes: AtomicU64,
    decoded_compressed: AtomicU64,
    decoded_uncompressed: AtomicU64,
    decode_errors: AtomicU64,
    decodes_too_large: AtomicU64,
}

/// Point-in-time copy of [`AtomicHeaderStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub encodes: u64,
    pub encoded_compressed: u64,
    pub encoded_uncompressed: u64,
    pub decodes: u64,
    pub decoded_compressed: u64,
    pub decoded_uncompressed: u64,
    pub decode_errors: u64,
    pub decodes_too_large: u64,
}

impl StatsSnapshot {
    /// Uncompressed bytes per compressed byte across all encodes
    pub fn encode_ratio(&self) -> f64 {
        if self.encoded_compressed == 0 {
            return 0.0;
        }
        self.encoded_uncompressed as f64 / self.encoded_compressed as f64
    }
}

impl AtomicHeaderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            encodes: self.encodes.load(Ordering::Relaxed),
            encoded_compressed: self.encoded_compressed.load(Ordering::Relaxed),
            encoded_uncompressed: self.encoded_uncompressed.load(Ordering::Relaxed),
            decodes: self.decodes.load(Ordering::Relaxed),
            decoded_compressed: self.decoded_compressed.load(Ordering::Relaxed),
            decoded_uncompressed: self.decoded_uncompressed.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            decodes_too_large: self.decodes_too_large.load(Ordering::Relaxed),
        }
    }
}

impl HeaderCodecStats for AtomicHeaderStats {
    fn record_encode(&self, _codec_type: CodecType, size: &HeaderSize) {
        self.encodes.fetch_add(1, Ordering::Relaxed);
        self.encoded_compressed.fetch_add(size.compressed as u64, Ordering::Relaxed);
        self.encoded_uncompressed.fetch_add(size.uncompressed as u64, Ordering::Relaxed);
    }

    fn record_decode(&self, _codec_type: CodecType, size: &HeaderSize) {
        self.decodes.fetch_add(1, Ordering::Relaxed);
        self.decoded_compressed.fetch_add(size.compressed as u64, Ordering::Relaxed);
        self.decoded_uncompressed.fetch_add(size.uncompressed as u64, Ordering::Relaxed);
    }

    fn record_decode_error(&self, _codec_type: CodecType) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_decode_too_large(&self, _codec_type: CodecType) {
        self.decodes_too_large.fetch_add(1, Ordering::Relaxed);
    }
}
