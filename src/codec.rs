//! Gzip header codec
//!
//! Serializes header lists into SPDY name/value blocks compressed with a
//! connection-long zlib stream primed with the version's dictionary, and
//! reverses the process for received blocks.
//!
//! The compressed stream is never reset: each direction of a connection owns
//! one codec and must feed it every block in order.

use crate::config::CodecConfig;
use crate::context::{CodecContext, ContextRegistry};
use crate::error::{CodecError, DecodeError, Result};
use crate::header::{DecodedHeaders, Header};
use crate::protocol::CodecProtocol;
use crate::scratch::ScratchBuffer;
use crate::stats::{CodecType, HeaderCodecStats, HeaderSize};
use crate::version::{SpdyVersion, VersionSettings};
use crate::wire;
use crate::zstream::{Deflater, InflateStatus, Inflater};
use bytes::{Buf, BytesMut};
use flate2::Compression;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Default ceiling on a decompressed header block
pub const DEFAULT_MAX_UNCOMPRESSED: usize = 128 * 1024;

/// Ceiling on name and value bytes created by splitting NUL-joined values
pub const MAX_EXPANDED_HEADER_LINE_BYTES: usize = 80 * 1024;

/// Encode/decode contract consumed by the session layer.
pub trait HeaderCodec {
    fn codec_type(&self) -> CodecType;

    /// Compress `headers` into a new block. The block starts with
    /// [`HeaderCodec::encode_headroom`] zeroed bytes reserved for framing.
    /// `headers` may be reordered.
    fn encode(&mut self, scratch: &mut ScratchBuffer, headers: &mut [Header<'_>]) -> BytesMut;

    /// Decode the `length` bytes at `cursor`. The returned headers borrow
    /// `scratch` and must be consumed before it is reused.
    fn decode<'s>(
        &mut self,
        scratch: &'s mut ScratchBuffer,
        cursor: &mut dyn Buf,
        length: u32,
    ) -> std::result::Result<DecodedHeaders<'s>, DecodeError>;

    fn encoded_size(&self) -> HeaderSize;
    fn decoded_size(&self) -> HeaderSize;
    fn encode_headroom(&self) -> usize;
    fn set_encode_headroom(&mut self, headroom: usize);
    fn max_uncompressed(&self) -> usize;
    fn set_max_uncompressed(&mut self, max: usize);
    fn set_stats(&mut self, stats: Option<Arc<dyn HeaderCodecStats>>);
}

/// SPDY gzip header codec for one direction of one connection.
pub struct GzipHeaderCodec {
    settings: &'static VersionSettings,
    deflater: Deflater,
    inflater: Inflater,
    max_uncompressed: usize,
    encode_headroom: usize,
    encoded_size: HeaderSize,
    decoded_size: HeaderSize,
    stats: Option<Arc<dyn HeaderCodecStats>>,
}

impl GzipHeaderCodec {
    /// Create a codec from copies of the registry's primed streams.
    pub fn new(registry: &mut ContextRegistry, level: Compression, version: SpdyVersion) -> Self {
        let (deflater, inflater) = registry.get(version, level).instantiate();
        Self {
            settings: version.settings(),
            deflater,
            inflater,
            max_uncompressed: DEFAULT_MAX_UNCOMPRESSED,
            encode_headroom: 0,
            encoded_size: HeaderSize::default(),
            decoded_size: HeaderSize::default(),
            stats: None,
        }
    }

    /// Create a codec using the calling thread's context registry.
    pub fn from_thread_registry(level: Compression, version: SpdyVersion) -> Self {
        CodecContext::with_current(|ctx| Self::new(&mut ctx.registry, level, version))
    }

    pub fn from_config(registry: &mut ContextRegistry, config: &CodecConfig) -> Result<Self> {
        config.validate()?;
        let mut codec = Self::new(registry, config.compression(), config.version);
        codec.max_uncompressed = config.max_uncompressed;
        codec.encode_headroom = config.encode_headroom;
        Ok(codec)
    }

    /// Create a codec for a negotiated protocol.
    pub fn for_protocol(
        registry: &mut ContextRegistry,
        protocol: CodecProtocol,
        level: Compression,
    ) -> Result<Self> {
        let version = protocol
            .spdy_version()
            .ok_or_else(|| CodecError::UnsupportedProtocol(protocol.to_string()))?;
        Ok(Self::new(registry, level, version))
    }

    pub fn version(&self) -> SpdyVersion {
        self.settings.version
    }

    pub fn encode(&mut self, scratch: &mut ScratchBuffer, headers: &mut [Header<'_>]) -> BytesMut {
        // SPDY forbids repeating a name within a block, so same-name headers
        // are made adjacent and merged into one NUL-joined value.
        headers.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let max_size = wire::max_serialized_size(headers, self.settings);
        debug!("Reserving {} bytes for uncompressed headers", max_size);
        scratch.prepare(self.max_uncompressed);
        scratch.reserve_total(max_size);

        let (uncompressed_len, _) = wire::write_name_values(headers, self.settings, scratch.storage_mut());
        scratch.commit(uncompressed_len);

        let max_deflated = self.deflater.bound(uncompressed_len);
        let headroom = self.encode_headroom;
        let mut out = BytesMut::zeroed(headroom + max_deflated);
        let progress = self
            .deflater
            .compress_sync(scratch.filled(), &mut out[headroom..])
            .unwrap_or_else(|e| panic!("header compression failed: {}", e));
        assert_eq!(
            progress.consumed, uncompressed_len,
            "header compression left input unconsumed"
        );
        out.truncate(headroom + progress.produced);

        debug!(
            "Header size orig={}, max deflated={}, actual deflated={}",
            uncompressed_len, max_deflated, progress.produced
        );

        self.encoded_size = HeaderSize {
            compressed: progress.produced,
            uncompressed: uncompressed_len,
        };
        if let Some(stats) = &self.stats {
            stats.record_encode(CodecType::Gzip, &self.encoded_size);
        }
        out
    }

    pub fn decode<'s>(
        &mut self,
        scratch: &'s mut ScratchBuffer,
        cursor: &mut dyn Buf,
        length: u32,
    ) -> std::result::Result<DecodedHeaders<'s>, DecodeError> {
        if length == 0 {
            return Ok(DecodedHeaders::default());
        }

        let result = self.decode_block(scratch, cursor, length);
        if let (Err(err), Some(stats)) = (&result, &self.stats) {
            if *err == DecodeError::HeadersTooLarge {
                stats.record_decode_too_large(CodecType::Gzip);
            } else {
                stats.record_decode_error(CodecType::Gzip);
            }
        }
        result
    }

    /// Encode using the calling thread's scratch buffer.
    pub fn encode_headers(&mut self, headers: &mut [Header<'_>]) -> BytesMut {
        CodecContext::with_current(|ctx| self.encode(&mut ctx.scratch, headers))
    }

    /// Decode using the calling thread's scratch buffer, copying the result
    /// out of it.
    pub fn decode_headers(
        &mut self,
        cursor: &mut dyn Buf,
        length: u32,
    ) -> std::result::Result<DecodedHeaders<'static>, DecodeError> {
        CodecContext::with_current(|ctx| {
            self.decode(&mut ctx.scratch, cursor, length)
                .map(DecodedHeaders::into_owned)
        })
    }

    fn decode_block<'s>(
        &mut self,
        scratch: &'s mut ScratchBuffer,
        cursor: &mut dyn Buf,
        length: u32,
    ) -> std::result::Result<DecodedHeaders<'s>, DecodeError> {
        let consumed = self.inflate_block(scratch, cursor, length)?;

        self.decoded_size = HeaderSize {
            compressed: consumed as usize,
            uncompressed: scratch.len(),
        };
        // Counted once inflate succeeds; a block that then fails to parse is
        // also reported as a decode error.
        if let Some(stats) = &self.stats {
            stats.record_decode(CodecType::Gzip, &self.decoded_size);
        }

        let scratch: &'s ScratchBuffer = scratch;
        let mut headers = Vec::new();
        let expanded = wire::parse_name_values(scratch.filled(), self.settings, &mut headers)?;
        if expanded > MAX_EXPANDED_HEADER_LINE_BYTES {
            error!("Expanded headers too large: {} bytes", expanded);
            return Err(DecodeError::HeadersTooLarge);
        }

        Ok(DecodedHeaders { headers, consumed })
    }

    /// Inflate `length` bytes from `cursor` into `scratch`, chunk by chunk.
    fn inflate_block(
        &mut self,
        scratch: &mut ScratchBuffer,
        cursor: &mut dyn Buf,
        length: u32,
    ) -> std::result::Result<u32, DecodeError> {
        scratch.prepare(self.max_uncompressed);
        let mut remaining = length as usize;
        let mut consumed = 0u32;

        while remaining > 0 {
            let chunk_len = {
                let chunk = cursor.chunk();
                if chunk.is_empty() {
                    error!("Header block truncated: {} bytes missing", remaining);
                    return Err(DecodeError::BadEncoding);
                }
                let chunk = &chunk[..chunk.len().min(remaining)];
                self.inflate_chunk(scratch, chunk)?;
                chunk.len()
            };
            cursor.advance(chunk_len);
            remaining -= chunk_len;
            consumed += chunk_len as u32;
        }
        Ok(consumed)
    }

    fn inflate_chunk(&mut self, scratch: &mut ScratchBuffer, mut input: &[u8]) -> std::result::Result<(), DecodeError> {
        loop {
            if scratch.tailroom() == 0 {
                // Only hit when the previous drain filled the buffer exactly.
                scratch.grow();
            }
            let tailroom = scratch.tailroom();
            let (status, progress) = self.inflater.decompress(input, scratch.tail_mut());
            input = &input[progress.consumed..];

            match status {
                InflateStatus::NeedDictionary => {
                    // Only known once the zlib header has been read, since
                    // inflate checks the dictionary's adler-32 against it.
                    if let Err(e) = self.inflater.set_dictionary(self.settings.dictionary) {
                        error!("Inflate set dictionary failed: {}", e);
                        return Err(DecodeError::InflateDictionary);
                    }
                    continue;
                }
                InflateStatus::Ok if progress.consumed > 0 || progress.produced > 0 => {}
                InflateStatus::BufError if input.is_empty() && progress.produced == 0 => return Ok(()),
                other => {
                    error!("Inflate failed with status {:?}", other);
                    return Err(DecodeError::BadEncoding);
                }
            }

            scratch.commit(progress.produced);
            if scratch.len() > self.max_uncompressed {
                error!("Decompressed headers too large: over {} bytes", self.max_uncompressed);
                return Err(DecodeError::HeadersTooLarge);
            }
            if input.is_empty() && progress.produced < tailroom {
                return Ok(());
            }
        }
    }
}

impl HeaderCodec for GzipHeaderCodec {
    fn codec_type(&self) -> CodecType {
        CodecType::Gzip
    }

    fn encode(&mut self, scratch: &mut ScratchBuffer, headers: &mut [Header<'_>]) -> BytesMut {
        GzipHeaderCodec::encode(self, scratch, headers)
    }

    fn decode<'s>(
        &mut self,
        scratch: &'s mut ScratchBuffer,
        cursor: &mut dyn Buf,
        length: u32,
    ) -> std::result::Result<DecodedHeaders<'s>, DecodeError> {
        GzipHeaderCodec::decode(self, scratch, cursor, length)
    }

    fn encoded_size(&self) -> HeaderSize {
        self.encoded_size
    }

    fn decoded_size(&self) -> HeaderSize {
        self.decoded_size
    }

    fn encode_headroom(&self) -> usize {
        self.encode_headroom
    }

    fn set_encode_headroom(&mut self, headroom: usize) {
        self.encode_headroom = headroom;
    }

    fn max_uncompressed(&self) -> usize {
        self.max_uncompressed
    }

    fn set_max_uncompressed(&mut self, max: usize) {
        self.max_uncompressed = max;
    }

    fn set_stats(&mut self, stats: Option<Arc<dyn HeaderCodecStats>>) {
        self.stats = stats;
    }
}

impl fmt::Debug for GzipHeaderCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzipHeaderCodec")
            .field("version", &self.settings.version)
            .field("max_uncompressed", &self.max_uncompressed)
            .field("encode_headroom", &self.encode_headroom)
            .field("encoded_size", &self.encoded_size)
            .field("decoded_size", &self.decoded_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::AtomicHeaderStats;

    fn codec_pair(version: SpdyVersion, level: Compression) -> (GzipHeaderCodec, GzipHeaderCodec) {
        let mut registry = ContextRegistry::new();
        let a = GzipHeaderCodec::new(&mut registry, level, version);
        let b = GzipHeaderCodec::new(&mut registry, level, version);
        (a, b)
    }

    fn lines(decoded: &DecodedHeaders<'_>) -> Vec<(String, String)> {
        decoded
            .iter()
            .map(|h| (h.name.to_string(), h.value.to_string()))
            .collect()
    }

    /// Compress an arbitrary uncompressed block on `codec`'s stream.
    fn compress_raw(codec: &mut GzipHeaderCodec, block: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; codec.deflater.bound(block.len())];
        let progress = codec.deflater.compress_sync(block, &mut out).unwrap();
        out.truncate(progress.produced);
        out
    }

    #[test]
    fn test_round_trip() {
        let (mut tx, mut rx) = codec_pair(SpdyVersion::Spdy3, Compression::default());
        let mut scratch = ScratchBuffer::new();
        let mut headers = vec![
            Header::new(":method", "GET"),
            Header::new("Host", "www.example.com"),
            Header::new("user-agent", "spdyhc"),
        ];
        let block = tx.encode(&mut scratch, &mut headers);
        let mut cursor = &block[..];
        let decoded = rx.decode(&mut scratch, &mut cursor, block.len() as u32).unwrap();

        assert_eq!(decoded.consumed as usize, block.len());
        let mut got = lines(&decoded);
        got.sort();
        assert_eq!(
            got,
            vec![
                (":method".to_string(), "GET".to_string()),
                ("host".to_string(), "www.example.com".to_string()),
                ("user-agent".to_string(), "spdyhc".to_string()),
            ]
        );
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_stream_continues_across_blocks() {
        let (mut tx, mut rx) = codec_pair(SpdyVersion::Spdy2, Compression::best());
        let mut scratch = ScratchBuffer::new();
        for i in 0..5 {
            let value = format!("/page/{}", i);
            let mut headers = vec![Header::new("url", value.as_str()), Header::new("method", "GET")];
            let block = tx.encode(&mut scratch, &mut headers);
            let decoded = rx.decode(&mut scratch, &mut &block[..], block.len() as u32).unwrap();
            assert_eq!(decoded.get_all("url").next().unwrap().as_bytes(), value.as_bytes());
        }
    }

    #[test]
    fn test_no_compression_round_trip() {
        let (mut tx, mut rx) = codec_pair(SpdyVersion::Spdy3_1, Compression::none());
        let mut scratch = ScratchBuffer::new();
        let mut headers = vec![Header::new("content-length", "42")];
        let block = tx.encode(&mut scratch, &mut headers);
        assert!(block.len() > tx.encoded_size().uncompressed);
        let decoded = rx.decode(&mut scratch, &mut &block[..], block.len() as u32).unwrap();
        assert_eq!(lines(&decoded), vec![("content-length".to_string(), "42".to_string())]);
    }

    #[test]
    fn test_headroom_is_reserved() {
        let (mut tx, mut rx) = codec_pair(SpdyVersion::Spdy3, Compression::default());
        tx.set_encode_headroom(8);
        let mut scratch = ScratchBuffer::new();
        let block = tx.encode(&mut scratch, &mut [Header::new("a", "b")]);

        assert_eq!(&block[..8], &[0u8; 8]);
        assert_eq!(block.len(), 8 + tx.encoded_size().compressed);
        let payload = &block[8..];
        let decoded = rx.decode(&mut scratch, &mut &payload[..], payload.len() as u32).unwrap();
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn test_zero_length_decode_touches_nothing() {
        let (_, mut rx) = codec_pair(SpdyVersion::Spdy3, Compression::default());
        let mut scratch = ScratchBuffer::new();
        let garbage = [0xffu8; 4];
        let mut cursor = &garbage[..];
        let decoded = rx.decode(&mut scratch, &mut cursor, 0).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(decoded.consumed, 0);
        assert_eq!(cursor.len(), 4);
        assert_eq!(scratch.capacity(), 0);
    }

    #[test]
    fn test_decompressed_size_ceiling() {
        let (mut tx, mut rx) = codec_pair(SpdyVersion::Spdy3, Compression::default());
        rx.set_max_uncompressed(1024);
        let block = compress_raw(&mut tx, &vec![b'a'; 64 * 1024]);
        assert!(block.len() < 1024);

        let mut scratch = ScratchBuffer::new();
        let err = rx.decode(&mut scratch, &mut &block[..], block.len() as u32).unwrap_err();
        assert_eq!(err, DecodeError::HeadersTooLarge);
        assert!(scratch.capacity() <= 2 * 1024);
    }

    #[test]
    fn test_expansion_ceiling() {
        let (mut tx, mut rx) = codec_pair(SpdyVersion::Spdy3, Compression::default());
        rx.set_max_uncompressed(1024 * 1024);

        // 20000 one-byte values sharing a 10-byte name expand to ~220 KB.
        let mut value = Vec::new();
        for _ in 0..20_000 {
            value.extend_from_slice(b"v\0");
        }
        value.pop();
        let mut block = vec![0, 0, 0, 1, 0, 0, 0, 10];
        block.extend_from_slice(b"x-repeated");
        block.extend_from_slice(&(value.len() as u32).to_be_bytes());
        block.extend_from_slice(&value);

        let compressed = compress_raw(&mut tx, &block);
        let mut scratch = ScratchBuffer::new();
        let err = rx
            .decode(&mut scratch, &mut &compressed[..], compressed.len() as u32)
            .unwrap_err();
        assert_eq!(err, DecodeError::HeadersTooLarge);
    }

    #[test]
    fn test_uppercase_name_rejected() {
        let (mut tx, mut rx) = codec_pair(SpdyVersion::Spdy3, Compression::default());
        let compressed = compress_raw(&mut tx, b"\x00\x00\x00\x01\x00\x00\x00\x01A\x00\x00\x00\x01v");
        let mut scratch = ScratchBuffer::new();
        let err = rx
            .decode(&mut scratch, &mut &compressed[..], compressed.len() as u32)
            .unwrap_err();
        assert_eq!(err, DecodeError::InvalidHeaderValue);
    }

    #[test]
    fn test_garbage_is_bad_encoding() {
        let (_, mut rx) = codec_pair(SpdyVersion::Spdy3, Compression::default());
        let mut scratch = ScratchBuffer::new();
        let garbage = [0x12u8, 0x34, 0x56, 0x78];
        let err = rx.decode(&mut scratch, &mut &garbage[..], 4).unwrap_err();
        assert_eq!(err, DecodeError::BadEncoding);
    }

    #[test]
    fn test_short_cursor_is_bad_encoding() {
        let (mut tx, mut rx) = codec_pair(SpdyVersion::Spdy3, Compression::default());
        let mut scratch = ScratchBuffer::new();
        let block = tx.encode(&mut scratch, &mut [Header::new("a", "b")]);
        let err = rx
            .decode(&mut scratch, &mut &block[..], block.len() as u32 + 10)
            .unwrap_err();
        assert_eq!(err, DecodeError::BadEncoding);
    }

    #[test]
    fn test_dictionary_mismatch() {
        let mut registry = ContextRegistry::new();
        let mut tx = GzipHeaderCodec::new(&mut registry, Compression::default(), SpdyVersion::Spdy2);
        let mut rx = GzipHeaderCodec::new(&mut registry, Compression::default(), SpdyVersion::Spdy3);
        let mut scratch = ScratchBuffer::new();
        let block = tx.encode(&mut scratch, &mut [Header::new("host", "x")]);
        let err = rx.decode(&mut scratch, &mut &block[..], block.len() as u32).unwrap_err();
        assert_eq!(err, DecodeError::InflateDictionary);
    }

    #[test]
    fn test_stats_are_recorded() {
        let (mut tx, mut rx) = codec_pair(SpdyVersion::Spdy3, Compression::default());
        let stats = Arc::new(AtomicHeaderStats::new());
        tx.set_stats(Some(stats.clone()));
        rx.set_stats(Some(stats.clone()));

        let mut scratch = ScratchBuffer::new();
        let block = tx.encode(&mut scratch, &mut [Header::new("host", "x")]);
        rx.decode(&mut scratch, &mut &block[..], block.len() as u32).unwrap();

        let snap = stats.snapshot();
        assert_eq!(snap.encodes, 1);
        assert_eq!(snap.encoded_compressed as usize, tx.encoded_size().compressed);
        assert_eq!(snap.decodes, 1);
        assert_eq!(snap.decoded_uncompressed as usize, rx.decoded_size().uncompressed);
        assert_eq!(snap.decode_errors, 0);
    }

    #[test]
    fn test_stats_count_parse_failures_as_decodes() {
        let (mut tx, mut rx) = codec_pair(SpdyVersion::Spdy3, Compression::default());
        let stats = Arc::new(AtomicHeaderStats::new());
        rx.set_stats(Some(stats.clone()));

        let mut scratch = ScratchBuffer::new();
        let block = tx.encode(&mut scratch, &mut [Header::new("host", "x")]);
        rx.decode(&mut scratch, &mut &block[..], block.len() as u32).unwrap();

        // Mid-stream, these bytes open a stored deflate block and inflate
        // cleanly to nothing, so only the name/value parser rejects them.
        let garbage = [0u8; 3];
        let err = rx.decode(&mut scratch, &mut &garbage[..], 3).unwrap_err();
        assert_eq!(err, DecodeError::BadEncoding);

        let snap = stats.snapshot();
        assert_eq!(snap.decodes, 2);
        assert_eq!(snap.decode_errors, 1);
    }

    #[test]
    fn test_stats_skip_decode_on_inflate_failure() {
        let (_, mut rx) = codec_pair(SpdyVersion::Spdy3, Compression::default());
        let stats = Arc::new(AtomicHeaderStats::new());
        rx.set_stats(Some(stats.clone()));

        // On a fresh stream the same bytes fail the zlib header check.
        let mut scratch = ScratchBuffer::new();
        let garbage = [0u8; 3];
        let err = rx.decode(&mut scratch, &mut &garbage[..], 3).unwrap_err();
        assert_eq!(err, DecodeError::BadEncoding);

        let snap = stats.snapshot();
        assert_eq!(snap.decodes, 0);
        assert_eq!(snap.decode_errors, 1);
    }

    #[test]
    fn test_for_protocol() {
        let mut registry = ContextRegistry::new();
        let codec =
            GzipHeaderCodec::for_protocol(&mut registry, CodecProtocol::Spdy3_1, Compression::fast()).unwrap();
        assert_eq!(codec.version(), SpdyVersion::Spdy3_1);
        assert!(matches!(
            GzipHeaderCodec::for_protocol(&mut registry, CodecProtocol::Spdy3_1Hpack, Compression::fast()),
            Err(CodecError::UnsupportedProtocol(_))
        ));
    }

    #[test]
    fn test_thread_scratch_helpers() {
        let mut tx = GzipHeaderCodec::from_thread_registry(Compression::default(), SpdyVersion::Spdy3);
        let mut rx = GzipHeaderCodec::from_thread_registry(Compression::default(), SpdyVersion::Spdy3);
        let block = tx.encode_headers(&mut [Header::new("vary", "a"), Header::new("vary", "b")]);
        let decoded = rx.decode_headers(&mut &block[..], block.len() as u32).unwrap();
        assert_eq!(
            lines(&decoded),
            vec![("vary".to_string(), "a".to_string()), ("vary".to_string(), "b".to_string())]
        );
        assert!(decoded.headers[1].value.is_owned());
    }
}
