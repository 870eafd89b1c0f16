//! SPDY name/value block serialization
//!
//! Layout: `count, (name_len, name, value_len, value) * count`, every size
//! field `size_width` bytes wide. A name appears at most once per block, so
//! repeated headers travel as one value joined with NUL bytes.

use crate::error::{DecodeError, WireError};
use crate::header::{DecodedHeader, Header, HeaderCode, HeaderPiece};
use crate::version::VersionSettings;
use tracing::error;

/// Upper bound on the serialized size of `headers`. Merging same-name
/// headers only shrinks the output.
pub fn max_serialized_size(headers: &[Header<'_>], settings: &VersionSettings) -> usize {
    let width = settings.size_width;
    headers
        .iter()
        .fold(width, |size, h| size + 2 * width + h.name.len() + h.value.len())
}

fn put_field(buf: &mut [u8], pos: usize, settings: &VersionSettings, bytes: &[u8]) -> usize {
    (settings.write_size)(&mut buf[pos..], bytes.len() as u32);
    let start = pos + settings.size_width;
    buf[start..start + bytes.len()].copy_from_slice(bytes);
    start + bytes.len()
}

/// Serialize `headers`, which must already be sorted by
/// [`Header::sort_key`], into `buf`.
///
/// Returns the number of bytes written and the number of distinct names.
///
/// # Panics
///
/// If `buf` is smaller than [`max_serialized_size`].
pub fn write_name_values(headers: &[Header<'_>], settings: &VersionSettings, buf: &mut [u8]) -> (usize, u32) {
    // The count field is filled in once all names are known.
    let mut pos = settings.size_width;
    let mut count = 0u32;
    let mut last: Option<(HeaderCode, &[u8])> = None;
    let mut value_len_offset = 0;
    let mut value_len = 0;

    for header in headers {
        let key = header.sort_key();
        if last != Some(key) {
            count += 1;
            let name = header.name.as_bytes();
            pos = put_field(buf, pos, settings, name);
            buf[pos - name.len()..pos].make_ascii_lowercase();

            value_len_offset = pos;
            value_len = header.value.len();
            pos = put_field(buf, pos, settings, header.value.as_bytes());
            last = Some(key);
        } else {
            let value = header.value.as_bytes();
            buf[pos] = 0;
            pos += 1;
            buf[pos..pos + value.len()].copy_from_slice(value);
            pos += value.len();

            value_len += 1 + value.len();
            (settings.write_size)(&mut buf[value_len_offset..], value_len as u32);
        }
    }

    (settings.write_size)(buf, count);
    (pos, count)
}

fn take_field<'a>(cursor: &mut &'a [u8], settings: &VersionSettings) -> Result<&'a [u8], WireError> {
    let len = (settings.read_size)(cursor)? as usize;
    if cursor.len() < len {
        return Err(WireError::Truncated);
    }
    let (field, rest) = cursor.split_at(len);
    *cursor = rest;
    Ok(field)
}

fn is_valid_name(name: &[u8]) -> bool {
    name.iter()
        .all(|&c| (0x20..=0x7e).contains(&c) && !c.is_ascii_uppercase())
}

/// Parse an uncompressed name/value block, appending decoded lines to `out`.
///
/// Values holding NUL separators are expanded into one line per segment.
/// Returns the number of name and value bytes created by that expansion.
pub fn parse_name_values<'a>(
    block: &'a [u8],
    settings: &VersionSettings,
    out: &mut Vec<DecodedHeader<'a>>,
) -> Result<usize, DecodeError> {
    let mut cursor = block;
    let count = (settings.read_size)(&mut cursor)?;
    let mut expanded = 0;

    for _ in 0..count {
        let name = take_field(&mut cursor, settings)?;
        if name.is_empty() {
            error!("empty header name");
            return Err(DecodeError::EmptyHeaderName);
        }
        if !is_valid_name(name) {
            error!("invalid header name");
            return Err(DecodeError::InvalidHeaderValue);
        }

        let value = take_field(&mut cursor, settings)?;
        if !value.contains(&0) {
            out.push(DecodedHeader {
                name: HeaderPiece::borrowed(name, false),
                value: HeaderPiece::borrowed(value, false),
            });
            continue;
        }

        for (i, segment) in value.split(|&b| b == 0).enumerate() {
            if segment.is_empty() {
                error!("empty header value");
                return Err(DecodeError::EmptyHeaderValue);
            }
            let duplicate = i > 0;
            if duplicate {
                expanded += name.len() + segment.len();
            }
            out.push(DecodedHeader {
                name: HeaderPiece::borrowed(name, duplicate),
                value: HeaderPiece::borrowed(segment, duplicate),
            });
        }
    }

    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::SpdyVersion;

    fn serialize(headers: &mut [Header<'_>], version: SpdyVersion) -> Vec<u8> {
        let settings = version.settings();
        headers.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        let mut buf = vec![0u8; max_serialized_size(headers, settings)];
        let (len, _) = write_name_values(headers, settings, &mut buf);
        buf.truncate(len);
        buf
    }

    fn parse(block: &[u8]) -> Result<(Vec<(String, String)>, usize), DecodeError> {
        let mut out = Vec::new();
        let expanded = parse_name_values(block, SpdyVersion::Spdy3.settings(), &mut out)?;
        let lines = out
            .iter()
            .map(|h| (h.name.to_string(), h.value.to_string()))
            .collect();
        Ok((lines, expanded))
    }

    #[test]
    fn test_spdy2_layout() {
        let block = serialize(&mut [Header::new("Host", "a.com")], SpdyVersion::Spdy2);
        assert_eq!(block, b"\x00\x01\x00\x04host\x00\x05a.com");
    }

    #[test]
    fn test_empty_list_writes_zero_count() {
        let block = serialize(&mut [], SpdyVersion::Spdy3);
        assert_eq!(block, [0, 0, 0, 0]);
        assert!(parse(&block).unwrap().0.is_empty());
    }

    #[test]
    fn test_same_name_values_are_joined() {
        let mut headers = [
            Header::new("set-cookie", "a=1"),
            Header::new("x-other", "z"),
            Header::new("set-cookie", "b=2"),
        ];
        let block = serialize(&mut headers, SpdyVersion::Spdy3);
        let mut expected = vec![0, 0, 0, 2];
        expected.extend_from_slice(b"\x00\x00\x00\x07x-other\x00\x00\x00\x01z");
        expected.extend_from_slice(b"\x00\x00\x00\x0aset-cookie\x00\x00\x00\x07a=1\x00b=2");
        assert_eq!(block, expected);
    }

    #[test]
    fn test_grouping_is_case_sensitive() {
        let mut headers = [Header::new("X-Dup", "1"), Header::new("x-dup", "2")];
        let block = serialize(&mut headers, SpdyVersion::Spdy3);
        assert_eq!(&block[..4], &[0, 0, 0, 2]);
        let (lines, _) = parse(&block).unwrap();
        assert_eq!(
            lines,
            vec![("x-dup".to_string(), "1".to_string()), ("x-dup".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn test_max_size_is_an_upper_bound() {
        let headers = [Header::new("a", "1"), Header::new("a", "2")];
        let bound = max_serialized_size(&headers, SpdyVersion::Spdy3.settings());
        assert_eq!(bound, 4 + 2 * (8 + 2));
        let mut headers = headers;
        assert!(serialize(&mut headers, SpdyVersion::Spdy3).len() < bound);
    }

    #[test]
    fn test_nul_joined_value_expands() {
        let block = b"\x00\x00\x00\x01\x00\x00\x00\x03via\x00\x00\x00\x05a\x00b\x00c";
        let (lines, expanded) = parse(block).unwrap();
        assert_eq!(
            lines,
            vec![
                ("via".to_string(), "a".to_string()),
                ("via".to_string(), "b".to_string()),
                ("via".to_string(), "c".to_string()),
            ]
        );
        assert_eq!(expanded, 2 * (3 + 1));
    }

    #[test]
    fn test_expanded_pieces_are_flagged() {
        let block = b"\x00\x00\x00\x01\x00\x00\x00\x03via\x00\x00\x00\x03a\x00b";
        let mut out = Vec::new();
        parse_name_values(block, SpdyVersion::Spdy3.settings(), &mut out).unwrap();
        assert!(!out[0].value.is_multi_valued());
        assert!(out[1].name.is_multi_valued());
        assert!(out[1].value.is_multi_valued());
    }

    #[test]
    fn test_empty_value_without_nul_is_allowed() {
        let block = b"\x00\x00\x00\x01\x00\x00\x00\x01a\x00\x00\x00\x00";
        assert_eq!(parse(block).unwrap().0, vec![("a".to_string(), String::new())]);
    }

    #[test]
    fn test_empty_segments_are_rejected() {
        let values: [&[u8]; 3] = [b"x\0\0y", b"\0x", b"x\0"];
        for value in values {
            let mut block = b"\x00\x00\x00\x01\x00\x00\x00\x01a".to_vec();
            block.extend_from_slice(&(value.len() as u32).to_be_bytes());
            block.extend_from_slice(value);
            assert_eq!(parse(&block), Err(DecodeError::EmptyHeaderValue));
        }
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let block = b"\x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\x00\x01v";
        assert_eq!(parse(block), Err(DecodeError::EmptyHeaderName));
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let names: [&[u8]; 4] = [b"A", b"x-Upper", b"tab\t", b"del\x7f"];
        for name in names {
            let mut block = vec![0, 0, 0, 1];
            block.extend_from_slice(&(name.len() as u32).to_be_bytes());
            block.extend_from_slice(name);
            block.extend_from_slice(b"\x00\x00\x00\x01v");
            assert_eq!(parse(&block), Err(DecodeError::InvalidHeaderValue));
        }
    }

    #[test]
    fn test_truncated_blocks_are_bad_encoding() {
        let cases: [&[u8]; 4] = [
            b"\x00\x00",
            b"\x00\x00\x00\x01",
            b"\x00\x00\x00\x01\x00\x00\x00\x09short",
            b"\x00\x00\x00\x02\x00\x00\x00\x01a\x00\x00\x00\x01b",
        ];
        for block in cases {
            assert_eq!(parse(block), Err(DecodeError::BadEncoding));
        }
    }
}
