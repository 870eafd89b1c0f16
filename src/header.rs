//! Header representations used by the codec

use std::borrow::Cow;
use std::fmt;

macro_rules! header_codes {
    ($($variant:ident => $name:expr,)*) => {
        /// Identifier of a well-known HTTP header.
        ///
        /// The declaration order is the primary sort order used when a header
        /// list is serialized; `Other` sorts first and falls back to the name.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum HeaderCode {
            Other,
            $($variant,)*
        }

        const KNOWN_HEADERS: &[(HeaderCode, &str)] = &[
            $((HeaderCode::$variant, $name),)*
        ];
    };
}

header_codes! {
    Accept => "accept",
    AcceptCharset => "accept-charset",
    AcceptEncoding => "accept-encoding",
    AcceptLanguage => "accept-language",
    AcceptRanges => "accept-ranges",
    Age => "age",
    Allow => "allow",
    Authorization => "authorization",
    CacheControl => "cache-control",
    Connection => "connection",
    ContentEncoding => "content-encoding",
    ContentLanguage => "content-language",
    ContentLength => "content-length",
    ContentLocation => "content-location",
    ContentMd5 => "content-md5",
    ContentRange => "content-range",
    ContentType => "content-type",
    Cookie => "cookie",
    Date => "date",
    Etag => "etag",
    Expect => "expect",
    Expires => "expires",
    From => "from",
    Host => "host",
    IfMatch => "if-match",
    IfModifiedSince => "if-modified-since",
    IfNoneMatch => "if-none-match",
    IfRange => "if-range",
    IfUnmodifiedSince => "if-unmodified-since",
    KeepAlive => "keep-alive",
    LastModified => "last-modified",
    Location => "location",
    MaxForwards => "max-forwards",
    Origin => "origin",
    Pragma => "pragma",
    ProxyAuthenticate => "proxy-authenticate",
    ProxyAuthorization => "proxy-authorization",
    Range => "range",
    Referer => "referer",
    RetryAfter => "retry-after",
    Server => "server",
    SetCookie => "set-cookie",
    Te => "te",
    Trailer => "trailer",
    TransferEncoding => "transfer-encoding",
    Upgrade => "upgrade",
    UserAgent => "user-agent",
    Vary => "vary",
    Via => "via",
    Warning => "warning",
    WwwAuthenticate => "www-authenticate",
}

impl HeaderCode {
    /// Case-insensitive lookup of a header name.
    pub fn from_name(name: &[u8]) -> Self {
        KNOWN_HEADERS
            .iter()
            .find(|(_, known)| known.as_bytes().eq_ignore_ascii_case(name))
            .map(|(code, _)| *code)
            .unwrap_or(HeaderCode::Other)
    }

    /// Canonical lowercase name, `None` for `Other`.
    pub fn name(&self) -> Option<&'static str> {
        KNOWN_HEADERS
            .iter()
            .find(|(code, _)| code == self)
            .map(|(_, name)| *name)
    }
}

/// A header to be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header<'a> {
    pub code: HeaderCode,
    pub name: Cow<'a, str>,
    pub value: Cow<'a, str>,
}

impl<'a> Header<'a> {
    /// Create a header, deriving its code from the name.
    pub fn new(name: impl Into<Cow<'a, str>>, value: impl Into<Cow<'a, str>>) -> Self {
        let name = name.into();
        Self {
            code: HeaderCode::from_name(name.as_bytes()),
            name,
            value: value.into(),
        }
    }

    pub fn with_code(
        code: HeaderCode,
        name: impl Into<Cow<'a, str>>,
        value: impl Into<Cow<'a, str>>,
    ) -> Self {
        Self { code, name: name.into(), value: value.into() }
    }

    /// Serialization order and same-name grouping key. Names compare
    /// byte-for-byte.
    pub fn sort_key(&self) -> (HeaderCode, &[u8]) {
        (self.code, self.name.as_bytes())
    }
}

/// A decoded header name or value.
///
/// Pieces borrow from the thread's scratch buffer and therefore cannot
/// outlive the next decode on that thread; `into_owned` detaches them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPiece<'a> {
    bytes: Cow<'a, [u8]>,
    multi_valued: bool,
}

impl<'a> HeaderPiece<'a> {
    pub(crate) fn borrowed(bytes: &'a [u8], multi_valued: bool) -> Self {
        Self { bytes: Cow::Borrowed(bytes), multi_valued }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.bytes, Cow::Owned(_))
    }

    /// Whether this piece was produced by splitting a NUL-joined value.
    pub fn is_multi_valued(&self) -> bool {
        self.multi_valued
    }

    pub fn into_owned(self) -> HeaderPiece<'static> {
        HeaderPiece {
            bytes: Cow::Owned(self.bytes.into_owned()),
            multi_valued: self.multi_valued,
        }
    }
}

impl fmt::Display for HeaderPiece<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.bytes))
    }
}

/// One decoded (name, value) line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHeader<'a> {
    pub name: HeaderPiece<'a>,
    pub value: HeaderPiece<'a>,
}

impl DecodedHeader<'_> {
    pub fn code(&self) -> HeaderCode {
        HeaderCode::from_name(self.name.as_bytes())
    }

    pub fn into_owned(self) -> DecodedHeader<'static> {
        DecodedHeader {
            name: self.name.into_owned(),
            value: self.value.into_owned(),
        }
    }
}

/// Result of decoding one header block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedHeaders<'a> {
    pub headers: Vec<DecodedHeader<'a>>,
    /// Compressed bytes consumed from the cursor
    pub consumed: u32,
}

impl<'a> DecodedHeaders<'a> {
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DecodedHeader<'a>> {
        self.headers.iter()
    }

    /// Values of every line named `name`, in wire order.
    pub fn get_all<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s HeaderPiece<'a>> + 's {
        self.headers
            .iter()
            .filter(move |h| h.name.as_bytes() == name.as_bytes())
            .map(|h| &h.value)
    }

    pub fn into_owned(self) -> DecodedHeaders<'static> {
        DecodedHeaders {
            headers: self.headers.into_iter().map(DecodedHeader::into_owned).collect(),
            consumed: self.consumed,
        }
    }
}
