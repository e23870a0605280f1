//! HTTP/1.1 responses: construction, wire serialization and parsing.
//!
//! [`Response::to_bytes`] and [`Response::parse`] are inverses of each other
//! for every response this crate produces: status, reason phrase, the exact
//! header list, and the body bytes all survive the trip. That property is
//! what lets a stored response be served any number of times later.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{Headers, Method, StatusCode, header};

/// Errors produced while reading an HTTP/1.1 response from raw bytes.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response head is incomplete")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    #[error("invalid Content-Length value {0:?}")]
    InvalidContentLength(String),

    #[error("body truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("malformed chunked body")]
    InvalidChunk,
}

/// An HTTP/1.1 response.
///
/// The body is always fully buffered. Cloning is cheap.
///
/// # Examples
///
/// ```
/// use httpcache::http::{Method, Response, StatusCode};
///
/// let response = Response::new(StatusCode::OK)
///     .header("Cache-Control", "max-age=60")
///     .header("Content-Length", "2")
///     .body("ok");
///
/// let wire = response.to_bytes();
/// let text = std::str::from_utf8(&wire).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
///
/// let parsed = Response::parse(&wire, &Method::Get).unwrap();
/// assert_eq!(parsed.status(), StatusCode::OK);
/// assert_eq!(parsed.body_bytes().as_ref(), b"ok");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    reason: Option<String>,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Bytes,
}

impl Response {
    /// Maximum number of header fields accepted by [`Response::parse`].
    const MAX_HEADERS: usize = 128;

    /// Creates a new HTTP/1.1 response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
            version: 1,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response body.
    ///
    /// No framing header is added; callers that want `Content-Length` on the
    /// wire set it themselves.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Overrides the reason phrase written on the status line.
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the reason phrase: the one received on the wire, or the
    /// canonical phrase for the status code.
    pub fn reason_phrase(&self) -> &str {
        match &self.reason {
            Some(reason) => reason,
            None => self.status.canonical_reason().unwrap_or(""),
        }
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable access to the header map, for layers that decorate a response
    /// they did not build.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the header list declares a chunked transfer coding.
    pub fn is_chunked(&self) -> bool {
        self.headers.has_token(header::TRANSFER_ENCODING, "chunked")
    }

    /// Serializes the response using HTTP/1.1 wire format.
    ///
    /// Headers are written exactly as held, in order. When the headers declare
    /// `Transfer-Encoding: chunked` the body is written as a single chunk
    /// followed by the terminating zero-length chunk; otherwise it is written
    /// as-is.
    pub fn to_bytes(&self) -> Bytes {
        let estimated_size = 64 + self.headers.len() * 48 + self.body.len();
        let mut buf = BytesMut::with_capacity(estimated_size);

        // Status line
        buf.put(
            format!(
                "HTTP/1.{} {} {}\r\n",
                self.version,
                self.status.as_u16(),
                self.reason_phrase()
            )
            .as_bytes(),
        );

        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        // Header/body separator
        buf.put(&b"\r\n"[..]);

        if self.is_chunked() {
            if !self.body.is_empty() {
                buf.put(format!("{:x}\r\n", self.body.len()).as_bytes());
                buf.put(self.body.as_ref());
                buf.put(&b"\r\n"[..]);
            }
            buf.put(&b"0\r\n\r\n"[..]);
        } else {
            buf.put(self.body.as_ref());
        }

        buf.freeze()
    }

    /// Parses a complete HTTP/1.1 response.
    ///
    /// `method` is the method of the request that produced the response; a
    /// `HEAD` response never has a body, regardless of its framing headers.
    ///
    /// Body framing, in order:
    ///
    /// 1. 1xx, 204 and 304 responses (and any `HEAD` response) have no body.
    /// 2. `Transfer-Encoding: chunked` bodies are de-chunked; trailers are dropped.
    /// 3. `Content-Length` selects exactly that many bytes.
    /// 4. Otherwise the body is everything after the header block.
    ///
    /// # Errors
    ///
    /// Any [`ResponseError`]; a stored entry that fails here is corrupt.
    pub fn parse(buf: &[u8], method: &Method) -> Result<Self, ResponseError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Response::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(ResponseError::Incomplete),
        };

        let code = raw.code.ok_or(ResponseError::Incomplete)?;
        let status = StatusCode::from_u16(code).ok_or(ResponseError::InvalidStatus(code))?;

        let mut header_map = Headers::with_capacity(raw.headers.len());
        for h in raw.headers.iter() {
            header_map.insert(h.name, String::from_utf8_lossy(h.value));
        }

        let mut response = Self {
            status,
            reason: raw
                .reason
                .filter(|r| Some(*r) != status.canonical_reason())
                .map(str::to_owned),
            version: raw.version.unwrap_or(1),
            headers: header_map,
            body: Bytes::new(),
        };

        let rest = &buf[body_offset..];
        let bodiless = *method == Method::Head
            || status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED;

        response.body = if bodiless {
            Bytes::new()
        } else if response.is_chunked() {
            decode_chunked(rest)?
        } else if let Some(raw_len) = response.headers.get(header::CONTENT_LENGTH) {
            let expected: usize = raw_len
                .trim()
                .parse()
                .map_err(|_| ResponseError::InvalidContentLength(raw_len.to_owned()))?;
            if rest.len() < expected {
                return Err(ResponseError::Truncated {
                    expected,
                    found: rest.len(),
                });
            }
            Bytes::copy_from_slice(&rest[..expected])
        } else {
            Bytes::copy_from_slice(rest)
        };

        Ok(response)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

/// Concatenates the data of a chunked body up to the zero-length chunk.
fn decode_chunked(mut buf: &[u8]) -> Result<Bytes, ResponseError> {
    let mut body = BytesMut::new();
    loop {
        let (offset, size) = match httparse::parse_chunk_size(buf) {
            Ok(httparse::Status::Complete(pair)) => pair,
            Ok(httparse::Status::Partial) => return Err(ResponseError::Incomplete),
            Err(_) => return Err(ResponseError::InvalidChunk),
        };
        if size == 0 {
            return Ok(body.freeze());
        }
        let size = usize::try_from(size).map_err(|_| ResponseError::InvalidChunk)?;
        // chunk data plus its CRLF
        let framed = size.checked_add(2).ok_or(ResponseError::InvalidChunk)?;
        buf = &buf[offset..];
        if buf.len() < framed {
            return Err(ResponseError::Truncated {
                expected: framed,
                found: buf.len(),
            });
        }
        if &buf[size..framed] != b"\r\n" {
            return Err(ResponseError::InvalidChunk);
        }
        body.put(&buf[..size]);
        buf = &buf[framed..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(bytes: &Bytes) -> &str {
        std::str::from_utf8(bytes).unwrap()
    }

    #[test]
    fn serializes_headers_verbatim() {
        let r = Response::new(StatusCode::OK)
            .header("X-Request-Id", "abc-123")
            .header("content-length", "2")
            .body("ok");
        let wire = r.to_bytes();
        assert_eq!(
            text(&wire),
            "HTTP/1.1 200 OK\r\nX-Request-Id: abc-123\r\ncontent-length: 2\r\n\r\nok"
        );
    }

    #[test]
    fn unknown_status_keeps_wire_reason() {
        let raw = b"HTTP/1.1 418 I'm a teapot\r\nContent-Length: 0\r\n\r\n";
        let r = Response::parse(raw, &Method::Get).unwrap();
        assert_eq!(r.status().as_u16(), 418);
        assert_eq!(r.reason_phrase(), "I'm a teapot");
        assert_eq!(r.to_bytes().as_ref(), raw);
    }

    #[test]
    fn round_trip_preserves_everything() {
        let original = Response::new(StatusCode::NOT_FOUND)
            .header("Date", "Tue, 15 Nov 1994 08:12:31 GMT")
            .header("Set-Cookie", "a=1")
            .header("Set-Cookie", "b=2")
            .header("Content-Length", "9")
            .body("not here!");
        let parsed = Response::parse(&original.to_bytes(), &Method::Get).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn chunked_body_is_rechunked_and_decoded() {
        let original = Response::new(StatusCode::OK)
            .header("Transfer-Encoding", "chunked")
            .body("hello world");
        let wire = original.to_bytes();
        assert!(text(&wire).ends_with("\r\n\r\nb\r\nhello world\r\n0\r\n\r\n"));
        let parsed = Response::parse(&wire, &Method::Get).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn multi_chunk_body() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\nX-Trailer: 1\r\n\r\n";
        let r = Response::parse(raw, &Method::Get).unwrap();
        assert_eq!(r.body_bytes().as_ref(), b"Wikipedia");
    }

    #[test]
    fn oversized_chunk_is_an_error() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\nab";
        assert!(matches!(
            Response::parse(raw, &Method::Get),
            Err(ResponseError::InvalidChunk | ResponseError::Truncated { .. })
        ));
    }

    #[test]
    fn short_chunk_is_truncated() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n10\r\nabc";
        assert!(matches!(
            Response::parse(raw, &Method::Get),
            Err(ResponseError::Truncated { expected: 18, found: 3 })
        ));
    }

    #[test]
    fn head_response_has_no_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 1234\r\n\r\n";
        let r = Response::parse(raw, &Method::Head).unwrap();
        assert!(r.body_bytes().is_empty());
        assert_eq!(r.headers().get("content-length"), Some("1234"));
    }

    #[test]
    fn no_content_ignores_trailing_bytes() {
        let raw = b"HTTP/1.1 204 No Content\r\n\r\ngarbage";
        let r = Response::parse(raw, &Method::Get).unwrap();
        assert!(r.body_bytes().is_empty());
    }

    #[test]
    fn unframed_body_reads_to_end() {
        let raw = b"HTTP/1.0 200 OK\r\nServer: old\r\n\r\nall of it";
        let r = Response::parse(raw, &Method::Get).unwrap();
        assert_eq!(r.version(), 0);
        assert_eq!(r.body_bytes().as_ref(), b"all of it");
        assert_eq!(r.to_bytes().as_ref(), raw);
    }

    #[test]
    fn truncated_body_is_an_error() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort";
        assert!(matches!(
            Response::parse(raw, &Method::Get),
            Err(ResponseError::Truncated { expected: 10, found: 5 })
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Response::parse(b"not http at all\r\n\r\n", &Method::Get).is_err());
        assert!(matches!(
            Response::parse(b"HTTP/1.1 200 OK\r\nDate:", &Method::Get),
            Err(ResponseError::Incomplete)
        ));
        assert!(matches!(
            Response::parse(b"HTTP/1.1 200 OK\r\nContent-Length: ten\r\n\r\n", &Method::Get),
            Err(ResponseError::InvalidContentLength(_))
        ));
    }
}
