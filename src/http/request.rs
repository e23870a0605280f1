//! Outgoing HTTP requests.
//!
//! A [`Request`] is what callers hand to a [`Transport`](crate::transport::Transport).
//! Its target is kept exactly as supplied (usually an absolute `http://` URL);
//! normalization for cache keys happens in [`crate::cache::key`].
//!
//! [`Request::parse`] reads a request back off the wire with [`httparse`],
//! which is how loopback origins in tests and demos inspect what the
//! TCP transport sent.

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// An HTTP request on its way to an origin.
///
/// Cloning is cheap: the body is a reference-counted [`Bytes`] buffer.
///
/// # Examples
///
/// ```
/// use httpcache::http::{Method, Request};
///
/// let request = Request::get("http://example.com/items?page=2")
///     .header("Authorization", "Bearer abc")
///     .header("Cache-Control", "max-stale=30");
///
/// assert_eq!(request.method(), &Method::Get);
/// assert_eq!(request.target(), "http://example.com/items?page=2");
/// assert_eq!(request.headers().get("authorization"), Some("Bearer abc"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    target: String,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers accepted by [`Request::parse`].
    const MAX_HEADERS: usize = 64;

    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Shorthand for `Request::new(Method::Get, target)`.
    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::Get, target)
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request target exactly as it was supplied.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// The request target is kept in whatever form the peer sent it
    /// (origin-form for requests written by
    /// [`TcpTransport`](crate::transport::TcpTransport)). Bytes after the
    /// header block up to `Content-Length` become the body.
    ///
    /// Returns the parsed `Request` and the byte offset just past the body.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`]: the header block or the body is not complete yet.
    /// - [`RequestError::Parse`]: the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`]: the method or target is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = match raw_req.method {
            Some(m) => match m.parse() {
                Ok(method) => method,
                Err(never) => match never {},
            },
            None => return Err(RequestError::MissingField { field: "method" }),
        };

        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?
            .to_owned();

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            header_map.insert(header.name, String::from_utf8_lossy(header.value));
        }

        let content_length: usize = header_map
            .get("content-length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        let end = body_offset
            .checked_add(content_length)
            .ok_or(RequestError::Incomplete)?;
        if buf.len() < end {
            return Err(RequestError::Incomplete);
        }

        Ok((
            Self {
                method,
                target,
                headers: header_map,
                body: Bytes::copy_from_slice(&buf[body_offset..end]),
            },
            end,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_target_verbatim() {
        let req = Request::get("http://example.com/a%20b?q=1+2");
        assert_eq!(req.target(), "http://example.com/a%20b?q=1+2");
        assert!(req.body_bytes().is_empty());
    }

    #[test]
    fn builder_appends_headers() {
        let req = Request::new(Method::Post, "http://example.com/")
            .header("Content-Type", "application/json")
            .header("Accept", "text/html")
            .body(r#"{"a":1}"#);
        assert_eq!(req.headers().len(), 2);
        assert_eq!(req.body_bytes().as_ref(), br#"{"a":1}"#);
    }

    #[test]
    fn parse_simple_get() {
        let raw = b"GET /items?page=2 HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.target(), "/items?page=2");
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert_eq!(offset, raw.len());
    }

    #[test]
    fn parse_waits_for_body() {
        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhel";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));

        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.body_bytes().as_ref(), b"hello");
        assert_eq!(offset, raw.len());
    }

    #[test]
    fn huge_content_length_does_not_overflow() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\nhi";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }
}
