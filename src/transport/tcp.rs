//! Plain-TCP HTTP/1.1 origin transport.
//!
//! One connection per request: the request is written with
//! `Connection: close` and the response is read until the peer closes the
//! socket, then parsed by [`Response::parse`]. Only `http://` URLs are
//! supported.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

use super::{RoundTrip, Transport, TransportError};
use crate::http::{Method, Request, Response, header};

/// Maximum size of a complete HTTP response we will buffer (8 MiB).
const MAX_RESPONSE_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Request headers the transport writes itself.
const MANAGED_HEADERS: [&str; 3] = [header::HOST, header::CONNECTION, header::CONTENT_LENGTH];

/// Sends requests straight to the origin named in their absolute URL.
///
/// # Examples
///
/// ```rust,no_run
/// use httpcache::http::Request;
/// use httpcache::transport::{TcpTransport, Transport};
///
/// # async fn run() -> Result<(), httpcache::transport::TransportError> {
/// let transport = TcpTransport::new();
/// let response = transport.round_trip(Request::get("http://127.0.0.1:8080/")).await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    timeout: Option<Duration>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the whole exchange (connect, write, read) by `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange(request))
                .await
                .map_err(|_| {
                    TransportError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "origin did not answer in time",
                    ))
                })?,
            None => exchange(request).await,
        }
    }
}

impl Transport for TcpTransport {
    fn round_trip(&self, request: Request) -> RoundTrip<'_> {
        Box::pin(self.send(request))
    }
}

async fn exchange(request: Request) -> Result<Response, TransportError> {
    let url = Url::parse(request.target()).map_err(|source| TransportError::InvalidUrl {
        url: request.target().to_owned(),
        source,
    })?;
    if url.scheme() != "http" {
        return Err(TransportError::UnsupportedScheme(url.scheme().to_owned()));
    }
    let host = url
        .host_str()
        .ok_or_else(|| TransportError::UnsupportedScheme(url.scheme().to_owned()))?;
    let port = url.port_or_known_default().unwrap_or(80);

    let mut stream = TcpStream::connect((host, port)).await?;
    debug!(host, port, method = %request.method(), "connected to origin");

    stream.write_all(&encode_request(&request, &url)).await?;
    stream.flush().await?;

    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
    loop {
        let bytes_read = stream.read_buf(&mut buf).await?;
        if bytes_read == 0 {
            break;
        }
        if buf.len() > MAX_RESPONSE_SIZE {
            return Err(TransportError::ResponseTooLarge {
                max_bytes: MAX_RESPONSE_SIZE,
            });
        }
    }

    Ok(Response::parse(&buf, request.method())?)
}

/// Writes the request line in origin-form plus headers and body.
fn encode_request(request: &Request, url: &Url) -> BytesMut {
    let mut path = url.path().to_owned();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }
    let host = match (url.host_str(), url.port()) {
        (Some(h), Some(p)) => format!("{h}:{p}"),
        (Some(h), None) => h.to_owned(),
        _ => String::new(),
    };

    let body = request.body_bytes();
    let mut buf = BytesMut::with_capacity(128 + request.headers().len() * 48 + body.len());
    buf.put(format!("{} {} HTTP/1.1\r\n", request.method(), path).as_bytes());
    buf.put(format!("Host: {host}\r\n").as_bytes());
    for (name, value) in request.headers().iter() {
        if MANAGED_HEADERS.iter().any(|m| m.eq_ignore_ascii_case(name)) {
            continue;
        }
        buf.put(format!("{name}: {value}\r\n").as_bytes());
    }
    if !body.is_empty() || matches!(request.method(), Method::Post | Method::Put | Method::Patch) {
        buf.put(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }
    buf.put(&b"Connection: close\r\n\r\n"[..]);
    buf.put(body.as_ref());
    buf
}
