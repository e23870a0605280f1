//! Request dispatch: the "round tripper" seam every layer plugs into.
//!
//! A [`Transport`] turns a [`Request`] into a [`Response`]. Layers compose by
//! holding the next hop as an `Arc<dyn Transport>` and delegating to it, so a
//! cache sits in front of an origin transport without either knowing about the
//! other:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use httpcache::cache::{CacheTransport, MemoryStorage};
//! use httpcache::transport::{TcpTransport, Transport};
//!
//! let origin: Arc<dyn Transport> = Arc::new(TcpTransport::new());
//! let cached = CacheTransport::new(origin, Arc::new(MemoryStorage::default()));
//! ```
//!
//! Any `Fn(Request) -> impl Future<Output = Result<Response, TransportError>>`
//! closure is a transport too, which is how tests script an origin.

use std::{future::Future, pin::Pin};

use thiserror::Error;

use crate::http::{Request, Response, response::ResponseError};

mod tcp;

pub use tcp::TcpTransport;

/// Boxed future returned by [`Transport::round_trip`].
pub type RoundTrip<'a> = Pin<Box<dyn Future<Output = Result<Response, TransportError>> + Send + 'a>>;

/// Errors produced while exchanging a request with the next hop.
///
/// The cache layer passes these through untouched: a failing origin is the
/// only way a cached client request fails.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid request URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported URL scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("malformed response: {0}")]
    Malformed(#[from] ResponseError),

    #[error("response exceeds maximum allowed size of {max_bytes} bytes")]
    ResponseTooLarge { max_bytes: usize },

    #[error("{0}")]
    Other(String),
}

/// Sends a request to the next hop and yields its response.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync`; one transport is shared by
///   every request a client issues.
/// - The returned future **must** be `Send` so it can be awaited across
///   `.await` points in multi-threaded runtimes.
/// - Dropping the future cancels the exchange.
pub trait Transport: Send + Sync {
    fn round_trip(&self, request: Request) -> RoundTrip<'_>;
}

impl<T, F> Transport for T
where
    T: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Result<Response, TransportError>> + Send + 'static,
{
    fn round_trip(&self, request: Request) -> RoundTrip<'_> {
        Box::pin((self)(request))
    }
}
