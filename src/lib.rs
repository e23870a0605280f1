//! # httpcache
//!
//! A transparent HTTP response cache for async HTTP clients.
//!
//! [`CacheTransport`] sits in front of any [`Transport`] and answers repeated
//! requests from storage while `Cache-Control`, `Expires` and `Last-Modified`
//! say the stored copy is still fresh. Callers see the same request/response
//! shape whether the answer came from the origin or from storage; cached
//! answers carry `X-HTTPCache: true`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use httpcache::{CacheTransport, Request, TcpTransport, Transport};
//! use httpcache::cache::CacheConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CacheTransport::in_memory(Arc::new(TcpTransport::new()), CacheConfig::default());
//!
//!     let response = client.round_trip(Request::get("http://127.0.0.1:8080/")).await?;
//!     println!("{} ({:?})", response.status(), response.headers().get("X-HTTPCache"));
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod http;
pub mod transport;

pub use cache::{CacheTransport, MemoryStorage};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use transport::{TcpTransport, Transport, TransportError};
