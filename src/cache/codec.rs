//! Cache entry codec: whole responses to bytes and back.
//!
//! The stored form is the HTTP/1.1 wire form produced by
//! [`Response::to_bytes`], body included, so an entry can be decoded any
//! number of times. Decoding needs the request being answered because a
//! `HEAD` response carries no body whatever its headers say.

use bytes::Bytes;
use thiserror::Error;

use crate::http::{Request, Response, response::ResponseError};

/// A stored response that no longer parses. Treated exactly like a miss.
#[derive(Debug, Error)]
#[error("corrupt cache entry: {0}")]
pub struct CorruptEntry(#[from] pub ResponseError);

/// Serializes `response` (status line, headers, buffered body).
pub fn encode(response: &Response) -> Bytes {
    response.to_bytes()
}

/// Rebuilds a response from bytes written by [`encode`].
///
/// # Errors
///
/// [`CorruptEntry`] if the bytes are not a complete HTTP/1.1 response.
pub fn decode(bytes: &[u8], request: &Request) -> Result<Response, CorruptEntry> {
    Ok(Response::parse(bytes, request.method())?)
}
