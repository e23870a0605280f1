//! Cache key derivation.
//!
//! Keys have the form `"{METHOD} {target}"`, followed by `" {authorization}"`
//! when the request carries credentials, so responses fetched under different
//! credentials never share a slot. The target is the request target exactly as
//! the caller supplied it, query-unescaped; see [`normalize_target`].
//!
//! Keys are persisted by remote backends, so this format is stable across
//! releases.

use std::borrow::Cow;
use std::fmt;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

use crate::http::{Method, Request, header};

/// Opaque identifier of a cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for `request`.
    ///
    /// # Examples
    ///
    /// ```
    /// use httpcache::cache::CacheKey;
    /// use httpcache::http::Request;
    ///
    /// let key = CacheKey::for_request(
    ///     &Request::get("http://example.com/search?q=caf%C3%A9+au+lait")
    ///         .header("Authorization", "  Bearer abc  "),
    /// );
    /// assert_eq!(
    ///     key.as_str(),
    ///     "GET http://example.com/search?q=café au lait Bearer abc"
    /// );
    /// ```
    pub fn for_request(request: &Request) -> Self {
        derive_key(
            request.method(),
            request.target(),
            request.headers().get(header::AUTHORIZATION),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Builds a key from its parts. Deterministic and free of I/O.
///
/// A blank `authorization` value is treated as absent.
pub fn derive_key(method: &Method, target: &str, authorization: Option<&str>) -> CacheKey {
    let mut key = format!("{} {}", method, normalize_target(target));
    if let Some(credential) = authorization.map(str::trim).filter(|c| !c.is_empty()) {
        key.push(' ');
        key.push_str(credential);
    }
    CacheKey(key)
}

/// Query-unescapes a request target: `+` becomes a space and `%XX` escapes
/// are decoded.
///
/// If the target cannot be decoded (a `%` not followed by two hex digits, or
/// escapes that do not form UTF-8) it is returned unchanged.
pub fn normalize_target(raw: &str) -> Cow<'_, str> {
    if !has_valid_escapes(raw) {
        return Cow::Borrowed(raw);
    }
    let spaced = raw.replace('+', " ");
    match percent_decode_str(&spaced).decode_utf8() {
        Ok(decoded) => Cow::Owned(decoded.into_owned()),
        Err(_) => Cow::Borrowed(raw),
    }
}

fn has_valid_escapes(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = |j: usize| bytes.get(j).is_some_and(u8::is_ascii_hexdigit);
            if !(hex(i + 1) && hex(i + 2)) {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}
