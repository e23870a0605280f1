//! Stored HTTP exchanges.

use std::time::SystemTime;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::codec::{self, CorruptEntry};
use super::key::normalize_target;
use crate::http::{Request, Response};

/// One stored response plus the request facts it was captured under.
///
/// Entries are created once, right after a successful origin fetch, and are
/// never mutated; a backend overwrites or deletes them whole.
///
/// The serde form is JSON-friendly for remote backends:
///
/// ```json
/// {
///   "response": "SFRUUC8xLjEgMjAwIE9LDQoNCg==",
///   "requestUri": "http://example.com/x",
///   "requestMethod": "GET",
///   "cachedTime": "Mon, 01 Jan 2024 00:00:00 GMT"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// The encoded response, body included.
    #[serde(with = "base64_bytes")]
    pub response: Bytes,
    /// Normalized target of the request that produced the response.
    pub request_uri: String,
    pub request_method: String,
    #[serde(rename = "cachedTime", with = "http_date")]
    pub cached_at: SystemTime,
}

impl CacheEntry {
    /// Captures `response` as the answer to `request`, stored at `cached_at`.
    pub fn capture(request: &Request, response: &Response, cached_at: SystemTime) -> Self {
        Self {
            response: codec::encode(response),
            request_uri: normalize_target(request.target()).into_owned(),
            request_method: request.method().to_string(),
            cached_at,
        }
    }

    /// Rebuilds the stored response for `request`.
    ///
    /// # Errors
    ///
    /// [`CorruptEntry`] if the stored bytes no longer parse.
    pub fn restore(&self, request: &Request) -> Result<Response, CorruptEntry> {
        codec::decode(&self.response, request)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map(Bytes::from).map_err(D::Error::custom)
    }
}

mod http_date {
    use std::time::SystemTime;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&httpdate::fmt_http_date(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        httpdate::parse_http_date(&raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;
    use crate::http::StatusCode;

    fn noon() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_704_110_400)
    }

    #[test]
    fn capture_records_request_facts() {
        let request = Request::get("http://example.com/a%20b");
        let response = Response::new(StatusCode::OK).body("hi");
        let entry = CacheEntry::capture(&request, &response, noon());
        assert_eq!(entry.request_uri, "http://example.com/a b");
        assert_eq!(entry.request_method, "GET");
        assert_eq!(entry.restore(&request).unwrap(), response);
    }

    #[test]
    fn json_field_names() {
        let request = Request::get("/x");
        let entry = CacheEntry::capture(&request, &Response::new(StatusCode::OK), noon());
        let json: serde_json::Value = serde_json::from_str(&entry.to_json().unwrap()).unwrap();
        assert_eq!(json["requestUri"], "/x");
        assert_eq!(json["requestMethod"], "GET");
        assert_eq!(json["cachedTime"], "Mon, 01 Jan 2024 12:00:00 GMT");
        assert!(json["response"].as_str().unwrap().starts_with("SFRUUC8xLjEg"));
    }

    #[test]
    fn json_restores_the_same_entry() {
        let request = Request::get("/x");
        let response = Response::new(StatusCode::OK)
            .header("Content-Length", "4")
            .body(vec![0u8, 159, 146, 150]);
        let entry = CacheEntry::capture(&request, &response, noon());
        let back = CacheEntry::from_json(&entry.to_json().unwrap()).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn corrupt_payload_is_reported() {
        let entry = CacheEntry {
            response: Bytes::from_static(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort"),
            request_uri: "/x".into(),
            request_method: "GET".into(),
            cached_at: noon(),
        };
        assert!(entry.restore(&Request::get("/x")).is_err());
    }
}
