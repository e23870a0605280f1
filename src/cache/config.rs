//! Construction-time cache configuration.

use std::time::Duration;

use serde::Deserialize;

/// Provenance tag written to `X-HTTPCache-Origin` on cache hits by default.
pub const DEFAULT_ORIGIN_TAG: &str = "CACHE";

/// Default backend-level expiry (one hour).
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Settings fixed when a [`CacheTransport`](super::CacheTransport) is built.
///
/// Configured through builder methods, or deserialized (any missing field
/// takes its default):
///
/// ```
/// use httpcache::cache::CacheConfig;
/// use std::time::Duration;
///
/// let config = CacheConfig::new().shared(false).ttl(Duration::from_secs(60));
/// assert!(!config.is_shared());
///
/// let loaded = CacheConfig::from_json(r#"{ "ttl_secs": 120 }"#).unwrap();
/// assert!(loaded.is_shared());
/// assert_eq!(loaded.backend_ttl(), Duration::from_secs(120));
/// assert_eq!(loaded.origin_tag(), "CACHE");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Shared-cache semantics: honor `s-maxage` and refuse `private` responses.
    shared: bool,
    /// Backend-level expiry in seconds. A coarse upper bound on how long an
    /// entry is kept; HTTP freshness is decided separately. `0` disables it.
    ttl_secs: u64,
    /// Value of `X-HTTPCache-Origin` on cache hits.
    origin_tag: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shared: true,
            ttl_secs: DEFAULT_TTL_SECS,
            origin_tag: DEFAULT_ORIGIN_TAG.to_owned(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from JSON.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Selects shared-cache (`true`, the default) or single-client semantics.
    #[must_use]
    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    /// Sets the backend-level expiry. Sub-second precision is dropped.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = ttl.as_secs();
        self
    }

    /// Sets the provenance tag written to `X-HTTPCache-Origin` on hits.
    #[must_use]
    pub fn with_origin_tag(mut self, tag: impl Into<String>) -> Self {
        self.origin_tag = tag.into();
        self
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn backend_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn origin_tag(&self) -> &str {
        &self.origin_tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CacheConfig::default();
        assert!(config.is_shared());
        assert_eq!(config.backend_ttl(), Duration::from_secs(3600));
        assert_eq!(config.origin_tag(), DEFAULT_ORIGIN_TAG);
    }

    #[test]
    fn json_overrides_every_field() {
        let config =
            CacheConfig::from_json(r#"{"shared": false, "ttl_secs": 0, "origin_tag": "EDGE"}"#)
                .unwrap();
        assert_eq!(
            config,
            CacheConfig::new()
                .shared(false)
                .ttl(Duration::ZERO)
                .with_origin_tag("EDGE")
        );
    }

    #[test]
    fn unknown_json_fields_are_ignored() {
        assert!(CacheConfig::from_json(r#"{"vary": true}"#).is_ok());
    }
}
