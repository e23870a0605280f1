//! Transparent HTTP response caching.
//!
//! [`CacheTransport`] wraps any [`Transport`] and answers repeated requests
//! from a [`Storage`] backend while the stored response is still fresh
//! under RFC 7234 `Cache-Control` rules. Each request moves through:
//!
//! ```text
//! LOOKUP -> VALIDATE -> SERVE_CACHED
//!                    \-> FETCH_ORIGIN -> STORE -> RETURN
//! ```
//!
//! Storage failures never fail a request: a broken read is a miss and a
//! broken write is logged and counted. Only errors from the wrapped
//! transport reach the caller.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use httpcache::cache::{CacheConfig, CacheTransport};
//! use httpcache::http::Request;
//! use httpcache::transport::{TcpTransport, Transport};
//!
//! # async fn run() -> Result<(), httpcache::transport::TransportError> {
//! let cache = CacheTransport::in_memory(Arc::new(TcpTransport::new()), CacheConfig::default());
//!
//! let first = cache.round_trip(Request::get("http://127.0.0.1:8080/doc")).await?;
//! let second = cache.round_trip(Request::get("http://127.0.0.1:8080/doc")).await?;
//! assert_eq!(second.headers().get("X-HTTPCache"), Some("true"));
//! # let _ = first;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod directive;
pub mod entry;
pub mod freshness;
pub mod key;
#[cfg(feature = "redis")]
pub mod redis;
mod stats;
pub mod storage;


use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, warn};

pub use clock::{Clock, SystemClock};
pub use config::CacheConfig;
pub use entry::CacheEntry;
pub use freshness::{Evaluator, Validation};
pub use key::CacheKey;
#[cfg(feature = "redis")]
pub use self::redis::RedisStorage;
pub use stats::CacheStats;
pub use storage::{MemoryStorage, NullStorage, Storage, StorageError};

use crate::http::{Request, Response, StatusCode, header};
use crate::transport::{RoundTrip, Transport, TransportError};
use directive::Directives;
use stats::AtomicStats;

/// Header set to `true` on responses served from storage.
pub const X_HTTPCACHE: &str = "X-HTTPCache";

/// Header carrying the provenance tag on responses served from storage.
pub const X_HTTPCACHE_ORIGIN: &str = "X-HTTPCache-Origin";

/// A [`Transport`] that serves fresh stored responses and stores cacheable
/// origin responses.
///
/// Cloning is cheap; clones share the storage, the wrapped transport and the
/// counters.
pub struct CacheTransport<S: Storage + ?Sized = dyn Storage> {
    next: Arc<dyn Transport>,
    storage: Arc<S>,
    config: CacheConfig,
    evaluator: Evaluator,
    clock: Arc<dyn Clock>,
    stats: Arc<AtomicStats>,
}

impl<S: Storage + ?Sized> Clone for CacheTransport<S> {
    fn clone(&self) -> Self {
        Self {
            next: Arc::clone(&self.next),
            storage: Arc::clone(&self.storage),
            config: self.config.clone(),
            evaluator: self.evaluator,
            clock: Arc::clone(&self.clock),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl CacheTransport<MemoryStorage> {
    /// Builds a cache over an in-process [`MemoryStorage`] whose TTL is
    /// `config.backend_ttl()`.
    pub fn in_memory(next: Arc<dyn Transport>, config: CacheConfig) -> Self {
        let storage = Arc::new(MemoryStorage::new(config.backend_ttl()));
        Self::new(next, storage).with_config(config)
    }
}

impl<S: Storage + ?Sized> CacheTransport<S> {
    /// Wraps `next`, storing responses in `storage` with the default
    /// configuration.
    pub fn new(next: Arc<dyn Transport>, storage: Arc<S>) -> Self {
        let config = CacheConfig::default();
        Self {
            next,
            storage,
            evaluator: Evaluator::new(config.is_shared()),
            config,
            clock: Arc::new(SystemClock),
            stats: Arc::new(AtomicStats::default()),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.evaluator = Evaluator::new(config.is_shared());
        self.config = config;
        self
    }

    /// Replaces the wall clock used for freshness decisions.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Snapshot of the hit, miss and store counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Answers `request` from storage if possible, otherwise from the wrapped
    /// transport.
    ///
    /// # Errors
    ///
    /// Only errors from the wrapped transport. Storage and validation
    /// failures are absorbed.
    pub async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        let key = CacheKey::for_request(&request);

        if let Some(response) = self.lookup(&key, &request).await {
            AtomicStats::bump(&self.stats.hits);
            debug!(key = %key, "serving from cache");
            return Ok(response);
        }

        if only_if_cached(&request) {
            debug!(key = %key, "only-if-cached with nothing servable");
            return Ok(Response::new(StatusCode::GATEWAY_TIMEOUT));
        }

        AtomicStats::bump(&self.stats.misses);
        debug!(key = %key, "fetching from origin");
        let response = self.next.round_trip(request.clone()).await?;

        self.store(&key, &request, &response).await;
        Ok(response)
    }

    /// Removes the stored response for `request`, if any.
    pub async fn invalidate(&self, request: &Request) -> Result<(), StorageError> {
        let key = CacheKey::for_request(request);
        debug!(key = %key, "invalidating");
        self.storage.delete(&key).await
    }

    /// Removes every stored response.
    pub async fn flush(&self) -> Result<(), StorageError> {
        debug!(backend = self.storage.name(), "flushing cache");
        self.storage.flush().await
    }

    async fn lookup(&self, key: &CacheKey, request: &Request) -> Option<Response> {
        let entry = match self.storage.get(key).await {
            Ok(entry) => entry,
            Err(StorageError::NotFound) => return None,
            Err(e) => {
                AtomicStats::bump(&self.stats.lookup_errors);
                warn!(key = %key, backend = self.storage.name(), error = %e, "cache read failed");
                return None;
            }
        };

        let response = match entry.restore(request) {
            Ok(response) => response,
            Err(e) => {
                AtomicStats::bump(&self.stats.corrupt);
                warn!(key = %key, error = %e, "discarding unreadable cache entry");
                return None;
            }
        };

        let now = self.clock.now();
        match self.evaluator.assess(request, &response, entry.cached_at, now) {
            Ok(assessment) if assessment.is_servable(now) => {
                Some(self.annotate(response, entry.cached_at))
            }
            Ok(_) => {
                AtomicStats::bump(&self.stats.stale);
                debug!(key = %key, "stored response is not servable");
                None
            }
            Err(e) => {
                AtomicStats::bump(&self.stats.lookup_errors);
                warn!(key = %key, error = %e, "cannot validate stored response");
                None
            }
        }
    }

    async fn store(&self, key: &CacheKey, request: &Request, response: &Response) {
        let now = self.clock.now();
        let validation = match self.evaluator.assess(request, response, now, now) {
            Ok(assessment) => assessment.validation,
            Err(e) => {
                AtomicStats::bump(&self.stats.uncacheable);
                debug!(key = %key, error = %e, "not storing response");
                return;
            }
        };

        if let Validation::NotCacheable(reason) = validation {
            AtomicStats::bump(&self.stats.uncacheable);
            debug!(key = %key, reason = ?reason, "response is not cacheable");
            return;
        }

        let entry = CacheEntry::capture(request, response, now);
        match self.storage.set(key, entry).await {
            Ok(()) => {
                AtomicStats::bump(&self.stats.stores);
                debug!(key = %key, "stored response");
            }
            Err(e) => {
                AtomicStats::bump(&self.stats.store_errors);
                warn!(key = %key, backend = self.storage.name(), error = %e, "cache write failed");
            }
        }
    }

    fn annotate(&self, mut response: Response, cached_at: SystemTime) -> Response {
        let headers = response.headers_mut();
        headers.set(header::EXPIRES, httpdate::fmt_http_date(cached_at));
        headers.set(X_HTTPCACHE, "true");
        headers.set(X_HTTPCACHE_ORIGIN, self.config.origin_tag());
        response
    }
}

impl<S: Storage + ?Sized> Transport for CacheTransport<S> {
    fn round_trip(&self, request: Request) -> RoundTrip<'_> {
        Box::pin(self.execute(request))
    }
}

fn only_if_cached(request: &Request) -> bool {
    Directives::from_header(request.headers().get(header::CACHE_CONTROL))
        .is_ok_and(|directives| directives.contains(directive::ONLY_IF_CACHED))
}
