//! Cacheability and freshness evaluation.
//!
//! [`Evaluator::evaluate`] answers two questions about a response:
//!
//! 1. May it be stored at all? Checked in order, first match wins:
//!    `no-store` on either side; a method other than GET/HEAD; a status
//!    outside [`CACHEABLE_STATUSES`]; `private` in a shared cache.
//! 2. If so, when does it stop being fresh? In priority order: `s-maxage`
//!    (shared caches only), `max-age`, `Expires`, a heuristic of 10% of the
//!    time since `Last-Modified`, and otherwise "already stale".
//!
//! The answer depends on "now" and is recomputed on every lookup.
//! [`Expiry::is_servable`] then applies the request's own tolerance
//! (`max-age`, `min-fresh`, `max-stale`, `no-cache`).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

use super::directive::{self, DirectiveError, Directives};
use crate::http::{Headers, Method, Request, Response, StatusCode, header};

/// Status codes whose responses may be stored.
pub const CACHEABLE_STATUSES: [u16; 11] = [200, 203, 204, 206, 300, 301, 404, 405, 410, 414, 501];

/// Divisor applied to `Date - Last-Modified` for heuristic freshness.
const HEURISTIC_DIVISOR: u32 = 10;

/// Why a response may not be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uncacheable {
    NoStore,
    Method,
    Status(StatusCode),
    Private,
}

/// When a cacheable response stops being fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    /// First instant at which the response is stale.
    pub expires_at: SystemTime,
    /// The response's `Date`, or when it was stored if it had none. Ages are
    /// measured from here.
    pub date: SystemTime,
    /// Set by `no-cache` or `must-revalidate`: never serve this response stale.
    pub revalidate: bool,
}

/// Outcome of evaluating a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    NotCacheable(Uncacheable),
    Cacheable(Expiry),
}

/// Inputs that cannot be evaluated. Distinct from [`Uncacheable`]: the
/// response might be fine, but its headers make no sense.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid request Cache-Control: {0}")]
    RequestDirectives(#[source] DirectiveError),

    #[error("invalid response Cache-Control: {0}")]
    ResponseDirectives(#[source] DirectiveError),

    #[error("invalid {header} header {value:?}")]
    InvalidDate { header: &'static str, value: String },
}

/// The facts about a stored or freshly fetched response the evaluator needs
/// besides its directives.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Method of the request that produced (or now asks for) the response.
    pub method: &'a Method,
    pub status: StatusCode,
    pub headers: &'a Headers,
    /// When the response entered the cache; stands in for a missing `Date`.
    pub stored_at: SystemTime,
}

/// A [`Validation`] paired with the request directives it will be served
/// under.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub validation: Validation,
    pub request: Directives,
}

impl Assessment {
    /// Returns `true` if the response may be served at `now` without
    /// contacting the origin.
    pub fn is_servable(&self, now: SystemTime) -> bool {
        match &self.validation {
            Validation::NotCacheable(_) => false,
            Validation::Cacheable(expiry) => expiry.is_servable(now, &self.request),
        }
    }
}

/// Applies the cacheability and expiration rules.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    shared: bool,
}

impl Evaluator {
    /// `shared` selects shared-cache semantics (`s-maxage` honored, `private`
    /// refused).
    pub fn new(shared: bool) -> Self {
        Self { shared }
    }

    /// Parses both `Cache-Control` headers and evaluates `response` as an
    /// answer to `request`.
    ///
    /// # Errors
    ///
    /// [`ValidationError`] when either `Cache-Control` header, or the
    /// response's `Date` or `Last-Modified`, cannot be parsed.
    pub fn assess(
        &self,
        request: &Request,
        response: &Response,
        stored_at: SystemTime,
        now: SystemTime,
    ) -> Result<Assessment, ValidationError> {
        let request_directives = Directives::from_header(request.headers().get(header::CACHE_CONTROL))
            .map_err(ValidationError::RequestDirectives)?;
        let response_directives =
            Directives::from_header(response.headers().get(header::CACHE_CONTROL))
                .map_err(ValidationError::ResponseDirectives)?;

        let candidate = Candidate {
            method: request.method(),
            status: response.status(),
            headers: response.headers(),
            stored_at,
        };
        let validation = self.evaluate(&request_directives, &response_directives, &candidate, now)?;

        Ok(Assessment {
            validation,
            request: request_directives,
        })
    }

    /// Evaluates already-parsed directives.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidDate`] when `Date` or `Last-Modified` is
    /// present but unparseable. An unparseable `Expires` is not an error: it
    /// means "already expired".
    pub fn evaluate(
        &self,
        request: &Directives,
        response: &Directives,
        candidate: &Candidate<'_>,
        now: SystemTime,
    ) -> Result<Validation, ValidationError> {
        if let Some(reason) = self.uncacheable(request, response, candidate) {
            return Ok(Validation::NotCacheable(reason));
        }

        let date = header_date(candidate.headers, header::DATE)?.unwrap_or(candidate.stored_at);

        let expires_at = if let Some(secs) = response
            .seconds(directive::S_MAXAGE)
            .filter(|_| self.shared)
        {
            add_secs(date, secs)
        } else if let Some(secs) = response.seconds(directive::MAX_AGE) {
            add_secs(date, secs)
        } else if let Some(raw) = candidate.headers.get(header::EXPIRES) {
            // "0", "-1" and other junk mean "already expired"
            httpdate::parse_http_date(raw.trim()).unwrap_or(UNIX_EPOCH)
        } else if let Some(last_modified) = header_date(candidate.headers, header::LAST_MODIFIED)? {
            let age = date.duration_since(last_modified).unwrap_or(Duration::ZERO);
            date + age / HEURISTIC_DIVISOR
        } else {
            now
        };

        let no_cache = request.contains(directive::NO_CACHE) || response.contains(directive::NO_CACHE);
        let revalidate = no_cache
            || response.contains(directive::MUST_REVALIDATE)
            || (self.shared && response.contains(directive::PROXY_REVALIDATE));

        Ok(Validation::Cacheable(Expiry {
            expires_at: if no_cache { now } else { expires_at },
            date,
            revalidate,
        }))
    }

    fn uncacheable(
        &self,
        request: &Directives,
        response: &Directives,
        candidate: &Candidate<'_>,
    ) -> Option<Uncacheable> {
        if response.contains(directive::NO_STORE) || request.contains(directive::NO_STORE) {
            Some(Uncacheable::NoStore)
        } else if !candidate.method.is_cacheable() {
            Some(Uncacheable::Method)
        } else if !CACHEABLE_STATUSES.contains(&candidate.status.as_u16()) {
            Some(Uncacheable::Status(candidate.status))
        } else if self.shared && response.contains(directive::PRIVATE) {
            Some(Uncacheable::Private)
        } else {
            None
        }
    }
}

impl Expiry {
    /// Returns `true` if a response with this expiry satisfies `request` at `now`.
    ///
    /// - Request `no-cache` never accepts a stored response.
    /// - Request `max-age=N` rejects responses older than N seconds.
    /// - Otherwise the response must satisfy
    ///   `now + min-fresh < expires_at + max-stale`; a valueless `max-stale`
    ///   accepts any staleness, and `max-stale` is ignored when the response
    ///   demands revalidation.
    pub fn is_servable(&self, now: SystemTime, request: &Directives) -> bool {
        if request.contains(directive::NO_CACHE) {
            return false;
        }

        if let Some(max_age) = request.seconds(directive::MAX_AGE) {
            let age = now.duration_since(self.date).unwrap_or(Duration::ZERO);
            if age > Duration::from_secs(max_age) {
                return false;
            }
        }

        let max_stale = if self.revalidate || !request.contains(directive::MAX_STALE) {
            Some(0)
        } else {
            request.seconds(directive::MAX_STALE)
        };
        let Some(max_stale) = max_stale else {
            return true;
        };

        let min_fresh = request.seconds(directive::MIN_FRESH).unwrap_or(0);
        add_secs(now, min_fresh) < add_secs(self.expires_at, max_stale)
    }
}

/// Reads an HTTP-date header. Absent is `None`; present but unparseable is an error.
fn header_date(headers: &Headers, name: &'static str) -> Result<Option<SystemTime>, ValidationError> {
    headers
        .get(name)
        .map(|raw| {
            httpdate::parse_http_date(raw.trim()).map_err(|_| ValidationError::InvalidDate {
                header: name,
                value: raw.to_owned(),
            })
        })
        .transpose()
}

fn add_secs(time: SystemTime, secs: u64) -> SystemTime {
    time.checked_add(Duration::from_secs(secs)).unwrap_or(time)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2024-01-01T00:00:00Z
    fn t0() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_704_067_200)
    }

    fn at(offset: i64) -> SystemTime {
        if offset >= 0 {
            t0() + Duration::from_secs(offset as u64)
        } else {
            t0() - Duration::from_secs(offset.unsigned_abs())
        }
    }

    fn http_date(offset: i64) -> String {
        httpdate::fmt_http_date(at(offset))
    }

    fn dirs(raw: &str) -> Directives {
        Directives::parse(raw).unwrap()
    }

    fn evaluate_with(
        evaluator: Evaluator,
        request_cc: &str,
        response_cc: &str,
        status: u16,
        headers: &Headers,
    ) -> Validation {
        let candidate = Candidate {
            method: &Method::Get,
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            stored_at: t0(),
        };
        evaluator
            .evaluate(&dirs(request_cc), &dirs(response_cc), &candidate, t0())
            .unwrap()
    }

    fn evaluate(response_cc: &str, headers: &Headers) -> Validation {
        evaluate_with(Evaluator::new(true), "", response_cc, 200, headers)
    }

    fn expiry(validation: Validation) -> Expiry {
        match validation {
            Validation::Cacheable(expiry) => expiry,
            other => panic!("expected cacheable, got {other:?}"),
        }
    }

    fn dated() -> Headers {
        [("Date", http_date(0))].into_iter().collect()
    }

    // ── cacheability ─────────────────────────────────────────────────────────

    #[test]
    fn no_store_on_either_side() {
        let h = dated();
        assert_eq!(evaluate("no-store", &h), Validation::NotCacheable(Uncacheable::NoStore));
        assert_eq!(
            evaluate_with(Evaluator::new(true), "no-store", "max-age=60", 200, &h),
            Validation::NotCacheable(Uncacheable::NoStore)
        );
    }

    #[test]
    fn only_get_and_head() {
        let h = dated();
        let candidate = Candidate {
            method: &Method::Post,
            status: StatusCode::OK,
            headers: &h,
            stored_at: t0(),
        };
        let v = Evaluator::new(true)
            .evaluate(&dirs(""), &dirs("max-age=60"), &candidate, t0())
            .unwrap();
        assert_eq!(v, Validation::NotCacheable(Uncacheable::Method));
    }

    #[test]
    fn status_allow_list() {
        let h = dated();
        for code in CACHEABLE_STATUSES {
            assert!(matches!(
                evaluate_with(Evaluator::new(true), "", "max-age=60", code, &h),
                Validation::Cacheable(_)
            ));
        }
        for code in [201, 302, 304, 500, 503] {
            assert!(matches!(
                evaluate_with(Evaluator::new(true), "", "max-age=60", code, &h),
                Validation::NotCacheable(Uncacheable::Status(_))
            ));
        }
    }

    #[test]
    fn private_only_matters_to_shared_caches() {
        let h = dated();
        assert_eq!(
            evaluate_with(Evaluator::new(true), "", "private, max-age=60", 200, &h),
            Validation::NotCacheable(Uncacheable::Private)
        );
        assert!(matches!(
            evaluate_with(Evaluator::new(false), "", "private, max-age=60", 200, &h),
            Validation::Cacheable(_)
        ));
    }

    #[test]
    fn no_store_is_checked_before_method() {
        let h = dated();
        let candidate = Candidate {
            method: &Method::Post,
            status: StatusCode::OK,
            headers: &h,
            stored_at: t0(),
        };
        let v = Evaluator::new(true)
            .evaluate(&dirs(""), &dirs("no-store"), &candidate, t0())
            .unwrap();
        assert_eq!(v, Validation::NotCacheable(Uncacheable::NoStore));
    }

    // ── expiration ───────────────────────────────────────────────────────────

    #[test]
    fn s_maxage_beats_max_age_in_shared_mode() {
        let h = dated();
        assert_eq!(expiry(evaluate("max-age=60, s-maxage=10", &h)).expires_at, at(10));
        assert_eq!(
            expiry(evaluate_with(Evaluator::new(false), "", "max-age=60, s-maxage=10", 200, &h))
                .expires_at,
            at(60)
        );
    }

    #[test]
    fn max_age_counts_from_date() {
        let h: Headers = [("Date", http_date(-20))].into_iter().collect();
        assert_eq!(expiry(evaluate("max-age=60", &h)).expires_at, at(40));
    }

    #[test]
    fn max_age_counts_from_storage_without_date() {
        let e = expiry(evaluate("max-age=60", &Headers::new()));
        assert_eq!(e.expires_at, at(60));
        assert_eq!(e.date, t0());
    }

    #[test]
    fn max_age_beats_expires() {
        let mut h = dated();
        h.insert("Expires", http_date(3600));
        assert_eq!(expiry(evaluate("max-age=5", &h)).expires_at, at(5));
    }

    #[test]
    fn expires_header() {
        let mut h = dated();
        h.insert("Expires", http_date(90));
        assert_eq!(expiry(evaluate("", &h)).expires_at, at(90));
    }

    #[test]
    fn bogus_expires_means_expired() {
        for value in ["0", "-1", "next tuesday"] {
            let mut h = dated();
            h.insert("Expires", value);
            assert_eq!(expiry(evaluate("", &h)).expires_at, UNIX_EPOCH, "Expires: {value}");
        }
    }

    #[test]
    fn heuristic_from_last_modified() {
        let mut h = dated();
        h.insert("Last-Modified", http_date(-1000));
        assert_eq!(expiry(evaluate("", &h)).expires_at, at(100));
    }

    #[test]
    fn heuristic_floors_at_zero() {
        let mut h = dated();
        h.insert("Last-Modified", http_date(500));
        assert_eq!(expiry(evaluate("", &h)).expires_at, at(0));
    }

    #[test]
    fn no_freshness_information_is_stale_now() {
        assert_eq!(expiry(evaluate("public", &dated())).expires_at, t0());
    }

    #[test]
    fn no_cache_forces_staleness() {
        let h = dated();
        let e = expiry(evaluate("no-cache, max-age=600", &h));
        assert_eq!(e.expires_at, t0());
        assert!(e.revalidate);

        let e = expiry(evaluate_with(Evaluator::new(true), "no-cache", "max-age=600", 200, &h));
        assert_eq!(e.expires_at, t0());
    }

    #[test]
    fn revalidate_flags() {
        let h = dated();
        assert!(expiry(evaluate("max-age=5, must-revalidate", &h)).revalidate);
        assert!(expiry(evaluate("max-age=5, proxy-revalidate", &h)).revalidate);
        assert!(
            !expiry(evaluate_with(Evaluator::new(false), "", "max-age=5, proxy-revalidate", 200, &h))
                .revalidate
        );
        assert!(!expiry(evaluate("max-age=5", &h)).revalidate);
    }

    // ── errors ───────────────────────────────────────────────────────────────

    #[test]
    fn bad_dates_are_errors() {
        let h: Headers = [("Date", "yesterday")].into_iter().collect();
        let candidate = Candidate {
            method: &Method::Get,
            status: StatusCode::OK,
            headers: &h,
            stored_at: t0(),
        };
        let err = Evaluator::new(true)
            .evaluate(&dirs(""), &dirs("max-age=60"), &candidate, t0())
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidDate { header: "Date", .. }));
    }

    #[test]
    fn bad_directives_are_errors_not_uncacheable() {
        let request = Request::get("/x").header("Cache-Control", "max-age=soon");
        let response = Response::new(StatusCode::OK).header("Cache-Control", "max-age=60");
        assert!(matches!(
            Evaluator::new(true).assess(&request, &response, t0(), t0()),
            Err(ValidationError::RequestDirectives(_))
        ));

        let request = Request::get("/x");
        let response = Response::new(StatusCode::OK).header("Cache-Control", "=");
        assert!(matches!(
            Evaluator::new(true).assess(&request, &response, t0(), t0()),
            Err(ValidationError::ResponseDirectives(_))
        ));
    }

    // ── servability ──────────────────────────────────────────────────────────

    fn fresh_for(secs: u64, revalidate: bool) -> Expiry {
        Expiry {
            expires_at: add_secs(t0(), secs),
            date: t0(),
            revalidate,
        }
    }

    #[test]
    fn servable_strictly_before_expiry() {
        let e = fresh_for(60, false);
        let none = Directives::default();
        assert!(e.is_servable(at(59), &none));
        assert!(!e.is_servable(at(60), &none));
        assert!(!e.is_servable(at(61), &none));
    }

    #[test]
    fn min_fresh_shrinks_the_window() {
        let e = fresh_for(60, false);
        assert!(e.is_servable(at(30), &dirs("min-fresh=20")));
        assert!(!e.is_servable(at(45), &dirs("min-fresh=20")));
    }

    #[test]
    fn max_stale_widens_the_window() {
        let e = fresh_for(60, false);
        assert!(e.is_servable(at(80), &dirs("max-stale=30")));
        assert!(!e.is_servable(at(95), &dirs("max-stale=30")));
        assert!(e.is_servable(at(1_000_000), &dirs("max-stale")));
    }

    #[test]
    fn max_stale_cannot_override_revalidation() {
        let e = fresh_for(60, true);
        assert!(!e.is_servable(at(61), &dirs("max-stale")));
        assert!(e.is_servable(at(10), &dirs("max-stale")));
    }

    #[test]
    fn request_max_age_limits_age() {
        let e = fresh_for(600, false);
        assert!(e.is_servable(at(30), &dirs("max-age=30")));
        assert!(!e.is_servable(at(31), &dirs("max-age=30")));
    }

    #[test]
    fn request_no_cache_refuses_stored_copies() {
        assert!(!fresh_for(600, false).is_servable(at(1), &dirs("no-cache")));
    }

    #[test]
    fn assessment_of_uncacheable_is_never_servable() {
        let a = Assessment {
            validation: Validation::NotCacheable(Uncacheable::Private),
            request: Directives::default(),
        };
        assert!(!a.is_servable(t0()));
    }
}
