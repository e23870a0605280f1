//! `Cache-Control` directive parsing.
//!
//! A header value such as `public, max-age=60, private="Set-Cookie"` becomes a
//! [`Directives`] map of lower-cased names to optional values. Requests and
//! responses are parsed the same way; which names matter is up to the
//! freshness evaluator. Unknown directives are kept so the map always
//! reflects what was sent.

use std::collections::BTreeMap;

use thiserror::Error;

pub const NO_CACHE: &str = "no-cache";
pub const NO_STORE: &str = "no-store";
pub const NO_TRANSFORM: &str = "no-transform";
pub const MAX_AGE: &str = "max-age";
pub const MAX_STALE: &str = "max-stale";
pub const MIN_FRESH: &str = "min-fresh";
pub const ONLY_IF_CACHED: &str = "only-if-cached";
pub const PUBLIC: &str = "public";
pub const PRIVATE: &str = "private";
pub const MUST_REVALIDATE: &str = "must-revalidate";
pub const PROXY_REVALIDATE: &str = "proxy-revalidate";
pub const S_MAXAGE: &str = "s-maxage";

/// Directives whose value must be delta-seconds when the directive is present.
const REQUIRED_SECONDS: [&str; 3] = [MAX_AGE, S_MAXAGE, MIN_FRESH];

/// Errors produced by [`Directives::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
    #[error("directive with empty name in {0:?}")]
    EmptyName(String),

    #[error("unterminated quoted string in {0:?}")]
    UnterminatedQuote(String),

    #[error("directive {name} requires delta-seconds, got {value:?}")]
    InvalidSeconds { name: String, value: Option<String> },
}

/// A parsed `Cache-Control` header.
///
/// # Examples
///
/// ```
/// use httpcache::cache::directive::Directives;
///
/// let d = Directives::parse("Public, MAX-AGE=60, x-ext=\"a, b\"").unwrap();
/// assert!(d.contains("public"));
/// assert_eq!(d.seconds("max-age"), Some(60));
/// assert_eq!(d.value("x-ext"), Some("a, b"));
/// assert!(Directives::parse("max-age=soon").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    entries: BTreeMap<String, Option<String>>,
}

impl Directives {
    /// Parses a raw header value.
    ///
    /// Tokens are separated by commas outside quoted strings; each token is
    /// trimmed and split at its first `=`. Empty tokens are skipped. When a
    /// directive repeats, the first occurrence wins.
    ///
    /// # Errors
    ///
    /// See [`DirectiveError`].
    pub fn parse(raw: &str) -> Result<Self, DirectiveError> {
        let mut entries = BTreeMap::new();

        for token in split_tokens(raw)? {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            let (name, value) = match token.split_once('=') {
                Some((name, value)) => (name.trim(), Some(unquote(value.trim(), raw)?)),
                None => (token, None),
            };
            if name.is_empty() {
                return Err(DirectiveError::EmptyName(raw.to_owned()));
            }

            let name = name.to_ascii_lowercase();
            check_seconds(&name, value.as_deref())?;
            entries.entry(name).or_insert(value);
        }

        Ok(Self { entries })
    }

    /// Parses an optional header; an absent header is an empty set.
    pub fn from_header(raw: Option<&str>) -> Result<Self, DirectiveError> {
        raw.map_or_else(|| Ok(Self::default()), Self::parse)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the value of `name`, or `None` if it is absent or valueless.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.entries.get(name)?.as_deref()
    }

    /// Returns the delta-seconds value of `name`.
    ///
    /// `None` when the directive is absent or carries no value. Values too
    /// large for 32 bits saturate at `u32::MAX`.
    pub fn seconds(&self, name: &str) -> Option<u64> {
        self.value(name).and_then(delta_seconds)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

/// Splits on commas that are not inside a quoted string.
fn split_tokens(raw: &str) -> Result<Vec<&str>, DirectiveError> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in raw.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                tokens.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if in_quotes || escaped {
        return Err(DirectiveError::UnterminatedQuote(raw.to_owned()));
    }
    tokens.push(&raw[start..]);
    Ok(tokens)
}

/// Strips surrounding quotes and resolves backslash escapes.
fn unquote(value: &str, raw: &str) -> Result<String, DirectiveError> {
    let Some(inner) = value.strip_prefix('"') else {
        return Ok(value.to_owned());
    };
    let inner = inner
        .strip_suffix('"')
        .ok_or_else(|| DirectiveError::UnterminatedQuote(raw.to_owned()))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let escaped = chars
                .next()
                .ok_or_else(|| DirectiveError::UnterminatedQuote(raw.to_owned()))?;
            out.push(escaped);
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

fn check_seconds(name: &str, value: Option<&str>) -> Result<(), DirectiveError> {
    let required = REQUIRED_SECONDS.contains(&name);
    let valid = match value {
        Some(v) => delta_seconds(v).is_some(),
        // max-stale without a value means "any staleness"
        None => !required,
    };
    if valid || !(required || name == MAX_STALE) {
        return Ok(());
    }
    Err(DirectiveError::InvalidSeconds {
        name: name.to_owned(),
        value: value.map(str::to_owned),
    })
}

fn delta_seconds(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(
        value
            .parse::<u64>()
            .map_or(u64::from(u32::MAX), |n| n.min(u64::from(u32::MAX))),
    )
}
