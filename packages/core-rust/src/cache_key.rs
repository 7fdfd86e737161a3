//! Deterministic cache keys and invalidation targets.
//!
//! A [`CacheKey`] has the shape `namespace:segment:segment[#digest]`:
//!
//! - the namespace names the resource family (`cart`, `catalog`, `order`);
//! - segments are the identifying fields in a fixed order (resource ids);
//! - filter parameters are unordered, so they are sorted, length-prefixed and
//!   reduced to a SHA-256 digest (first 16 hex chars) appended after `#`.
//!
//! Two requests that name the same resource with the same filters derive the
//! same key regardless of the order filters were supplied in.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use sha2::{Digest, Sha256};

/// Number of hex characters of the filter digest kept in a key.
const FILTER_DIGEST_LEN: usize = 16;

/// Derived key of a cacheable query result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    #[must_use]
    pub fn builder(namespace: impl Into<String>) -> CacheKeyBuilder {
        CacheKeyBuilder {
            namespace: namespace.into(),
            segments: Vec::new(),
            filters: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespace part (everything before the first `:` or `#`).
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.0.split(&[':', '#'][..]).next().unwrap_or_default()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builder for [`CacheKey`]. See the module docs for the key layout.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    namespace: String,
    segments: Vec<String>,
    filters: BTreeMap<String, String>,
}

impl CacheKeyBuilder {
    /// Appends an identifying segment. Order matters.
    #[must_use]
    pub fn segment(mut self, value: impl fmt::Display) -> Self {
        self.segments.push(escape(&value.to_string()));
        self
    }

    /// Adds a filter parameter. Order does not matter; a repeated name keeps
    /// the last value.
    #[must_use]
    pub fn filter(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.filters.insert(name.into(), value.to_string());
        self
    }

    /// Adds a filter parameter only when a value is present.
    #[must_use]
    pub fn filter_opt<V: fmt::Display>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.filter(name, value),
            None => self,
        }
    }

    #[must_use]
    pub fn build(self) -> CacheKey {
        let mut key = escape(&self.namespace);
        for segment in &self.segments {
            key.push(':');
            key.push_str(segment);
        }
        if !self.filters.is_empty() {
            key.push('#');
            key.push_str(&filter_digest(&self.filters));
        }
        CacheKey(key)
    }
}

/// Escapes the characters that carry meaning in keys and patterns.
fn escape(raw: &str) -> String {
    raw.replace('%', "%25")
        .replace(':', "%3A")
        .replace('#', "%23")
        .replace('*', "%2A")
}

fn filter_digest(filters: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (name, value) in filters {
        // Length prefixes keep ("ab","c") and ("a","bc") apart.
        hasher.update((name.len() as u64).to_le_bytes());
        hasher.update(name.as_bytes());
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(FILTER_DIGEST_LEN);
    digest
}

// ---------------------------------------------------------------------------
// Patterns and invalidation
// ---------------------------------------------------------------------------

/// Glob over cache keys where `*` matches any run of characters.
#[derive(Debug, Clone)]
pub struct CachePattern {
    raw: String,
    regex: Regex,
    scope: Option<String>,
}

impl CachePattern {
    /// # Errors
    ///
    /// Returns an error if the translated expression is rejected by the regex
    /// engine (e.g. it exceeds the size limit).
    pub fn new(glob: &str) -> Result<Self, regex::Error> {
        let body = glob
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{body}$"))?;
        let literal = glob.split('*').next().unwrap_or_default();
        let scope = match literal.find([':', '#']) {
            Some(end) => Some(literal[..end].to_string()),
            None if !glob.contains('*') => Some(glob.to_string()),
            None => None,
        };
        Ok(Self {
            raw: glob.to_string(),
            regex,
            scope,
        })
    }

    /// Pattern matching every key in a namespace: the bare namespace key and
    /// any key continuing with a segment or a filter digest.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex engine rejects the expression.
    pub fn namespace(namespace: &str) -> Result<Self, regex::Error> {
        let escaped = escape(namespace);
        let regex = Regex::new(&format!("^{}([:#].*)?$", regex::escape(&escaped)))?;
        Ok(Self {
            raw: format!("{escaped}*"),
            regex,
            scope: Some(escaped),
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The single namespace every matching key belongs to, or `None` when
    /// the pattern can match keys of several namespaces (`ca*`).
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}

impl PartialEq for CachePattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for CachePattern {}

/// What a mutating command removes from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Key(CacheKey),
    Pattern(CachePattern),
}

impl Invalidation {
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Key(exact) => exact.as_str() == key,
            Self::Pattern(pattern) => pattern.matches(key),
        }
    }
}

impl From<CacheKey> for Invalidation {
    fn from(key: CacheKey) -> Self {
        Self::Key(key)
    }
}

impl From<CachePattern> for Invalidation {
    fn from(pattern: CachePattern) -> Self {
        Self::Pattern(pattern)
    }
}

impl fmt::Display for Invalidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key.as_str()),
            Self::Pattern(pattern) => f.write_str(pattern.as_str()),
        }
    }
}
