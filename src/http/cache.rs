//! HTTP cache control module
//!
//! Cache-Control policies and HTTP date formatting for response headers.

use chrono::{DateTime, Utc};

/// Expiry date used to defeat HTTP/1.0 caches
pub const EXPIRED_DATE: &str = "Fri, 31 Dec 1999 23:59:59 GMT";

/// Default lifetime for `cache_response`, in seconds (10 days)
pub const DEFAULT_CACHE_DURATION: u32 = 864_000;

/// Cache control policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Public cache with specified max-age (seconds)
    Public(u32),
    /// Private cache (browser cache only)
    Private(u32),
    /// Revalidate on every use
    NoCache,
    /// No store
    NoStore,
}

impl CachePolicy {
    /// Convert to Cache-Control header value
    pub fn to_header_value(self) -> String {
        match self {
            Self::Public(max_age) => format!("public, max-age={max_age}"),
            Self::Private(max_age) => format!("private, max-age={max_age}"),
            Self::NoCache => "no-cache, must-revalidate".to_string(),
            Self::NoStore => "no-store".to_string(),
        }
    }

    /// Matching HTTP/1.0 `Pragma` value
    pub const fn pragma(self) -> &'static str {
        match self {
            Self::Public(_) => "Public",
            Self::Private(_) => "Private",
            Self::NoCache | Self::NoStore => "no-cache",
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::Public(DEFAULT_CACHE_DURATION)
    }
}

/// Format a timestamp as an HTTP header date (RFC 7231 IMF-fixdate)
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Current time as an HTTP header date
pub fn http_date_now() -> String {
    http_date(Utc::now())
}
