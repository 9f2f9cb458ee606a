//! Cookie parsing and `Set-Cookie` formatting

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CookieError {
    #[error("invalid cookie name {0:?}")]
    InvalidName(String),
}

/// Attributes for an outgoing cookie; unset fields are omitted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: Option<String>,
    pub domain: Option<String>,
    pub expires: Option<String>,
    pub max_age: Option<i64>,
    pub secure: Option<bool>,
    pub http_only: bool,
}

impl CookieOptions {
    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    #[must_use]
    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    #[must_use]
    pub const fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    #[must_use]
    pub const fn secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    #[must_use]
    pub const fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCookie {
    pub name: String,
    pub value: String,
    pub options: CookieOptions,
}

impl ResponseCookie {
    /// Value of the `Set-Cookie` header for this cookie
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, quote_value(&self.value));
        let opts = &self.options;
        if let Some(ref domain) = opts.domain {
            out.push_str(&format!("; Domain={domain}"));
        }
        if let Some(ref expires) = opts.expires {
            out.push_str(&format!("; expires={expires}"));
        }
        if opts.http_only {
            out.push_str("; HttpOnly");
        }
        if let Some(max_age) = opts.max_age {
            out.push_str(&format!("; Max-Age={max_age}"));
        }
        if let Some(ref path) = opts.path {
            out.push_str(&format!("; Path={path}"));
        }
        if opts.secure == Some(true) {
            out.push_str("; Secure");
        }
        out
    }
}

/// Cookie names must be RFC 6265 tokens
pub fn validate_name(name: &str) -> Result<(), CookieError> {
    let valid = !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
        });
    if valid {
        Ok(())
    } else {
        Err(CookieError::InvalidName(name.to_string()))
    }
}

fn needs_quotes(value: &str) -> bool {
    value
        .bytes()
        .any(|b| !b.is_ascii_graphic() || matches!(b, b'"' | b',' | b';' | b'\\'))
}

fn quote_value(value: &str) -> String {
    if !needs_quotes(value) {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn unquote_value(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse a `Cookie` request header; malformed pairs are skipped and the
/// first occurrence of a name wins
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for pair in header.split(';') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if validate_name(name).is_err() {
            continue;
        }
        cookies
            .entry(name.to_string())
            .or_insert_with(|| unquote_value(value.trim()));
    }
    cookies
}
