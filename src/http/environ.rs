//! Request environment module
//!
//! `Environ` is the framework-neutral view of one request: method, scheme,
//! host, raw path and query, headers and the fully read body. The dispatcher
//! only ever sees an `Environ`, so it can be driven without sockets.

use http_body_util::{BodyExt, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE, HOST};
use hyper::{HeaderMap, Method, Request};
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::HttpConfig;

#[derive(Debug, Error)]
pub enum EnvironError {
    #[error("request body exceeds {0} bytes")]
    TooLarge(u64),
    #[error("failed to read request body: {0}")]
    Body(String),
}

#[derive(Debug, Clone)]
pub struct Environ {
    pub method: Method,
    pub https: bool,
    pub host: String,
    /// Raw (still percent-encoded) path
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub remote_addr: Option<SocketAddr>,
}

impl Environ {
    /// Build an environment for `target` (path plus optional query) on
    /// `localhost`, with no headers and an empty body
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        Self {
            method,
            https: false,
            host: "localhost".to_string(),
            path: path.to_string(),
            query: query.to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    #[must_use]
    pub const fn with_https(mut self) -> Self {
        self.https = true;
        self
    }

    /// Read a request fully, rejecting bodies over `http.max_body_size`
    pub async fn from_request<B>(
        req: Request<B>,
        remote_addr: Option<SocketAddr>,
        http_config: &HttpConfig,
    ) -> Result<Self, EnvironError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let limit = http_config.max_body_size;

        let body = match Limited::new(body, usize::try_from(limit).unwrap_or(usize::MAX))
            .collect()
            .await
        {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.is::<http_body_util::LengthLimitError>() => {
                return Err(EnvironError::TooLarge(limit));
            }
            Err(err) => return Err(EnvironError::Body(err.to_string())),
        };

        let forwarded_https = http_config.trust_forwarded_proto
            && parts
                .headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.eq_ignore_ascii_case("https"));
        let https = forwarded_https || parts.uri.scheme_str() == Some("https");

        let host = parts
            .headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
            .or_else(|| parts.uri.authority().map(ToString::to_string))
            .unwrap_or_else(|| "localhost".to_string());

        Ok(Self {
            method: parts.method,
            https,
            host,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().unwrap_or_default().to_string(),
            headers: parts.headers,
            body,
            remote_addr,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Content type without parameters, empty when absent
    pub fn content_type(&self) -> &str {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or("", |ct| ct.split(';').next().unwrap_or_default().trim())
    }

    /// Full `Content-Type` header value including parameters
    pub fn raw_content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn http_config(max_body_size: u64) -> HttpConfig {
        HttpConfig {
            server_name: "test".to_string(),
            max_body_size,
            trust_forwarded_proto: true,
        }
    }

    #[test]
    fn test_new_splits_target() {
        let env = Environ::new(Method::GET, "/a/b?x=1&y=2");
        assert_eq!(env.path, "/a/b");
        assert_eq!(env.query, "x=1&y=2");
        assert!(!env.https);

        let env = Environ::new(Method::GET, "/plain");
        assert_eq!(env.query, "");
    }

    #[test]
    fn test_content_type_strips_parameters() {
        let env = Environ::new(Method::POST, "/")
            .with_header("Content-Type", "application/json; charset=utf-8");
        assert_eq!(env.content_type(), "application/json");
        assert_eq!(Environ::new(Method::POST, "/").content_type(), "");
    }

    #[tokio::test]
    async fn test_from_request_reads_body_and_scheme() {
        let req = Request::builder()
            .method("POST")
            .uri("/service?token=t")
            .header("Host", "example.com")
            .header("X-Forwarded-Proto", "https")
            .body(Full::new(Bytes::from_static(b"{\"a\":1}")))
            .unwrap();

        let env = Environ::from_request(req, None, &http_config(1024))
            .await
            .unwrap();
        assert_eq!(env.method, Method::POST);
        assert!(env.https);
        assert_eq!(env.host, "example.com");
        assert_eq!(env.path, "/service");
        assert_eq!(env.query, "token=t");
        assert_eq!(&env.body[..], b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_forwarded_proto_ignored_unless_trusted() {
        let request = || {
            Request::builder()
                .uri("/")
                .header("X-Forwarded-Proto", "https")
                .body(Full::new(Bytes::new()))
                .unwrap()
        };
        let untrusted = HttpConfig {
            trust_forwarded_proto: false,
            ..http_config(1024)
        };

        let env = Environ::from_request(request(), None, &untrusted).await.unwrap();
        assert!(!env.https);
        let env = Environ::from_request(request(), None, &http_config(1024))
            .await
            .unwrap();
        assert!(env.https);
    }

    #[tokio::test]
    async fn test_from_request_rejects_large_body() {
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .body(Full::new(Bytes::from(vec![b'x'; 64])))
            .unwrap();

        let err = Environ::from_request(req, None, &http_config(16))
            .await
            .unwrap_err();
        assert!(matches!(err, EnvironError::TooLarge(16)));
    }
}
