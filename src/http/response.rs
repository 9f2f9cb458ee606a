//! HTTP response building module
//!
//! Provides builders for the fixed responses of the dispatcher.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const ALLOWED_METHODS: &str = "OPTIONS, GET, HEAD, POST";
pub const WWW_AUTHENTICATE: &str = "Token realm='Service', error='token_expired'";

/// Build `200 OK` answer to `OPTIONS`, independent of the route
pub fn build_options_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(200)
        .header("Allow", ALLOWED_METHODS)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|e| {
            log_build_error("OPTIONS", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build bare status response: no headers, empty body
pub fn build_status_response(status: u16) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|e| {
            log_build_error(&status.to_string(), &e);
            build_500_fallback()
        })
}

/// Build 501 Not Implemented response for unsupported methods
pub fn build_501_response() -> Response<Full<Bytes>> {
    build_status_response(501)
}

/// Build HTML error page response (401 adds `WWW-Authenticate`)
pub fn build_error_page(status: u16, page: String) -> Response<Full<Bytes>> {
    let mut builder = Response::builder()
        .status(status)
        .header("Content-Type", HTML_CONTENT_TYPE);
    if status == 401 {
        builder = builder.header("WWW-Authenticate", WWW_AUTHENTICATE);
    }
    builder.body(Full::new(Bytes::from(page))).unwrap_or_else(|e| {
        log_build_error(&status.to_string(), &e);
        build_500_fallback()
    })
}

/// Build 413 Payload Too Large response
pub fn build_413_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(413)
        .header("Content-Type", "text/plain")
        .body(Full::new(Bytes::from("413 Payload Too Large")))
        .unwrap_or_else(|e| {
            log_build_error("413", &e);
            Response::new(Full::new(Bytes::from("413 Payload Too Large")))
        })
}

/// Build 301/302 redirect carrying the context headers
pub fn build_redirect_response(
    location: &str,
    permanent: bool,
    headers: Vec<(String, String)>,
) -> Response<Full<Bytes>> {
    let status = if permanent { 301 } else { 302 };
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    builder
        .header("Content-Type", HTML_CONTENT_TYPE)
        .header("Location", location)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|e| {
            log_build_error(&status.to_string(), &e);
            build_500_fallback()
        })
}

/// Build handler content response; HEAD keeps the headers but drops the body
pub fn build_content_response(
    status: u16,
    headers: Vec<(String, String)>,
    content: Bytes,
    is_head: bool,
) -> Response<Full<Bytes>> {
    let body = if is_head { Bytes::new() } else { content };
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    builder.body(Full::new(body)).unwrap_or_else(|e| {
        log_build_error(&status.to_string(), &e);
        build_500_fallback()
    })
}

fn build_500_fallback() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_response() {
        let resp = build_options_response();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["Allow"], ALLOWED_METHODS);
    }

    #[test]
    fn test_status_response_has_no_headers() {
        let resp = build_status_response(418);
        assert_eq!(resp.status(), 418);
        assert!(resp.headers().is_empty());
        assert_eq!(build_status_response(1000).status(), 500);
    }

    #[test]
    fn test_error_page_401_header() {
        let resp = build_error_page(401, "denied".to_string());
        assert_eq!(resp.headers()["WWW-Authenticate"], WWW_AUTHENTICATE);
        assert!(build_error_page(404, String::new())
            .headers()
            .get("WWW-Authenticate")
            .is_none());
    }

    #[test]
    fn test_redirect_response() {
        let resp = build_redirect_response(
            "/login",
            false,
            vec![("Set-Cookie".to_string(), "a=b".to_string())],
        );
        assert_eq!(resp.status(), 302);
        assert_eq!(resp.headers()["Location"], "/login");
        assert_eq!(resp.headers()["Set-Cookie"], "a=b");
        assert_eq!(build_redirect_response("/", true, Vec::new()).status(), 301);
    }
}
