//! Request context
//!
//! One `Context` is created per request and handed to the handler and every
//! renderer. It exposes the request (cookies, URLs, identity) and buffers the
//! response status, headers and cookies until the dispatcher builds the
//! response.

pub mod cookies;
pub mod identity;
pub mod url;

pub use cookies::{CookieError, CookieOptions, ResponseCookie};
pub use identity::{Anonymous, CookieIdentity, Identity};

use hyper::body::Bytes;
use hyper::{HeaderMap, Method};
use rand::Rng;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::app::Runtime;
use crate::config::AppSettings;
use crate::crypto;
use crate::handler::{Arg, Failure, Halt, Kwargs};
use crate::http::{http_date_now, CachePolicy, Environ, EXPIRED_DATE};

const COOKIE_EXPIRED_DATE: &str = "Fri, 31-Dec-99 23:59:59 GMT";
const XSRF_COOKIE: &str = "xsrf";

pub struct Context {
    runtime: Arc<Runtime>,
    pub method: Method,
    pub https: bool,
    pub host: String,
    /// Raw request path
    pub path: String,
    /// Raw query string
    pub query: String,
    pub request_headers: HeaderMap,
    /// Raw POST body, kept when the route sets `post_encoding`
    pub request_body: Option<Bytes>,
    pub ajax_request: bool,
    /// JSONP callback popped from the `callback` argument
    pub json_callback: Option<Arg>,
    /// Set by a renderer to skip the remaining renderers
    pub end_pipeline: bool,

    status: u16,
    headers: Vec<(String, String)>,
    cookies: Vec<ResponseCookie>,

    request_cookies: OnceLock<HashMap<String, String>>,
    user_id: OnceLock<Option<String>>,
    is_admin: OnceLock<bool>,
    xsrf_token: Option<String>,
}

impl Context {
    pub fn new(runtime: Arc<Runtime>, env: &Environ) -> Self {
        Self {
            runtime,
            method: env.method.clone(),
            https: env.https,
            host: env.host.clone(),
            path: env.path.clone(),
            query: env.query.clone(),
            request_headers: env.headers.clone(),
            request_body: None,
            ajax_request: false,
            json_callback: None,
            end_pipeline: false,
            status: 200,
            headers: Vec::new(),
            cookies: Vec::new(),
            request_cookies: OnceLock::new(),
            user_id: OnceLock::new(),
            is_admin: OnceLock::new(),
            xsrf_token: None,
        }
    }

    pub fn settings(&self) -> &AppSettings {
        &self.runtime.settings
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub const fn scheme(&self) -> &'static str {
        if self.https {
            "https"
        } else {
            "http"
        }
    }

    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.request_headers.get(name).and_then(|v| v.to_str().ok())
    }

    // -- response status and headers

    pub const fn status(&self) -> u16 {
        self.status
    }

    pub fn set_response_status(&mut self, code: u16) {
        self.status = code;
    }

    /// Set a response header, replacing any existing value
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    /// Add a response header, keeping existing values
    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((name.to_string(), value.into()));
    }

    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Buffered headers followed by one `Set-Cookie` per cookie
    pub fn response_headers(&self) -> Vec<(String, String)> {
        let mut headers = self.headers.clone();
        headers.extend(
            self.cookies
                .iter()
                .map(|c| ("Set-Cookie".to_string(), c.to_header_value())),
        );
        headers
    }

    pub fn cache_response(&mut self, duration: u32) {
        let policy = CachePolicy::Public(duration);
        self.set_header("Pragma", policy.pragma());
        self.set_header("Cache-Control", policy.to_header_value());
    }

    pub fn do_not_cache_response(&mut self) {
        let policy = CachePolicy::NoCache;
        self.set_header("Expires", EXPIRED_DATE);
        self.set_header("Last-Modified", http_date_now());
        self.set_header("Cache-Control", policy.to_header_value());
        self.set_header("Pragma", policy.pragma());
    }

    // -- cookies

    fn request_cookies(&self) -> &HashMap<String, String> {
        self.request_cookies.get_or_init(|| {
            self.request_headers
                .get_all(hyper::header::COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(|h| cookies::parse_cookie_header(h).into_iter())
                .collect()
        })
    }

    pub fn get_cookie(&self, name: &str) -> Option<&str> {
        self.request_cookies().get(name).map(String::as_str)
    }

    /// Value of a signed, timestamped cookie set with `set_secure_cookie`
    pub fn get_secure_cookie(&self, name: &str) -> Option<String> {
        let key = self.settings().secure_cookie_key.as_bytes();
        self.get_secure_cookie_with(name, key, true)
    }

    pub fn get_secure_cookie_with(&self, name: &str, key: &[u8], timestamped: bool) -> Option<String> {
        let signed = self.get_cookie(name)?;
        crypto::validate_tamper_proof_string(name, signed, key, timestamped)
    }

    /// Queue a cookie; the path defaults to `/` and HTTPS requests default to
    /// `Secure`
    pub fn set_cookie(
        &mut self,
        name: &str,
        value: &str,
        mut options: CookieOptions,
    ) -> Result<(), CookieError> {
        cookies::validate_name(name)?;
        if options.path.is_none() {
            options.path = Some("/".to_string());
        }
        if options.secure.is_none() && self.https {
            options.secure = Some(true);
        }
        let cookie = ResponseCookie {
            name: name.to_string(),
            value: value.to_string(),
            options,
        };
        match self.cookies.iter_mut().find(|c| c.name == name) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
        Ok(())
    }

    /// Sign `value` with the configured key and lifetime
    pub fn set_secure_cookie(
        &mut self,
        name: &str,
        value: &str,
        options: CookieOptions,
    ) -> Result<(), CookieError> {
        let settings = self.settings();
        let signed = crypto::create_tamper_proof_string(
            name,
            value,
            settings.secure_cookie_key.as_bytes(),
            Some(settings.secure_cookie_duration),
        );
        self.set_cookie(name, &signed, options)
    }

    /// Append `value` to a queued cookie as `old:new`
    pub fn append_to_cookie(&mut self, name: &str, value: &str) -> Result<(), CookieError> {
        if let Some(existing) = self.cookies.iter_mut().find(|c| c.name == name) {
            existing.value = format!("{}:{value}", existing.value);
            return Ok(());
        }
        cookies::validate_name(name)?;
        self.cookies.push(ResponseCookie {
            name: name.to_string(),
            value: value.to_string(),
            options: CookieOptions::default(),
        });
        Ok(())
    }

    /// Replace any queued cookie with one that expires immediately
    pub fn expire_cookie(&mut self, name: &str, mut options: CookieOptions) -> Result<(), CookieError> {
        self.cookies.retain(|c| c.name != name);
        options.max_age = Some(0);
        options.expires = Some(COOKIE_EXPIRED_DATE.to_string());
        self.set_cookie(name, "", options)
    }

    pub fn response_cookies(&self) -> &[ResponseCookie] {
        &self.cookies
    }

    // -- URLs

    pub fn site_url(&self) -> String {
        let host = self.settings().site_host.as_deref().unwrap_or(&self.host);
        format!("{}://{host}", self.scheme())
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.site_url(), self.path)
    }

    pub fn url_with_qs(&self) -> String {
        if self.query.is_empty() {
            self.url()
        } else {
            format!("{}?{}", self.url(), self.query)
        }
    }

    pub fn compute_url(&self, args: &[&str], params: &Kwargs) -> String {
        let host = self.settings().site_host.as_deref().unwrap_or(&self.host);
        url::compute_url_for_host(self.scheme(), host, args, params)
    }

    pub fn compute_url_for_host(&self, host: &str, args: &[&str], params: &Kwargs) -> String {
        url::compute_url_for_host(self.scheme(), host, args, params)
    }

    pub fn login_url(&self) -> String {
        self.runtime.identity.login_url(self)
    }

    pub fn static_url(&self, name: &str) -> String {
        self.runtime.assets.url(name, &self.host, self.https)
    }

    // -- identity

    pub fn user_id(&self) -> Option<&str> {
        self.user_id
            .get_or_init(|| self.runtime.identity.user_id(self))
            .as_deref()
    }

    pub fn is_admin(&self) -> bool {
        *self
            .is_admin
            .get_or_init(|| self.runtime.identity.is_admin(self))
    }

    /// The session's XSRF token, created and stored in a signed cookie on
    /// first use
    pub fn xsrf_token(&mut self) -> Result<String, CookieError> {
        if let Some(ref token) = self.xsrf_token {
            return Ok(token.clone());
        }
        let token = match self.get_secure_cookie(XSRF_COOKIE) {
            Some(token) if !token.is_empty() => token,
            _ => {
                let mut bytes = [0u8; 18];
                rand::rng().fill(&mut bytes);
                let token = hex::encode(bytes);
                self.set_secure_cookie(XSRF_COOKIE, &token, CookieOptions::default())?;
                token
            }
        };
        self.xsrf_token = Some(token.clone());
        Ok(token)
    }

    // -- templates

    /// Variables every template sees as `ctx`
    pub fn template_vars(&self) -> Value {
        json!({
            "host": self.host,
            "https": self.https,
            "path": self.path,
            "url": self.url(),
            "site_url": self.site_url(),
            "user_id": self.user_id(),
            "is_admin": self.is_admin(),
            "ajax_request": self.ajax_request,
            "debug": self.settings().debug,
        })
    }

    /// Render a template with `data` plus `ctx`, `xsrf_token` and `STATIC`
    pub fn render_template(&mut self, name: &str, mut data: Map<String, Value>) -> Result<String, Halt> {
        let token = self.xsrf_token()?;
        data.insert("ctx".to_string(), self.template_vars());
        data.insert("xsrf_token".to_string(), Value::String(token));
        data.insert(
            "STATIC".to_string(),
            Value::Object(self.runtime.assets.url_map(&self.host, self.https)),
        );
        self.runtime.templates.render(name, data).map_err(|err| {
            let trace = err.trace();
            let failure = Failure::new(err);
            Halt::Failure(match trace {
                Some(trace) => failure.with_trace(trace),
                None => failure,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::config::AppSettings;

    fn settings() -> AppSettings {
        AppSettings {
            secure_cookie_key: "test-key".to_string(),
            site_host: None,
            ..AppSettings::default()
        }
    }

    fn context(env: &Environ) -> Context {
        let app = App::builder(settings()).build().unwrap();
        Context::new(app.runtime(), env)
    }

    #[test]
    fn test_set_cookie_defaults() {
        let mut ctx = context(&Environ::new(Method::GET, "/").with_https());
        ctx.set_cookie("a", "1", CookieOptions::default()).unwrap();
        assert_eq!(
            ctx.response_headers(),
            vec![("Set-Cookie".to_string(), "a=1; Path=/; Secure".to_string())]
        );
        assert!(ctx.set_cookie("bad name", "1", CookieOptions::default()).is_err());
    }

    #[test]
    fn test_append_and_expire_cookie() {
        let mut ctx = context(&Environ::new(Method::GET, "/"));
        ctx.append_to_cookie("seen", "a").unwrap();
        ctx.append_to_cookie("seen", "b").unwrap();
        assert_eq!(ctx.response_cookies()[0].value, "a:b");

        ctx.expire_cookie("seen", CookieOptions::default()).unwrap();
        let cookie = &ctx.response_cookies()[0];
        assert_eq!(cookie.value, "");
        assert_eq!(cookie.options.max_age, Some(0));
        assert_eq!(cookie.options.path.as_deref(), Some("/"));
        assert_eq!(ctx.response_cookies().len(), 1);
    }

    #[test]
    fn test_secure_cookie_round_trip() {
        let mut ctx = context(&Environ::new(Method::GET, "/"));
        ctx.set_secure_cookie("session", "user-1", CookieOptions::default())
            .unwrap();
        let signed = ctx.response_cookies()[0].value.clone();

        let env = Environ::new(Method::GET, "/").with_header("Cookie", &format!("session={signed}"));
        assert_eq!(context(&env).get_secure_cookie("session").as_deref(), Some("user-1"));

        let tampered = signed.replacen('|', "x|", 1);
        let env = Environ::new(Method::GET, "/").with_header("Cookie", &format!("session={tampered}"));
        assert_eq!(context(&env).get_secure_cookie("session"), None);
    }

    #[test]
    fn test_xsrf_token_generated_once() {
        let mut ctx = context(&Environ::new(Method::GET, "/"));
        let token = ctx.xsrf_token().unwrap();
        assert_eq!(token.len(), 36);
        assert_eq!(ctx.xsrf_token().unwrap(), token);
        assert_eq!(ctx.response_cookies().len(), 1);
        assert_eq!(ctx.response_cookies()[0].name, "xsrf");
    }

    #[test]
    fn test_xsrf_token_read_from_cookie() {
        let mut first = context(&Environ::new(Method::GET, "/"));
        let token = first.xsrf_token().unwrap();
        let signed = first.response_cookies()[0].value.clone();

        let env = Environ::new(Method::GET, "/").with_header("Cookie", &format!("xsrf={signed}"));
        let mut second = context(&env);
        assert_eq!(second.xsrf_token().unwrap(), token);
        assert!(second.response_cookies().is_empty());
    }

    #[test]
    fn test_urls() {
        let env = Environ::new(Method::GET, "/a/b?x=1").with_host("example.com");
        let ctx = context(&env);
        assert_eq!(ctx.site_url(), "http://example.com");
        assert_eq!(ctx.url(), "http://example.com/a/b");
        assert_eq!(ctx.url_with_qs(), "http://example.com/a/b?x=1");
        assert_eq!(
            ctx.login_url(),
            "http://example.com/login?return_to=http%3A//example.com/a/b%3Fx%3D1"
        );
    }

    #[test]
    fn test_cache_headers() {
        let mut ctx = context(&Environ::new(Method::GET, "/"));
        ctx.cache_response(60);
        assert_eq!(ctx.response_header("Pragma"), Some("Public"));
        assert_eq!(ctx.response_header("cache-control"), Some("public, max-age=60"));

        ctx.do_not_cache_response();
        assert_eq!(ctx.response_header("Pragma"), Some("no-cache"));
        assert_eq!(ctx.response_header("Expires"), Some(EXPIRED_DATE));
        assert!(ctx.response_header("Last-Modified").is_some());
        assert_eq!(ctx.response_headers().len(), 4);
    }

    #[test]
    fn test_anonymous_identity() {
        let ctx = context(&Environ::new(Method::GET, "/"));
        assert_eq!(ctx.user_id(), None);
        assert!(!ctx.is_admin());
    }
}
