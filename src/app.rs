//! Application
//!
//! An `App` owns everything a request needs: settings, the handler registry,
//! an optional router, the identity provider, templates, static assets and
//! error pages. It is built once at startup and shared read-only afterwards.

use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::{Request, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::config::{AppSettings, Config, HttpConfig, ServiceSettings};
use crate::context::{Context, CookieIdentity, Identity};
use crate::handler::{self, HandlerConfig, HandlerRegistry, Kwargs, Outcome, RouteBuilder, Router};
use crate::http::{self, Environ, EnvironError, ErrorPages};
use crate::logger::{self, AccessLogEntry};
use crate::render::{AssetsError, StaticAssets, TemplateEngine, TemplateError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Templates(#[from] TemplateError),
    #[error(transparent)]
    Assets(#[from] AssetsError),
    #[error("app.secure_cookie_key must be set when signed cookies identify users or carry XSRF tokens")]
    MissingCookieKey,
}

/// Shared, read-only state every request context points at
pub struct Runtime {
    pub settings: AppSettings,
    pub service: ServiceSettings,
    pub identity: Box<dyn Identity>,
    pub templates: TemplateEngine,
    pub assets: StaticAssets,
    pub pages: ErrorPages,
}

pub struct App {
    runtime: Arc<Runtime>,
    handlers: HandlerRegistry,
    router: Option<Box<dyn Router>>,
    http: HttpConfig,
    access_log: Option<String>,
}

impl App {
    pub fn builder(settings: AppSettings) -> AppBuilder {
        AppBuilder::new(settings)
    }

    pub fn runtime(&self) -> Arc<Runtime> {
        Arc::clone(&self.runtime)
    }

    pub const fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn router(&self) -> Option<&dyn Router> {
        self.router.as_deref()
    }

    /// Dispatch one request environment and write its access log line
    pub async fn dispatch(&self, env: Environ) -> Response<Full<Bytes>> {
        let start = Instant::now();
        let entry = self.access_log.as_ref().map(|_| access_entry(&env));
        let response = handler::handle_http_request(self, env).await;

        if let (Some(format), Some(mut entry)) = (self.access_log.as_deref(), entry) {
            entry.status = response.status().as_u16();
            entry.body_bytes =
                usize::try_from(response.body().size_hint().lower()).unwrap_or_default();
            entry.request_time_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
            logger::log_access(&entry, format);
        }
        response
    }

    /// Read a hyper request and dispatch it
    pub async fn serve<B>(&self, req: Request<B>, remote_addr: Option<SocketAddr>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        match Environ::from_request(req, remote_addr, &self.http).await {
            Ok(env) => self.dispatch(env).await,
            Err(EnvironError::TooLarge(limit)) => {
                logger::log_warning(&format!("Request body exceeds {limit} bytes"));
                http::build_413_response()
            }
            Err(err) => {
                logger::log_warning(&err.to_string());
                http::build_status_response(400)
            }
        }
    }
}

fn access_entry(env: &Environ) -> AccessLogEntry {
    let mut entry = AccessLogEntry::new(
        env.remote_addr
            .map_or_else(|| "-".to_string(), |addr| addr.ip().to_string()),
        env.method.to_string(),
        env.path.clone(),
    );
    entry.query = (!env.query.is_empty()).then(|| env.query.clone());
    entry.referer = env.header("referer").map(ToString::to_string);
    entry.user_agent = env.header("user-agent").map(ToString::to_string);
    entry
}

pub struct AppBuilder {
    settings: AppSettings,
    service: ServiceSettings,
    http: HttpConfig,
    identity: Option<Box<dyn Identity>>,
    templates: Option<TemplateEngine>,
    assets: Option<StaticAssets>,
    router: Option<Box<dyn Router>>,
    handlers: HandlerRegistry,
    access_log: Option<String>,
}

impl AppBuilder {
    pub fn new(settings: AppSettings) -> Self {
        let handlers = HandlerRegistry::new(HandlerConfig::defaults(settings.ssl_only));
        Self {
            settings,
            service: ServiceSettings::default(),
            http: HttpConfig {
                server_name: concat!("weblite/", env!("CARGO_PKG_VERSION")).to_string(),
                max_body_size: 10 * 1024 * 1024,
                trust_forwarded_proto: false,
            },
            identity: None,
            templates: None,
            assets: None,
            router: None,
            handlers,
            access_log: None,
        }
    }

    /// Builder carrying every setting from a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        let mut builder = Self::new(config.app.clone())
            .service(config.service.clone())
            .http(config.http.clone());
        if config.logging.access_log {
            builder = builder.access_log(&config.logging.access_log_format);
        }
        builder
    }

    #[must_use]
    pub fn service(mut self, service: ServiceSettings) -> Self {
        self.service = service;
        self
    }

    #[must_use]
    pub fn http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    #[must_use]
    pub fn identity(mut self, identity: impl Identity + 'static) -> Self {
        self.identity = Some(Box::new(identity));
        self
    }

    #[must_use]
    pub fn templates(mut self, templates: TemplateEngine) -> Self {
        self.templates = Some(templates);
        self
    }

    #[must_use]
    pub fn assets(mut self, assets: StaticAssets) -> Self {
        self.assets = Some(assets);
        self
    }

    #[must_use]
    pub fn router(mut self, router: impl Router + 'static) -> Self {
        self.router = Some(Box::new(router));
        self
    }

    /// Write an access log line in `format` after every request
    #[must_use]
    pub fn access_log(mut self, format: &str) -> Self {
        self.access_log = Some(format.to_string());
        self
    }

    pub const fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.handlers
    }

    /// Register a handler; see [`HandlerRegistry::handle`]
    pub fn handle<F>(&mut self, names: &str, handler: F) -> RouteBuilder<'_>
    where
        F: Fn(&mut Context, Vec<String>, Kwargs) -> Outcome + Send + Sync + 'static,
    {
        self.handlers.handle(names, handler)
    }

    /// Signed cookies are trusted by the default identity and by XSRF checks
    fn needs_cookie_key(&self) -> bool {
        self.identity.is_none()
            || self
                .handlers
                .names()
                .filter_map(|name| self.handlers.get(name))
                .any(|route| route.config.xsrf)
    }

    /// Load whatever was not supplied explicitly from the settings
    pub fn build(self) -> Result<App, AppError> {
        if self.settings.secure_cookie_key.is_empty() && self.needs_cookie_key() {
            return Err(AppError::MissingCookieKey);
        }
        let settings = self.settings;

        let templates = match self.templates {
            Some(templates) => templates,
            None => TemplateEngine::from_dir(&settings.template_dir, settings.debug)?,
        };

        let assets = match self.assets {
            Some(assets) => assets,
            None => {
                let manifest = match settings.assets_manifest {
                    Some(ref path) => StaticAssets::load_manifest(path)?,
                    None => std::collections::HashMap::new(),
                };
                StaticAssets::new(
                    manifest,
                    &settings.static_path,
                    settings.static_http_hosts.clone(),
                    settings.static_https_hosts.clone(),
                    settings.hosted,
                )
            }
        };

        let stylesheet = assets.contains("site.css").then(|| assets.path("site.css"));
        let pages = ErrorPages::new(stylesheet.as_deref());

        let identity = self.identity.unwrap_or_else(|| {
            Box::new(CookieIdentity::new(
                &settings.login_cookie,
                settings.admins.iter().cloned(),
            ))
        });

        Ok(App {
            runtime: Arc::new(Runtime {
                settings,
                service: self.service,
                identity,
                templates,
                assets,
                pages,
            }),
            handlers: self.handlers,
            router: self.router,
            http: self.http,
            access_log: self.access_log,
        })
    }
}
