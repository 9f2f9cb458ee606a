//! Handler registry
//!
//! Routes are registered by name while the `App` is built and are read-only
//! once serving starts.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::args::Kwargs;
use super::body::Charset;
use super::halt::Outcome;
use crate::context::Context;
use crate::render::Renderer;

pub type HandlerFn = dyn Fn(&mut Context, Vec<String>, Kwargs) -> Outcome + Send + Sync;

/// How a POST body is decoded as JSON
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JsonMode {
    /// Only when the request says `application/json`
    #[default]
    Off,
    /// Always decode; the payload object is merged into kwargs
    Merge,
    /// Always decode; the payload is stored under this key
    Nested(String),
}

/// Per-route policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    pub admin: bool,
    pub anon: bool,
    pub blob: bool,
    pub json: JsonMode,
    pub post_encoding: Option<Charset>,
    pub ssl: bool,
    pub xsrf: bool,
}

impl HandlerConfig {
    pub fn defaults(ssl_only: bool) -> Self {
        Self {
            admin: false,
            anon: true,
            blob: false,
            json: JsonMode::Off,
            post_encoding: None,
            ssl: ssl_only,
            xsrf: false,
        }
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self::defaults(false)
    }
}

pub struct Route {
    pub handler: Arc<HandlerFn>,
    pub renderers: Vec<Renderer>,
    pub config: HandlerConfig,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("renderers", &self.renderers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Picks the route for a request instead of the first path segment
pub trait Router: Send + Sync {
    /// Route name and positional args, or `None` for not found
    fn route(&self, ctx: &Context, segments: &[String], kwargs: &Kwargs)
        -> Option<(String, Vec<String>)>;
}

impl<F> Router for F
where
    F: Fn(&Context, &[String], &Kwargs) -> Option<(String, Vec<String>)> + Send + Sync,
{
    fn route(
        &self,
        ctx: &Context,
        segments: &[String],
        kwargs: &Kwargs,
    ) -> Option<(String, Vec<String>)> {
        self(ctx, segments, kwargs)
    }
}

#[derive(Debug, Default)]
pub struct HandlerRegistry {
    routes: HashMap<String, Arc<Route>>,
    defaults: HandlerConfig,
}

impl HandlerRegistry {
    pub fn new(defaults: HandlerConfig) -> Self {
        Self {
            routes: HashMap::new(),
            defaults,
        }
    }

    /// Start registering `handler` under the space-separated `names`
    pub fn handle<F>(&mut self, names: &str, handler: F) -> RouteBuilder<'_>
    where
        F: Fn(&mut Context, Vec<String>, Kwargs) -> Outcome + Send + Sync + 'static,
    {
        let config = self.defaults.clone();
        RouteBuilder {
            registry: self,
            names: names.to_string(),
            handler: Arc::new(handler),
            renderers: Vec::new(),
            config,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Route>> {
        self.routes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}

/// Route settings merged over the registry defaults; nothing is stored
/// until `register` is called
#[must_use = "routes are only stored by `register()`"]
pub struct RouteBuilder<'a> {
    registry: &'a mut HandlerRegistry,
    names: String,
    handler: Arc<HandlerFn>,
    renderers: Vec<Renderer>,
    config: HandlerConfig,
}

impl RouteBuilder<'_> {
    /// Only admins may call the route; others get a 404
    pub const fn admin(mut self, admin: bool) -> Self {
        self.config.admin = admin;
        self
    }

    /// Allow users who are not logged in
    pub const fn anon(mut self, anon: bool) -> Self {
        self.config.anon = anon;
        self
    }

    /// Turn multipart file fields into blob references
    pub const fn blob(mut self, blob: bool) -> Self {
        self.config.blob = blob;
        self
    }

    /// Decode every POST body as JSON and merge it into kwargs
    pub fn json(mut self) -> Self {
        self.config.json = JsonMode::Merge;
        self
    }

    /// Decode every POST body as JSON and pass it as the `key` argument
    pub fn json_nested(mut self, key: &str) -> Self {
        self.config.json = JsonMode::Nested(key.to_string());
        self
    }

    /// Decode form fields with `charset` and keep the raw body on the context
    pub const fn post_encoding(mut self, charset: Charset) -> Self {
        self.config.post_encoding = Some(charset);
        self
    }

    /// Hide the route from plain HTTP requests on the hosting platform
    pub const fn ssl(mut self, ssl: bool) -> Self {
        self.config.ssl = ssl;
        self
    }

    /// Require an `xsrf` argument matching the session token
    pub const fn xsrf(mut self, xsrf: bool) -> Self {
        self.config.xsrf = xsrf;
        self
    }

    pub fn renderer(mut self, renderer: impl Into<Renderer>) -> Self {
        self.renderers.push(renderer.into());
        self
    }

    pub fn register(self) {
        let route = Arc::new(Route {
            handler: self.handler,
            renderers: self.renderers,
            config: self.config,
        });
        for name in self.names.split_whitespace() {
            self.registry.routes.insert(name.to_string(), Arc::clone(&route));
        }
    }
}
