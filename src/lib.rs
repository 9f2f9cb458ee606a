//! weblite: a small request-dispatch framework
//!
//! Handlers are registered by name on an [`AppBuilder`]; each request is
//! routed by its first path segment (or a custom [`Router`]), checked against
//! the route's policies, passed to the handler and optionally through a chain
//! of renderers before being turned into exactly one HTTP response.

pub mod app;
pub mod config;
pub mod context;
pub mod crypto;
pub mod handler;
pub mod http;
pub mod logger;
pub mod render;
pub mod server;
pub mod services;

pub use app::{App, AppBuilder, AppError};
pub use config::Config;
pub use context::Context;
pub use handler::{handle_http_request, Arg, Halt, Kwargs, Outcome, Reply, Router};
pub use render::Renderer;
pub use services::{default_services, register_endpoint, ServiceRegistry};
