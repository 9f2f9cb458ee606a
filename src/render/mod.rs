//! Renderer pipeline
//!
//! A route may list renderers that turn the handler's reply into the final
//! body. Each renderer receives the previous value as an object of template
//! variables.

pub mod assets;
pub mod templates;

pub use assets::{AssetsError, StaticAssets};
pub use templates::{TemplateEngine, TemplateError, TemplateTrace};

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::handler::{Outcome, Reply};

pub type RenderFn = dyn Fn(&mut Context, Map<String, Value>) -> Outcome + Send + Sync;

#[derive(Clone)]
pub enum Renderer {
    /// Template name, resolved by the template engine
    Template(String),
    Func(Arc<RenderFn>),
}

impl Renderer {
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&mut Context, Map<String, Value>) -> Outcome + Send + Sync + 'static,
    {
        Self::Func(Arc::new(f))
    }
}

impl From<&str> for Renderer {
    fn from(name: &str) -> Self {
        Self::Template(name.to_string())
    }
}

impl From<String> for Renderer {
    fn from(name: String) -> Self {
        Self::Template(name)
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(name) => f.debug_tuple("Template").field(name).finish(),
            Self::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Pass `content` through each renderer in turn until one sets
/// `ctx.end_pipeline`
pub fn run_pipeline(ctx: &mut Context, renderers: &[Renderer], mut content: Reply) -> Outcome {
    for renderer in renderers {
        if ctx.end_pipeline {
            break;
        }
        let data = content.into_render_data();
        content = match renderer {
            Renderer::Template(name) => Reply::Text(ctx.render_template(name, data)?),
            Renderer::Func(f) => f(ctx, data)?,
        };
    }
    Ok(content)
}
