//! Template engine
//!
//! Tera templates loaded from the configured directory. In debug mode the
//! directory is re-read before every render so edits show up immediately.

use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use tera::Tera;
use thiserror::Error;

use crate::http::escape_html;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("cannot find template {0}")]
    NotFound(String),
    #[error("failed to load templates from {dir}")]
    Load {
        dir: String,
        #[source]
        source: tera::Error,
    },
    #[error("failed to render template {template}")]
    Render {
        template: String,
        #[source]
        source: tera::Error,
    },
}

impl TemplateError {
    /// Diagnostics for the error page, when a template was involved
    pub fn trace(&self) -> Option<TemplateTrace> {
        match self {
            Self::NotFound(_) => None,
            Self::Load { dir, source } => Some(TemplateTrace::from_error(dir, source)),
            Self::Render { template, source } => {
                Some(TemplateTrace::from_error(template, source))
            }
        }
    }
}

/// Where a template failed and the messages tera reported, outermost first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateTrace {
    pub template: String,
    pub messages: Vec<String>,
}

impl TemplateTrace {
    fn from_error(template: &str, error: &tera::Error) -> Self {
        let mut messages = vec![error.to_string()];
        let mut source = std::error::Error::source(error);
        while let Some(err) = source {
            messages.push(err.to_string());
            source = err.source();
        }
        Self {
            template: template.to_string(),
            messages,
        }
    }

    pub fn to_plain(&self) -> String {
        let mut out = format!("Template error in {}:\n", self.template);
        for message in &self.messages {
            out.push_str("  ");
            out.push_str(message);
            out.push('\n');
        }
        out
    }

    pub fn to_html(&self) -> String {
        let mut out = format!(
            "<div class=\"stacktrace\"><strong>Template error in {}</strong><ul>",
            escape_html(&self.template)
        );
        for message in &self.messages {
            out.push_str(&format!("<li><pre>{}</pre></li>", escape_html(message)));
        }
        out.push_str("</ul></div>");
        out
    }
}

pub struct TemplateEngine {
    tera: RwLock<Tera>,
    dir: Option<String>,
    reload: bool,
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("dir", &self.dir)
            .field("reload", &self.reload)
            .finish_non_exhaustive()
    }
}

impl TemplateEngine {
    /// Load every template under `dir`; a missing directory gives an empty
    /// engine
    pub fn from_dir(dir: &str, reload: bool) -> Result<Self, TemplateError> {
        if !Path::new(dir).is_dir() {
            return Ok(Self::from_tera(Tera::default()));
        }
        let pattern = format!("{}/**/*", dir.trim_end_matches('/'));
        let tera = Tera::new(&pattern).map_err(|source| TemplateError::Load {
            dir: dir.to_string(),
            source,
        })?;
        Ok(Self {
            tera: RwLock::new(tera),
            dir: Some(dir.to_string()),
            reload,
        })
    }

    /// Engine holding only the given in-memory templates
    pub fn from_raw<'a>(
        templates: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, TemplateError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|source| TemplateError::Load {
                dir: "<memory>".to_string(),
                source,
            })?;
        Ok(Self::from_tera(tera))
    }

    fn from_tera(tera: Tera) -> Self {
        Self {
            tera: RwLock::new(tera),
            dir: None,
            reload: false,
        }
    }

    /// Render `name` (or `name.html`) with the object `data` as variables
    pub fn render(&self, name: &str, data: Map<String, Value>) -> Result<String, TemplateError> {
        if self.reload && self.dir.is_some() {
            let mut tera = self.tera.write().unwrap_or_else(PoisonError::into_inner);
            tera.full_reload().map_err(|source| TemplateError::Load {
                dir: self.dir.clone().unwrap_or_default(),
                source,
            })?;
        }

        let tera = self.tera.read().unwrap_or_else(PoisonError::into_inner);
        let template = Self::resolve(&tera, name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        let context = tera::Context::from_value(Value::Object(data)).map_err(|source| {
            TemplateError::Render {
                template: template.clone(),
                source,
            }
        })?;
        tera.render(&template, &context)
            .map_err(|source| TemplateError::Render { template, source })
    }

    fn resolve(tera: &Tera, name: &str) -> Option<String> {
        let with_ext = format!("{name}.html");
        tera.get_template_names()
            .find(|t| *t == name || *t == with_ext)
            .map(ToString::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_render_with_and_without_extension() {
        let engine = TemplateEngine::from_raw([
            ("hello.html", "Hello {{ name }}!"),
            ("plain.txt", "{{ content }}"),
        ])
        .unwrap();
        assert_eq!(
            engine.render("hello", data(json!({"name": "<b>"}))).unwrap(),
            "Hello &lt;b&gt;!"
        );
        assert_eq!(
            engine.render("plain.txt", data(json!({"content": "<b>"}))).unwrap(),
            "<b>"
        );
    }

    #[test]
    fn test_missing_template() {
        let engine = TemplateEngine::from_raw([]).unwrap();
        let err = engine.render("nope", Map::new()).unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(_)));
        assert!(err.trace().is_none());
    }

    #[test]
    fn test_render_error_trace() {
        let engine = TemplateEngine::from_raw([("broken.html", "{{ missing.field }}")]).unwrap();
        let err = engine.render("broken", Map::new()).unwrap_err();
        let trace = err.trace().unwrap();
        assert_eq!(trace.template, "broken.html");
        assert!(!trace.messages.is_empty());
        assert!(trace.to_plain().starts_with("Template error in broken.html"));
        assert!(trace.to_html().contains("stacktrace"));
    }

    #[test]
    fn test_from_dir_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "v1").unwrap();

        let engine = TemplateEngine::from_dir(dir.path().to_str().unwrap(), true).unwrap();
        assert_eq!(engine.render("page", Map::new()).unwrap(), "v1");

        std::fs::write(&path, "v2").unwrap();
        assert_eq!(engine.render("page", Map::new()).unwrap(), "v2");
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let engine = TemplateEngine::from_dir("/nonexistent/templates", false).unwrap();
        assert!(matches!(
            engine.render("any", Map::new()),
            Err(TemplateError::NotFound(_))
        ));
    }
}
