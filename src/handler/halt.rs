//! Handler outcomes
//!
//! Handlers return `Outcome`: either a `Reply` for the renderer pipeline or a
//! `Halt` that ends the request with a fixed kind of response.

use hyper::body::Bytes;
use serde_json::Value;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

use crate::render::TemplateTrace;

pub type Outcome = Result<Reply, Halt>;

/// Value produced by a handler or renderer
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    None,
    Text(String),
    Bytes(Bytes),
    Data(Value),
}

impl Reply {
    /// Wrap for the next renderer: nothing (or JSON null) becomes
    /// `{"content": ""}` and non-objects become `{"content": value}`
    pub fn into_render_data(self) -> serde_json::Map<String, Value> {
        let content = match self {
            Self::None | Self::Data(Value::Null) => Value::String(String::new()),
            Self::Data(Value::Object(map)) => return map,
            Self::Data(value) => value,
            Self::Text(text) => Value::String(text),
            Self::Bytes(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        };
        let mut map = serde_json::Map::new();
        map.insert("content".to_string(), content);
        map
    }
}

impl From<()> for Reply {
    fn from((): ()) -> Self {
        Self::None
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Bytes> for Reply {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::Data(value)
    }
}

/// Response directive that short-circuits the handler pipeline
#[derive(Debug)]
pub enum Halt {
    /// Body ready to send as-is with the context's status and headers
    Content(Bytes),
    Redirect { uri: String, permanent: bool },
    NotFound,
    Auth(String),
    Forbidden,
    /// Bare status code, no headers, empty body
    Status(u16),
    /// A platform capability is disabled (maintenance, read-only mode)
    Unavailable(String),
    Failure(Failure),
}

impl Halt {
    pub fn redirect(uri: impl Into<String>) -> Self {
        Self::Redirect {
            uri: uri.into(),
            permanent: false,
        }
    }

    pub fn permanent_redirect(uri: impl Into<String>) -> Self {
        Self::Redirect {
            uri: uri.into(),
            permanent: true,
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn content(body: impl Into<Bytes>) -> Self {
        Self::Content(body.into())
    }

    /// Uncaught failure carrying only a message
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(Failure::new(Message(message.into())))
    }
}

impl<E> From<E> for Halt
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::Failure(Failure::new(error))
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

/// An unexpected error that ends the request with a 500
pub struct Failure {
    error: Box<dyn StdError + Send + Sync>,
    type_name: String,
    trace: Option<TemplateTrace>,
}

impl Failure {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            type_name: short_type_name::<E>().to_string(),
            error: Box::new(error),
            trace: None,
        }
    }

    #[must_use]
    pub fn with_trace(mut self, trace: TemplateTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub const fn trace(&self) -> Option<&TemplateTrace> {
        self.trace.as_ref()
    }

    pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.error.as_ref()
    }

    /// The error followed by each of its sources
    pub fn chain(&self) -> Vec<String> {
        let mut chain = vec![self.error.to_string()];
        let mut source = self.error.source();
        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }
        chain
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.error)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("type_name", &self.type_name)
            .field("error", &self.error)
            .field("trace", &self.trace)
            .finish()
    }
}

/// Last path segment of a type name, without generic parameters
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
