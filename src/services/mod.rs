//! Service methods
//!
//! A second registry behind the single `service` route. Methods are looked
//! up by name and receive the request's `data` according to their arity:
//! nothing, the whole value, or the fields of an object as named parameters.

pub mod endpoint;
pub mod highlight;
pub mod phone;

pub use endpoint::register_endpoint;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::context::Context;
use crate::handler::halt::short_type_name;

type ServiceFn = dyn Fn(&mut Context, Value) -> Result<Value, ServiceError> + Send + Sync;

/// How a method receives `data`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    None,
    Single,
    Splat,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("missing service method")]
    MissingMethod,
    #[error("unknown service method: {0}")]
    UnknownMethod(String),
    #[error("invalid arguments for {method}: {source}")]
    Arguments {
        method: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{message}")]
    Failed { type_name: String, message: String },
}

impl ServiceError {
    /// Name reported in the `error.type` field of the reply
    pub fn type_name(&self) -> &str {
        match self {
            Self::MissingMethod | Self::Arguments { .. } => "ArgumentError",
            Self::UnknownMethod(_) => "UnknownMethod",
            Self::Failed { type_name, .. } => type_name,
        }
    }

    fn failed<E: std::error::Error>(err: &E) -> Self {
        Self::Failed {
            type_name: short_type_name::<E>().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<String, (Arc<ServiceFn>, Arity)>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("methods", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn encode<T: Serialize>(reply: &T) -> Result<Value, ServiceError> {
    serde_json::to_value(reply).map_err(|e| ServiceError::failed(&e))
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Method taking no arguments; `data` is ignored
    pub fn register_none<F, T, E>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut Context) -> Result<T, E> + Send + Sync + 'static,
        T: Serialize,
        E: std::error::Error,
    {
        let call = move |ctx: &mut Context, _data: Value| -> Result<Value, ServiceError> {
            f(ctx).map_err(|e| ServiceError::failed(&e)).and_then(|r| encode(&r))
        };
        self.insert(name, Arity::None, Arc::new(call));
    }

    /// Method receiving `data` as a single value
    pub fn register_single<F, A, T, E>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut Context, A) -> Result<T, E> + Send + Sync + 'static,
        A: DeserializeOwned,
        T: Serialize,
        E: std::error::Error,
    {
        let method = name.to_string();
        let call = move |ctx: &mut Context, data: Value| -> Result<Value, ServiceError> {
            let arg = serde_json::from_value(data).map_err(|source| ServiceError::Arguments {
                method: method.clone(),
                source,
            })?;
            f(ctx, arg).map_err(|e| ServiceError::failed(&e)).and_then(|r| encode(&r))
        };
        self.insert(name, Arity::Single, Arc::new(call));
    }

    /// Method receiving the fields of the `data` object as named parameters;
    /// `A` is usually a struct with `#[serde(deny_unknown_fields)]`
    pub fn register<F, A, T, E>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut Context, A) -> Result<T, E> + Send + Sync + 'static,
        A: DeserializeOwned,
        T: Serialize,
        E: std::error::Error,
    {
        let method = name.to_string();
        let call = move |ctx: &mut Context, data: Value| -> Result<Value, ServiceError> {
            let data = match data {
                Value::Null => Value::Object(serde_json::Map::new()),
                object @ Value::Object(_) => object,
                other => {
                    return Err(ServiceError::Arguments {
                        method: method.clone(),
                        source: serde::de::Error::custom(format!(
                            "expected an object of named parameters, got {other}"
                        )),
                    })
                }
            };
            let arg = serde_json::from_value(data).map_err(|source| ServiceError::Arguments {
                method: method.clone(),
                source,
            })?;
            f(ctx, arg).map_err(|e| ServiceError::failed(&e)).and_then(|r| encode(&r))
        };
        self.insert(name, Arity::Splat, Arc::new(call));
    }

    fn insert(&mut self, name: &str, arity: Arity, call: Arc<ServiceFn>) {
        self.services.insert(name.to_string(), (call, arity));
    }

    pub fn arity(&self, name: &str) -> Option<Arity> {
        self.services.get(name).map(|(_, arity)| *arity)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Call `method` with `data`
    pub fn call(&self, ctx: &mut Context, method: &str, data: Value) -> Result<Value, ServiceError> {
        let (call, _) = self
            .services
            .get(method)
            .ok_or_else(|| ServiceError::UnknownMethod(method.to_string()))?;
        call(ctx, data)
    }
}

/// Registry with the bundled services
pub fn default_services() -> ServiceRegistry {
    let mut services = ServiceRegistry::new();
    services.register("phonenumber.info", phone::info);
    services.register("syntax.highlight", highlight::highlight);
    services
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::config::AppSettings;
    use crate::http::Environ;
    use hyper::Method;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Error)]
    #[error("negative input")]
    struct NegativeError;

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct AddArgs {
        a: i64,
        #[serde(default)]
        b: i64,
    }

    fn context() -> Context {
        let app = App::builder(AppSettings {
            secure_cookie_key: "service-test-key".to_string(),
            ..AppSettings::default()
        })
        .build()
        .unwrap();
        Context::new(app.runtime(), &Environ::new(Method::POST, "/service"))
    }

    fn registry() -> ServiceRegistry {
        let mut services = ServiceRegistry::new();
        services.register_none("ping", |_ctx| Ok::<_, NegativeError>("pong"));
        services.register_single("double", |_ctx, n: i64| {
            if n < 0 {
                Err(NegativeError)
            } else {
                Ok(n * 2)
            }
        });
        services.register("add", |_ctx, args: AddArgs| Ok::<_, NegativeError>(args.a + args.b));
        services
    }

    #[test]
    fn test_arities() {
        let services = registry();
        let mut ctx = context();
        assert_eq!(services.call(&mut ctx, "ping", json!({"x": 1})).unwrap(), json!("pong"));
        assert_eq!(services.call(&mut ctx, "double", json!(21)).unwrap(), json!(42));
        assert_eq!(
            services.call(&mut ctx, "add", json!({"a": 1, "b": 2})).unwrap(),
            json!(3)
        );
        assert_eq!(services.call(&mut ctx, "add", json!({"a": 1})).unwrap(), json!(1));
        assert_eq!(services.arity("add"), Some(Arity::Splat));
        assert_eq!(services.arity("double"), Some(Arity::Single));
        assert_eq!(services.len(), 3);
    }

    #[test]
    fn test_errors() {
        let services = registry();
        let mut ctx = context();

        let err = services.call(&mut ctx, "nope", Value::Null).unwrap_err();
        assert_eq!(err.type_name(), "UnknownMethod");

        let err = services.call(&mut ctx, "add", json!({"a": 1, "c": 2})).unwrap_err();
        assert_eq!(err.type_name(), "ArgumentError");

        let err = services.call(&mut ctx, "add", json!([1, 2])).unwrap_err();
        assert_eq!(err.type_name(), "ArgumentError");

        let err = services.call(&mut ctx, "double", json!(-1)).unwrap_err();
        assert_eq!(err.type_name(), "NegativeError");
        assert_eq!(err.to_string(), "negative input");
    }

    #[test]
    fn test_default_services() {
        let services = default_services();
        assert_eq!(services.arity("phonenumber.info"), Some(Arity::Splat));
        assert_eq!(services.arity("syntax.highlight"), Some(Arity::Splat));
    }
}
