//! The `service` route
//!
//! Accepts `{method, token, data}` as a JSON body (or `method`/`token` in the
//! query string) and answers `{"reply": ...}` or `{"error": {type, message}}`.

use serde_json::{json, Value};
use std::sync::Arc;

use super::{ServiceError, ServiceRegistry};
use crate::app::AppBuilder;
use crate::context::Context;
use crate::crypto::secure_string_comparison;
use crate::handler::{Arg, Halt, Kwargs, Outcome, Reply};
use crate::logger;

pub const SERVICE_ROUTE: &str = "service";
const INBOUND_APP_ID_HEADER: &str = "x-appengine-inbound-appid";

/// Register the `service` route backed by `services`
pub fn register_endpoint(builder: &mut AppBuilder, services: ServiceRegistry) {
    let services = Arc::new(services);
    builder
        .handle(SERVICE_ROUTE, move |ctx, _args, kwargs| {
            handle_service(&services, ctx, kwargs)
        })
        .json()
        .register();
}

fn authorize(ctx: &Context, kwargs: &Kwargs) -> Result<(), Halt> {
    let service = &ctx.runtime().service;

    if ctx.settings().hosted {
        let caller = ctx.request_header(INBOUND_APP_ID_HEADER).unwrap_or_default();
        if caller != service.app_id {
            logger::log_warning(&format!("Service call from unexpected app: {caller:?}"));
            return Err(Halt::NotFound);
        }
    }

    let token = kwargs.get_str("token").unwrap_or_default();
    if service.token.is_empty() || !secure_string_comparison(token, &service.token) {
        logger::log_warning("Service call with an invalid token");
        return Err(Halt::NotFound);
    }
    Ok(())
}

fn handle_service(services: &ServiceRegistry, ctx: &mut Context, kwargs: Kwargs) -> Outcome {
    authorize(ctx, &kwargs)?;
    ctx.set_header("Content-Type", "application/json");

    let result = kwargs
        .get_str("method")
        .ok_or(ServiceError::MissingMethod)
        .and_then(|method| {
            let data = kwargs.get("data").map_or(Value::Null, Arg::to_json);
            services.call(ctx, method, data)
        });

    Ok(Reply::Data(match result {
        Ok(reply) => json!({ "reply": reply }),
        Err(err) => {
            logger::log_warning(&format!("Service call failed: {}: {err}", err.type_name()));
            json!({ "error": { "type": err.type_name(), "message": err.to_string() } })
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::config::{AppSettings, ServiceSettings};
    use crate::handler::handle_http_request;
    use crate::http::Environ;
    use crate::services::default_services;
    use http_body_util::BodyExt;
    use hyper::Method;

    const TOKEN: &str = "s3cret";

    fn service_app(hosted: bool, token: &str) -> App {
        let settings = AppSettings {
            hosted,
            secure_cookie_key: "endpoint-test-key".to_string(),
            ..AppSettings::default()
        };
        let mut builder = App::builder(settings).service(ServiceSettings {
            app_id: "caller-app".to_string(),
            token: token.to_string(),
        });
        register_endpoint(&mut builder, default_services());
        builder.build().unwrap()
    }

    fn post(body: &Value) -> Environ {
        Environ::new(Method::POST, "/service")
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
    }

    async fn call(app: &App, env: Environ) -> (u16, Option<String>, Value) {
        let response = handle_http_request(app, env).await;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, content_type, json)
    }

    #[tokio::test]
    async fn test_phonenumber_reply() {
        let app = service_app(false, TOKEN);
        let body = json!({
            "method": "phonenumber.info",
            "token": TOKEN,
            "data": {"number": "+44 20 7031 3000"},
        });
        let (status, content_type, reply) = call(&app, post(&body)).await;
        assert_eq!(status, 200);
        assert_eq!(content_type.as_deref(), Some("application/json"));
        assert_eq!(reply["reply"]["country_code"], 44);
        assert_eq!(reply["reply"]["e164"], "+442070313000");
    }

    #[tokio::test]
    async fn test_highlight_reply() {
        let app = service_app(false, TOKEN);
        let body = json!({
            "method": "syntax.highlight",
            "token": TOKEN,
            "data": {"text": "x = 1"},
        });
        let (_, _, reply) = call(&app, post(&body)).await;
        let html = reply["reply"].as_str().unwrap();
        assert!(html.starts_with("<div class=\"syntax txt\">"));
    }

    #[tokio::test]
    async fn test_bad_token_is_not_found() {
        let app = service_app(false, TOKEN);
        let body = json!({"method": "phonenumber.info", "token": "wrong"});
        assert_eq!(call(&app, post(&body)).await.0, 404);

        let body = json!({"method": "phonenumber.info"});
        assert_eq!(call(&app, post(&body)).await.0, 404);
    }

    #[tokio::test]
    async fn test_empty_configured_token_rejects_everything() {
        let app = service_app(false, "");
        let body = json!({"method": "phonenumber.info", "token": ""});
        assert_eq!(call(&app, post(&body)).await.0, 404);
    }

    #[tokio::test]
    async fn test_hosted_requires_app_id() {
        let app = service_app(true, TOKEN);
        let body = json!({
            "method": "syntax.highlight",
            "token": TOKEN,
            "data": {"text": "x"},
        });
        assert_eq!(call(&app, post(&body)).await.0, 404);

        let env = post(&body).with_header(INBOUND_APP_ID_HEADER, "other-app");
        assert_eq!(call(&app, env).await.0, 404);

        let env = post(&body).with_header(INBOUND_APP_ID_HEADER, "caller-app");
        assert_eq!(call(&app, env).await.0, 200);
    }

    #[tokio::test]
    async fn test_error_envelopes() {
        let app = service_app(false, TOKEN);

        let (status, _, reply) = call(&app, post(&json!({"token": TOKEN}))).await;
        assert_eq!(status, 200);
        assert_eq!(reply["error"]["type"], "ArgumentError");

        let body = json!({"method": "nope", "token": TOKEN});
        let (_, _, reply) = call(&app, post(&body)).await;
        assert_eq!(reply["error"]["type"], "UnknownMethod");

        let body = json!({"method": "phonenumber.info", "token": TOKEN, "data": {"bogus": 1}});
        let (_, _, reply) = call(&app, post(&body)).await;
        assert_eq!(reply["error"]["type"], "ArgumentError");

        let body = json!({
            "method": "phonenumber.info",
            "token": TOKEN,
            "data": {"number": "+1 650 253 0000", "region": "NOWHERE"},
        });
        let (_, _, reply) = call(&app, post(&body)).await;
        assert_eq!(reply["error"]["type"], "PhoneError");
        assert!(reply["error"]["message"].as_str().unwrap().contains("NOWHERE"));
    }

    #[tokio::test]
    async fn test_query_string_method_and_token() {
        let app = service_app(false, TOKEN);
        let env = Environ::new(Method::GET, &format!("/service?method=nope&token={TOKEN}"));
        let (status, _, reply) = call(&app, env).await;
        assert_eq!(status, 200);
        assert_eq!(reply["error"]["type"], "UnknownMethod");
    }
}
