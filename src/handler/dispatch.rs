//! Request dispatch
//!
//! Entry point for request processing: method validation, argument decoding,
//! route resolution, policy checks, the handler call, the renderer pipeline
//! and the mapping of the outcome to a response.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Method, Response};
use serde_json::{json, Value};
use std::sync::Arc;

use super::args::{parse_query, split_path, Arg, Kwargs};
use super::body::{self, BodyError, FORM_URLENCODED, MULTIPART_FORM};
use super::halt::{Failure, Halt, Outcome, Reply};
use super::registry::{HandlerConfig, JsonMode};
use crate::app::{App, Runtime};
use crate::context::Context;
use crate::crypto::secure_string_comparison;
use crate::http::{self, escape_html, Environ};
use crate::logger;
use crate::render::run_pipeline;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Produce exactly one response for a request environment
pub async fn handle_http_request(app: &App, env: Environ) -> Response<Full<Bytes>> {
    // 1. Check HTTP method
    if env.method == Method::OPTIONS {
        return http::build_options_response();
    }
    if !matches!(env.method, Method::GET | Method::HEAD | Method::POST) {
        return http::build_501_response();
    }
    let is_head = env.method == Method::HEAD;

    // 2. Run the handler pipeline
    let runtime = app.runtime();
    let mut ctx = Context::new(Arc::clone(&runtime), &env);
    let outcome = run(app, &mut ctx, env).await;

    // 3. Map the outcome to a response
    into_response(&runtime, &mut ctx, outcome, is_head)
}

async fn run(app: &App, ctx: &mut Context, env: Environ) -> Outcome {
    let segments = split_path(&env.path);
    let mut kwargs = parse_query(&env.query);

    let (name, args) = if let Some(router) = app.router() {
        router.route(ctx, &segments, &kwargs).ok_or_else(|| {
            logger::log_error(&format!("No handler found for: {}", env.path));
            Halt::NotFound
        })?
    } else {
        match segments.split_first() {
            Some((first, rest)) => (first.clone(), rest.to_vec()),
            None => ("/".to_string(), Vec::new()),
        }
    };

    let Some(route) = app.handlers().get(&name).map(Arc::clone) else {
        logger::log_error(&format!("Handler not found: {name}"));
        return Err(Halt::NotFound);
    };

    if env.method == Method::POST {
        decode_body(ctx, &route.config, &env, &mut kwargs).await?;
    }

    kwargs.remove("submit");
    if let Some(callback) = kwargs.remove("callback") {
        ctx.json_callback = Some(callback);
    }
    if env.header("x-requested-with") == Some("XMLHttpRequest") {
        ctx.ajax_request = true;
    }
    if kwargs.remove("__ajax__").is_some() {
        ctx.ajax_request = true;
    }

    check_policies(ctx, &route.config, &mut kwargs)?;

    let content = (route.handler)(ctx, args, kwargs)?;
    run_pipeline(ctx, &route.renderers, content)
}

/// Merge a POST body into kwargs according to the route's settings
async fn decode_body(
    ctx: &mut Context,
    config: &HandlerConfig,
    env: &Environ,
    kwargs: &mut Kwargs,
) -> Result<(), Halt> {
    let content_type = env.content_type();

    if config.json != JsonMode::Off || content_type == JSON_CONTENT_TYPE {
        let payload = body::parse_json(&env.body).map_err(bad_request)?;
        match (&config.json, payload) {
            (JsonMode::Nested(key), payload) => kwargs.insert(key.clone(), Arg::Json(payload)),
            (_, Value::Object(object)) => kwargs.merge_json(object),
            (_, other) => {
                logger::log_warning(&format!(
                    "JSON body must be an object to merge, got: {other}"
                ));
                return Err(Halt::Status(400));
            }
        }
    } else if matches!(content_type, "" | FORM_URLENCODED | MULTIPART_FORM) {
        if config.post_encoding.is_some() {
            ctx.request_body = Some(env.body.clone());
        }
        let fields = body::parse_form(
            env.body.clone(),
            content_type,
            env.raw_content_type(),
            config.post_encoding.unwrap_or_default(),
            config.blob,
        )
        .await
        .map_err(bad_request)?;
        for (key, value) in fields {
            kwargs.push(key, value);
        }
    }
    Ok(())
}

fn bad_request(err: BodyError) -> Halt {
    logger::log_warning(&format!("Rejected request body: {err}"));
    Halt::Status(400)
}

/// SSL, XSRF, admin and login checks, in that order
fn check_policies(ctx: &mut Context, config: &HandlerConfig, kwargs: &mut Kwargs) -> Result<(), Halt> {
    if config.ssl && ctx.settings().hosted && !ctx.https {
        return Err(Halt::NotFound);
    }

    if config.xsrf {
        let Some(provided) = kwargs.remove("xsrf") else {
            return Err(Halt::auth("XSRF token not present."));
        };
        let expected = ctx.xsrf_token()?;
        if !secure_string_comparison(provided.as_str().unwrap_or_default(), &expected) {
            return Err(Halt::auth("XSRF tokens do not match."));
        }
    }

    if config.admin && !ctx.is_admin() {
        return Err(Halt::NotFound);
    }

    if !config.anon && ctx.user_id().is_none() {
        let login_url = ctx.login_url();
        if ctx.ajax_request {
            ctx.set_header("Content-Type", JSON_CONTENT_TYPE);
            let body = json!({
                "error": {
                    "type": "AuthError",
                    "redirect": login_url,
                }
            });
            return Err(Halt::content(body.to_string()));
        }
        return Err(Halt::redirect(login_url));
    }
    Ok(())
}

fn reply_body(ctx: &mut Context, reply: Reply) -> Bytes {
    match reply {
        Reply::None => Bytes::new(),
        Reply::Text(text) => Bytes::from(text),
        Reply::Bytes(bytes) => bytes,
        Reply::Data(value) => {
            if ctx.response_header("Content-Type").is_none() {
                ctx.set_header("Content-Type", JSON_CONTENT_TYPE);
            }
            Bytes::from(value.to_string())
        }
    }
}

fn into_response(
    runtime: &Runtime,
    ctx: &mut Context,
    outcome: Outcome,
    is_head: bool,
) -> Response<Full<Bytes>> {
    let halt = match outcome {
        Ok(reply) => Halt::Content(reply_body(ctx, reply)),
        Err(halt) => halt,
    };

    match halt {
        Halt::Content(content) => {
            if ctx.response_header("Content-Type").is_none() {
                ctx.set_header("Content-Type", http::response::HTML_CONTENT_TYPE);
            }
            ctx.set_header("Content-Length", content.len().to_string());
            http::build_content_response(ctx.status(), ctx.response_headers(), content, is_head)
        }
        Halt::Redirect { uri, permanent } => {
            http::build_redirect_response(&uri, permanent, ctx.response_headers())
        }
        Halt::NotFound => http::build_error_page(404, runtime.pages.not_found()),
        Halt::Auth(message) => {
            logger::log_info(&format!("Auth error for {}: {message}", ctx.path));
            http::build_error_page(401, runtime.pages.unauthorized())
        }
        Halt::Forbidden => http::build_error_page(403, runtime.pages.forbidden()),
        Halt::Status(code) => http::build_status_response(code),
        Halt::Unavailable(reason) => {
            logger::log_warning(&format!("Capability unavailable: {reason}"));
            http::build_error_page(503, runtime.pages.unavailable())
        }
        Halt::Failure(failure) => failure_response(runtime, &failure),
    }
}

/// Log a failure with its causes and render the 500 page
fn failure_response(runtime: &Runtime, failure: &Failure) -> Response<Full<Bytes>> {
    let chain = failure.chain();
    let report = format!("{}: {}", failure.type_name(), chain.join("\n  caused by: "));
    logger::log_critical(&report);
    if let Some(trace) = failure.trace() {
        logger::log_critical(&trace.to_plain());
    }

    let traceback = if runtime.settings.debug {
        failure.trace().map_or_else(
            || format!("<pre>{}</pre>", escape_html(&report)),
            |trace| trace.to_html(),
        )
    } else {
        escape_html(&failure.to_string())
    };
    http::build_error_page(500, runtime.pages.server_error(Some(&traceback)))
}
