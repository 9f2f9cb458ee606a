//! Request handler module
//!
//! Handler registration, argument decoding and the dispatcher that turns a
//! request environment into exactly one response.

pub mod args;
pub mod body;
pub mod dispatch;
pub mod halt;
pub mod registry;

// Re-export main entry point
pub use args::{Arg, BlobInfo, Kwargs, Upload};
pub use body::{BodyError, Charset};
pub use dispatch::handle_http_request;
pub use halt::{Failure, Halt, Outcome, Reply};
pub use registry::{HandlerConfig, HandlerRegistry, JsonMode, Route, RouteBuilder, Router};
