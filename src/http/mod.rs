//! HTTP protocol layer module
//!
//! Request environment, cache headers, error pages and response builders,
//! decoupled from the handler pipeline.

pub mod cache;
pub mod environ;
pub mod pages;
pub mod response;

// Re-export commonly used types
pub use cache::{http_date, http_date_now, CachePolicy, EXPIRED_DATE};
pub use environ::{Environ, EnvironError};
pub use pages::{escape_html, ErrorPages};
pub use response::{
    build_413_response, build_501_response, build_content_response, build_error_page,
    build_options_response, build_redirect_response, build_status_response,
};
