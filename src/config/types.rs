// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub http: HttpConfig,
    pub app: AppSettings,
    #[serde(default)]
    pub service: ServiceSettings,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common or json)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive: bool,
    /// Seconds a single connection may stay open
    pub request_timeout: u64,
    pub max_connections: Option<u64>,
}

/// HTTP configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    pub server_name: String,
    pub max_body_size: u64,
    /// Treat `X-Forwarded-Proto: https` as an SSL request
    pub trust_forwarded_proto: bool,
}

/// Framework settings shared by every request
#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    /// Render full diagnostics on error pages and reload templates
    pub debug: bool,
    /// Running behind the hosting platform front end; enables SSL
    /// enforcement and inbound app id checks
    pub hosted: bool,
    /// Default for the per-route `ssl` flag
    pub ssl_only: bool,
    #[serde(default)]
    pub site_host: Option<String>,
    pub secure_cookie_key: String,
    /// Lifetime of signed cookies in seconds
    pub secure_cookie_duration: i64,
    pub template_dir: String,
    pub static_path: String,
    #[serde(default)]
    pub static_http_hosts: Vec<String>,
    #[serde(default)]
    pub static_https_hosts: Vec<String>,
    /// JSON file mapping asset names to their versioned file names
    #[serde(default)]
    pub assets_manifest: Option<String>,
    /// Signed cookie holding the logged-in user id
    pub login_cookie: String,
    #[serde(default)]
    pub admins: Vec<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            debug: false,
            hosted: false,
            ssl_only: false,
            site_host: None,
            secure_cookie_key: String::new(),
            secure_cookie_duration: 86_400,
            template_dir: "template".to_string(),
            static_path: "/static/".to_string(),
            static_http_hosts: Vec::new(),
            static_https_hosts: Vec::new(),
            assets_manifest: None,
            login_cookie: "user".to_string(),
            admins: Vec::new(),
        }
    }
}

/// Shared secrets for the service endpoint
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServiceSettings {
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub token: String,
}
