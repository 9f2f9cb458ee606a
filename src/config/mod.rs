// Configuration module entry point
// Loads server, logging and framework settings

mod types;

use std::net::SocketAddr;

// Re-export public types
pub use types::{
    AppSettings, Config, HttpConfig, LoggingConfig, PerformanceConfig, ServerConfig,
    ServiceSettings,
};

impl Config {
    /// Load configuration from `config_path` given without extension
    /// (`config` finds `config.toml`); a missing file leaves only defaults
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("WEBLITE").separator("__"))
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive", true)?
            .set_default("performance.request_timeout", 30)?
            .set_default("http.server_name", "weblite/0.3")?
            .set_default("http.max_body_size", 10_485_760)? // 10MB
            .set_default("http.trust_forwarded_proto", false)?
            .set_default("app.debug", false)?
            .set_default("app.hosted", false)?
            .set_default("app.ssl_only", false)?
            .set_default("app.secure_cookie_key", "")?
            .set_default("app.secure_cookie_duration", 86_400)?
            .set_default("app.template_dir", "template")?
            .set_default("app.static_path", "/static/")?
            .set_default("app.login_cookie", "user")?
            .build()?;

        settings.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}
