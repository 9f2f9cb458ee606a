// Connection module
// Accepts a TCP connection and serves it with the application

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::app::App;
use crate::config::PerformanceConfig;
use crate::logger;

/// Per-connection limits taken from the performance settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub keep_alive: bool,
    pub timeout: Duration,
    pub max_connections: Option<usize>,
}

impl From<&PerformanceConfig> for ConnectionSettings {
    fn from(perf: &PerformanceConfig) -> Self {
        Self {
            keep_alive: perf.keep_alive,
            timeout: Duration::from_secs(perf.request_timeout.max(1)),
            max_connections: perf
                .max_connections
                .map(|max| usize::try_from(max).unwrap_or(usize::MAX)),
        }
    }
}

/// Count the connection and serve it, or drop it when the limit is reached.
/// Returns whether the connection was accepted.
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    app: &Arc<App>,
    settings: ConnectionSettings,
    active: &Arc<AtomicUsize>,
) -> bool {
    // Increment first so concurrent accepts cannot both pass the check
    let previous = active.fetch_add(1, Ordering::SeqCst);
    if let Some(max) = settings.max_connections {
        if previous >= max {
            active.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {previous}/{max}. Rejected {peer_addr}"
            ));
            return false;
        }
    }

    logger::log_debug(&format!("Accepted connection from {peer_addr}"));
    handle_connection(stream, peer_addr, Arc::clone(app), settings, Arc::clone(active));
    true
}

fn handle_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    app: Arc<App>,
    settings: ConnectionSettings,
    active: Arc<AtomicUsize>,
) {
    tokio::task::spawn_local(async move {
        let io = TokioIo::new(stream);

        let mut builder = http1::Builder::new();
        builder.keep_alive(settings.keep_alive);

        let conn = builder.serve_connection(
            io,
            service_fn(move |req| {
                let app = Arc::clone(&app);
                async move { Ok::<_, Infallible>(app.serve(req, Some(peer_addr)).await) }
            }),
        );

        match tokio::time::timeout(settings.timeout, conn).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => logger::log_connection_error(&err),
            Err(_) => logger::log_warning(&format!(
                "Connection from {peer_addr} timed out after {} seconds",
                settings.timeout.as_secs()
            )),
        }

        active.fetch_sub(1, Ordering::SeqCst);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_performance() {
        let settings = ConnectionSettings::from(&PerformanceConfig {
            keep_alive: false,
            request_timeout: 0,
            max_connections: Some(8),
        });
        assert!(!settings.keep_alive);
        assert_eq!(settings.timeout, Duration::from_secs(1));
        assert_eq!(settings.max_connections, Some(8));
    }
}
