// Server loop module
// Accepts connections until shutdown, then drains the ones in flight

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;

use super::connection::{accept_connection, ConnectionSettings};
use super::signal::SignalHandler;
use crate::app::App;
use crate::logger;

const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Serve `app` on `listener` until `signals` requests shutdown.
///
/// Must run inside a `LocalSet`: connections are served with `spawn_local`.
pub async fn start_server_loop(
    listener: TcpListener,
    app: Arc<App>,
    settings: ConnectionSettings,
    signals: Arc<SignalHandler>,
) -> std::io::Result<()> {
    let active = Arc::new(AtomicUsize::new(0));
    let addr = listener.local_addr()?;

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    accept_connection(stream, peer_addr, &app, settings, &active);
                }
                Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
            },
            () = signals.shutdown.notified() => break,
        }
    }

    drop(listener);
    logger::log_info(&format!("Stopped listening on {addr}"));
    drain(&active, settings.timeout).await;
    Ok(())
}

/// Wait for open connections to finish, at most `timeout`
async fn drain(active: &AtomicUsize, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while active.load(Ordering::SeqCst) > 0 {
        if Instant::now() >= deadline {
            logger::log_warning(&format!(
                "Shutting down with {} connections still open",
                active.load(Ordering::SeqCst)
            ));
            return;
        }
        tokio::time::sleep(DRAIN_POLL).await;
    }
}
