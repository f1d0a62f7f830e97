use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Raises `stop` on SIGINT or SIGTERM.
///
/// The listener runs a current-thread runtime on its own thread so the
/// control loop stays synchronous.
pub fn spawn_signal_listener(stop: Arc<AtomicBool>) -> io::Result<thread::JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            let signal = runtime.block_on(wait_for_termination());
            info!(signal, "Termination signal received");
            stop.store(true, Ordering::Relaxed);
        })
}

/// Raises `stop` once `after` has elapsed.
pub fn spawn_deadline(stop: Arc<AtomicBool>, after: Duration) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("deadline".to_string())
        .spawn(move || {
            thread::sleep(after);
            info!(seconds = after.as_secs(), "Run duration elapsed");
            stop.store(true, Ordering::Relaxed);
        })
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Cannot listen for SIGINT");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_termination() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => tokio::select! {
            _ = ctrl_c() => "SIGINT",
            _ = term.recv() => "SIGTERM",
        },
        Err(err) => {
            warn!(error = %err, "Cannot listen for SIGTERM");
            ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> &'static str {
    ctrl_c().await;
    "ctrl-c"
}
