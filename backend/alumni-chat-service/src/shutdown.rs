//! Process shutdown signals.

use tokio::signal;
use tracing::info;

/// Which signal ended the wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    CtrlC,
    Terminate,
}

/// Wait for Ctrl+C or SIGTERM. Container runtimes stop services with SIGTERM.
pub async fn shutdown_signal() -> std::io::Result<ShutdownSignal> {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    #[cfg(unix)]
    let terminated = async {
        terminate.recv().await;
    };

    #[cfg(not(unix))]
    let terminated = std::future::pending::<()>();

    let received = tokio::select! {
        res = signal::ctrl_c() => {
            res?;
            ShutdownSignal::CtrlC
        }
        _ = terminated => ShutdownSignal::Terminate,
    };
    info!(signal = ?received, "shutdown signal received");
    Ok(received)
}
