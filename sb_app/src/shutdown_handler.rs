use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancel `token` on the first Ctrl+C
///
/// Calls still queued for quota return `Cancelled` straight away; calls on the
/// wire finish first so their quota headers are not lost.
pub fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                    token.cancel();
                }
                Err(err) => tracing::warn!("Failed to listen for Ctrl+C: {}", err),
            },
            _ = token.cancelled() => {}
        }
    })
}
