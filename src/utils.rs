//! Miscellaneous helper utilities.

use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt};

use crate::models::BotStatus;

/// Initialize `tracing` subscriber with env-based filter.
///
/// If `RUST_LOG` is not set, defaults to `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Spawns a background task that logs every status change published on `rx`.
pub fn spawn_status_logger(mut rx: watch::Receiver<BotStatus>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            match status {
                BotStatus::Error(_) | BotStatus::SessionLost => {
                    tracing::warn!("[STATUS] Bot Status: {status}")
                }
                _ => tracing::info!("[STATUS] Bot Status: {status}"),
            }
        }
    })
}
