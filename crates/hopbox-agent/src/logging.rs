//! Structured logging for the remote agent: stderr plus a size-capped file
//! under the configured log directory, the same scheme the client-side
//! daemon uses (`hopbox-daemon::logging`) so both ends of the tunnel read
//! the same way in the field.

use std::path::Path;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Initializes the global subscriber. Returns the file appender guard,
/// which must be held for the process lifetime to keep the background
/// flush thread alive.
pub fn init(log_path: &Path) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    truncate_if_oversized(log_path)?;

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    tracing::info!("agent logging initialized");
    Ok(guard)
}

fn truncate_if_oversized(path: &Path) -> std::io::Result<()> {
    if let Ok(metadata) = std::fs::metadata(path) {
        if metadata.len() > MAX_LOG_BYTES {
            std::fs::write(path, b"")?;
        }
    }
    Ok(())
}
