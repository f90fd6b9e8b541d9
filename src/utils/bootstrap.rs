//! Bootstrap utilities for rigbus binaries.
//!
//! Shared initialization code for the relay, supervisor and worker binaries.

use std::future::Future;

use backon::BackoffBuilder;

use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;
use crate::utils::retry::startup_backoff;

/// Initialize tracing with RIGBUS_LOG environment variable.
///
/// Defaults to "info" level if RIGBUS_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Config file path from `--config <path>` / `-c <path>` (or `--config=<path>`).
pub fn parse_config_path() -> Option<String> {
    parse_config_path_from(std::env::args().skip(1))
}

fn parse_config_path_from<I>(args: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

/// Resolve when the process receives SIGTERM or SIGINT.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler, waiting for SIGINT only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Run an async operation with exponential backoff retry.
///
/// # Arguments
/// * `what` - Human-readable name for logging (e.g., "relay bind")
/// * `operation` - Async function that attempts the operation
///
/// # Returns
/// The first success, or the last error once [`startup_backoff`] runs out.
pub async fn retry_with_backoff<T, E, F, Fut>(what: &str, operation: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delays = startup_backoff().build();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                tracing::info!("{} ready", what);
                return Ok(value);
            }
            Err(e) => match delays.next() {
                Some(delay) => {
                    warn!(
                        "{} failed (attempt {}): {}. Retrying in {:?}...",
                        what, attempt, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::error!("{} failed after {} attempts: {}", what, attempt, e);
                    return Err(e);
                }
            },
        }
    }
}
