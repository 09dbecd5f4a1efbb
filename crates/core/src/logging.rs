//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the logging system with tracing.
///
/// `RUST_LOG` takes precedence; `default_filter` is used when it is unset or
/// does not parse. Typically fed from [`RendererConfig::log_filter`].
///
/// [`RendererConfig::log_filter`]: crate::RendererConfig::log_filter
///
/// # Example
/// ```
/// framechain_core::init_logging("info,framechain=debug");
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}
