//! Logging setup for the ctmatch server.
//!
//! Tracing starts at `info` before the configuration is read. Once the
//! `[logging]` section is loaded, [`apply_logging_level`] swaps the filter in
//! place through a reload handle. `RUST_LOG`, when set, overrides both.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type FilterHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

static FILTER_HANDLE: OnceLock<FilterHandle> = OnceLock::new();

pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    let filter = env_filter().unwrap_or_else(|| level_filter(level));

    let (reload_layer, handle) = reload::Layer::new(filter);
    let _ = FILTER_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Switch to the configured level after startup.
pub fn apply_logging_level(level: &str) {
    if env_filter().is_some() {
        tracing::debug!(level, "RUST_LOG is set, configured log level ignored");
        return;
    }
    let Some(handle) = FILTER_HANDLE.get() else {
        return;
    };
    if let Err(e) = handle.modify(|filter| *filter = level_filter(level)) {
        tracing::warn!(error = %e, level, "Unable to apply configured log level");
    } else {
        tracing::info!(level, "Log level applied");
    }
}

fn env_filter() -> Option<EnvFilter> {
    std::env::var_os("RUST_LOG")?;
    EnvFilter::try_from_default_env().ok()
}

/// Filter for a configured level. Unparseable directives fall back to `info`.
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}
