//! Logging setup for Quarry.
//!
//! Statement compilation and execution emit structured `tracing`
//! events; this module wires up a subscriber for them, controlled by
//! environment variables:
//!
//! - `QUARRY_DEBUG=true|1|yes` - enable debug logging
//! - `QUARRY_LOG_LEVEL=trace|debug|info|warn|error` - set a specific level
//! - `QUARRY_LOG_FORMAT=json|pretty|compact` - output format (default: json)
//!
//! ```rust,no_run
//! quarry_query::logging::init();
//! ```
//!
//! Applications with their own subscriber can skip `init()` entirely;
//! Quarry only emits events, it never requires this setup.

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Whether `QUARRY_DEBUG` requests debug logging.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("QUARRY_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Effective log level: `QUARRY_LOG_LEVEL` when valid, otherwise
/// `debug` under `QUARRY_DEBUG` and `warn` without it.
pub fn get_log_level() -> &'static str {
    if let Ok(level) = env::var("QUARRY_LOG_LEVEL") {
        match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => {
                if is_debug_enabled() {
                    "debug"
                } else {
                    "warn"
                }
            }
        }
    } else if is_debug_enabled() {
        "debug"
    } else {
        "warn"
    }
}

/// Output format from `QUARRY_LOG_FORMAT`, defaulting to `json`.
pub fn get_log_format() -> &'static str {
    env::var("QUARRY_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Install the global subscriber. Call once at startup; later calls
/// are no-ops. Does nothing unless logging was requested through the
/// environment, and nothing without the `tracing-subscriber` feature.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("QUARRY_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!(
                "quarry_query={level},quarry_sqlite={level}"
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            match get_log_format() {
                "pretty" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().pretty())
                        .init();
                }
                "compact" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().compact())
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
            }

            tracing::info!(
                level = level,
                format = get_log_format(),
                "Quarry logging initialized"
            );
        }
    });
}

/// Initialize with an explicit level.
///
/// # Safety
///
/// Sets environment variables, which is unsound once other threads
/// run. Call at program startup only.
pub fn init_with_level(level: &str) {
    // SAFETY: callers invoke this before spawning threads.
    unsafe {
        env::set_var("QUARRY_LOG_LEVEL", level);
    }
    init();
}
