//! Logging infrastructure for Scribe.
//!
//! Internal diagnostics go through `tracing`; this module wires up a
//! subscriber controlled by environment variables.
//!
//! # Environment Variables
//!
//! - `SCRIBE_DEBUG=true` - Enable debug logging
//! - `SCRIBE_LOG_LEVEL=debug|info|warn|error|trace` - Set specific log level
//! - `SCRIBE_LOG_FORMAT=json|pretty|compact` - Set output format (default: json)
//!
//! # Usage
//!
//! ```rust,no_run
//! use scribe_intercept::logging;
//!
//! // Initialize logging (call once at startup)
//! # #[cfg(feature = "tracing-subscriber")]
//! logging::init();
//! ```

use std::env;

#[cfg(feature = "tracing-subscriber")]
use std::sync::Once;

#[cfg(feature = "tracing-subscriber")]
static INIT: Once = Once::new();

/// Check if debug logging is enabled via `SCRIBE_DEBUG`.
///
/// Returns `true` if `SCRIBE_DEBUG` is set to "true", "1", or "yes"
/// (case-insensitive).
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("SCRIBE_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Get the configured log level from `SCRIBE_LOG_LEVEL`.
///
/// Defaults to "debug" if `SCRIBE_DEBUG` is enabled, otherwise "warn".
pub fn get_log_level() -> &'static str {
    if let Ok(level) = env::var("SCRIBE_LOG_LEVEL") {
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

/// Get the configured log format from `SCRIBE_LOG_FORMAT`.
///
/// Defaults to "json" for structured logging.
pub fn get_log_format() -> &'static str {
    env::var("SCRIBE_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Initialize the Scribe logging system.
///
/// Should be called once at application startup; subsequent calls are
/// no-ops. A subscriber installed by the host wins: installation failures
/// are ignored.
#[cfg(feature = "tracing-subscriber")]
pub fn init() {
    init_with_level(get_log_level());
}

/// Initialize with an explicit level, bypassing `SCRIBE_LOG_LEVEL`.
#[cfg(feature = "tracing-subscriber")]
pub fn init_with_level(level: &str) {
    let level = level.to_string();
    INIT.call_once(move || {
        let filter = tracing_subscriber::EnvFilter::try_new(level)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        match get_log_format() {
            "pretty" => {
                let _ = builder.pretty().try_init();
            }
            "compact" => {
                let _ = builder.compact().try_init();
            }
            _ => {
                let _ = builder.json().try_init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flag_parsing() {
        // Without the variable set, debug is off.
        if env::var("SCRIBE_DEBUG").is_err() {
            assert!(!is_debug_enabled());
        }
    }

    #[test]
    fn test_default_level_is_warn() {
        if env::var("SCRIBE_LOG_LEVEL").is_err() && env::var("SCRIBE_DEBUG").is_err() {
            assert_eq!(get_log_level(), "warn");
        }
    }

    #[test]
    fn test_default_format_is_json() {
        if env::var("SCRIBE_LOG_FORMAT").is_err() {
            assert_eq!(get_log_format(), "json");
        }
    }
}
