//! Logging setup for the screener.
//!
//! Logs go to stderr so that stdout carries only the result table.
//!
//! # Noise Filtering
//!
//! Noisy library modules (hyper, reqwest, h2, rustls) are set to `warn`
//! unless `RUST_LOG` overrides the whole filter.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Modules that log connection and TLS chatter at debug level.
pub const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

/// Build the filter directive string for a base level.
fn build_directives(log_level: &str) -> String {
    let mut directives = String::from(log_level);

    for module in NOISY_MODULES {
        directives.push_str(&format!(",{}=warn", module));
    }

    directives
}

/// Build the default EnvFilter with noise suppression.
fn build_filter(log_level: &str) -> EnvFilter {
    // Try environment variable first (allows override)
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    EnvFilter::try_new(build_directives(log_level))
        .unwrap_or_else(|_| EnvFilter::new(build_directives("info")))
}

/// Initialize logging.
///
/// # Arguments
///
/// * `log_level` - Base log level (trace, debug, info, warn, error)
/// * `log_format` - "json" for structured JSON, anything else for human-readable
pub fn init_logging(log_level: &str, log_format: &str) {
    let filter = build_filter(log_level);

    let subscriber = tracing_subscriber::registry().with(filter);

    if log_format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_target(true);
        let _ = subscriber.with(fmt_layer).try_init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false);
        let _ = subscriber.with(fmt_layer).try_init();
    }

    tracing::debug!(
        log_level = %log_level,
        log_format = %log_format,
        noise_filtered = NOISY_MODULES.len(),
        "Logging initialized"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noisy_modules_list() {
        assert!(NOISY_MODULES.contains(&"hyper"));
        assert!(NOISY_MODULES.contains(&"reqwest"));
        assert!(NOISY_MODULES.contains(&"rustls"));
    }

    #[test]
    fn test_build_directives() {
        let directives = build_directives("debug");
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("reqwest=warn"));
        assert!(directives.contains("h2=warn"));
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging("info", "pretty");
        init_logging("debug", "json");
    }
}
