//! Diagnostic logging setup.

use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding every other log filter.
pub const LOG_ENV: &str = "BRIDGECHAT_LOG";

static INIT: OnceLock<()> = OnceLock::new();

/// Pick the filter: `BRIDGECHAT_LOG`, then `RUST_LOG`, then `default_level`.
pub fn resolve_env_filter(default_level: &str) -> EnvFilter {
    if let Ok(level) = std::env::var(LOG_ENV) {
        if let Ok(filter) = EnvFilter::try_new(level) {
            return filter;
        }
    }
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Initialize logging once per process. Logs go to stderr so they never mix
/// with transcript output on stdout.
pub fn init_logging(default_level: &str) {
    INIT.get_or_init(|| {
        let layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr);
        let _ = tracing_subscriber::registry()
            .with(resolve_env_filter(default_level))
            .with(layer)
            .try_init();
    });
}
