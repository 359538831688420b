//! Logging initialization
//!
//! The allocator logs through the `tracing` facade; embedding applications
//! that already install a subscriber need nothing from this module. For
//! standalone use, [`init_logging_default`] sets up a subscriber driven by
//! environment variables:
//!
//! - `RUST_LOG`: standard tracing filter (e.g. "debug,hipbuddy=trace")
//! - `HIPBUDDY_LOG_LEVEL`: simple level (error, warn, info, debug, trace)
//! - `HIPBUDDY_LOG_FORMAT`: output format ("human" or "json")

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Global flag to track if tracing has been initialized
static TRACING_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Default log level when no environment variable is set
const DEFAULT_LOG_LEVEL: &str = "warn";

/// Environment variable for log level override
const LOG_LEVEL_ENV: &str = "HIPBUDDY_LOG_LEVEL";

/// Environment variable for log format (json/human)
const LOG_FORMAT_ENV: &str = "HIPBUDDY_LOG_FORMAT";

/// Log format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable colored output (default)
    #[default]
    Human,
    /// JSON structured output
    Json,
}

impl LogFormat {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" | "pretty" | "console" => Some(LogFormat::Human),
            "json" | "structured" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Initialize logging from environment variables.
///
/// This function is idempotent; calling it multiple times, or calling it
/// in a process that already installed a subscriber, has no effect beyond
/// the first successful initialization.
pub fn init_logging_default() {
    TRACING_INITIALIZED.get_or_init(|| {
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|s| LogFormat::from_str(&s))
            .unwrap_or_default();

        let registry = tracing_subscriber::registry().with(build_env_filter());
        let result = match format {
            LogFormat::Json => registry
                .with(fmt::layer().json().with_target(false))
                .try_init(),
            LogFormat::Human => registry
                .with(fmt::layer().with_target(true))
                .try_init(),
        };
        // A subscriber installed by the embedding application wins.
        if let Err(err) = result {
            tracing::debug!("logging already initialized: {}", err);
        }
    });
}

/// Build the environment filter for the log level. Tries `RUST_LOG` first
/// (standard tracing convention), then `HIPBUDDY_LOG_LEVEL`.
fn build_env_filter() -> EnvFilter {
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        if let Ok(filter) = EnvFilter::try_new(rust_log) {
            return filter;
        }
    }
    if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
        if let Ok(filter) = EnvFilter::try_new(level) {
            return filter;
        }
    }
    EnvFilter::new(DEFAULT_LOG_LEVEL)
}

/// Check if tracing has been initialized
pub fn is_initialized() -> bool {
    TRACING_INITIALIZED.get().is_some()
}
