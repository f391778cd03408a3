use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

/// Global flag to control per-visit negotiation tracing
pub static NEGOTIATION_TRACE_ENABLED: AtomicBool = AtomicBool::new(false);

static SUBSCRIBER_INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the fmt subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Calling this more than once is harmless; only the first call installs
/// anything.
pub fn init_logging(default_filter: &str) {
    SUBSCRIBER_INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));

        // Another subscriber may already be set by the embedding application
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    });
}

/// Set negotiation trace logging on/off
pub fn set_negotiation_trace(enabled: bool) {
    NEGOTIATION_TRACE_ENABLED.store(enabled, Ordering::Relaxed);
    tracing::info!(
        "🔧 NEGOTIATION: trace logging {}",
        if enabled { "ENABLED" } else { "DISABLED" }
    );
}

/// Check if negotiation trace logging is enabled
pub fn is_negotiation_trace_enabled() -> bool {
    NEGOTIATION_TRACE_ENABLED.load(Ordering::Relaxed)
}

/// Negotiation trace macro - only logs if negotiation tracing is enabled
#[macro_export]
macro_rules! negotiation_trace {
    ($($arg:tt)*) => {
        if $crate::log::NEGOTIATION_TRACE_ENABLED.load(std::sync::atomic::Ordering::Relaxed) {
            tracing::debug!($($arg)*);
        }
    };
}
