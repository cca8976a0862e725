//! Tracing subscriber setup shared by the daemon binaries.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::error::{CfgMgrError, CfgMgrResult};

/// Builds the log filter: `RUST_LOG` wins over `default_level`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize tracing/logging.
pub fn init_logging(default_level: &str) -> CfgMgrResult<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter(default_level))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| CfgMgrError::internal(format!("Failed to set tracing subscriber: {}", e)))
}
