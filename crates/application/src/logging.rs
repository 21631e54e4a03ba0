use tracing_subscriber::EnvFilter;

use crate::constants::DEFAULT_LOG_FILTER;

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `info,cropmap=debug`. Returns `false` if a global subscriber was already
/// set.
pub fn init_logging() -> bool {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Logging initialised");
    }
    installed
}
