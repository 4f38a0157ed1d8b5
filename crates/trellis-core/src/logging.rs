//! Logging initialization.

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// The filter is read from `RUST_LOG` and defaults to `info`. Calling this
/// more than once is harmless: later calls leave the first subscriber in place.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
    {
        tracing::debug!("Logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_keeps_first_subscriber() {
        init_logging();
        init_logging();
        tracing::info!("still logging");
    }
}
