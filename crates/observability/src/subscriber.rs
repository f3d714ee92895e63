//! Tracing subscriber initialization.
//!
//! JSON lines on stdout, filtered through `RUST_LOG`.

use tracing_subscriber::EnvFilter;

/// Install the JSON subscriber. `default_directive` applies when `RUST_LOG`
/// is unset or unparsable.
///
/// Returns false if a global subscriber was already installed.
pub fn init(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(default_directive, "tracing initialised");
    }
    installed
}

#[cfg(test)]
mod tests {
    #[test]
    fn second_init_is_a_noop() {
        let _ = super::init("warn");
        assert!(!super::init("debug"));
    }
}
