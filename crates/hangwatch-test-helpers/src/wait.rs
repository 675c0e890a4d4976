//! Polling and tracing setup helpers for timer-driven tests.

use std::sync::Once;
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

/// Install a test-friendly `tracing` subscriber once per process.
///
/// Output goes through the libtest capture writer and honours `RUST_LOG`,
/// defaulting to `debug` for hangwatch crates.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,hangwatch=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Poll `condition` every millisecond until it holds or `timeout` elapses.
///
/// Returns the final value of `condition`.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return condition();
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_wait_until_sees_condition() {
        let polls = AtomicUsize::new(0);
        assert!(wait_until(Duration::from_secs(1), || {
            polls.fetch_add(1, Ordering::SeqCst) >= 3
        }));
    }

    #[test]
    fn test_wait_until_times_out() {
        assert!(!wait_until(Duration::from_millis(5), || false));
    }

    #[test]
    fn test_init_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
        tracing::debug!("tracing initialised");
    }
}
