// ABOUTME: tracing subscriber setup for the CLI
// ABOUTME: Reads DRIVESYNC_LOG, falls back to info or debug with --verbose

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV: &str = "DRIVESYNC_LOG";

static INIT: Once = Once::new();

pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "drivesync=debug"
    } else {
        "drivesync=info"
    }
}

/// Logs go to stderr so stdout stays free for the authorization prompt.
/// Safe to call more than once.
pub fn init_tracing(verbose: bool) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false), "drivesync=info");
        assert_eq!(default_filter(true), "drivesync=debug");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(false);
        init_tracing(true);
    }
}
