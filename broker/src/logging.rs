//! Logging initialization, per §10.1.
//!
//! `tracing-subscriber` with an `EnvFilter`, optionally layered over a
//! daily-rolling non-blocking file appender, falling back to stderr
//! (with ANSI) whenever the cache directory can't be resolved or written
//! to.

use std::io::stderr;
use std::path::Path;
use std::sync::Once;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt::layer};

static INIT: Once = Once::new();

/// Initializes the global `tracing` subscriber. Safe to call more than
/// once; only the first call takes effect.
pub fn init(log_level: &str, log_to_file: bool) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{log_level},broker_core=debug,broker_http=debug"))
        });

        if log_to_file
            && let Some(cache_dir) = dirs::cache_dir().map(|d| d.join("broker"))
            && test_write_permission(&cache_dir)
        {
            let file_appender = tracing_appender::rolling::daily(&cache_dir, "broker.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer().with_writer(non_blocking).with_ansi(false))
                .init();

            // Leaked so the background flush thread keeps running for the
            // life of the process; the writer guard has no natural owner
            // once init() returns.
            Box::leak(Box::new(guard));
            return;
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer().with_writer(stderr).with_ansi(true))
            .init();
    });
}

fn test_write_permission(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".broker_log_test");
    match std::fs::write(&probe, "test") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
