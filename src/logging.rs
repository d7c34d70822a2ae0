//! Tracing subscriber setup
//!
//! Logs go to stderr and, when a log file is configured, to that file too.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose debug output drowns out ours
const NOISY_CRATES: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2"];

/// Default filter directives when `RUST_LOG` is unset
pub fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    std::iter::once(level.to_string())
        .chain(NOISY_CRATES.iter().map(|c| format!("{c}=warn")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber.
///
/// Returns warnings for the run report, e.g. when the log file cannot be
/// created. Calling this twice is harmless; the second call does nothing.
pub fn init(log_file: Option<&Path>, verbose: bool) -> Vec<String> {
    let mut warnings = Vec::new();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    let file_layer = log_file.and_then(|path| match File::create(path) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file)),
        ),
        Err(e) => {
            warnings.push(format!("Could not create log file: {e}"));
            None
        }
    });

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    warnings
}
