// src/logging.rs
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `json` switches stdout to JSON lines; anything else keeps the compact format.
pub const ENV_LOG_FORMAT: &str = "RSS_FORWARDER_LOG_FORMAT";

/// Install the global subscriber: `RUST_LOG` filter (default `info`), stdout, and
/// optionally an appended plain-text log file. Calling it twice is a no-op.
pub fn init(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var(ENV_LOG_FORMAT)
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));
    let (compact_layer, json_layer) = if json {
        (None, Some(fmt::layer().json()))
    } else {
        (Some(fmt::layer().compact()), None)
    };

    let mut file_error = None;
    let file_layer = log_file.and_then(|path| {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            let _ = std::fs::create_dir_all(dir);
        }
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
            Err(e) => {
                file_error = Some(format!("{}: {e}", path.display()));
                None
            }
        }
    });

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(compact_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if let (true, Some(err)) = (installed, file_error) {
        tracing::warn!("log file unavailable, logging to stdout only: {err}");
    }
}
