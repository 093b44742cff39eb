// Exhibitor Search - util/logging.rs
//
// Structured logging with runtime-selectable debug mode and a separate
// request-history file.
//
// Activation:
//   - Environment variable: RUST_LOG=debug (or trace)
//   - CLI flag: --debug
//   - Config file: [logging] level = "debug"
//
// Channels:
//   - stderr: everything except the request-history target.
//   - <log_dir>/request_history.log: every request, response and retry,
//     written on the `request_history` target.
//
// Header values are never logged; exhibition headers carry cookies and tokens.

use super::constants;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{EnvFilter, Targets};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Initialise the logging subsystem.
///
/// `debug_flag` is true when the user passed --debug on the CLI.
/// `config_level` is the level from config.toml (if present).
/// `log_dir` enables the request-history file when set.
///
/// Priority: RUST_LOG env var > CLI --debug flag > config level > default "info".
///
/// The returned guard flushes the request-history writer on drop; keep it
/// alive until the program exits.
pub fn init(
    debug_flag: bool,
    config_level: Option<&str>,
    log_dir: Option<&Path>,
) -> Option<WorkerGuard> {
    let level_spec = match std::env::var("RUST_LOG") {
        Ok(spec) if !spec.is_empty() => spec,
        _ if debug_flag => "debug".to_string(),
        _ => config_level
            .unwrap_or(constants::DEFAULT_LOG_LEVEL)
            .to_string(),
    };

    // The request target is file-only; keep it off the console.
    let console_filter = EnvFilter::new(format!(
        "{level_spec},{}=off",
        constants::REQUEST_LOG_TARGET
    ));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(debug_flag)
        .with_thread_ids(debug_flag)
        .compact()
        .with_filter(console_filter);

    let mut file_error = None;
    let (file_layer, guard) = match log_dir.map(open_request_log) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_filter(
                    Targets::new().with_target(constants::REQUEST_LOG_TARGET, Level::DEBUG),
                );
            (Some(layer), Some(guard))
        }
        Some(Err(e)) => {
            file_error = Some(e);
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        tracing::warn!(error = %e, "Request history log disabled");
    }

    tracing::debug!(
        app = constants::APP_NAME,
        version = constants::APP_VERSION,
        request_log = guard.is_some(),
        "Logging initialised"
    );

    guard
}

fn open_request_log(dir: &Path) -> Result<RollingFileAppender, String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("{}: {e}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(constants::REQUEST_LOG_FILE)
        .build(dir)
        .map_err(|e| format!("{}: {e}", dir.display()))
}

/// Truncate `text` to at most `max_chars` characters, marking the cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
