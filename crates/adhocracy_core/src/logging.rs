//! Logging bootstrap for the versioning core, REST mapper and notifier.
//!
//! # Responsibility
//! - Start rolling file logs once per process, or stderr logs when no
//!   directory is configured.
//! - Keep `key=value` event lines on a single line.
//!
//! # Invariants
//! - Initialization is idempotent for the same level and target and never
//!   panics.
//! - Switching level or target after initialization is rejected.

use crate::config::Settings;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "adhocracy";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_MESSAGE_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    Directory(PathBuf),
}

impl Display for LogTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stderr => write!(f, "stderr"),
            Self::Directory(dir) => write!(f, "{}", dir.display()),
        }
    }
}

struct LoggingState {
    level: &'static str,
    target: LogTarget,
    _logger: LoggerHandle,
}

/// Initializes logging from process settings.
pub fn init_from_settings(settings: &Settings) -> Result<(), String> {
    let target = match settings.log_dir.as_deref() {
        Some(dir) => LogTarget::Directory(absolute_log_dir(dir)?),
        None => LogTarget::Stderr,
    };
    init(&settings.log_level, target)
}

/// Initializes rolling file logs under `log_dir`.
///
/// # Errors
/// - `level` is not one of trace|debug|info|warn|error.
/// - `log_dir` is empty, relative or cannot be created.
/// - Logging already runs with another level or target.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    let trimmed = log_dir.trim();
    if trimmed.is_empty() {
        return Err("log_dir cannot be empty".to_string());
    }
    init(level, LogTarget::Directory(absolute_log_dir(Path::new(trimmed))?))
}

fn init(level: &str, target: LogTarget) -> Result<(), String> {
    let level = normalize_level(level)?;
    let state = LOGGING_STATE.get_or_try_init(|| start(level, target.clone()))?;

    if state.target != target {
        return Err(format!(
            "logging already initialized at `{}`; refusing to switch to `{}`",
            state.target, target
        ));
    }
    if state.level != level {
        return Err(format!(
            "logging already initialized with level `{}`; refusing to switch to `{}`",
            state.level, level
        ));
    }
    Ok(())
}

fn start(level: &'static str, target: LogTarget) -> Result<LoggingState, String> {
    let logger =
        Logger::try_with_str(level).map_err(|err| format!("invalid log level `{level}`: {err}"))?;
    let logger = match &target {
        LogTarget::Stderr => logger.format(flexi_logger::detailed_format),
        LogTarget::Directory(dir) => {
            std::fs::create_dir_all(dir).map_err(|err| {
                format!("failed to create log directory `{}`: {err}", dir.display())
            })?;
            logger
                .log_to_file(
                    FileSpec::default()
                        .directory(dir.as_path())
                        .basename(LOG_FILE_BASENAME),
                )
                .rotate(
                    Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(MAX_LOG_FILES),
                )
                .write_mode(WriteMode::BufferAndFlush)
                .append()
                .format_for_files(flexi_logger::detailed_format)
        }
    };
    let handle = logger
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    log_panics();
    info!(
        "event=core_init module=core status=ok level={} target={} version={}",
        level,
        target,
        env!("CARGO_PKG_VERSION")
    );
    Ok(LoggingState {
        level,
        target,
        _logger: handle,
    })
}

/// Active `(level, target)`, or `None` before initialization.
pub fn logging_status() -> Option<(&'static str, LogTarget)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.level, state.target.clone()))
}

/// `debug` in debug builds, `info` in release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn absolute_log_dir(dir: &Path) -> Result<PathBuf, String> {
    if !dir.is_absolute() {
        return Err(format!(
            "log_dir must be an absolute path, got `{}`",
            dir.display()
        ));
    }
    Ok(dir.to_path_buf())
}

// Called once, from inside the logger's OnceCell initializer.
fn log_panics() {
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let thread = std::thread::current();
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic module=core status=error thread={} location={} message={}",
            thread.name().unwrap_or("unnamed"),
            location,
            truncate_chars(&single_line(&payload), MAX_PANIC_MESSAGE_CHARS)
        );
        previous_hook(panic_info);
    }));
}

/// Replaces line breaks so a value fits in one `key=value` log line.
pub(crate) fn single_line(value: &str) -> String {
    value.replace(['\n', '\r'], " ")
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &value[..cut]),
        None => value.to_string(),
    }
}
