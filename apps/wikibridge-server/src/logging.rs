//! Logging initialization and log file management.
//!
//! Provides dual-output tracing: stderr (human-readable) and an optional
//! JSON log file at `<log_dir>/<timestamp>.log`. File logging is enabled
//! when the serve command is given a log directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Maximum age of log files before cleanup, in days.
const LOG_RETENTION_DAYS: u64 = 3;

/// Initialize the tracing subscriber with stderr output.
///
/// When `log_dir` is `Some`, an additional JSON file layer writes to
/// `<log_dir>/<timestamp>.log`. Returns an optional [`WorkerGuard`] that
/// must be held for the lifetime of the program so buffered logs are
/// flushed.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or the log
/// file cannot be opened.
pub fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let built = build_tracing(log_dir)?;

    if let Some((subscriber, guard)) = built {
        subscriber.init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(EnvFilter::from_default_env())
            .init();
        Ok(None)
    }
}

/// Build the tracing subscriber layers without registering globally.
///
/// Returns `Some((subscriber, guard))` when a log directory is given
/// (dual-layer), or `None` when only stderr logging is needed.
fn build_tracing(
    log_dir: Option<&Path>,
) -> Result<Option<(impl tracing::Subscriber + Send + Sync, WorkerGuard)>> {
    let Some(log_dir) = log_dir else {
        return Ok(None);
    };

    let (non_blocking, guard) = open_log_writer(log_dir)?;

    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::from_default_env()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::from_default_env()),
        );

    Ok(Some((subscriber, guard)))
}

/// Create the log directory and file, returning a non-blocking writer
/// and its guard.
fn open_log_writer(
    log_dir: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let log_path = build_log_path(log_dir);

    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let log_file = fs::File::create(&log_path)
        .with_context(|| format!("failed to create log file: {}", log_path.display()))?;

    Ok(tracing_appender::non_blocking(log_file))
}

/// Build the log file path: `<log_dir>/<YYYYMMDD_HHMMSS>.log`.
fn build_log_path(log_dir: &Path) -> PathBuf {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    log_dir.join(format!("{timestamp}.log"))
}

/// Remove `.log` files older than the retention window from `log_dir`.
///
/// Best-effort: errors on individual files are reported via `eprintln!`
/// (tracing is not initialized yet) but never fail the caller.
pub fn cleanup_old_logs(log_dir: &Path) {
    if !log_dir.is_dir() {
        return;
    }

    let cutoff = std::time::SystemTime::now()
        - std::time::Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!(
                "warning: failed to read log directory {}: {e}",
                log_dir.display()
            );
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }
        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                eprintln!(
                    "warning: failed to read metadata for {}: {e}",
                    path.display()
                );
                continue;
            }
        };
        if modified < cutoff
            && let Err(e) = fs::remove_file(&path)
        {
            eprintln!(
                "warning: failed to remove old log file {}: {e}",
                path.display(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_build_timestamped_log_path() {
        let path = build_log_path(Path::new("/tmp/wikibridge-logs"));
        let path_str = path.to_string_lossy();

        assert!(path_str.starts_with("/tmp/wikibridge-logs/"));
        assert!(path_str.ends_with(".log"));

        // The filename should be a valid timestamp format: YYYYMMDD_HHMMSS.log
        let filename = path.file_stem().expect("stem").to_string_lossy();
        assert_eq!(filename.len(), 15);
        assert_eq!(&filename[8..9], "_");
    }

    #[test]
    fn test_should_create_log_dir_and_file() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        let log_dir = tmp.path().join("logs");
        let (_non_blocking, _guard) = open_log_writer(&log_dir).expect("should open writer");

        assert!(log_dir.is_dir(), "log directory should be created");
        let entries: Vec<_> = fs::read_dir(&log_dir)
            .expect("should list")
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 1, "exactly one log file should be created");
        assert_eq!(
            entries[0].path().extension().and_then(|e| e.to_str()),
            Some("log"),
        );
    }

    #[test]
    fn test_should_keep_recent_logs_and_non_log_files() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        let recent = tmp.path().join("recent.log");
        fs::write(&recent, "recent").expect("should write");
        let notes = tmp.path().join("notes.txt");
        fs::write(&notes, "notes").expect("should write");

        cleanup_old_logs(tmp.path());

        assert!(recent.exists(), "recent log file should be preserved");
        assert!(notes.exists(), "non-.log files should not be removed");
    }

    #[test]
    fn test_should_handle_nonexistent_log_dir() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        // Should not panic when the directory does not exist.
        cleanup_old_logs(&tmp.path().join("missing"));
    }

    #[test]
    fn test_should_return_error_for_invalid_log_dir() {
        let result = open_log_writer(Path::new("/dev/null/logs"));
        assert!(
            result.is_err(),
            "should fail when directory cannot be created"
        );
    }

    #[test]
    fn test_should_return_none_guard_without_log_dir() {
        let result = build_tracing(None).expect("should build");
        assert!(
            result.is_none(),
            "should return None when no log directory is given",
        );
    }
}
