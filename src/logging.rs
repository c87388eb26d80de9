//! Logging setup
//!
//! JSON lines go to `combined.log` (everything passing the filter) and
//! `error.log` (errors only) under the log directory. The console only gets
//! output in development.
//!
//! Each file rotates at [`MAX_LOG_BYTES`]: `combined.log` becomes
//! `combined.log.1`, older files shift up and at most [`ROTATED_LOGS`] of them
//! are kept. Writes go through a background worker so request tasks never
//! block on disk.

use anyhow::{Context, Result};
use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

pub const COMBINED_LOG: &str = "combined.log";
pub const ERROR_LOG: &str = "error.log";

/// Size at which a log file is rotated
pub const MAX_LOG_BYTES: usize = 5 * 1024 * 1024;

/// Rotated files kept next to the live one
pub const ROTATED_LOGS: usize = 4;

/// Logging settings
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info` or `dynproxy=debug`
    pub level: String,
    pub dir: PathBuf,
    pub console: bool,
}

/// Keeps the file writers alive. Dropping it flushes pending lines, so hold it
/// until the process exits.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _workers: [WorkerGuard; 2],
}

/// Install the global subscriber
pub fn init(settings: &LogSettings) -> Result<LogGuard> {
    let filter = EnvFilter::try_new(&settings.level).unwrap_or_else(|_| EnvFilter::new("info"));

    fs::create_dir_all(&settings.dir)
        .with_context(|| format!("Failed to create log directory {}", settings.dir.display()))?;
    let (combined, combined_guard) = file_writer(&settings.dir.join(COMBINED_LOG), MAX_LOG_BYTES);
    let (errors, errors_guard) = file_writer(&settings.dir.join(ERROR_LOG), MAX_LOG_BYTES);

    let console = settings
        .console
        .then(|| fmt::layer().with_target(false).compact());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_current_span(true)
                .with_writer(combined),
        )
        .with(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(errors)
                .with_filter(LevelFilter::ERROR),
        )
        .with(console)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuard {
        _workers: [combined_guard, errors_guard],
    })
}

/// Non-blocking writer over a size-rotated file
fn file_writer(path: &Path, max_bytes: usize) -> (NonBlocking, WorkerGuard) {
    tracing_appender::non_blocking(rotating_file(path, max_bytes))
}

fn rotating_file(path: &Path, max_bytes: usize) -> FileRotate<AppendCount> {
    FileRotate::new(
        path,
        AppendCount::new(ROTATED_LOGS),
        ContentLimit::Bytes(max_bytes),
        Compression::None,
        #[cfg(unix)]
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn rotated(path: &Path, n: usize) -> PathBuf {
        PathBuf::from(format!("{}.{}", path.display(), n))
    }

    #[test]
    fn test_rotating_file_caps_size_and_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(COMBINED_LOG);

        let mut file = rotating_file(&path, 16);
        for i in 0..20 {
            writeln!(file, "line {:02}", i).unwrap();
        }
        file.flush().unwrap();

        assert!(fs::metadata(&path).unwrap().len() <= 16);
        for n in 1..=ROTATED_LOGS {
            let older = rotated(&path, n);
            assert!(older.exists(), "{} missing", older.display());
            assert!(fs::metadata(&older).unwrap().len() <= 16);
        }
        assert!(!rotated(&path, ROTATED_LOGS + 1).exists());

        // The newest lines stay in the live file
        assert!(fs::read_to_string(&path).unwrap().contains("line 19"));
    }

    #[test]
    fn test_file_writer_flushes_on_guard_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(ERROR_LOG);

        let (mut writer, guard) = file_writer(&path, MAX_LOG_BYTES);
        writeln!(writer, "first").unwrap();
        writeln!(writer, "second").unwrap();
        drop(guard);

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
