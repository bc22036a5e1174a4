//! Console and optional file logging.
//!
//! File output uses tracing-appender with daily rotation and is switched on
//! through the environment:
//!
//! - `SDB_WWW_FILE_LOGGING`: "true" or "1" to enable file logging
//! - `SDB_WWW_LOG_DIR`: log directory (defaults to `{data_dir}/logs`)
//! - `SDB_WWW_LOG_MAX_FILES`: number of daily files to keep (default: 7)
//!
//! Files are JSON, one event per line:
//! ```json
//! {"timestamp":"2026-03-14T10:30:00Z","level":"INFO","target":"server","message":"..."}
//! ```

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};
use utils::assets::log_dir;

const LOG_FILE_PREFIX: &str = "solidb-www.log";

#[derive(Debug, Clone)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    pub log_dir: PathBuf,
    /// Number of daily log files to retain.
    pub max_files: usize,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        let enabled = std::env::var("SDB_WWW_FILE_LOGGING")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let log_dir = std::env::var("SDB_WWW_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| log_dir());

        let max_files = std::env::var("SDB_WWW_LOG_MAX_FILES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(7);

        Self {
            enabled,
            log_dir,
            max_files,
        }
    }
}

/// Filter directive for the workspace crates at `log_level`, everything else
/// at `warn`.
pub fn filter_directive(log_level: &str) -> String {
    format!(
        "warn,server={level},services={level},utils={level},tower_http={level}",
        level = log_level
    )
}

fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(filter_directive(log_level)).unwrap_or_else(|e| {
        eprintln!("Invalid log level '{log_level}': {e}; falling back to info");
        EnvFilter::new(filter_directive("info"))
    })
}

/// Initialize logging. The returned guard flushes the file writer when
/// dropped and must live as long as the application.
pub fn init_logging(log_level: &str) -> Option<WorkerGuard> {
    let config = FileLoggingConfig::default();
    let console_layer = tracing_subscriber::fmt::layer().with_filter(build_filter(log_level));

    if !config.enabled {
        tracing_subscriber::registry().with(console_layer).init();
        return None;
    }

    if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
        eprintln!("Failed to create log directory {:?}: {}", config.log_dir, e);
        tracing_subscriber::registry().with(console_layer).init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(build_filter(log_level));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!(
        log_dir = ?config.log_dir,
        max_files = config.max_files,
        "File logging enabled"
    );

    let log_dir = config.log_dir.clone();
    let max_files = config.max_files;
    std::thread::spawn(move || cleanup_old_logs(&log_dir, max_files));

    Some(guard)
}

/// Delete rotated log files beyond the newest `max_files`.
fn cleanup_old_logs(log_dir: &Path, max_files: usize) {
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return;
    };

    let mut log_files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX))
        })
        .filter_map(|e| {
            e.metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(|t| (e.path(), t))
        })
        .collect();

    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.into_iter().skip(max_files) {
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!("Failed to remove old log file {:?}: {}", path, e);
        } else {
            tracing::debug!("Removed old log file: {:?}", path);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    #[test]
    fn directive_covers_workspace_crates() {
        let directive = filter_directive("debug");
        assert!(directive.starts_with("warn,"));
        for krate in ["server=debug", "services=debug", "utils=debug"] {
            assert!(directive.contains(krate));
        }
    }

    #[test]
    fn cleanup_keeps_newest_files() {
        let dir = std::env::temp_dir().join(format!("solidb-www-logs-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let now = SystemTime::now();
        for day in 0..4u64 {
            let path = dir.join(format!("{LOG_FILE_PREFIX}.2026-01-0{}", day + 1));
            std::fs::write(&path, "{}").unwrap();
            let file = std::fs::File::options().write(true).open(&path).unwrap();
            file.set_modified(now - Duration::from_secs(86_400 * (4 - day)))
                .unwrap();
        }
        std::fs::write(dir.join("unrelated.txt"), "keep").unwrap();

        cleanup_old_logs(&dir, 2);

        let mut remaining: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        remaining.sort();
        assert_eq!(
            remaining,
            [
                format!("{LOG_FILE_PREFIX}.2026-01-03"),
                format!("{LOG_FILE_PREFIX}.2026-01-04"),
                "unrelated.txt".to_string(),
            ]
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
