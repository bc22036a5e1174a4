use std::path::PathBuf;

use directories::ProjectDirs;

/// Per-user data directory for the front-end (log files live below it).
///
/// Falls back to `./solidb-www` when the platform gives us no home directory.
pub fn data_dir() -> PathBuf {
    ProjectDirs::from("io", "solidb", "solidb-www")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("solidb-www"))
}

/// Default directory for rotated log files.
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}
