/// Error types for pcapscout.
///
/// Every variant is fatal for the invocation that produced it. Nothing here is
/// transient, so callers are expected to report and stop rather than retry:
/// ```rust,ignore
/// match driver.run(path, &patterns) {
///     Ok(report) => // Render the report,
///     Err(ScanError::Format { path, .. }) => // Not a capture file,
///     Err(ScanError::DeviceInit(_)) => // Re-run with EngineKind::Sequential,
///     Err(e) => // Everything else,
/// }
/// ```
///
/// Running out of room in the match buffer is deliberately *not* an error; it
/// surfaces as `matches_found > matches_recorded` in the report.
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Pattern set validation failures, raised before any scanning starts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("Pattern {index} is {len} bytes, longer than the {max}-byte limit")]
    TooLong { index: usize, len: usize, max: usize },
    #[error("No non-empty patterns to search for")]
    EmptySet,
}

/// Errors that can occur while loading, compiling or scanning
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Unrecognized capture format in {path}: {reason}")]
    Format { path: PathBuf, reason: String },
    #[error("No packets decoded from {0}")]
    EmptyCapture(PathBuf),
    #[error("Invalid pattern set: {0}")]
    Pattern(#[from] PatternError),
    #[error("Parallel backend initialization failed: {0}")]
    DeviceInit(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ScanError {
    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn empty_capture(path: impl Into<PathBuf>) -> Self {
        Self::EmptyCapture(path.into())
    }

    pub fn device_init(msg: impl Into<String>) -> Self {
        Self::DeviceInit(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Maps an I/O error on `path` to the most specific variant
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::IoError(err),
        }
    }

    /// True for the pattern validation failures
    pub fn is_pattern_error(&self) -> bool {
        matches!(self, Self::Pattern(_))
    }
}
