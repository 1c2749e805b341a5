/// Error types shared by the search, filter and replace layers.
///
/// Errors come in two flavours. Batch-level failures (an unreadable configuration, a
/// refresh that cannot be performed, a replace where every target is read-only) are
/// returned as `Err(SearchError)` and abort the operation before anything is mutated.
/// Local problems (a scanner that cannot be built, one match that no longer lines up
/// with the live text) are logged or collected as values by the caller and never
/// surface through this type.
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Errors that can occur during search and replace operations
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("Invalid UTF-8 in file {path}: {source}")]
    EncodingError {
        path: PathBuf,
        source: std::string::FromUtf8Error,
    },
    #[error("Scanner '{id}' is unavailable: {message}")]
    ScannerUnavailable { id: String, message: String },
    #[error("Cannot synchronize {path} with the file system: {message}")]
    OutOfSync { path: PathBuf, message: String },
    #[error("All {} target files are read-only", .0.len())]
    AllFilesReadOnly(Vec<PathBuf>),
    #[error("Unknown element: {0}")]
    UnknownElement(String),
    #[error("Operation cancelled")]
    Cancelled,
}

/// Canonicalize the path and strip UNC prefixes so that
/// comparisons on Windows are consistent.
pub fn unify_path(original: &Path) -> PathBuf {
    let canonical = original
        .canonicalize()
        .unwrap_or_else(|_| original.to_path_buf());
    strip_unc_prefix(&canonical)
}

/// Strips the Windows UNC prefix (\\?\) from a path if present
fn strip_unc_prefix(p: &Path) -> PathBuf {
    let s = p.display().to_string();
    if let Some(stripped) = s.strip_prefix(r"\\?\") {
        PathBuf::from(stripped)
    } else {
        p.to_path_buf()
    }
}

impl SearchError {
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn invalid_pattern(pattern: impl Into<String>) -> Self {
        Self::InvalidPattern(pattern.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn scanner_unavailable(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ScannerUnavailable {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn out_of_sync(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::OutOfSync {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn encoding_error(path: impl Into<PathBuf>, source: std::string::FromUtf8Error) -> Self {
        let path = path.into();
        let unified = unify_path(&path);
        Self::EncodingError {
            path: unified,
            source,
        }
    }

    /// Maps an I/O error on `path` to the most specific variant.
    pub fn from_io(path: &Path, e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => SearchError::file_not_found(path),
            std::io::ErrorKind::PermissionDenied => SearchError::permission_denied(path),
            _ => SearchError::IoError(e),
        }
    }
}
