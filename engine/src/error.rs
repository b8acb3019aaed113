//! Error types for the watch engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Terminal failures of a watch-engine instance.
///
/// Recoverable conditions (an unreadable subtree, a directory that
/// vanished before it could be registered, an event whose path no
/// longer resolves) are absorbed and logged where they occur. Only
/// configuration problems and loss of the watch subsystem itself
/// surface through this type.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Base directory missing at startup.
    #[error("base directory not found: {0}")]
    BaseDirectoryNotFound(String),

    /// Base path exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// An include or exclude glob failed to compile.
    #[error("invalid glob pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend's event stream closed while directories were still
    /// registered.
    #[error("watch backend closed unexpectedly")]
    BackendClosed,
}
