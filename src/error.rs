//! Central error types for tainthound.
//!
//! Uses `thiserror` for ergonomic error definitions with automatic
//! `Display` and `From` implementations.
//!
//! The taxonomy deliberately separates fatal conditions (configuration
//! errors, deliberate cancellation) from recoverable ones. Recoverable
//! conditions never abort a run: the pipeline converts them into findings
//! (`unparseable`, `unresolved-dynamic-call`, ...) so results stay
//! auditable instead of silently incomplete.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum HoundError {
    /// IO operation failed (without path context - prefer IoWithPath when path is available)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IO operation failed with path context for better error messages
    #[error("IO error at {path}: {error}")]
    IoWithPath {
        error: std::io::Error,
        path: PathBuf,
    },

    /// Failed to parse a source file. The pipeline records this as an
    /// `unparseable` finding and skips the file.
    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    /// Tree-sitter grammar or query error
    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),

    /// No registered language can analyze the file
    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Invalid analysis configuration (bad matcher regex, unknown detector
    /// id, empty sink table). The only fatal startup error class.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The run was cancelled via the cancellation token.
    #[error("Analysis cancelled")]
    Cancelled,
}

/// Convenience type alias for Results using HoundError.
pub type Result<T> = std::result::Result<T, HoundError>;

impl HoundError {
    /// Create an IO error with path context.
    ///
    /// Use this when reading files so error messages name the path that
    /// failed.
    #[inline]
    pub fn io_with_path(error: std::io::Error, path: impl AsRef<Path>) -> Self {
        HoundError::IoWithPath {
            error,
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create a parse error for a file.
    #[inline]
    pub fn parse(file: impl Into<String>, message: impl Into<String>) -> Self {
        HoundError::Parse {
            file: file.into(),
            message: message.into(),
        }
    }
}
