use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for Kiln operations that have no more specific error.
#[derive(Debug, Error, Diagnostic)]
pub enum KilnError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or malformed build file (e.g. Kiln.toml).
    #[error("Build file error: {message}")]
    #[diagnostic(help("Check your Kiln.toml for syntax errors"))]
    BuildFile { message: String },

    /// Resolution of several configurations failed.
    #[error("Dependency resolution failed: {message}")]
    Resolution { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}
