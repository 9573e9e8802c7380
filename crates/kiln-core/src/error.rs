use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while declaring or freezing the configuration model.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ModelError {
    /// The `extends-from` relation would contain a cycle.
    #[error("Configuration inheritance cycle: {}", path.join(" -> "))]
    #[diagnostic(help("A configuration cannot (transitively) extend itself"))]
    CycleDetected { path: Vec<String> },

    #[error("Configuration '{name}' is already registered")]
    DuplicateConfiguration { name: String },

    #[error("Configuration '{configuration}' extends unknown configuration '{parent}'")]
    UnknownParent {
        configuration: String,
        parent: String,
    },

    #[error("Unknown configuration '{name}'")]
    UnknownConfiguration { name: String },

    /// A coordinate, version, or constraint string could not be parsed.
    #[error("Invalid notation '{input}': {reason}")]
    InvalidNotation { input: String, reason: String },
}
