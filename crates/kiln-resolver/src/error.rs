//! Resolution errors and the per-module failure report.

use std::fmt;

use kiln_core::error::ModelError;
use kiln_core::identity::ModuleIdentity;
use miette::Diagnostic;
use thiserror::Error;

use crate::conflict::ConflictRequest;

/// Errors that abort the resolution of one configuration.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum ResolveError {
    #[error("Could not resolve all dependencies of configuration '{configuration}'")]
    #[diagnostic(help("Declare the dependency as optional, or add the module to the metadata source"))]
    ModuleNotFound {
        configuration: String,
        #[related]
        missing: Vec<MissingModule>,
    },

    #[error("Unresolvable version conflicts in configuration '{configuration}'")]
    Conflict {
        configuration: String,
        #[related]
        conflicts: Vec<ConflictError>,
    },

    #[error("Dependency cycle in configuration '{configuration}': {}", join_path(path))]
    #[diagnostic(help("Only a configuration resolved as cycle-tolerant may reference itself"))]
    CycleDetected {
        configuration: String,
        path: Vec<ModuleIdentity>,
    },

    #[error(
        "Resolution of configuration '{configuration}' did not converge after {iterations} iterations (still changing: {})",
        join_ids(oscillating)
    )]
    #[diagnostic(help("Raise `max-iterations` in the [resolution] table of the global config"))]
    DidNotConverge {
        configuration: String,
        iterations: usize,
        oscillating: Vec<ModuleIdentity>,
    },

    #[error("Resolution of configuration '{configuration}' was cancelled")]
    Cancelled { configuration: String },

    #[error("Failed to fetch metadata for {module} in configuration '{configuration}': {message}")]
    Transport {
        configuration: String,
        module: ModuleIdentity,
        message: String,
    },

    #[error("Unknown configuration '{name}'")]
    UnknownConfiguration { name: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Model(ModelError),
}

impl From<ModelError> for ResolveError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::UnknownConfiguration { name } => Self::UnknownConfiguration { name },
            other => Self::Model(other),
        }
    }
}

impl ResolveError {
    /// The modules that could not be resolved, with their context.
    ///
    /// Empty for errors that are not tied to particular modules.
    pub fn failures(&self) -> Vec<ModuleFailure> {
        match self {
            Self::ModuleNotFound { missing, .. } => {
                missing.iter().cloned().map(ModuleFailure::NotFound).collect()
            }
            Self::Conflict { conflicts, .. } => {
                conflicts.iter().cloned().map(ModuleFailure::Conflict).collect()
            }
            Self::CycleDetected { path, .. } => vec![ModuleFailure::Cycle { path: path.clone() }],
            _ => Vec::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// A non-optional module the metadata source does not know.
#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
#[error("Module {module} not found (requested by {})", join_requests(requested_by))]
pub struct MissingModule {
    pub module: ModuleIdentity,
    pub requested_by: Vec<ConflictRequest>,
}

/// Incompatible constraints on one module.
#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
#[error("Version conflict on {module}: {reason} (requested {})", join_requests(requests))]
pub struct ConflictError {
    pub module: ModuleIdentity,
    pub reason: String,
    /// Every requester involved in the conflict.
    pub requests: Vec<ConflictRequest>,
}

/// One entry of the structured failure report.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleFailure {
    NotFound(MissingModule),
    Conflict(ConflictError),
    Cycle { path: Vec<ModuleIdentity> },
}

impl ModuleFailure {
    /// The module the failure is reported against.
    pub fn module(&self) -> Option<&ModuleIdentity> {
        match self {
            Self::NotFound(m) => Some(&m.module),
            Self::Conflict(c) => Some(&c.module),
            Self::Cycle { path } => path.first(),
        }
    }
}

impl fmt::Display for ModuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(m) => write!(f, "{m}"),
            Self::Conflict(c) => write!(f, "{c}"),
            Self::Cycle { path } => write!(f, "Dependency cycle: {}", join_path(path)),
        }
    }
}

fn join_path(path: &[ModuleIdentity]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn join_ids(ids: &[ModuleIdentity]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_requests(requests: &[ConflictRequest]) -> String {
    requests
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
