//! Command dispatch and handler modules.

mod resolve;
mod tree;

use std::path::PathBuf;

use miette::Result;

use crate::cli::{Cli, Command};

/// Route a parsed CLI invocation to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Resolve {
            configurations,
            json,
            cycle_tolerant,
        } => resolve::exec(configurations, json, cycle_tolerant).await,
        Command::Tree {
            configuration,
            depth,
            why,
            conflicts,
            cycle_tolerant,
        } => tree::exec(&configuration, depth, why, conflicts, cycle_tolerant).await,
    }
}

/// The current directory, if it holds a `Kiln.toml`.
fn project_root() -> Result<PathBuf> {
    let project_root = std::env::current_dir().map_err(kiln_util::errors::KilnError::Io)?;

    if !project_root.join(kiln_ops::BUILD_FILE).is_file() {
        return Err(kiln_util::errors::KilnError::BuildFile {
            message: "No Kiln.toml found in current directory".to_string(),
        }
        .into());
    }
    Ok(project_root)
}
