//! High-level operations wiring CLI commands to the resolver: loading the
//! build file, resolving configurations, and rendering trees.

pub mod file_source;
pub mod ops_resolve;
pub mod ops_tree;

use std::path::Path;
use std::sync::Arc;

use kiln_core::build_file::BuildFile;
use kiln_core::config::GlobalConfig;
use kiln_resolver::{InMemorySource, Resolver, ResolverOptions};

/// Name of the build file at the project root.
pub const BUILD_FILE: &str = "Kiln.toml";

/// A loaded project, ready to resolve.
pub struct Project {
    pub build: BuildFile,
    pub resolver: Resolver<InMemorySource>,
}

/// Load `Kiln.toml` from `project_root`, freeze its configurations, and set
/// up a resolver over its module metadata.
pub fn open_project(project_root: &Path) -> miette::Result<Project> {
    let build = BuildFile::from_path(&project_root.join(BUILD_FILE))?;
    let config = GlobalConfig::load()?;
    let model = build.registry()?.freeze()?;
    let source = file_source::source_from_build_file(&build)?;
    tracing::debug!(
        "Loaded project {} with {} configuration(s)",
        build.project.name,
        build.configurations.len()
    );

    let resolver = Resolver::new(
        Arc::new(model),
        Arc::new(source),
        ResolverOptions::from(&config.resolution),
    );
    Ok(Project { build, resolver })
}
