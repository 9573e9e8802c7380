//! Metadata source backed by the `[[modules]]` tables of a build file.

use std::collections::{BTreeMap, BTreeSet};

use kiln_core::build_file::{BuildFile, DependencyDecl, ModuleDecl};
use kiln_core::dependency::DependencyDescriptor;
use kiln_core::error::ModelError;
use kiln_core::identity::ModuleIdentity;
use kiln_resolver::source::{InMemorySource, ModuleMetadata};
use kiln_util::hash::FingerprintHasher;

/// Build the metadata source for `build`.
///
/// Every `[[modules]]` entry becomes one module version. Projects that are
/// referenced but have no entry resolve to an artifact-less module at the
/// project version.
pub fn source_from_build_file(build: &BuildFile) -> Result<InMemorySource, ModelError> {
    let mut source = InMemorySource::new();
    let mut revisions: BTreeMap<ModuleIdentity, FingerprintHasher> = BTreeMap::new();

    for decl in &build.modules {
        let module = ModuleIdentity::parse(&decl.module)?;
        let mut metadata = ModuleMetadata::new(&decl.version);
        metadata.dependencies = decl
            .dependencies
            .iter()
            .map(|d| d.to_descriptor(&build.project))
            .collect::<Result<_, _>>()?;
        metadata.artifacts = decl.artifacts.clone();
        metadata.excludes = decl.exclude.clone();

        revisions
            .entry(module.clone())
            .or_default()
            .entry(&decl.version, &revision_of(decl));
        source.insert(module, metadata);
    }

    for module in project_references(build)? {
        if source.contains(&module) {
            continue;
        }
        tracing::debug!("Serving project {module} without module metadata");
        source.insert(module.clone(), ModuleMetadata::new(&build.project.version));
        revisions
            .entry(module)
            .or_default()
            .entry("project", &build.project.version);
    }

    for (module, hasher) in revisions {
        source.set_revision(module, hasher.finish());
    }
    Ok(source)
}

/// The declared revision, or a digest of the entry itself.
fn revision_of(decl: &ModuleDecl) -> String {
    match &decl.revision {
        Some(revision) => revision.clone(),
        None => {
            let mut hasher = FingerprintHasher::new();
            hasher.entry("module", &format!("{decl:?}"));
            hasher.finish()
        }
    }
}

fn project_references(build: &BuildFile) -> Result<BTreeSet<ModuleIdentity>, ModelError> {
    let decls = build
        .configurations
        .values()
        .flat_map(|c| c.dependencies.iter())
        .chain(build.modules.iter().flat_map(|m| m.dependencies.iter()));

    let mut projects = BTreeSet::new();
    for decl in decls {
        if !matches!(decl, DependencyDecl::Project { .. }) {
            continue;
        }
        if let DependencyDescriptor::Project(p) = decl.to_descriptor(&build.project)? {
            projects.insert(p.module);
        }
    }
    Ok(projects)
}
