//! The metadata source: the only I/O boundary of resolution.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use kiln_core::constraint::VersionConstraint;
use kiln_core::dependency::DependencyDescriptor;
use kiln_core::identity::ModuleIdentity;
use kiln_core::rules::ExcludeRule;
use kiln_core::version::Version;
use thiserror::Error;

/// What a source knows about one version of a module.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleMetadata {
    pub version: Version,
    pub dependencies: Vec<DependencyDescriptor>,
    pub artifacts: Vec<String>,
    /// Exclusions applied to everything below this module.
    pub excludes: Vec<ExcludeRule>,
}

impl ModuleMetadata {
    pub fn new(version: &str) -> Self {
        Self {
            version: Version::parse(version),
            dependencies: Vec::new(),
            artifacts: Vec::new(),
            excludes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("not found")]
    NotFound,
    /// Retrying is the caller's business.
    #[error("{0}")]
    Transport(String),
}

/// Resolves a module identity and constraint to module metadata.
pub trait MetadataSource: Send + Sync + 'static {
    fn fetch_descriptor(
        &self,
        module: &ModuleIdentity,
        constraint: &VersionConstraint,
    ) -> impl Future<Output = Result<ModuleMetadata, FetchError>> + Send;

    /// A token that changes whenever the metadata of `module` changes.
    ///
    /// Must be cheap; it is called on every cache lookup.
    fn revision(&self, module: &ModuleIdentity) -> Option<String>;
}

/// A metadata source backed by a map, used by the build-file repository and
/// by tests.
#[derive(Debug, Default)]
pub struct InMemorySource {
    modules: HashMap<ModuleIdentity, Vec<ModuleMetadata>>,
    revisions: HashMap<ModuleIdentity, String>,
    failing: HashMap<ModuleIdentity, String>,
    fetches: AtomicUsize,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one version of a module; versions are kept sorted.
    pub fn insert(&mut self, module: ModuleIdentity, metadata: ModuleMetadata) {
        let versions = self.modules.entry(module).or_default();
        versions.retain(|m| m.version != metadata.version);
        versions.push(metadata);
        versions.sort_by(|a, b| a.version.cmp(&b.version));
    }

    pub fn set_revision(&mut self, module: ModuleIdentity, revision: impl Into<String>) {
        self.revisions.insert(module, revision.into());
    }

    /// Make every fetch of `module` fail with a transport error.
    pub fn fail_with(&mut self, module: ModuleIdentity, message: impl Into<String>) {
        self.failing.insert(module, message.into());
    }

    pub fn contains(&self, module: &ModuleIdentity) -> bool {
        self.modules.contains_key(module)
    }

    /// Number of fetches served so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// The version a constraint picks among the known ones: the requested
    /// version when it is known and admitted, else the highest admitted.
    fn select(&self, module: &ModuleIdentity, constraint: &VersionConstraint) -> Option<&ModuleMetadata> {
        let versions = self.modules.get(module)?;
        if let Some(requested) = constraint.requested_version() {
            if let Some(m) = versions
                .iter()
                .find(|m| &m.version == requested && constraint.admits(&m.version))
            {
                return Some(m);
            }
        }
        versions.iter().rev().find(|m| constraint.admits(&m.version))
    }
}

impl MetadataSource for InMemorySource {
    async fn fetch_descriptor(
        &self,
        module: &ModuleIdentity,
        constraint: &VersionConstraint,
    ) -> Result<ModuleMetadata, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failing.get(module) {
            return Err(FetchError::Transport(message.clone()));
        }
        self.select(module, constraint)
            .cloned()
            .ok_or(FetchError::NotFound)
    }

    fn revision(&self, module: &ModuleIdentity) -> Option<String> {
        self.revisions.get(module).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ModuleIdentity {
        ModuleIdentity::parse(s).unwrap()
    }

    fn source() -> InMemorySource {
        let mut source = InMemorySource::new();
        for v in ["1.0", "1.2", "2.0"] {
            source.insert(id("org:lib"), ModuleMetadata::new(v));
        }
        source
    }

    #[tokio::test]
    async fn picks_requested_version_when_known() {
        let source = source();
        let m = source
            .fetch_descriptor(&id("org:lib"), &VersionConstraint::required("1.2"))
            .await
            .unwrap();
        assert_eq!(m.version, Version::parse("1.2"));
    }

    #[tokio::test]
    async fn ranges_pick_highest_admitted() {
        let source = source();
        let range: VersionConstraint = "[1.1,2.0)".parse().unwrap();
        let m = source.fetch_descriptor(&id("org:lib"), &range).await.unwrap();
        assert_eq!(m.version, Version::parse("1.2"));
    }

    #[tokio::test]
    async fn strict_miss_is_not_found() {
        let source = source();
        let err = source
            .fetch_descriptor(&id("org:lib"), &VersionConstraint::strict("1.1"))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::NotFound);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn transport_failures() {
        let mut source = source();
        source.fail_with(id("org:lib"), "connection reset");
        let err = source
            .fetch_descriptor(&id("org:lib"), &VersionConstraint::required("1.0"))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Transport("connection reset".into()));
    }
}
