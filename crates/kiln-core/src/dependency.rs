use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::constraint::VersionConstraint;
use crate::error::ModelError;
use crate::identity::ModuleIdentity;
use crate::rules::ExcludeRule;
use crate::version::Version;

/// Group used for the synthetic identities of file-based dependencies.
pub const LOCAL_FILES_GROUP: &str = "local-files";

/// A declared dependency.
///
/// All variants expose [`identity`](Self::identity),
/// [`constraint`](Self::constraint) and [`excludes`](Self::excludes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DependencyDescriptor {
    External(ExternalDependency),
    Project(ProjectDependency),
    File(FileDependency),
}

/// A module fetched through the metadata source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ExternalDependency {
    pub module: ModuleIdentity,
    pub constraint: VersionConstraint,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<ExcludeRule>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// A reference to another project of the same build.
///
/// Projects request their own version strictly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProjectDependency {
    pub path: String,
    pub module: ModuleIdentity,
    pub constraint: VersionConstraint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<ExcludeRule>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

/// Local files added directly to a configuration.
///
/// These never reach the metadata source; they resolve to a leaf whose
/// artifacts are the files themselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FileDependency {
    pub label: String,
    pub module: ModuleIdentity,
    pub files: Vec<PathBuf>,
    #[serde(skip)]
    constraint: VersionConstraint,
}

impl ExternalDependency {
    pub fn new(module: ModuleIdentity, constraint: VersionConstraint) -> Self {
        Self {
            module,
            constraint,
            excludes: Vec::new(),
            optional: false,
            attributes: BTreeMap::new(),
        }
    }
}

impl ProjectDependency {
    /// `path` is the project path (`:fixtures` or `fixtures`); its last
    /// segment becomes the module name.
    pub fn new(group: &str, path: &str, version: &str) -> Self {
        let name = path.rsplit(':').next().unwrap_or(path);
        Self {
            path: path.to_string(),
            module: ModuleIdentity::new(group, name),
            constraint: VersionConstraint::Strict(Version::parse(version)),
            configuration: None,
            excludes: Vec::new(),
            optional: false,
        }
    }
}

impl FileDependency {
    pub fn new(label: &str, files: Vec<PathBuf>) -> Self {
        Self {
            label: label.to_string(),
            module: ModuleIdentity::new(LOCAL_FILES_GROUP, label),
            files,
            constraint: VersionConstraint::Strict(Version::unspecified()),
        }
    }
}

impl DependencyDescriptor {
    /// `group:name:constraint`, e.g. `org.slf4j:slf4j-api:1.7.36`.
    pub fn external(notation: &str) -> Result<Self, ModelError> {
        let mut parts = notation.splitn(3, ':');
        let (Some(group), Some(name), Some(constraint)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ModelError::InvalidNotation {
                input: notation.to_string(),
                reason: "expected `group:name:version`".to_string(),
            });
        };
        let module = ModuleIdentity::parse(&format!("{group}:{name}"))?;
        Ok(Self::External(ExternalDependency::new(
            module,
            constraint.parse()?,
        )))
    }

    pub fn identity(&self) -> &ModuleIdentity {
        match self {
            Self::External(d) => &d.module,
            Self::Project(d) => &d.module,
            Self::File(d) => &d.module,
        }
    }

    pub fn constraint(&self) -> &VersionConstraint {
        match self {
            Self::External(d) => &d.constraint,
            Self::Project(d) => &d.constraint,
            Self::File(d) => &d.constraint,
        }
    }

    /// Whether this declaration excludes `candidate` from its transitive
    /// dependencies.
    pub fn excludes(&self, candidate: &ModuleIdentity) -> bool {
        self.exclude_rules().iter().any(|e| e.matches(candidate))
    }

    pub fn exclude_rules(&self) -> &[ExcludeRule] {
        match self {
            Self::External(d) => &d.excludes,
            Self::Project(d) => &d.excludes,
            Self::File(_) => &[],
        }
    }

    pub fn is_optional(&self) -> bool {
        match self {
            Self::External(d) => d.optional,
            Self::Project(d) => d.optional,
            Self::File(_) => false,
        }
    }

    /// Same declaration pointing at another module. File dependencies keep
    /// their synthetic identity.
    pub fn with_identity(&self, module: ModuleIdentity) -> Self {
        let mut copy = self.clone();
        match &mut copy {
            Self::External(d) => d.module = module,
            Self::Project(d) => d.module = module,
            Self::File(_) => {}
        }
        copy
    }

    /// Same declaration with another constraint. File dependencies keep
    /// their placeholder constraint.
    pub fn with_constraint(&self, constraint: VersionConstraint) -> Self {
        let mut copy = self.clone();
        match &mut copy {
            Self::External(d) => d.constraint = constraint,
            Self::Project(d) => d.constraint = constraint,
            Self::File(_) => {}
        }
        copy
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::File(_))
    }
}

impl fmt::Display for DependencyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External(d) => write!(f, "{}:{}", d.module, d.constraint),
            Self::Project(d) => write!(f, "project {}", d.path),
            Self::File(d) => write!(f, "files '{}'", d.label),
        }
    }
}
