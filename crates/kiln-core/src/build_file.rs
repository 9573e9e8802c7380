use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::configuration::{Configuration, ConfigurationRegistry};
use crate::constraint::VersionConstraint;
use crate::dependency::{
    DependencyDescriptor, ExternalDependency, FileDependency, ProjectDependency,
};
use crate::error::ModelError;
use crate::identity::ModuleIdentity;
use crate::rules::{ConstraintRule, ExcludeRule, RuleSet, SubstitutionRule};

/// The parsed representation of a `Kiln.toml` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildFile {
    pub project: ProjectInfo,

    #[serde(default)]
    pub configurations: BTreeMap<String, ConfigurationDecl>,

    /// Module metadata served by the file-backed metadata source.
    #[serde(default)]
    pub modules: Vec<ModuleDecl>,
}

/// Project identity from the `[project]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    #[serde(default)]
    pub group: String,
    pub version: String,
}

/// One `[configurations.<name>]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigurationDecl {
    #[serde(default, rename = "extends-from")]
    pub extends_from: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<DependencyDecl>,
    #[serde(default)]
    pub exclude: Vec<ExcludeRule>,
    /// `group:name:version` entries forced to that version.
    #[serde(default)]
    pub force: Vec<String>,
    /// `group:name:version` entries pinned strictly to that version.
    #[serde(default)]
    pub strict: Vec<String>,
    #[serde(default)]
    pub substitute: Vec<SubstituteDecl>,
}

/// A dependency entry: shorthand string or one of the table forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyDecl {
    Short(String),
    Module {
        module: String,
        version: String,
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        exclude: Vec<ExcludeRule>,
        #[serde(default)]
        attributes: BTreeMap<String, String>,
    },
    Project {
        project: String,
        #[serde(default)]
        configuration: Option<String>,
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        exclude: Vec<ExcludeRule>,
    },
    Files {
        name: String,
        files: Vec<PathBuf>,
    },
}

/// A `substitute = [{ from, to, version }]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstituteDecl {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// A `[[modules]]` entry: the metadata of one module version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDecl {
    pub module: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: Vec<DependencyDecl>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<ExcludeRule>,
    /// Token that changes whenever this module's metadata changes.
    #[serde(default)]
    pub revision: Option<String>,
}

impl BuildFile {
    /// Load and parse a `Kiln.toml` file from the given path.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            kiln_util::errors::KilnError::BuildFile {
                message: format!("Failed to read {}: {e}", path.display()),
            }
        })?;
        Self::parse_toml(&content)
    }

    /// Parse a `Kiln.toml` from a string.
    pub fn parse_toml(content: &str) -> miette::Result<Self> {
        toml::from_str(content).map_err(|e| {
            kiln_util::errors::KilnError::BuildFile {
                message: format!("Failed to parse Kiln.toml: {e}"),
            }
            .into()
        })
    }

    /// Register every declared configuration.
    ///
    /// Fails on the first invalid entry or inheritance cycle.
    pub fn registry(&self) -> Result<ConfigurationRegistry, ModelError> {
        let mut registry = ConfigurationRegistry::new();
        for (name, decl) in &self.configurations {
            registry.register(decl.to_configuration(name, &self.project)?)?;
        }
        Ok(registry)
    }
}

impl ConfigurationDecl {
    pub fn to_configuration(
        &self,
        name: &str,
        project: &ProjectInfo,
    ) -> Result<Configuration, ModelError> {
        let dependencies = self
            .dependencies
            .iter()
            .map(|d| d.to_descriptor(project))
            .collect::<Result<Vec<_>, _>>()?;

        let mut rules = RuleSet::new();
        for sub in &self.substitute {
            rules.substitutions.push(SubstitutionRule {
                from: ModuleIdentity::parse(&sub.from)?,
                to: ModuleIdentity::parse(&sub.to)?,
                constraint: sub.version.as_deref().map(str::parse).transpose()?,
            });
        }
        for (entries, prefix) in [(&self.strict, "="), (&self.force, "!")] {
            for entry in entries {
                let (module, version) = split_coordinate(entry)?;
                let constraint: VersionConstraint = format!("{prefix}{version}").parse()?;
                rules.constraints.push(ConstraintRule::new(module, constraint)?);
            }
        }
        rules.excludes = self.exclude.clone();

        Ok(Configuration {
            name: name.to_string(),
            dependencies,
            rules,
            extends_from: self.extends_from.clone(),
        })
    }
}

impl DependencyDecl {
    pub fn to_descriptor(&self, project: &ProjectInfo) -> Result<DependencyDescriptor, ModelError> {
        match self {
            Self::Short(s) => DependencyDescriptor::external(s),
            Self::Module {
                module,
                version,
                optional,
                exclude,
                attributes,
            } => {
                let mut dep = ExternalDependency::new(ModuleIdentity::parse(module)?, version.parse()?);
                dep.optional = *optional;
                dep.excludes = exclude.clone();
                dep.attributes = attributes.clone();
                Ok(DependencyDescriptor::External(dep))
            }
            Self::Project {
                project: path,
                configuration,
                optional,
                exclude,
            } => {
                let mut dep = ProjectDependency::new(&project.group, path, &project.version);
                dep.configuration = configuration.clone();
                dep.optional = *optional;
                dep.excludes = exclude.clone();
                Ok(DependencyDescriptor::Project(dep))
            }
            Self::Files { name, files } => {
                Ok(DependencyDescriptor::File(FileDependency::new(name, files.clone())))
            }
        }
    }
}

/// Split `group:name:version` into identity and version text.
fn split_coordinate(entry: &str) -> Result<(ModuleIdentity, &str), ModelError> {
    match entry.rsplit_once(':') {
        Some((module, version)) if !version.is_empty() => {
            Ok((ModuleIdentity::parse(module)?, version))
        }
        _ => Err(ModelError::InvalidNotation {
            input: entry.to_string(),
            reason: "expected `group:name:version`".to_string(),
        }),
    }
}
