//! Resolution rules declared on configurations and the build-scoped table
//! that holds them once the declaration phase is over.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};

use crate::constraint::{ConstraintKind, VersionConstraint};
use crate::error::ModelError;
use crate::identity::ModuleIdentity;

/// A transitive dependency to exclude.
///
/// Both parts are glob patterns; a missing `module` excludes the whole group.
/// The patterns are compiled on first match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExcludeRule {
    pub group: String,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(skip)]
    compiled: CompiledPatterns,
}

impl ExcludeRule {
    pub fn group(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            module: None,
            compiled: CompiledPatterns::default(),
        }
    }

    pub fn module(group: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            module: Some(module.into()),
            compiled: CompiledPatterns::default(),
        }
    }

    pub fn matches(&self, candidate: &ModuleIdentity) -> bool {
        let (group, module) = self.compiled.0.get_or_init(|| {
            (
                Pattern::new(&self.group),
                self.module.as_deref().map(Pattern::new),
            )
        });
        group.is_match(&candidate.group)
            && module.as_ref().map_or(true, |m| m.is_match(&candidate.name))
    }
}

impl fmt::Display for ExcludeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(m) => write!(f, "{}:{m}", self.group),
            None => write!(f, "{}:*", self.group),
        }
    }
}

/// Matchers for an [`ExcludeRule`]. Never part of its identity: equality,
/// hashing and debug output only see the pattern strings.
#[derive(Clone, Default)]
struct CompiledPatterns(OnceLock<(Pattern, Option<Pattern>)>);

impl fmt::Debug for CompiledPatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("..")
    }
}

impl PartialEq for CompiledPatterns {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Eq for CompiledPatterns {}

impl Hash for CompiledPatterns {
    fn hash<H: Hasher>(&self, _: &mut H) {}
}

#[derive(Clone)]
enum Pattern {
    Exact(String),
    Glob(GlobMatcher),
    Invalid,
}

impl Pattern {
    fn new(pattern: &str) -> Self {
        if !pattern.contains(['*', '?', '[', '{']) {
            return Self::Exact(pattern.to_string());
        }
        match Glob::new(pattern) {
            Ok(glob) => Self::Glob(glob.compile_matcher()),
            Err(e) => {
                tracing::warn!("Ignoring invalid exclude pattern '{pattern}': {e}");
                Self::Invalid
            }
        }
    }

    fn is_match(&self, value: &str) -> bool {
        match self {
            Self::Exact(p) => p == value,
            Self::Glob(m) => m.is_match(value),
            Self::Invalid => false,
        }
    }
}

/// Redirects requests for one module to another (e.g. `log4j:log4j` to
/// `org.slf4j:log4j-over-slf4j`), optionally replacing the constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SubstitutionRule {
    pub from: ModuleIdentity,
    pub to: ModuleIdentity,
    pub constraint: Option<VersionConstraint>,
}

/// Overrides the constraint of every request for `module`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConstraintRule {
    pub module: ModuleIdentity,
    pub constraint: VersionConstraint,
}

impl ConstraintRule {
    /// Only strict and forced constraints can be imposed by a rule.
    pub fn new(module: ModuleIdentity, constraint: VersionConstraint) -> Result<Self, ModelError> {
        match constraint.kind() {
            ConstraintKind::Strict | ConstraintKind::Forced => Ok(Self { module, constraint }),
            _ => Err(ModelError::InvalidNotation {
                input: format!("{module}:{constraint}"),
                reason: "constraint rules must be strict (`=`) or forced (`!`)".to_string(),
            }),
        }
    }
}

/// The rules of one configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct RuleSet {
    pub substitutions: Vec<SubstitutionRule>,
    pub constraints: Vec<ConstraintRule>,
    pub excludes: Vec<ExcludeRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.substitutions.is_empty() && self.constraints.is_empty() && self.excludes.is_empty()
    }

    /// First substitution declared for `module`.
    pub fn substitution_for(&self, module: &ModuleIdentity) -> Option<&SubstitutionRule> {
        self.substitutions.iter().find(|s| &s.from == module)
    }

    /// First constraint rule declared for `module`.
    pub fn constraint_for(&self, module: &ModuleIdentity) -> Option<&ConstraintRule> {
        self.constraints.iter().find(|c| &c.module == module)
    }

    /// First exclusion matching `module`.
    pub fn exclusion_for(&self, module: &ModuleIdentity) -> Option<&ExcludeRule> {
        self.excludes.iter().find(|e| e.matches(module))
    }

    /// Append `other`'s rules after this set's own, skipping exact duplicates.
    pub fn extend_from(&mut self, other: &RuleSet) {
        for s in &other.substitutions {
            if !self.substitutions.contains(s) {
                self.substitutions.push(s.clone());
            }
        }
        for c in &other.constraints {
            if !self.constraints.contains(c) {
                self.constraints.push(c.clone());
            }
        }
        for e in &other.excludes {
            if !self.excludes.contains(e) {
                self.excludes.push(e.clone());
            }
        }
    }
}

/// Index of a rule set in the build-scoped [`RuleTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RuleSetId(usize);

/// Arena of the effective rule sets of a build.
///
/// Metadata produced during expansion refers to rules by [`RuleSetId`];
/// nothing outside the table owns a rule container.
#[derive(Debug, Default)]
pub struct RuleTable {
    sets: Vec<Arc<RuleSet>>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `rules`, reusing the slot of an identical set.
    pub fn intern(&mut self, rules: RuleSet) -> RuleSetId {
        if let Some(pos) = self.sets.iter().position(|s| **s == rules) {
            return RuleSetId(pos);
        }
        self.sets.push(Arc::new(rules));
        RuleSetId(self.sets.len() - 1)
    }

    pub fn get(&self, id: RuleSetId) -> Option<&Arc<RuleSet>> {
        self.sets.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ModuleIdentity {
        ModuleIdentity::parse(s).unwrap()
    }

    #[test]
    fn exclude_whole_group() {
        let rule = ExcludeRule::group("commons-logging");
        assert!(rule.matches(&id("commons-logging:commons-logging")));
        assert!(!rule.matches(&id("org.slf4j:slf4j-api")));
    }

    #[test]
    fn exclude_glob_patterns() {
        let rule = ExcludeRule::module("org.slf4j", "slf4j-*");
        assert!(rule.matches(&id("org.slf4j:slf4j-api")));
        assert!(!rule.matches(&id("org.slf4j:jcl-over-slf4j")));

        let groups = ExcludeRule::group("com.acme.*");
        assert!(groups.matches(&id("com.acme.core:lib")));
        assert!(!groups.matches(&id("com.acme:lib")));
    }

    #[test]
    fn compiled_patterns_do_not_change_identity() {
        let rule = ExcludeRule::module("org.*", "lib-?");
        let before = format!("{rule:?}");
        let fresh = rule.clone();
        assert!(rule.matches(&id("org.acme:lib-a")));
        assert!(rule.matches(&id("org.other:lib-b")));
        assert!(!rule.matches(&id("com.acme:lib-a")));
        assert_eq!(format!("{rule:?}"), before);
        assert_eq!(rule, fresh);

        let invalid = ExcludeRule::group("org.[acme");
        assert!(!invalid.matches(&id("org.[acme:lib")));
    }

    #[test]
    fn constraint_rules_must_be_strict_or_forced() {
        assert!(ConstraintRule::new(id("a:b"), VersionConstraint::forced("1.0")).is_ok());
        assert!(ConstraintRule::new(id("a:b"), VersionConstraint::strict("1.0")).is_ok());
        assert!(ConstraintRule::new(id("a:b"), VersionConstraint::required("1.0")).is_err());
    }

    #[test]
    fn interning_reuses_identical_sets() {
        let mut table = RuleTable::new();
        let mut rules = RuleSet::new();
        rules.excludes.push(ExcludeRule::group("junit"));

        let a = table.intern(rules.clone());
        let b = table.intern(rules);
        let c = table.intern(RuleSet::new());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(a).unwrap().excludes.len(), 1);
    }

    #[test]
    fn extend_skips_duplicates() {
        let mut own = RuleSet::new();
        own.excludes.push(ExcludeRule::group("junit"));
        let mut parent = RuleSet::new();
        parent.excludes.push(ExcludeRule::group("junit"));
        parent.excludes.push(ExcludeRule::group("log4j"));

        own.extend_from(&parent);
        assert_eq!(own.excludes.len(), 2);
        assert_eq!(own.excludes[1].group, "log4j");
    }
}
