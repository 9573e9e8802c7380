//! Immutable, rule-free snapshots of resolved graphs.
//!
//! During expansion an edge may stay bound to the configuration's rule set
//! ([`DependencyMetadata::RuleBound`]). Isolation copies only those edges
//! into plain ones and shares everything else, so the snapshot can be cached
//! and handed out without keeping any rule container alive.

use std::sync::{Arc, LazyLock};

use kiln_core::dependency::DependencyDescriptor;
use kiln_core::identity::ModuleIdentity;
use kiln_core::rules::RuleSetId;
use kiln_core::version::Version;
use serde::Serialize;

use crate::conflict::ConflictRequest;
use crate::graph::ResolvedGraph;

/// The declaration behind one edge of a resolved graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum DependencyMetadata {
    Plain(Arc<DependencyDescriptor>),
    /// Still bound to the rule set it was produced under.
    RuleBound {
        descriptor: Arc<DependencyDescriptor>,
        rules: RuleSetId,
    },
}

impl DependencyMetadata {
    pub fn descriptor(&self) -> &Arc<DependencyDescriptor> {
        match self {
            Self::Plain(d) | Self::RuleBound { descriptor: d, .. } => d,
        }
    }

    pub fn identity(&self) -> &ModuleIdentity {
        self.descriptor().identity()
    }

    pub fn rules(&self) -> Option<RuleSetId> {
        match self {
            Self::Plain(_) => None,
            Self::RuleBound { rules, .. } => Some(*rules),
        }
    }

    pub fn is_rule_bound(&self) -> bool {
        matches!(self, Self::RuleBound { .. })
    }
}

static EMPTY: LazyLock<Arc<[DependencyMetadata]>> = LazyLock::new(|| Arc::from(Vec::new()));

/// The shared instance every empty dependency list isolates to.
pub fn canonical_empty() -> Arc<[DependencyMetadata]> {
    Arc::clone(&EMPTY)
}

/// Strip the rule binding from one edge.
///
/// Rule-bound descriptors are copied into a fresh allocation; plain ones are
/// returned as they are.
pub fn isolate_metadata(metadata: &DependencyMetadata) -> DependencyMetadata {
    match metadata {
        DependencyMetadata::Plain(d) => DependencyMetadata::Plain(Arc::clone(d)),
        DependencyMetadata::RuleBound { descriptor, .. } => {
            DependencyMetadata::Plain(Arc::new(descriptor.as_ref().clone()))
        }
    }
}

/// Isolate a dependency list. An absent list stays absent and an empty list
/// becomes [`canonical_empty`].
pub fn isolate(dependencies: Option<&[DependencyMetadata]>) -> Option<Arc<[DependencyMetadata]>> {
    let dependencies = dependencies?;
    if dependencies.is_empty() {
        return Some(canonical_empty());
    }
    Some(dependencies.iter().map(isolate_metadata).collect())
}

/// A converged resolution, free of rule bindings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IsolatedGraph {
    pub configuration: String,
    pub roots: Arc<[DependencyMetadata]>,
    pub modules: Vec<IsolatedModule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IsolatedModule {
    pub module: ModuleIdentity,
    pub version: Version,
    pub artifacts: Vec<String>,
    pub dependencies: Arc<[DependencyMetadata]>,
    pub requested_by: Vec<ConflictRequest>,
}

impl IsolatedGraph {
    pub fn module(&self, identity: &ModuleIdentity) -> Option<&IsolatedModule> {
        self.modules.iter().find(|m| &m.module == identity)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Whether any edge still carries a rule binding.
    pub fn has_rule_bindings(&self) -> bool {
        self.roots
            .iter()
            .chain(self.modules.iter().flat_map(|m| m.dependencies.iter()))
            .any(DependencyMetadata::is_rule_bound)
    }
}

pub fn isolate_graph(graph: &ResolvedGraph) -> IsolatedGraph {
    IsolatedGraph {
        configuration: graph.configuration().to_string(),
        roots: isolate(Some(graph.roots())).unwrap_or_else(canonical_empty),
        modules: graph
            .modules()
            .iter()
            .map(|m| IsolatedModule {
                module: m.identity.clone(),
                version: m.version.clone(),
                artifacts: m.artifacts.clone(),
                dependencies: isolate(Some(&m.dependencies)).unwrap_or_else(canonical_empty),
                requested_by: m.requested_by.clone(),
            })
            .collect(),
    }
}
