//! Configurations, their registry, and the frozen configuration model.
//!
//! Configurations are declared into a [`ConfigurationRegistry`] during the
//! declaration phase. [`ConfigurationRegistry::freeze`] closes that phase and
//! produces the immutable [`ConfigurationModel`] that resolutions read from.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::dependency::DependencyDescriptor;
use crate::error::ModelError;
use crate::identity::ModuleIdentity;
use crate::rules::{RuleSet, RuleSetId, RuleTable};

/// A named, inheritable bucket of declared dependencies and rules.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub name: String,
    pub dependencies: Vec<DependencyDescriptor>,
    pub rules: RuleSet,
    pub extends_from: Vec<String>,
}

impl Configuration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends_from.push(parent.into());
        self
    }

    pub fn with_dependency(mut self, dependency: DependencyDescriptor) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }
}

type Observer = Box<dyn Fn(&str) + Send + Sync>;

/// Ordered registry of declared configurations.
///
/// Inheritance cycles are rejected as soon as the configuration closing the
/// cycle is registered.
#[derive(Default)]
pub struct ConfigurationRegistry {
    configurations: Vec<Configuration>,
    index: HashMap<String, usize>,
    observers: Vec<Observer>,
}

impl ConfigurationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `observer` with the name of every configuration registered from
    /// now on.
    pub fn on_register(&mut self, observer: impl Fn(&str) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn register(&mut self, configuration: Configuration) -> Result<(), ModelError> {
        if self.index.contains_key(&configuration.name) {
            return Err(ModelError::DuplicateConfiguration {
                name: configuration.name,
            });
        }
        if let Some(path) = self.find_cycle_through(&configuration) {
            return Err(ModelError::CycleDetected { path });
        }

        tracing::debug!(
            "Registered configuration '{}' (extends {:?})",
            configuration.name,
            configuration.extends_from
        );
        let name = configuration.name.clone();
        self.index.insert(name.clone(), self.configurations.len());
        self.configurations.push(configuration);
        for observer in &self.observers {
            observer(&name);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Configuration> {
        self.index.get(name).map(|&i| &self.configurations[i])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configurations.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    /// The registered graph is acyclic, so any new cycle must pass through
    /// the configuration being added.
    fn find_cycle_through(&self, new: &Configuration) -> Option<Vec<String>> {
        let mut path = vec![new.name.clone()];
        let mut visited = HashSet::new();
        for parent in &new.extends_from {
            if self.path_to(parent, &new.name, new, &mut path, &mut visited) {
                return Some(path);
            }
        }
        None
    }

    fn path_to(
        &self,
        current: &str,
        target: &str,
        new: &Configuration,
        path: &mut Vec<String>,
        visited: &mut HashSet<String>,
    ) -> bool {
        path.push(current.to_string());
        if current == target {
            return true;
        }
        if visited.insert(current.to_string()) {
            let parents = if current == new.name {
                Some(&new.extends_from)
            } else {
                self.get(current).map(|c| &c.extends_from)
            };
            for parent in parents.into_iter().flatten() {
                if self.path_to(parent, target, new, path, visited) {
                    return true;
                }
            }
        }
        path.pop();
        false
    }

    /// Close the declaration phase.
    ///
    /// Every parent must exist. Effective dependencies and rules are
    /// computed once here, so the returned model never changes.
    pub fn freeze(self) -> Result<ConfigurationModel, ModelError> {
        for configuration in &self.configurations {
            for parent in &configuration.extends_from {
                if !self.index.contains_key(parent) {
                    return Err(ModelError::UnknownParent {
                        configuration: configuration.name.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        let mut rules = RuleTable::new();
        let mut configurations = Vec::with_capacity(self.configurations.len());
        for configuration in &self.configurations {
            let ancestry = self.ancestry(&configuration.name);
            let dependencies = flatten_dependencies(&ancestry);
            let mut effective_rules = RuleSet::new();
            for (ancestor, _) in ancestry.nearest_first() {
                effective_rules.extend_from(&ancestor.rules);
            }
            configurations.push(EffectiveConfiguration {
                name: configuration.name.clone(),
                extends_from: configuration.extends_from.clone(),
                dependencies,
                rules: rules.intern(effective_rules),
            });
        }

        Ok(ConfigurationModel {
            configurations,
            index: self.index,
            rules,
        })
    }

    fn ancestry(&self, name: &str) -> Ancestry<'_> {
        // Breadth-first for hop distances; the first visit is the shortest.
        let mut distances: Vec<(&Configuration, usize)> = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([(name, 0usize)]);
        while let Some((current, distance)) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            let Some(configuration) = self.get(current) else {
                continue;
            };
            distances.push((configuration, distance));
            for parent in &configuration.extends_from {
                queue.push_back((parent.as_str(), distance + 1));
            }
        }

        // Depth-first post-order: ancestors before descendants.
        let mut declaration_order = Vec::new();
        let mut visited = HashSet::new();
        if let Some(root) = self.get(name) {
            self.post_order(root, &mut visited, &mut declaration_order);
        }

        Ancestry {
            distances,
            declaration_order,
        }
    }

    fn post_order<'a>(
        &'a self,
        configuration: &'a Configuration,
        visited: &mut HashSet<&'a str>,
        out: &mut Vec<&'a Configuration>,
    ) {
        if !visited.insert(configuration.name.as_str()) {
            return;
        }
        for parent in &configuration.extends_from {
            if let Some(parent) = self.get(parent) {
                self.post_order(parent, visited, out);
            }
        }
        out.push(configuration);
    }
}

struct Ancestry<'a> {
    distances: Vec<(&'a Configuration, usize)>,
    declaration_order: Vec<&'a Configuration>,
}

impl<'a> Ancestry<'a> {
    fn nearest_first(&self) -> impl Iterator<Item = (&'a Configuration, usize)> + '_ {
        self.distances.iter().copied()
    }

    fn distance(&self, name: &str) -> usize {
        self.distances
            .iter()
            .find(|(c, _)| c.name == name)
            .map(|(_, d)| *d)
            .unwrap_or(usize::MAX)
    }
}

/// Union of the declarations along the ancestry, one per module identity.
///
/// A surviving declaration keeps the position of the first declaration of
/// its identity. Between two declarations of the same identity:
/// - if both request the same version with different strength, the stricter
///   one wins wherever it was declared;
/// - otherwise the nearer one wins, and on equal distance the earlier one.
fn flatten_dependencies(ancestry: &Ancestry<'_>) -> Vec<Arc<DependencyDescriptor>> {
    struct Slot<'a> {
        descriptor: &'a DependencyDescriptor,
        distance: usize,
    }

    let mut slots: Vec<Slot<'_>> = Vec::new();
    let mut by_identity: HashMap<&ModuleIdentity, usize> = HashMap::new();

    for &configuration in &ancestry.declaration_order {
        let distance = ancestry.distance(&configuration.name);
        for dependency in &configuration.dependencies {
            match by_identity.get(dependency.identity()).copied() {
                None => {
                    by_identity.insert(dependency.identity(), slots.len());
                    slots.push(Slot {
                        descriptor: dependency,
                        distance,
                    });
                }
                Some(i) => {
                    let slot = &mut slots[i];
                    if replaces(slot.descriptor, slot.distance, dependency, distance) {
                        slot.descriptor = dependency;
                    }
                    slot.distance = slot.distance.min(distance);
                }
            }
        }
    }

    slots
        .into_iter()
        .map(|s| Arc::new(s.descriptor.clone()))
        .collect()
}

fn replaces(
    existing: &DependencyDescriptor,
    existing_distance: usize,
    candidate: &DependencyDescriptor,
    candidate_distance: usize,
) -> bool {
    let (old, new) = (existing.constraint(), candidate.constraint());
    let same_version = match (old.requested_version(), new.requested_version()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };
    if same_version && old.kind() != new.kind() {
        return new.kind() > old.kind();
    }
    candidate_distance < existing_distance
}

/// A configuration after inheritance has been flattened.
#[derive(Debug, Clone)]
pub struct EffectiveConfiguration {
    pub name: String,
    pub extends_from: Vec<String>,
    pub dependencies: Vec<Arc<DependencyDescriptor>>,
    pub rules: RuleSetId,
}

/// The immutable, build-scoped view of all configurations.
#[derive(Debug)]
pub struct ConfigurationModel {
    configurations: Vec<EffectiveConfiguration>,
    index: HashMap<String, usize>,
    rules: RuleTable,
}

impl ConfigurationModel {
    pub fn configuration(&self, name: &str) -> Result<&EffectiveConfiguration, ModelError> {
        self.index
            .get(name)
            .map(|&i| &self.configurations[i])
            .ok_or_else(|| ModelError::UnknownConfiguration {
                name: name.to_string(),
            })
    }

    /// Own and inherited declarations, deduplicated by module identity.
    pub fn effective_dependencies(
        &self,
        name: &str,
    ) -> Result<&[Arc<DependencyDescriptor>], ModelError> {
        self.configuration(name).map(|c| c.dependencies.as_slice())
    }

    /// Own rules first, then inherited ones, nearest ancestor first.
    pub fn effective_rules(&self, name: &str) -> Result<(RuleSetId, Arc<RuleSet>), ModelError> {
        let id = self.configuration(name)?.rules;
        Ok((id, self.rules(id)))
    }

    /// Look up an interned rule set. Ids from another model yield an empty set.
    pub fn rules(&self, id: RuleSetId) -> Arc<RuleSet> {
        self.rules.get(id).cloned().unwrap_or_default()
    }

    pub fn rule_table(&self) -> &RuleTable {
        &self.rules
    }

    /// Configuration names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configurations.iter().map(|c| c.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}
