//! Graph expansion and the fixed-point loop.
//!
//! One iteration expands the frontier breadth-first from the configuration's
//! declarations, fetching every newly seen module of a level in parallel,
//! then hands the collected requests to the conflict resolver. When a
//! selection differs from the version fetched during expansion, the module is
//! pinned to the selection and the whole graph is expanded again.
//!
//! A module's children inherit only the exclusions shared by every path that
//! reached it; when a later path narrows that set, the children are queued
//! again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kiln_core::constraint::VersionConstraint;
use kiln_core::dependency::DependencyDescriptor;
use kiln_core::identity::ModuleIdentity;
use kiln_core::rules::{ExcludeRule, RuleSet, RuleSetId};
use kiln_core::version::Version;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::conflict::{
    resolve_groups, ConflictGroup, ConflictReport, ConflictRequest, Requester, Selection,
};
use crate::error::{MissingModule, ResolveError};
use crate::graph::{ResolvedGraph, ResolvedModule};
use crate::isolate::DependencyMetadata;
use crate::resolver::CancellationSignal;
use crate::rules::{RuleEngine, RuleOutcome};
use crate::source::{FetchError, MetadataSource, ModuleMetadata};

const DEFAULT_JOBS: usize = 8;

/// Output of a converged build.
#[derive(Debug)]
pub struct BuildOutcome {
    pub graph: ResolvedGraph,
    pub warnings: Vec<String>,
    pub conflicts: ConflictReport,
    /// Revision tokens of every module the source was asked about.
    pub revisions: Vec<(ModuleIdentity, Option<String>)>,
    pub iterations: usize,
}

/// Builds the resolved graph of one configuration.
pub struct GraphBuilder<S> {
    configuration: String,
    source: Arc<S>,
    rules: Arc<RuleSet>,
    rule_set: Option<RuleSetId>,
    cycle_tolerant: bool,
    jobs: usize,
    max_iterations: usize,
    cancel: CancellationSignal,
}

/// A request waiting to be processed.
struct FrontierItem {
    descriptor: Arc<DependencyDescriptor>,
    /// The module that declared it; `None` for configuration declarations.
    parent: Option<ModuleIdentity>,
    path: Vec<ModuleIdentity>,
    requester: Requester,
    excludes: Vec<ExcludeRule>,
}

/// A newly seen module waiting for its metadata.
struct PendingFetch {
    identity: ModuleIdentity,
    constraint: VersionConstraint,
    path: Vec<ModuleIdentity>,
}

/// The transitive requests of a fetched module, kept so they can be queued
/// again when the module's exclusion scope narrows.
struct Children {
    dependencies: Vec<Arc<DependencyDescriptor>>,
    excludes: Vec<ExcludeRule>,
    path: Vec<ModuleIdentity>,
    requester: Requester,
}

struct FetchedModule {
    version: Version,
    artifacts: Vec<String>,
}

/// Everything one expansion pass collected.
#[derive(Default)]
struct Expansion {
    groups: HashMap<ModuleIdentity, ConflictGroup>,
    order: Vec<ModuleIdentity>,
    seen: HashSet<ModuleIdentity>,
    fetched: HashMap<ModuleIdentity, FetchedModule>,
    /// Exclusions every path to a module agrees on.
    scopes: HashMap<ModuleIdentity, Vec<ExcludeRule>>,
    children: HashMap<ModuleIdentity, Children>,
    edges: Vec<(Option<ModuleIdentity>, DependencyMetadata)>,
    missing: Vec<ModuleIdentity>,
    revisions: Vec<(ModuleIdentity, Option<String>)>,
    warnings: Vec<String>,
}

impl<S: MetadataSource> GraphBuilder<S> {
    pub fn new(configuration: impl Into<String>, source: Arc<S>, rules: Arc<RuleSet>) -> Self {
        Self {
            configuration: configuration.into(),
            source,
            rules,
            rule_set: None,
            cycle_tolerant: false,
            jobs: DEFAULT_JOBS,
            max_iterations: kiln_core::config::DEFAULT_MAX_ITERATIONS,
            cancel: CancellationSignal::default(),
        }
    }

    /// Bind edges to this rule set until the graph is isolated.
    pub fn rule_set(mut self, id: Option<RuleSetId>) -> Self {
        self.rule_set = id;
        self
    }

    pub fn cycle_tolerant(mut self, tolerant: bool) -> Self {
        self.cycle_tolerant = tolerant;
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn cancellation(mut self, signal: CancellationSignal) -> Self {
        self.cancel = signal;
        self
    }

    /// Expand and resolve until no selection changes.
    pub async fn build(
        &self,
        roots: &[Arc<DependencyDescriptor>],
    ) -> Result<BuildOutcome, ResolveError> {
        let mut pinned: HashMap<ModuleIdentity, Version> = HashMap::new();
        let mut changed = Vec::new();
        let mut consulted: Vec<(ModuleIdentity, Option<String>)> = Vec::new();

        for iteration in 1..=self.max_iterations {
            self.check_cancelled()?;
            let mut expansion = self.expand(roots, &pinned).await?;
            for revision in std::mem::take(&mut expansion.revisions) {
                if !consulted.contains(&revision) {
                    consulted.push(revision);
                }
            }
            self.drop_missing(&mut expansion)?;

            let fetched = fetched_versions(&expansion);
            let (selections, errors) = resolve_groups(&mut expansion.groups, &fetched);
            if !errors.is_empty() {
                return Err(ResolveError::Conflict {
                    configuration: self.configuration.clone(),
                    conflicts: errors,
                });
            }

            changed = selections
                .iter()
                .filter(|(id, selection)| {
                    expansion
                        .fetched
                        .get(id)
                        .is_some_and(|f| f.version != selection.version)
                })
                .map(|(id, _)| id.clone())
                .collect();

            if changed.is_empty() {
                expansion.revisions = consulted;
                return self.finish(expansion, selections, iteration);
            }

            tracing::debug!(
                "Iteration {iteration} of '{}': {} selection(s) changed",
                self.configuration,
                changed.len()
            );
            pinned = selections
                .into_iter()
                .map(|(id, selection)| (id, selection.version))
                .collect();
        }

        Err(ResolveError::DidNotConverge {
            configuration: self.configuration.clone(),
            iterations: self.max_iterations,
            oscillating: changed,
        })
    }

    async fn expand(
        &self,
        roots: &[Arc<DependencyDescriptor>],
        pinned: &HashMap<ModuleIdentity, Version>,
    ) -> Result<Expansion, ResolveError> {
        let engine = RuleEngine::new(&self.rules);
        let mut expansion = Expansion::default();
        let mut level: Vec<FrontierItem> = roots
            .iter()
            .map(|d| FrontierItem {
                descriptor: Arc::clone(d),
                parent: None,
                path: Vec::new(),
                requester: Requester::Configuration {
                    name: self.configuration.clone(),
                },
                excludes: Vec::new(),
            })
            .collect();

        while !level.is_empty() {
            let mut pending = Vec::new();
            let mut requeue = Vec::new();

            for item in level {
                let descriptor = match engine.apply(&item.descriptor, &item.excludes) {
                    RuleOutcome::Applied(d) => d,
                    RuleOutcome::Pruned(rule) => {
                        tracing::debug!("{} pruned by exclusion {rule}", item.descriptor.identity());
                        continue;
                    }
                };
                let identity = descriptor.identity().clone();

                if item.path.contains(&identity) {
                    if self.cycle_tolerant && item.path.last() == Some(&identity) {
                        let message = format!("Ignoring self-reference of {identity}");
                        expansion.warnings.push(message);
                        continue;
                    }
                    let mut path = item.path;
                    path.push(identity);
                    return Err(ResolveError::CycleDetected {
                        configuration: self.configuration.clone(),
                        path,
                    });
                }

                let request = ConflictRequest {
                    constraint: descriptor.constraint().clone(),
                    requester: item.requester,
                    optional: descriptor.is_optional(),
                };
                let group = expansion.groups.entry(identity.clone()).or_default();
                if !group.requests.contains(&request) {
                    group.push(request);
                }
                expansion
                    .edges
                    .push((item.parent, self.edge_metadata(&descriptor)));

                let mut scope = item.excludes;
                scope.extend(descriptor.exclude_rules().iter().cloned());

                if !expansion.seen.insert(identity.clone()) {
                    requeue.extend(expansion.narrow_scope(&identity, &scope));
                    continue;
                }
                expansion.order.push(identity.clone());
                expansion.scopes.insert(identity.clone(), scope);

                if let DependencyDescriptor::File(files) = descriptor.as_ref() {
                    expansion.fetched.insert(
                        identity,
                        FetchedModule {
                            version: Version::unspecified(),
                            artifacts: files.files.iter().map(|p| p.display().to_string()).collect(),
                        },
                    );
                    continue;
                }

                let constraint = pinned
                    .get(&identity)
                    .map(|v| VersionConstraint::Strict(v.clone()))
                    .unwrap_or_else(|| descriptor.constraint().clone());
                let mut path = item.path;
                path.push(identity.clone());
                pending.push(PendingFetch {
                    identity,
                    constraint,
                    path,
                });
            }

            if pending.is_empty() {
                level = requeue;
                continue;
            }

            self.check_cancelled()?;
            tracing::debug!(
                "Fetching metadata for {} module(s) of '{}'",
                pending.len(),
                self.configuration
            );
            let requests = pending
                .iter()
                .map(|p| (p.identity.clone(), p.constraint.clone()))
                .collect();
            let results = self.fetch_batch(requests).await?;

            let mut next = requeue;
            for (fetch, result) in pending.into_iter().zip(results) {
                expansion
                    .revisions
                    .push((fetch.identity.clone(), self.source.revision(&fetch.identity)));

                let metadata = match result {
                    Ok(metadata) => metadata,
                    Err(FetchError::NotFound) => {
                        expansion.missing.push(fetch.identity);
                        continue;
                    }
                    Err(FetchError::Transport(message)) => {
                        return Err(ResolveError::Transport {
                            configuration: self.configuration.clone(),
                            module: fetch.identity,
                            message,
                        });
                    }
                };

                let children = Children {
                    dependencies: metadata
                        .dependencies
                        .into_iter()
                        .filter(|d| !d.is_optional())
                        .map(Arc::new)
                        .collect(),
                    excludes: metadata.excludes,
                    path: fetch.path,
                    requester: Requester::Module {
                        module: fetch.identity.clone(),
                        version: metadata.version.clone(),
                    },
                };
                let scope = expansion
                    .scopes
                    .get(&fetch.identity)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                next.extend(children.queue(&fetch.identity, scope));
                expansion.children.insert(fetch.identity.clone(), children);

                expansion.fetched.insert(
                    fetch.identity,
                    FetchedModule {
                        version: metadata.version,
                        artifacts: metadata.artifacts,
                    },
                );
            }
            level = next;
        }

        Ok(expansion)
    }

    /// Fetch one level's metadata on a bounded pool. Results keep the order
    /// of `requests`.
    async fn fetch_batch(
        &self,
        requests: Vec<(ModuleIdentity, VersionConstraint)>,
    ) -> Result<Vec<Result<ModuleMetadata, FetchError>>, ResolveError> {
        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut join_set = JoinSet::new();
        let count = requests.len();

        for (i, (module, constraint)) in requests.into_iter().enumerate() {
            let source = Arc::clone(&self.source);
            let sem = semaphore.clone();
            join_set.spawn(async move {
                let _permit = sem.acquire().await;
                let result = source.fetch_descriptor(&module, &constraint).await;
                (i, result)
            });
        }

        let mut results: Vec<Option<Result<ModuleMetadata, FetchError>>> =
            (0..count).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((i, result)) => results[i] = Some(result),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => return Err(self.cancelled()),
            }
        }
        results
            .into_iter()
            .map(|r| r.ok_or_else(|| self.cancelled()))
            .collect()
    }

    /// Fail on required modules the source does not know; drop optional ones.
    fn drop_missing(&self, expansion: &mut Expansion) -> Result<(), ResolveError> {
        let mut fatal = Vec::new();
        for module in std::mem::take(&mut expansion.missing) {
            let Some(group) = expansion.groups.remove(&module) else {
                continue;
            };
            if group.is_required() {
                fatal.push(MissingModule {
                    module,
                    requested_by: group.requests,
                });
            } else {
                expansion
                    .warnings
                    .push(format!("Optional dependency {module} not found; skipping"));
                expansion.order.retain(|m| m != &module);
            }
        }

        if fatal.is_empty() {
            Ok(())
        } else {
            Err(ResolveError::ModuleNotFound {
                configuration: self.configuration.clone(),
                missing: fatal,
            })
        }
    }

    fn finish(
        &self,
        mut expansion: Expansion,
        selections: Vec<(ModuleIdentity, Selection)>,
        iterations: usize,
    ) -> Result<BuildOutcome, ResolveError> {
        let mut selections: HashMap<ModuleIdentity, Selection> = selections.into_iter().collect();
        let mut graph = ResolvedGraph::new(self.configuration.as_str());
        let mut conflicts = ConflictReport::new();

        for identity in &expansion.order {
            let (Some(fetched), Some(selection)) = (
                expansion.fetched.remove(identity),
                selections.remove(identity),
            ) else {
                continue;
            };
            conflicts.record(identity, &selection);
            let mut module = ResolvedModule::new(identity.clone(), selection.version);
            module.artifacts = fetched.artifacts;
            module.requested_by = selection.requests;
            graph.add_module(module);
        }

        for (parent, metadata) in expansion.edges {
            if graph.module(metadata.identity()).is_none() {
                continue;
            }
            match parent {
                None => graph.add_root(metadata),
                Some(parent) => graph.add_dependency(&parent, metadata),
            }
        }

        if let Some(path) = graph.find_cycle() {
            return Err(ResolveError::CycleDetected {
                configuration: self.configuration.clone(),
                path,
            });
        }

        for warning in &expansion.warnings {
            tracing::warn!("{warning}");
        }
        tracing::info!(
            "Resolved '{}': {} module(s) in {iterations} iteration(s)",
            self.configuration,
            graph.len()
        );

        Ok(BuildOutcome {
            graph,
            warnings: expansion.warnings,
            conflicts,
            revisions: expansion.revisions,
            iterations,
        })
    }

    fn edge_metadata(&self, descriptor: &Arc<DependencyDescriptor>) -> DependencyMetadata {
        match self.rule_set {
            Some(rules) => DependencyMetadata::RuleBound {
                descriptor: Arc::clone(descriptor),
                rules,
            },
            None => DependencyMetadata::Plain(Arc::clone(descriptor)),
        }
    }

    fn check_cancelled(&self) -> Result<(), ResolveError> {
        if self.cancel.is_cancelled() {
            Err(self.cancelled())
        } else {
            Ok(())
        }
    }

    fn cancelled(&self) -> ResolveError {
        ResolveError::Cancelled {
            configuration: self.configuration.clone(),
        }
    }
}

impl Expansion {
    /// Narrow the scope of an already seen module to the exclusions it shares
    /// with `incoming`. When that drops a rule, the module's children are
    /// returned for another pass so that nothing pruned only along one path
    /// stays pruned.
    fn narrow_scope(
        &mut self,
        identity: &ModuleIdentity,
        incoming: &[ExcludeRule],
    ) -> Vec<FrontierItem> {
        let Some(scope) = self.scopes.get_mut(identity) else {
            return Vec::new();
        };
        let before = scope.len();
        scope.retain(|rule| incoming.contains(rule));
        if scope.len() == before {
            return Vec::new();
        }
        match self.children.get(identity) {
            Some(children) => children.queue(identity, scope),
            // Not fetched yet; the fetch picks up the narrowed scope.
            None => Vec::new(),
        }
    }
}

impl Children {
    fn queue(&self, parent: &ModuleIdentity, scope: &[ExcludeRule]) -> Vec<FrontierItem> {
        let mut excludes = scope.to_vec();
        excludes.extend(self.excludes.iter().cloned());
        self.dependencies
            .iter()
            .map(|dependency| FrontierItem {
                descriptor: Arc::clone(dependency),
                parent: Some(parent.clone()),
                path: self.path.clone(),
                requester: self.requester.clone(),
                excludes: excludes.clone(),
            })
            .collect()
    }
}

fn fetched_versions(expansion: &Expansion) -> HashMap<ModuleIdentity, Version> {
    expansion
        .fetched
        .iter()
        .map(|(id, f)| (id.clone(), f.version.clone()))
        .collect()
}
