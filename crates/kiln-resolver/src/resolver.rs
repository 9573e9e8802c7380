//! Resolution entry point: configuration lookup, caching, and isolation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kiln_core::config::ResolutionConfig;
use kiln_core::configuration::ConfigurationModel;
use kiln_core::dependency::DependencyDescriptor;
use kiln_core::identity::ModuleIdentity;
use kiln_core::version::Version;
use serde::Serialize;
use tokio::task::JoinSet;

use crate::builder::{BuildOutcome, GraphBuilder};
use crate::cache::{CachedResolution, ResolutionCache};
use crate::conflict::ConflictReport;
use crate::error::ResolveError;
use crate::isolate::{isolate_graph, IsolatedGraph};
use crate::rules::{RuleEngine, RuleOutcome};
use crate::source::MetadataSource;

/// A build-scoped cancellation flag shared by every resolution.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Concurrent metadata fetches per resolution.
    pub jobs: usize,
    pub max_iterations: usize,
    pub cache: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self::from(&ResolutionConfig::default())
    }
}

impl From<&ResolutionConfig> for ResolverOptions {
    fn from(config: &ResolutionConfig) -> Self {
        Self {
            jobs: config.jobs,
            max_iterations: config.max_iterations,
            cache: config.cache,
        }
    }
}

/// The outcome of resolving one configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfigurationResult {
    pub configuration: String,
    pub graph: Arc<IsolatedGraph>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub conflicts: ConflictReport,
    pub cache_hit: bool,
}

impl ResolvedConfigurationResult {
    /// Every module with its selected version and artifacts, in discovery
    /// order.
    pub fn modules(&self) -> impl Iterator<Item = (&ModuleIdentity, &Version, &[String])> {
        self.graph
            .modules
            .iter()
            .map(|m| (&m.module, &m.version, m.artifacts.as_slice()))
    }

    pub fn artifacts(&self) -> Vec<&str> {
        self.graph
            .modules
            .iter()
            .flat_map(|m| m.artifacts.iter().map(String::as_str))
            .collect()
    }

    pub fn version_of(&self, module: &ModuleIdentity) -> Option<&Version> {
        self.graph.module(module).map(|m| &m.version)
    }
}

/// Resolves configurations of one frozen model against one metadata source.
pub struct Resolver<S> {
    model: Arc<ConfigurationModel>,
    source: Arc<S>,
    cache: Arc<ResolutionCache>,
    options: ResolverOptions,
    cancel: CancellationSignal,
}

impl<S> Clone for Resolver<S> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            source: Arc::clone(&self.source),
            cache: Arc::clone(&self.cache),
            options: self.options.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<S: MetadataSource> Resolver<S> {
    pub fn new(model: Arc<ConfigurationModel>, source: Arc<S>, options: ResolverOptions) -> Self {
        Self {
            model,
            source,
            cache: Arc::new(ResolutionCache::new()),
            options,
            cancel: CancellationSignal::new(),
        }
    }

    /// Share a cache with other resolvers.
    pub fn with_cache(mut self, cache: Arc<ResolutionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_cancellation(mut self, signal: CancellationSignal) -> Self {
        self.cancel = signal;
        self
    }

    pub fn cancellation_signal(&self) -> CancellationSignal {
        self.cancel.clone()
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    pub fn model(&self) -> &ConfigurationModel {
        &self.model
    }

    /// Resolve one configuration.
    ///
    /// `cycle_tolerant` lets a module reference its own identity; such edges
    /// are dropped with a warning.
    pub async fn resolve(
        &self,
        configuration: &str,
        cycle_tolerant: bool,
    ) -> Result<ResolvedConfigurationResult, ResolveError> {
        if self.cancel.is_cancelled() {
            return Err(ResolveError::Cancelled {
                configuration: configuration.to_string(),
            });
        }

        let effective = self.model.configuration(configuration)?;
        let (rule_id, rules) = self.model.effective_rules(configuration)?;
        let builder = GraphBuilder::new(configuration, Arc::clone(&self.source), Arc::clone(&rules))
            .rule_set((!rules.is_empty()).then_some(rule_id))
            .cycle_tolerant(cycle_tolerant)
            .jobs(self.options.jobs)
            .max_iterations(self.options.max_iterations)
            .cancellation(self.cancel.clone());
        let roots = effective.dependencies.as_slice();

        if !self.options.cache {
            let outcome = builder.build(roots).await?;
            return Ok(into_result(configuration, Arc::new(isolate(outcome)), false));
        }

        let engine = RuleEngine::new(&rules);
        let applied: Vec<Arc<DependencyDescriptor>> = roots
            .iter()
            .filter_map(|d| match engine.apply(d, &[]) {
                RuleOutcome::Applied(d) => Some(d),
                RuleOutcome::Pruned(_) => None,
            })
            .collect();
        let key = ResolutionCache::fingerprint(configuration, cycle_tolerant, &applied, &rules);

        let source = &self.source;
        let builder = &builder;
        let (cached, hit) = self
            .cache
            .get_or_resolve(
                &key,
                |entry| {
                    entry
                        .revisions
                        .iter()
                        .all(|(module, revision)| &source.revision(module) == revision)
                },
                move || async move { builder.build(roots).await.map(isolate) },
            )
            .await?;

        if hit {
            tracing::debug!("Using cached resolution of '{configuration}'");
        }
        Ok(into_result(configuration, cached, hit))
    }

    /// Resolve several configurations concurrently. Results come back in
    /// the order of `requests`.
    pub async fn resolve_all(
        &self,
        requests: &[(String, bool)],
    ) -> Vec<Result<ResolvedConfigurationResult, ResolveError>> {
        let mut join_set = JoinSet::new();
        for (i, (name, cycle_tolerant)) in requests.iter().cloned().enumerate() {
            let resolver = self.clone();
            join_set.spawn(async move { (i, resolver.resolve(&name, cycle_tolerant).await) });
        }

        let mut results: Vec<Option<Result<ResolvedConfigurationResult, ResolveError>>> =
            (0..requests.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((i, result)) => results[i] = Some(result),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => {}
            }
        }

        results
            .into_iter()
            .zip(requests)
            .map(|(result, (name, _))| {
                result.unwrap_or_else(|| {
                    Err(ResolveError::Cancelled {
                        configuration: name.clone(),
                    })
                })
            })
            .collect()
    }
}

fn isolate(outcome: BuildOutcome) -> CachedResolution {
    CachedResolution {
        graph: Arc::new(isolate_graph(&outcome.graph)),
        conflicts: outcome.conflicts,
        warnings: outcome.warnings,
        revisions: outcome.revisions,
    }
}

fn into_result(
    configuration: &str,
    resolution: Arc<CachedResolution>,
    cache_hit: bool,
) -> ResolvedConfigurationResult {
    ResolvedConfigurationResult {
        configuration: configuration.to_string(),
        graph: Arc::clone(&resolution.graph),
        warnings: resolution.warnings.clone(),
        conflicts: resolution.conflicts.clone(),
        cache_hit,
    }
}
