//! Resolution cache with single-flight semantics.
//!
//! Entries are keyed by a fingerprint of the resolution inputs. Each key maps
//! to a [`OnceCell`] slot: concurrent requests for the same fingerprint wait
//! on the one computation in flight. A failed or cancelled computation stores
//! nothing, and its slot is dropped once no other caller waits on it.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use kiln_core::dependency::DependencyDescriptor;
use kiln_core::identity::ModuleIdentity;
use kiln_core::rules::RuleSet;
use kiln_util::hash::FingerprintHasher;
use tokio::sync::OnceCell;

use crate::conflict::ConflictReport;
use crate::error::ResolveError;
use crate::isolate::IsolatedGraph;

/// A converged, isolated resolution as stored in the cache.
#[derive(Debug, Clone)]
pub struct CachedResolution {
    pub graph: Arc<IsolatedGraph>,
    pub conflicts: ConflictReport,
    pub warnings: Vec<String>,
    /// The revision token of every module the resolution fetched.
    pub revisions: Vec<(ModuleIdentity, Option<String>)>,
}

type Slot = Arc<OnceCell<Arc<CachedResolution>>>;

#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: DashMap<String, Slot>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    invalidations: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub invalidations: usize,
    pub entries: usize,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint of the inputs a resolution starts from.
    ///
    /// `roots` are the configuration's declarations after rule application.
    /// Module revisions are not part of the key; they are checked against
    /// the stored entry on lookup.
    pub fn fingerprint(
        configuration: &str,
        cycle_tolerant: bool,
        roots: &[Arc<DependencyDescriptor>],
        rules: &RuleSet,
    ) -> String {
        let mut hasher = FingerprintHasher::new();
        hasher
            .entry("configuration", configuration)
            .entry("cycle-tolerant", if cycle_tolerant { "true" } else { "false" });
        for root in roots {
            hasher.entry("dependency", &format!("{root:?}"));
        }
        hasher.entry("rules", &format!("{rules:?}"));
        hasher.finish()
    }

    fn slot(&self, key: &str) -> Slot {
        self.entries
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Return the entry for `key` if `is_current` accepts it, otherwise run
    /// `resolve` and store its result.
    ///
    /// The boolean is `true` when no computation was started by this call.
    /// A rejected entry is evicted; other keys are left alone.
    pub async fn get_or_resolve<V, F, Fut>(
        &self,
        key: &str,
        is_current: V,
        resolve: F,
    ) -> Result<(Arc<CachedResolution>, bool), ResolveError>
    where
        V: Fn(&CachedResolution) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedResolution, ResolveError>>,
    {
        let mut cell = self.slot(key);
        let stale = match cell.get() {
            Some(cached) if is_current(cached) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Resolution cache hit for {key}");
                return Ok((Arc::clone(cached), true));
            }
            Some(_) => true,
            None => false,
        };
        if stale {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Resolution cache entry {key} is stale");
            self.entries
                .remove_if(key, |_, current| Arc::ptr_eq(current, &cell));
            cell = self.slot(key);
        }

        let mut started = false;
        let outcome = cell
            .get_or_try_init(|| {
                started = true;
                async move { resolve().await.map(Arc::new) }
            })
            .await;
        let value = match outcome {
            Ok(value) => value,
            Err(e) => {
                // Drop the empty slot unless another caller is still waiting on it.
                self.entries.remove_if(key, |_, current| {
                    Arc::ptr_eq(current, &cell) && Arc::strong_count(current) == 2
                });
                return Err(e);
            }
        };

        if started {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Joined in-flight resolution for {key}");
        }
        Ok((Arc::clone(value), !started))
    }

    /// The stored entry for `key`, without revision checks.
    pub fn get(&self, key: &str) -> Option<Arc<CachedResolution>> {
        self.entries.get(key).and_then(|slot| slot.get().cloned())
    }

    /// Drop the entry for `key`. Returns whether one was stored.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of completed entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
