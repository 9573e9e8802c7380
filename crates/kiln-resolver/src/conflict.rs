//! Version conflict resolution and reporting.
//!
//! Every request for a module identity made during one expansion pass is
//! collected into a [`ConflictGroup`]. [`resolve_groups`] drains the groups
//! and selects exactly one version per identity:
//!
//! 1. a forced version wins unconditionally (two distinct forced versions
//!    conflict);
//! 2. else a strict version wins if every other request admits it;
//! 3. else the highest requested version wins, ties going to the first
//!    request. When a range does not admit it, the highest version admitted
//!    by every request is taken instead.

use std::collections::HashMap;
use std::fmt;

use kiln_core::constraint::{ConstraintKind, VersionConstraint};
use kiln_core::identity::ModuleIdentity;
use kiln_core::version::Version;
use serde::Serialize;

use crate::error::ConflictError;

/// Who asked for a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Requester {
    /// A declaration of the configuration being resolved.
    Configuration { name: String },
    /// A resolved module at the version it was fetched at.
    Module {
        module: ModuleIdentity,
        version: Version,
    },
}

impl fmt::Display for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { name } => write!(f, "configuration '{name}'"),
            Self::Module { module, version } => write!(f, "{module}:{version}"),
        }
    }
}

/// One request for a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConflictRequest {
    pub constraint: VersionConstraint,
    pub requester: Requester,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

impl fmt::Display for ConflictRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} by {}", self.constraint, self.requester)
    }
}

/// All requests for one module identity, in the order they were made.
#[derive(Debug, Clone, Default)]
pub struct ConflictGroup {
    pub requests: Vec<ConflictRequest>,
}

impl ConflictGroup {
    pub fn push(&mut self, request: ConflictRequest) {
        self.requests.push(request);
    }

    /// Whether any request is not optional.
    pub fn is_required(&self) -> bool {
        self.requests.iter().any(|r| !r.optional)
    }
}

/// Why a version was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionReason {
    Forced,
    Strict,
    HighestVersion,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forced => write!(f, "forced"),
            Self::Strict => write!(f, "strict"),
            Self::HighestVersion => write!(f, "highest version"),
        }
    }
}

/// The outcome for one module identity.
#[derive(Debug, Clone)]
pub struct Selection {
    pub version: Version,
    pub reason: SelectionReason,
    /// The drained requests, kept for diagnostics.
    pub requests: Vec<ConflictRequest>,
}

/// Select one version for every group, draining `groups`.
///
/// `fetched` holds the version fetched for each identity in the pass that
/// built the groups; it stands in for requests that name no version.
/// Selections and errors come back sorted by identity.
pub fn resolve_groups(
    groups: &mut HashMap<ModuleIdentity, ConflictGroup>,
    fetched: &HashMap<ModuleIdentity, Version>,
) -> (Vec<(ModuleIdentity, Selection)>, Vec<ConflictError>) {
    let mut selections = Vec::with_capacity(groups.len());
    let mut errors = Vec::new();

    let mut drained: Vec<_> = groups.drain().collect();
    drained.sort_by(|a, b| a.0.cmp(&b.0));

    for (module, group) in drained {
        match select(&module, group.requests, fetched.get(&module)) {
            Ok(selection) => selections.push((module, selection)),
            Err(e) => errors.push(e),
        }
    }
    (selections, errors)
}

/// Apply the selection policy to the requests for `module`.
pub fn select(
    module: &ModuleIdentity,
    requests: Vec<ConflictRequest>,
    fetched: Option<&Version>,
) -> Result<Selection, ConflictError> {
    let conflict = |reason: String, requests: Vec<ConflictRequest>| ConflictError {
        module: module.clone(),
        reason,
        requests,
    };

    let forced = distinct_versions(&requests, ConstraintKind::Forced);
    if forced.len() > 1 {
        let involved = of_kind(&requests, ConstraintKind::Forced);
        return Err(conflict("multiple forced versions".to_string(), involved));
    }
    if let Some(version) = forced.into_iter().next() {
        return Ok(Selection {
            version,
            reason: SelectionReason::Forced,
            requests,
        });
    }

    let strict = distinct_versions(&requests, ConstraintKind::Strict);
    if strict.len() > 1 {
        let involved = of_kind(&requests, ConstraintKind::Strict);
        return Err(conflict("multiple strict versions".to_string(), involved));
    }
    if let Some(version) = strict.into_iter().next() {
        let rejecting: Vec<_> = requests
            .iter()
            .filter(|r| !r.constraint.admits(&version))
            .cloned()
            .collect();
        if !rejecting.is_empty() {
            let mut involved = of_kind(&requests, ConstraintKind::Strict);
            involved.extend(rejecting);
            return Err(conflict(
                format!("strict version {version} is rejected by other requests"),
                involved,
            ));
        }
        return Ok(Selection {
            version,
            reason: SelectionReason::Strict,
            requests,
        });
    }

    let candidates: Vec<Version> = requests
        .iter()
        .filter_map(|r| candidate(&r.constraint, fetched))
        .collect();
    let admitted_by_all = |v: &Version| requests.iter().all(|r| r.constraint.admits(v));

    // Iterating in request order and replacing only on a strictly greater
    // version keeps the first of equal candidates.
    let mut best: Option<&Version> = None;
    for v in candidates.iter().filter(|v| admitted_by_all(v)) {
        if best.map_or(true, |b| v > b) {
            best = Some(v);
        }
    }
    match best {
        Some(version) => Ok(Selection {
            version: version.clone(),
            reason: SelectionReason::HighestVersion,
            requests,
        }),
        None if candidates.is_empty() => match fetched {
            Some(v) => Ok(Selection {
                version: v.clone(),
                reason: SelectionReason::HighestVersion,
                requests,
            }),
            None => Err(conflict("no version requested".to_string(), requests)),
        },
        None => Err(conflict(
            "no requested version satisfies every range".to_string(),
            requests,
        )),
    }
}

/// The version a request votes for.
///
/// A bounded range votes for the fetched version when it admits it, else for
/// its lower bound. Any other request votes for the fetched version when it
/// admits it and is not below the requested one, so a request whose exact
/// version the source does not publish settles on what the source served.
fn candidate(constraint: &VersionConstraint, fetched: Option<&Version>) -> Option<Version> {
    let admitted = fetched.filter(|v| constraint.admits(v));
    match constraint {
        VersionConstraint::Required(range) if !range.is_at_least() => {
            admitted.or_else(|| range.requested()).cloned()
        }
        other => match (other.requested_version(), admitted) {
            (Some(requested), Some(served)) if served >= requested => Some(served.clone()),
            (Some(requested), _) => Some(requested.clone()),
            (None, _) => fetched.cloned(),
        },
    }
}

fn distinct_versions(requests: &[ConflictRequest], kind: ConstraintKind) -> Vec<Version> {
    let mut versions: Vec<Version> = Vec::new();
    for r in requests.iter().filter(|r| r.constraint.kind() == kind) {
        if let Some(v) = r.constraint.requested_version() {
            if !versions.contains(v) {
                versions.push(v.clone());
            }
        }
    }
    versions
}

fn of_kind(requests: &[ConflictRequest], kind: ConstraintKind) -> Vec<ConflictRequest> {
    requests
        .iter()
        .filter(|r| r.constraint.kind() == kind)
        .cloned()
        .collect()
}

/// A report of all version conflicts encountered during resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConflictReport {
    pub conflicts: Vec<VersionConflict>,
}

/// A version that was requested for a module but not selected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionConflict {
    pub module: ModuleIdentity,
    pub requested: String,
    pub resolved: String,
    pub reason: SelectionReason,
}

impl ConflictReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, conflict: VersionConflict) {
        self.conflicts.push(conflict);
    }

    /// Record every requested version of `module` that lost to `selection`.
    pub fn record(&mut self, module: &ModuleIdentity, selection: &Selection) {
        let mut seen: Vec<&Version> = Vec::new();
        for request in &selection.requests {
            let Some(requested) = request.constraint.requested_version() else {
                continue;
            };
            if requested == &selection.version || seen.contains(&requested) {
                continue;
            }
            seen.push(requested);
            self.add(VersionConflict {
                module: module.clone(),
                requested: requested.to_string(),
                resolved: selection.version.to_string(),
                reason: selection.reason,
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conflicts.is_empty() {
            return write!(f, "No version conflicts.");
        }
        writeln!(f, "Version conflicts ({}):", self.conflicts.len())?;
        for c in &self.conflicts {
            writeln!(
                f,
                "  {} requested {} but resolved {} ({})",
                c.module, c.requested, c.resolved, c.reason
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {} ({})",
            self.module, self.requested, self.resolved, self.reason
        )
    }
}
