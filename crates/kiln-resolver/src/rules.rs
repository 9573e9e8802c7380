//! The rule pipeline applied to every dependency request.
//!
//! Substitution, then constraint overrides, then exclusion. Each step reads
//! the rule set and returns a new descriptor; nothing is mutated in place.

use std::sync::Arc;

use kiln_core::dependency::DependencyDescriptor;
use kiln_core::rules::{ExcludeRule, RuleSet};

/// Result of running a descriptor through the [`RuleEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Applied(Arc<DependencyDescriptor>),
    /// Dropped by this exclusion.
    Pruned(ExcludeRule),
}

pub struct RuleEngine<'a> {
    rules: &'a RuleSet,
}

impl<'a> RuleEngine<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self { rules }
    }

    /// Apply the rules to `descriptor`.
    ///
    /// `inherited` holds the exclusions collected along the expansion path.
    /// A descriptor no rule touches comes back as the same allocation.
    /// File dependencies are never rewritten or pruned.
    pub fn apply(
        &self,
        descriptor: &Arc<DependencyDescriptor>,
        inherited: &[ExcludeRule],
    ) -> RuleOutcome {
        if descriptor.is_file() {
            return RuleOutcome::Applied(Arc::clone(descriptor));
        }

        let mut current: Option<DependencyDescriptor> = None;

        if let DependencyDescriptor::External(_) = descriptor.as_ref() {
            if let Some(sub) = self.rules.substitution_for(descriptor.identity()) {
                tracing::debug!("Substituting {} with {}", sub.from, sub.to);
                let mut substituted = descriptor.with_identity(sub.to.clone());
                if let Some(constraint) = &sub.constraint {
                    substituted = substituted.with_constraint(constraint.clone());
                }
                current = Some(substituted);
            }
        }

        let view = current.as_ref().unwrap_or(descriptor.as_ref());
        if let Some(rule) = self.rules.constraint_for(view.identity()) {
            if view.constraint() != &rule.constraint {
                current = Some(view.with_constraint(rule.constraint.clone()));
            }
        }

        let view = current.as_ref().unwrap_or(descriptor.as_ref());
        let identity = view.identity();
        if let Some(rule) = self
            .rules
            .exclusion_for(identity)
            .or_else(|| inherited.iter().find(|e| e.matches(identity)))
        {
            return RuleOutcome::Pruned(rule.clone());
        }

        match current {
            Some(changed) => RuleOutcome::Applied(Arc::new(changed)),
            None => RuleOutcome::Applied(Arc::clone(descriptor)),
        }
    }
}
