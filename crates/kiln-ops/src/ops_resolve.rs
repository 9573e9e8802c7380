//! Operation: resolve configurations and print the selected modules.

use std::path::Path;

use kiln_resolver::{ResolveError, ResolvedConfigurationResult};
use kiln_util::errors::KilnError;
use kiln_util::progress::{status, status_error, status_info, status_warn};

/// Options for `kiln resolve`.
#[derive(Default)]
pub struct ResolveOptions {
    /// Configurations to resolve; all of them when empty.
    pub configurations: Vec<String>,
    /// Print the isolated graphs as JSON instead of module lines.
    pub json: bool,
    pub cycle_tolerant: bool,
}

/// Resolve the requested configurations of the project at `project_root`.
///
/// Every configuration is attempted and reported. A single failure is
/// returned as is; several are summarized.
pub async fn resolve(project_root: &Path, opts: &ResolveOptions) -> miette::Result<()> {
    let project = crate::open_project(project_root)?;
    let names: Vec<String> = if opts.configurations.is_empty() {
        project.resolver.model().names().map(str::to_string).collect()
    } else {
        opts.configurations.clone()
    };

    let requests: Vec<(String, bool)> = names
        .iter()
        .map(|name| (name.clone(), opts.cycle_tolerant))
        .collect();
    let results = project.resolver.resolve_all(&requests).await;

    let mut resolved = Vec::new();
    let mut failed: Vec<ResolveError> = Vec::new();
    for (name, result) in names.iter().zip(results) {
        match result {
            Ok(result) => {
                report(&result, opts.json);
                resolved.push(result);
            }
            Err(e) => {
                status_error("Failed", &format!("{name}: {e}"));
                for failure in e.failures() {
                    status_error("", &failure.to_string());
                }
                failed.push(e);
            }
        }
    }

    if opts.json {
        let json = serde_json::to_string_pretty(&resolved).map_err(|e| {
            KilnError::Generic {
                message: format!("Failed to serialize resolution: {e}"),
            }
        })?;
        println!("{json}");
    }

    if failed.len() > 1 {
        return Err(KilnError::Resolution {
            message: format!("{} of {} configurations failed", failed.len(), names.len()),
        }
        .into());
    }
    match failed.pop() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn report(result: &ResolvedConfigurationResult, json: bool) {
    let label = if result.cache_hit { "Cached" } else { "Resolved" };
    let summary = format!("{} ({} modules)", result.configuration, result.graph.len());
    if result.cache_hit {
        status_info(label, &summary);
    } else {
        status(label, &summary);
    }
    for warning in &result.warnings {
        status_warn("Warning", warning);
    }
    if json {
        return;
    }
    for (module, version, _) in result.modules() {
        println!("{module}:{version}");
    }
}
