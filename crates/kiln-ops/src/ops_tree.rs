//! Operation: display the dependency tree of one configuration.

use std::path::Path;

use kiln_resolver::graph::DependencyTree;

/// Options for `kiln tree`.
#[derive(Default)]
pub struct TreeOptions {
    /// Maximum tree depth to display.
    pub depth: Option<usize>,
    /// Explain why a module is included.
    pub why: Option<String>,
    /// Show version conflicts.
    pub conflicts: bool,
    pub cycle_tolerant: bool,
}

/// Display the dependency tree of `configuration`.
pub async fn tree(project_root: &Path, configuration: &str, opts: &TreeOptions) -> miette::Result<()> {
    let project = crate::open_project(project_root)?;
    let result = project
        .resolver
        .resolve(configuration, opts.cycle_tolerant)
        .await?;
    let tree = DependencyTree::new(&result.graph);

    // Handle --why
    if let Some(ref target) = opts.why {
        match tree.find_path(target) {
            Some(path) => {
                println!("Path to {target}:");
                for (i, node) in path.iter().enumerate() {
                    let indent = "  ".repeat(i);
                    println!("{indent}{node}");
                }
                println!();
                print!("{}", tree.print_inverted_tree(target));
            }
            None => println!("Module '{target}' not found in '{configuration}'."),
        }
        return Ok(());
    }

    // Handle --conflicts
    if opts.conflicts {
        if result.conflicts.is_empty() {
            println!("No version conflicts.");
        } else {
            print!("{}", result.conflicts);
        }
        return Ok(());
    }

    print!("{}", tree.print_tree(opts.depth));
    Ok(())
}
