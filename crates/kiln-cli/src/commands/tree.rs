//! Handler for `kiln tree`.

use miette::Result;

use kiln_ops::ops_tree::{self, TreeOptions};

pub async fn exec(
    configuration: &str,
    depth: Option<u32>,
    why: Option<String>,
    conflicts: bool,
    cycle_tolerant: bool,
) -> Result<()> {
    let project_root = super::project_root()?;
    let opts = TreeOptions {
        depth: depth.map(|d| d as usize),
        why,
        conflicts,
        cycle_tolerant,
    };
    ops_tree::tree(&project_root, configuration, &opts).await
}
