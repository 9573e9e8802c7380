//! Handler for `kiln resolve`.

use miette::Result;

use kiln_ops::ops_resolve::{self, ResolveOptions};

pub async fn exec(configurations: Vec<String>, json: bool, cycle_tolerant: bool) -> Result<()> {
    let project_root = super::project_root()?;
    let opts = ResolveOptions {
        configurations,
        json,
        cycle_tolerant,
    };
    ops_resolve::resolve(&project_root, &opts).await
}
