//! CLI argument definitions for Kiln.
//!
//! Uses `clap` derive macros to define the command surface. Each command
//! corresponds to a handler in the [`super::commands`] module.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "Dependency resolution for configuration-based builds",
    long_about = "Kiln resolves the dependency configurations declared in Kiln.toml: it applies \
                  substitution, constraint and exclusion rules, settles version conflicts, and \
                  prints the resulting module graph."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve configurations and print the selected modules
    Resolve {
        /// Configurations to resolve (default: all)
        configurations: Vec<String>,
        /// Print the resolved graphs as JSON
        #[arg(long)]
        json: bool,
        /// Allow modules to depend on themselves
        #[arg(long)]
        cycle_tolerant: bool,
    },

    /// Print the dependency tree of a configuration
    Tree {
        /// Configuration to display
        configuration: String,
        /// Maximum depth
        #[arg(long)]
        depth: Option<u32>,
        /// Explain why a module is included
        #[arg(long)]
        why: Option<String>,
        /// Show version conflicts
        #[arg(long)]
        conflicts: bool,
        /// Allow modules to depend on themselves
        #[arg(long)]
        cycle_tolerant: bool,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}
