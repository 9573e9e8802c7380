//! Core data types for the Kiln build tool.
//!
//! This crate defines the declaration-side model that dependency resolution
//! reads: module identities, versions and constraints, dependency
//! descriptors, resolution rules, configurations with their inheritance,
//! the `Kiln.toml` build file, and the global configuration.
//!
//! This crate is intentionally free of async code and network I/O.

pub mod build_file;
pub mod config;
pub mod configuration;
pub mod constraint;
pub mod dependency;
pub mod error;
pub mod identity;
pub mod rules;
pub mod version;
