//! Shared utilities for the Kiln build tool.
//!
//! This crate provides cross-cutting concerns used by all other Kiln crates:
//! the catch-all error type, fingerprint hashing, and terminal status lines.

pub mod errors;
pub mod hash;
pub mod progress;
