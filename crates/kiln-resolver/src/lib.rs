//! Dependency resolution engine: rule application, breadth-first graph
//! expansion, fixed-point conflict resolution, metadata isolation, and a
//! single-flight resolution cache.

pub mod builder;
pub mod cache;
pub mod conflict;
pub mod error;
pub mod graph;
pub mod isolate;
pub mod resolver;
pub mod rules;
pub mod source;

pub use error::ResolveError;
pub use resolver::{CancellationSignal, ResolvedConfigurationResult, Resolver, ResolverOptions};
pub use source::{InMemorySource, MetadataSource, ModuleMetadata};
