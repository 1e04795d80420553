//! stitch: a CommonJS bundler that nests every file of a project into one
//! closure tree
//!
//! The pipeline runs in stages over a [`file_registry::FileRegistry`]:
//! loading, binding, ordering, structuring, rewriting, bundling and package
//! emission. [`orchestrator::compile`] drives all of them.

pub mod binder;
pub mod bundler;
pub mod config;
pub mod dependency_graph;
pub mod error;
pub mod extractor;
pub mod file_registry;
pub mod io;
pub mod names;
pub mod nodes;
pub mod orchestrator;
pub mod package;
pub mod parser;
pub mod resolver;
pub mod rewriter;
pub mod source_map;
pub mod structure;
pub mod types;
mod visitors;

pub use config::{Config, OutputFormat, PackageData};
pub use error::BundleError;
pub use io::{DiskIo, Io, MemoryIo};
pub use orchestrator::{Compilation, CompileEvent, compile, compile_with_events};
