//! Source indexing pipeline: walk a working tree, parse and extract symbols
//! and references, resolve import aliases, build dependency edges, and
//! drive the two-pass store through a worker pool, an incremental path, and
//! a filesystem watcher.

pub mod dependencies;
pub mod incremental;
pub mod language_grammars;
pub mod parser;
pub mod path_alias;
pub mod pipeline;
pub mod reader;
pub mod references;
pub mod symbols;
pub mod tag_registry;
pub mod walker;
pub mod watcher;
pub mod workers;
