//! Filesystem rule-table loader with hot-reload via `notify` watcher.
//!
//! Watches the rules directory for YAML file changes (create, modify, delete)
//! and reloads affected tables into the in-memory table set.

mod core;
mod error;
mod watcher;

#[cfg(test)]
mod tests;

pub use self::core::{LoadedTable, RuleTableLoader};
pub use self::error::{LoadResult, LoadStatus, Result, RuleError};
