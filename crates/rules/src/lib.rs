//! Jurisdiction-aware legal rule engine.
//!
//! This crate provides:
//! - YAML rule-table schema (`LawRuleTable`, `LawRule`, `TriggerCategory`)
//! - Filesystem loader with hot-reload via `notify` watcher
//! - `RuleLookup` seam with jurisdiction-lineage precedence
//! - `RuleEngine` producing an ordered `LawTriggerResult`, failing open on lookup errors
//! - In-memory evaluation audit log

pub mod audit_log;
pub mod engine;
pub mod loader;
pub mod lookup;
pub mod schema;

pub use engine::{LawTriggerResult, RuleEngine};
pub use lookup::{LookupError, RuleLookup, StaticRuleLookup};
