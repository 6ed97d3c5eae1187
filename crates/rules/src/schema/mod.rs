//! YAML rule-table schema types with serde deserialization.
//!
//! - `LawRule`: a single legal rule (priority, SLA, citations)
//! - `TriggerCategory`: closed set of observed conditions rules are keyed by
//! - `LawRuleTable`: one jurisdiction's rule table document

mod law_rule;
mod metadata;
mod table;
mod trigger;

pub use law_rule::*;
pub use metadata::*;
pub use table::*;
pub use trigger::*;
