//! Jurisdiction rule-table documents.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use welfare_core::Jurisdiction;

use super::{CommonMetadata, LawRule, TriggerCategory};

/// The only document kind accepted by the rule-table loader.
pub const LAW_RULE_TABLE_KIND: &str = "LawRuleTable";

/// A rule plus the trigger categories it applies to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LawRuleEntry {
    #[serde(flatten)]
    pub rule: LawRule,
    pub triggers: Vec<TriggerCategory>,
}

impl LawRuleEntry {
    /// Whether any of this rule's triggers is in `triggers`.
    pub fn matches(&self, triggers: &BTreeSet<TriggerCategory>) -> bool {
        self.triggers.iter().any(|t| triggers.contains(t))
    }
}

/// All rules one jurisdiction defines.
///
/// ```yaml
/// apiVersion: v1
/// kind: LawRuleTable
/// metadata:
///   id: us-ca
///   name: California statutes
/// jurisdiction: US-CA
/// rules:
///   - id: ca-pc-597
///     name: Animal cruelty
///     legal_basis: state_statute
///     priority: critical
///     sla_minutes: 60
///     requires_immediate: true
///     citations: ["Cal. Penal Code § 597"]
///     triggers: [cruelty]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LawRuleTable {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: CommonMetadata,
    pub jurisdiction: Jurisdiction,
    #[serde(default)]
    pub rules: Vec<LawRuleEntry>,
}

impl LawRuleTable {
    /// Structural checks the loader applies before accepting a table.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.kind != LAW_RULE_TABLE_KIND {
            return Err(format!(
                "unsupported kind '{}', expected '{}'",
                self.kind, LAW_RULE_TABLE_KIND
            ));
        }
        if self.metadata.id.trim().is_empty() {
            return Err("metadata.id must not be empty".to_string());
        }
        if self.jurisdiction.is_empty() {
            return Err(format!("table '{}' has an empty jurisdiction", self.metadata.id));
        }

        let mut seen = HashSet::new();
        for entry in &self.rules {
            let id = &entry.rule.id;
            if id.trim().is_empty() {
                return Err(format!("table '{}' contains a rule without id", self.metadata.id));
            }
            if !seen.insert(id.as_str()) {
                return Err(format!("duplicate rule id '{}' in table '{}'", id, self.metadata.id));
            }
            if entry.triggers.is_empty() {
                return Err(format!("rule '{}' lists no triggers", id));
            }
            if entry.rule.sla_minutes == Some(0) {
                return Err(format!("rule '{}' has a zero-minute SLA", id));
            }
        }
        Ok(())
    }

    /// Rules in this table whose triggers intersect `triggers`.
    pub fn matching<'a>(
        &'a self,
        triggers: &'a BTreeSet<TriggerCategory>,
    ) -> impl Iterator<Item = &'a LawRule> + 'a {
        self.rules
            .iter()
            .filter(move |e| e.matches(triggers))
            .map(|e| &e.rule)
    }
}
