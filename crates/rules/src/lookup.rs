//! Rule-table lookup: the external seam the engine reads rules through.
//!
//! The engine never reads tables directly. It asks a [`RuleLookup`] for the
//! raw rules matching a jurisdiction and trigger set, so the backing store
//! (filesystem tables, a database, a remote config service) can fail
//! independently of evaluation.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use welfare_core::Jurisdiction;

use crate::loader::RuleTableLoader;
use crate::schema::{LawRule, LawRuleTable, TriggerCategory};

/// Errors raised by a rule lookup backend.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("rule store unavailable: {0}")]
    Unavailable(String),
}

/// Source of raw rule rows keyed by jurisdiction and trigger.
#[async_trait]
pub trait RuleLookup: Send + Sync {
    /// Return every rule applicable to `jurisdiction` for any of `triggers`.
    ///
    /// Ordering of the returned rows is unspecified.
    async fn lookup_rules(
        &self,
        jurisdiction: &Jurisdiction,
        triggers: &BTreeSet<TriggerCategory>,
    ) -> Result<Vec<LawRule>, LookupError>;
}

/// Collect matching rules across a jurisdiction's lineage.
///
/// Tables for the jurisdiction itself are consulted first, then each
/// ancestor (`US-CA/los-angeles` before `US-CA`). A rule id already taken
/// by a more specific jurisdiction shadows the same id further up. Tables at
/// the same level are visited in table-id order so the result is stable.
pub fn resolve_rules<'a>(
    tables: impl IntoIterator<Item = &'a LawRuleTable>,
    jurisdiction: &Jurisdiction,
    triggers: &BTreeSet<TriggerCategory>,
) -> Vec<LawRule> {
    let mut by_jurisdiction: HashMap<&Jurisdiction, Vec<&LawRuleTable>> = HashMap::new();
    for table in tables {
        if table.metadata.enabled {
            by_jurisdiction.entry(&table.jurisdiction).or_default().push(table);
        }
    }

    let mut seen = std::collections::HashSet::new();
    let mut rules = Vec::new();

    for level in jurisdiction.lineage() {
        let Some(level_tables) = by_jurisdiction.get_mut(&level) else {
            continue;
        };
        level_tables.sort_by(|a, b| a.metadata.id.cmp(&b.metadata.id));
        for table in level_tables.iter() {
            for rule in table.matching(triggers) {
                if seen.insert(rule.id.clone()) {
                    rules.push(rule.clone());
                }
            }
        }
    }

    rules
}

#[async_trait]
impl RuleLookup for RuleTableLoader {
    async fn lookup_rules(
        &self,
        jurisdiction: &Jurisdiction,
        triggers: &BTreeSet<TriggerCategory>,
    ) -> Result<Vec<LawRule>, LookupError> {
        let tables = self.tables();
        let guard = tables
            .read()
            .map_err(|_| LookupError::Unavailable("rule tables lock poisoned".to_string()))?;
        Ok(resolve_rules(
            guard.values().map(|t| &t.table),
            jurisdiction,
            triggers,
        ))
    }
}

/// Fixed in-memory set of tables.
#[derive(Debug, Clone, Default)]
pub struct StaticRuleLookup {
    tables: Vec<LawRuleTable>,
}

impl StaticRuleLookup {
    pub fn new(tables: Vec<LawRuleTable>) -> Self {
        Self { tables }
    }
}

#[async_trait]
impl RuleLookup for StaticRuleLookup {
    async fn lookup_rules(
        &self,
        jurisdiction: &Jurisdiction,
        triggers: &BTreeSet<TriggerCategory>,
    ) -> Result<Vec<LawRule>, LookupError> {
        Ok(resolve_rules(&self.tables, jurisdiction, triggers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(id: &str, jurisdiction: &str, yaml_rules: &str) -> LawRuleTable {
        serde_yaml::from_str(&format!(
            "apiVersion: v1\nkind: LawRuleTable\nmetadata:\n  id: {id}\n  name: {id}\njurisdiction: {jurisdiction}\nrules:\n{yaml_rules}"
        ))
        .unwrap()
    }

    fn state_table() -> LawRuleTable {
        table(
            "us-ca",
            "US-CA",
            r#"
  - id: cruelty
    name: State cruelty statute
    legal_basis: state_statute
    priority: critical
    sla_minutes: 60
    triggers: [cruelty]
  - id: dangerous-dog
    name: Potentially dangerous dog
    legal_basis: state_statute
    priority: high
    sla_minutes: 240
    triggers: [dangerous_animal, bite_incident]
"#,
        )
    }

    fn city_table() -> LawRuleTable {
        table(
            "us-ca-la",
            "US-CA/los-angeles",
            r#"
  - id: dangerous-dog
    name: LA dangerous dog ordinance
    legal_basis: local_ordinance
    priority: critical
    sla_minutes: 30
    triggers: [bite_incident]
"#,
        )
    }

    #[test]
    fn local_rule_shadows_state_rule_with_same_id() {
        let tables = vec![state_table(), city_table()];
        let triggers = BTreeSet::from([TriggerCategory::BiteIncident]);
        let rules = resolve_rules(&tables, &Jurisdiction::new("US-CA/los-angeles"), &triggers);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "LA dangerous dog ordinance");
        assert_eq!(rules[0].sla_minutes, Some(30));
    }

    #[test]
    fn state_rules_apply_to_child_jurisdictions() {
        let tables = vec![state_table(), city_table()];
        let triggers = BTreeSet::from([TriggerCategory::Cruelty]);
        let rules = resolve_rules(&tables, &Jurisdiction::new("US-CA/san-diego"), &triggers);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "cruelty");
    }

    #[test]
    fn sibling_and_unrelated_jurisdictions_do_not_leak() {
        let tables = vec![state_table(), city_table()];
        let triggers = BTreeSet::from([TriggerCategory::BiteIncident]);
        let rules = resolve_rules(&tables, &Jurisdiction::new("US-NV"), &triggers);
        assert!(rules.is_empty());
        let rules = resolve_rules(&tables, &Jurisdiction::new("US-CA/san-diego"), &triggers);
        assert_eq!(rules[0].name, "Potentially dangerous dog");
    }

    #[test]
    fn disabled_tables_are_ignored() {
        let mut city = city_table();
        city.metadata.enabled = false;
        let tables = vec![state_table(), city];
        let triggers = BTreeSet::from([TriggerCategory::BiteIncident]);
        let rules = resolve_rules(&tables, &Jurisdiction::new("US-CA/los-angeles"), &triggers);
        assert_eq!(rules[0].legal_basis, crate::schema::LegalBasis::StateStatute);
    }

    #[tokio::test]
    async fn static_lookup_delegates_to_resolution() {
        let lookup = StaticRuleLookup::new(vec![state_table()]);
        let triggers = BTreeSet::from([TriggerCategory::Cruelty, TriggerCategory::DangerousAnimal]);
        let rules = lookup
            .lookup_rules(&Jurisdiction::new("US-CA"), &triggers)
            .await
            .unwrap();
        assert_eq!(rules.len(), 2);
    }
}
