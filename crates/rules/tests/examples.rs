//! Integration tests that verify the example rule tables in
//! `data/law-rules/examples/` load and evaluate as expected.

use std::collections::BTreeSet;
use std::sync::Arc;

use welfare_core::Jurisdiction;
use welfare_rules::loader::{LoadStatus, RuleTableLoader};
use welfare_rules::schema::{LawPriority, LegalBasis, TriggerCategory};
use welfare_rules::RuleEngine;

/// Integration tests run from the crate directory, so we go up two levels.
fn examples_dir() -> std::path::PathBuf {
    let manifest = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest.join("../../data/law-rules/examples")
}

fn loaded_engine() -> RuleEngine {
    let loader = RuleTableLoader::new(examples_dir());
    let results = loader.load_all().expect("scan examples");
    for r in &results {
        assert!(
            matches!(r.status, LoadStatus::Loaded { .. }),
            "{} did not load: {:?}",
            r.path.display(),
            r.status
        );
    }
    assert_eq!(loader.len(), 2);
    RuleEngine::new(Arc::new(loader))
}

#[tokio::test]
async fn statewide_cruelty_is_critical_with_one_hour_sla() {
    let engine = loaded_engine();
    let triggers = BTreeSet::from([TriggerCategory::Cruelty]);
    let result = engine.evaluate(&Jurisdiction::new("US-CA/fresno"), &triggers).await;

    assert!(result.triggers_dispatch);
    let primary = result.primary_rule.as_ref().unwrap();
    assert_eq!(primary.id, "ca-pc-597");
    assert_eq!(primary.priority, LawPriority::Critical);
    assert_eq!(result.sla_minutes(), Some(60));
    assert!(result.requires_immediate);
    assert_eq!(
        result.citations,
        vec!["Cal. Penal Code § 597(a)", "Cal. Penal Code § 597(b)"]
    );
}

#[tokio::test]
async fn los_angeles_ordinance_overrides_state_dangerous_dog_rule() {
    let engine = loaded_engine();
    let triggers = BTreeSet::from([TriggerCategory::BiteIncident]);
    let result = engine
        .evaluate(&Jurisdiction::new("US-CA/los-angeles"), &triggers)
        .await;

    let ids: Vec<&str> = result.rules.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["ca-fac-31601", "ca-hsc-121575"]);
    let primary = result.primary_rule.as_ref().unwrap();
    assert_eq!(primary.legal_basis, LegalBasis::LocalOrdinance);
    assert_eq!(result.sla_minutes(), Some(30));
}

#[tokio::test]
async fn multiple_triggers_merge_citations_in_priority_order() {
    let engine = loaded_engine();
    let triggers = BTreeSet::from([TriggerCategory::Neglect, TriggerCategory::Cruelty]);
    let result = engine.evaluate(&Jurisdiction::new("US-CA"), &triggers).await;

    assert_eq!(result.rules.len(), 2);
    assert_eq!(result.rules[0].priority, LawPriority::Critical);
    // § 597(b) appears in both rules but only once in the union.
    assert_eq!(result.citations.len(), 2);
}

#[tokio::test]
async fn abandonment_rule_has_no_sla() {
    let engine = loaded_engine();
    let triggers = BTreeSet::from([TriggerCategory::Abandonment]);
    let result = engine.evaluate(&Jurisdiction::new("US-CA"), &triggers).await;
    assert!(result.triggers_dispatch);
    assert_eq!(result.sla_minutes(), None);
    assert!(!result.requires_immediate);
}

#[tokio::test]
async fn unknown_jurisdiction_requires_no_dispatch() {
    let engine = loaded_engine();
    let triggers = BTreeSet::from([TriggerCategory::Cruelty]);
    let result = engine.evaluate(&Jurisdiction::new("US-OR"), &triggers).await;
    assert!(!result.triggers_dispatch);
    assert!(!result.is_fail_open());
}
