//! Tests for the rule-table loader module.

use std::fs;

use tempfile::TempDir;

use super::*;

const CA_TABLE_YAML: &str = r#"
apiVersion: v1
kind: LawRuleTable
metadata:
  id: us-ca
  name: California statutes
jurisdiction: US-CA
rules:
  - id: ca-pc-597
    name: Animal cruelty
    legal_basis: state_statute
    priority: critical
    sla_minutes: 60
    requires_immediate: true
    citations: ["Cal. Penal Code § 597"]
    triggers: [cruelty]
"#;

fn temp_loader() -> (TempDir, RuleTableLoader) {
    let dir = TempDir::new().expect("create tempdir");
    let loader = RuleTableLoader::new(dir.path().to_path_buf());
    (dir, loader)
}

#[test]
fn load_table_from_file() {
    let (dir, loader) = temp_loader();
    let path = dir.path().join("us-ca.yml");
    fs::write(&path, CA_TABLE_YAML).unwrap();

    let table = loader.load_file(&path).unwrap();
    assert_eq!(table.metadata.id, "us-ca");
    assert_eq!(table.rules.len(), 1);
}

#[test]
fn load_all_skips_dotfiles_and_non_yaml() {
    let (dir, loader) = temp_loader();

    fs::write(dir.path().join("us-ca.yml"), CA_TABLE_YAML).unwrap();
    fs::write(dir.path().join(".hidden.yml"), CA_TABLE_YAML).unwrap();
    fs::write(dir.path().join("readme.txt"), "not a table").unwrap();

    let results = loader.load_all().unwrap();

    let loaded = results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Loaded { .. }))
        .count();
    let skipped = results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Skipped { .. }))
        .count();

    assert_eq!(loaded, 1);
    assert_eq!(skipped, 2);
    assert!(loader.tables().read().unwrap().contains_key("us-ca"));
}

#[test]
fn load_all_recurses_into_subdirectories() {
    let (dir, loader) = temp_loader();
    let nested = dir.path().join("states");
    fs::create_dir_all(&nested).unwrap();
    fs::write(nested.join("us-ca.yaml"), CA_TABLE_YAML).unwrap();

    loader.load_all().unwrap();
    assert_eq!(loader.len(), 1);
}

#[test]
fn invalid_table_reported_but_scan_continues() {
    let (dir, loader) = temp_loader();
    fs::write(dir.path().join("us-ca.yml"), CA_TABLE_YAML).unwrap();
    fs::write(
        dir.path().join("broken.yml"),
        CA_TABLE_YAML.replace("kind: LawRuleTable", "kind: Something"),
    )
    .unwrap();

    let results = loader.load_all().unwrap();
    let failed: Vec<_> = results
        .iter()
        .filter_map(|r| match &r.status {
            LoadStatus::Failed { error } => Some(error.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].contains("unsupported kind"));
    assert_eq!(loader.len(), 1);
}

#[test]
fn reloading_a_file_under_a_new_id_drops_the_old_entry() {
    let (dir, loader) = temp_loader();
    let path = dir.path().join("us-ca.yml");
    fs::write(&path, CA_TABLE_YAML).unwrap();
    loader.load_all().unwrap();

    fs::write(&path, CA_TABLE_YAML.replace("id: us-ca\n", "id: california\n")).unwrap();
    loader.load_all().unwrap();

    let tables = loader.tables();
    let guard = tables.read().unwrap();
    assert_eq!(guard.len(), 1);
    assert!(guard.contains_key("california"));
}

#[test]
fn missing_directory_is_created() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b");
    let loader = RuleTableLoader::new(nested.clone());
    assert!(nested.exists());
    assert!(loader.is_empty());
}
