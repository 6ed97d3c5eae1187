//! Core [`RuleTableLoader`] struct: filesystem-backed rule tables with optional hot-reload.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use crate::schema::LawRuleTable;

use super::error::{LoadResult, LoadStatus, Result, RuleError};
use super::watcher::handle_fs_event;

/// A table together with the file it was read from.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub path: PathBuf,
    pub table: LawRuleTable,
}

/// Shared in-memory table map keyed by `metadata.id`.
pub(crate) type TableMap = Arc<RwLock<HashMap<String, LoadedTable>>>;

/// Filesystem-backed rule-table loader with optional hot-reload.
///
/// Scans a directory (recursively) for `*.yml` / `*.yaml` files, deserializes
/// them into [`LawRuleTable`] instances and keeps an in-memory map keyed by
/// table ID. Rule tables are configuration: nothing here mutates a rule once
/// it is loaded, a reload replaces the whole table.
pub struct RuleTableLoader {
    /// Root directory containing rule-table YAML files.
    rules_dir: PathBuf,
    tables: TableMap,
    /// Active filesystem watcher (held to keep it alive).
    _watcher: Option<RecommendedWatcher>,
}

impl RuleTableLoader {
    /// Create a new loader for the given directory.
    ///
    /// Creates the directory (and parents) if it does not exist.
    pub fn new(rules_dir: PathBuf) -> Self {
        if !rules_dir.exists() {
            if let Err(e) = fs::create_dir_all(&rules_dir) {
                warn!(path = %rules_dir.display(), error = %e, "failed to create rules directory");
            }
        }
        Self {
            rules_dir,
            tables: Arc::new(RwLock::new(HashMap::new())),
            _watcher: None,
        }
    }

    /// Recursively scan the rules directory and load all YAML files.
    ///
    /// Dotfiles and non-YAML files are skipped. Parse errors are reported
    /// per-file but do not abort the scan.
    pub fn load_all(&self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        self.scan_dir_recursive(&self.rules_dir, &mut results)?;
        Ok(results)
    }

    fn scan_dir_recursive(&self, dir: &Path, results: &mut Vec<LoadResult>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to read directory");
                return Ok(());
            }
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();

            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    if path.is_file() {
                        results.push(LoadResult {
                            path,
                            status: LoadStatus::Skipped {
                                reason: "dotfile".to_string(),
                            },
                        });
                    }
                    continue;
                }
            }

            if path.is_dir() {
                self.scan_dir_recursive(&path, results)?;
                continue;
            }

            if !is_yaml(&path) {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML file".to_string(),
                    },
                });
                continue;
            }

            match self.load_file(&path) {
                Ok(table) => {
                    let table_id = table.metadata.id.clone();
                    let rule_count = table.rules.len();
                    info!(
                        table_id = %table_id,
                        jurisdiction = %table.jurisdiction,
                        rule_count,
                        path = %path.display(),
                        "loaded rule table"
                    );
                    self.insert_table(path.clone(), table);
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Loaded { table_id, rule_count },
                    });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load rule table");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(())
    }

    pub(super) fn insert_table(&self, path: PathBuf, table: LawRuleTable) {
        insert_into(&self.tables, path, table);
    }

    /// Parse and validate a single YAML file.
    pub fn load_file(&self, path: &Path) -> Result<LawRuleTable> {
        let contents = fs::read_to_string(path)?;
        parse_table(&contents)
    }

    /// Start a filesystem watcher with 500ms debounce.
    ///
    /// On file create/modify the table is re-parsed and upserted.
    /// On file delete the table loaded from that file is removed.
    /// Parse errors are logged as warnings; the previous version is kept.
    pub fn watch(&mut self) -> Result<()> {
        let tables = Arc::clone(&self.tables);

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => handle_fs_event(&event, &tables),
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            },
        )?;

        watcher.watch(&self.rules_dir, RecursiveMode::Recursive)?;

        let _ = watcher.configure(notify::Config::default().with_poll_interval(Duration::from_millis(500)));

        info!(path = %self.rules_dir.display(), "watching rule tables for changes (recursive)");
        self._watcher = Some(watcher);
        Ok(())
    }

    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }

    /// Get the shared table map.
    pub fn tables(&self) -> Arc<RwLock<HashMap<String, LoadedTable>>> {
        Arc::clone(&self.tables)
    }

    /// Number of tables currently loaded.
    pub fn len(&self) -> usize {
        self.tables.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(super) fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "yml" || e == "yaml")
        .unwrap_or(false)
}

pub(super) fn parse_table(contents: &str) -> Result<LawRuleTable> {
    let table: LawRuleTable = serde_yaml::from_str(contents)?;
    table.validate().map_err(RuleError::Validation)?;
    Ok(table)
}

/// Upsert a table, dropping any table previously loaded from the same file
/// under a different id.
pub(super) fn insert_into(tables: &TableMap, path: PathBuf, table: LawRuleTable) {
    let mut guard = tables.write().expect("rule tables lock poisoned");
    let id = table.metadata.id.clone();
    guard.retain(|existing_id, t| existing_id == &id || t.path != path);
    if let Some(existing) = guard.get(&id) {
        if existing.path != path {
            warn!(
                table_id = %id,
                previous = %existing.path.display(),
                replacement = %path.display(),
                "duplicate rule table id, later file wins"
            );
        }
    }
    guard.insert(id, LoadedTable { path, table });
}
