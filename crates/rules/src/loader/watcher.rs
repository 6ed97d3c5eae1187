//! Filesystem event handler for the notify watcher (hot-reload).

use std::fs;
use std::path::Path;

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind};
use tracing::{info, warn};

use super::core::{insert_into, is_yaml, parse_table, TableMap};

/// Handle a single filesystem event from the notify watcher.
pub(super) fn handle_fs_event(event: &Event, tables: &TableMap) {
    for path in &event.paths {
        if !is_yaml(path) {
            continue;
        }

        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with('.') {
                continue;
            }
        }

        match &event.kind {
            EventKind::Create(CreateKind::File)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_)) => match fs::read_to_string(path) {
                Ok(contents) => match parse_table(&contents) {
                    Ok(table) => {
                        info!(
                            table_id = %table.metadata.id,
                            jurisdiction = %table.jurisdiction,
                            path = %path.display(),
                            "hot-reloaded rule table"
                        );
                        insert_into(tables, path.clone(), table);
                    }
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "failed to parse rule table during hot-reload, keeping previous version"
                        );
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read file during hot-reload");
                }
            },
            EventKind::Remove(RemoveKind::File) => remove_table_by_path(tables, path),
            _ => {}
        }
    }
}

fn remove_table_by_path(tables: &TableMap, path: &Path) {
    let mut guard = tables.write().expect("rule tables lock poisoned");
    let before = guard.len();
    guard.retain(|_, t| t.path.as_path() != path);
    if guard.len() < before {
        info!(path = %path.display(), "removed rule table after file deletion");
    }
}
