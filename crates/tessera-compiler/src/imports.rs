// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Merging imported library documents.
//!
//! An import names another document of the same dialect. It is looked up
//! next to the importing document first, then in each search directory in
//! order. The structs and tasks of every reachable import are merged into
//! the main document, and their workflows become sub-workflows. A document
//! reached twice is merged once.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tessera_frontend::{Dialect, Document};

use crate::error::{CompileError, Result};

/// Merge every document reachable through `document.imports`.
pub fn resolve(document: &Document, dialect: &Dialect, search: &[PathBuf]) -> Result<Document> {
    let mut merged = document.clone();
    merged.imports.clear();

    let mut seen: HashSet<PathBuf> = HashSet::new();
    if let Some(source) = &document.source
        && let Ok(path) = Path::new(source).canonicalize()
    {
        seen.insert(path);
    }
    let mut pending: Vec<(String, Option<PathBuf>)> = document
        .imports
        .iter()
        .rev()
        .map(|name| (name.clone(), base_dir(document.source.as_deref())))
        .collect();

    while let Some((name, base)) = pending.pop() {
        let path = locate(&name, base.as_deref(), search)?;
        let canonical = path.canonicalize()?;
        if !seen.insert(canonical.clone()) {
            continue;
        }
        let text = std::fs::read_to_string(&canonical)?;
        let imported = dialect.frontend().parse(dialect, &text)?;
        tracing::debug!(
            import = %name,
            path = %canonical.display(),
            tasks = imported.tasks.len(),
            "Merging imported document"
        );
        let base = canonical.parent().map(Path::to_path_buf);
        for nested in imported.imports.iter().rev() {
            pending.push((nested.clone(), base.clone()));
        }
        merge(&mut merged, imported);
    }
    Ok(merged)
}

fn base_dir(source: Option<&str>) -> Option<PathBuf> {
    Path::new(source?).parent().map(Path::to_path_buf)
}

fn locate(name: &str, base: Option<&Path>, search: &[PathBuf]) -> Result<PathBuf> {
    let wanted = Path::new(name);
    if wanted.is_absolute() {
        return match wanted.is_file() {
            true => Ok(wanted.to_path_buf()),
            false => Err(CompileError::ImportNotFound {
                name: name.to_string(),
                searched: wanted.display().to_string(),
            }),
        };
    }
    let dirs: Vec<&Path> = base
        .into_iter()
        .chain(search.iter().map(PathBuf::as_path))
        .collect();
    dirs.iter()
        .map(|dir| dir.join(wanted))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| CompileError::ImportNotFound {
            name: name.to_string(),
            searched: dirs
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// Identical definitions reached through two imports collapse; differing
/// ones under one name are left for the bundle to reject.
fn merge(into: &mut Document, imported: Document) {
    for def in imported.structs {
        if !into.structs.contains(&def) {
            into.structs.push(def);
        }
    }
    for task in imported.tasks {
        if !into.tasks.contains(&task) {
            into.tasks.push(task);
        }
    }
    for workflow in imported.workflow.into_iter().chain(imported.subworkflows) {
        if !into.subworkflows.contains(&workflow) {
            into.subworkflows.push(workflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value as Json, json};
    use tempfile::TempDir;

    fn wdl() -> Dialect {
        "wdl,1.0".parse().unwrap()
    }

    fn write(dir: &Path, name: &str, value: Json) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();
        path
    }

    fn task(name: &str) -> Json {
        json!({"name": name, "command": format!("echo {}", name)})
    }

    #[test]
    fn test_imports_follow_the_search_path() {
        let work = TempDir::new().unwrap();
        let lib = TempDir::new().unwrap();
        write(
            lib.path(),
            "lib.json",
            json!({"language": "wdl", "tasks": [task("shared")], "imports": ["util.json"]}),
        );
        write(
            lib.path(),
            "util.json",
            json!({
                "language": "wdl",
                "tasks": [task("helper")],
                "workflow": {"name": "double", "body": [{"node": "call", "callee": "helper"}]}
            }),
        );
        let main = write(
            work.path(),
            "main.json",
            json!({"language": "wdl", "tasks": [task("own")], "imports": ["lib.json"]}),
        );
        let mut document: Document =
            serde_json::from_str(&std::fs::read_to_string(&main).unwrap()).unwrap();
        document.source = Some(main.display().to_string());

        let merged = resolve(&document, &wdl(), &[lib.path().to_path_buf()]).unwrap();
        let names: Vec<&str> = merged.tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["own", "shared", "helper"]);
        assert_eq!(merged.subworkflows[0].name, "double");
        assert!(merged.imports.is_empty());
    }

    #[test]
    fn test_local_import_wins_and_cycles_merge_once() {
        let work = TempDir::new().unwrap();
        let lib = TempDir::new().unwrap();
        write(
            work.path(),
            "lib.json",
            json!({"language": "wdl", "tasks": [task("local")], "imports": ["main.json"]}),
        );
        write(lib.path(), "lib.json", json!({"language": "wdl", "tasks": [task("remote")]}));
        let main = write(
            work.path(),
            "main.json",
            json!({"language": "wdl", "imports": ["lib.json"]}),
        );
        let mut document: Document =
            serde_json::from_str(&std::fs::read_to_string(&main).unwrap()).unwrap();
        document.source = Some(main.display().to_string());

        let merged = resolve(&document, &wdl(), &[lib.path().to_path_buf()]).unwrap();
        let names: Vec<&str> = merged.tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["local"]);
    }

    #[test]
    fn test_missing_import_lists_searched_dirs() {
        let lib = TempDir::new().unwrap();
        let document: Document = serde_json::from_value(json!({
            "language": "wdl",
            "imports": ["absent.json"]
        }))
        .unwrap();
        let err = resolve(&document, &wdl(), &[lib.path().to_path_buf()]).unwrap_err();
        assert_eq!(err.error_code(), "IMPORT_NOT_FOUND");
        assert!(err.to_string().contains(&lib.path().display().to_string()));
    }

    #[test]
    fn test_import_of_another_language_is_rejected() {
        let lib = TempDir::new().unwrap();
        write(lib.path(), "tool.json", json!({"language": "cwl", "version": "v1.2"}));
        let document: Document =
            serde_json::from_value(json!({"language": "wdl", "imports": ["tool.json"]})).unwrap();
        let err = resolve(&document, &wdl(), &[lib.path().to_path_buf()]).unwrap_err();
        assert_eq!(err.error_code(), "LANGUAGE_MISMATCH");
    }
}
