// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Home-directory implementation of [`JobMeta`].
//!
//! ```text
//! <home>/
//! ├── job_input.json      inputs, native JSON
//! ├── job_info.json       job id, instance type, catalog, task
//! ├── job_output.json     written by the executor
//! ├── children/<id>.json  relaunched jobs
//! └── uploads/<id>/...    uploaded outputs
//! ```
//!
//! Inputs are local paths or `file://` URIs.

use serde_json::{Map, Value as Json, json};
use std::fs;
use std::path::{Path, PathBuf};
use tessera_ir::PathKind;

use crate::error::{ExecutorError, Result};
use crate::job_meta::{JobInfo, JobMeta};

pub const JOB_INPUT: &str = "job_input.json";
pub const JOB_INFO: &str = "job_info.json";
pub const JOB_OUTPUT: &str = "job_output.json";

#[derive(Debug, Clone)]
pub struct LocalJobMeta {
    home: PathBuf,
}

impl LocalJobMeta {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    fn read_json(&self, name: &str) -> Result<Json> {
        let path = self.home.join(name);
        let text = fs::read_to_string(&path)
            .map_err(|e| ExecutorError::JobMeta(format!("{}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Outputs written so far, if any.
    pub fn outputs(&self) -> Result<Option<Map<String, Json>>> {
        if !self.home.join(JOB_OUTPUT).exists() {
            return Ok(None);
        }
        match self.read_json(JOB_OUTPUT)? {
            Json::Object(map) => Ok(Some(map)),
            _ => Err(ExecutorError::JobMeta(format!("{} is not an object", JOB_OUTPUT))),
        }
    }

    /// Ids of child jobs launched from this home.
    pub fn children(&self) -> Result<Vec<String>> {
        let dir = self.home.join("children");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn local_path(uri: &str) -> Result<PathBuf> {
    if let Some(path) = uri.strip_prefix("file://") {
        return Ok(PathBuf::from(path));
    }
    if uri.contains("://") {
        return Err(ExecutorError::localization(uri, "remote URIs are not reachable from a local home"));
    }
    Ok(PathBuf::from(uri))
}

fn copy_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

impl JobMeta for LocalJobMeta {
    fn home(&self) -> &Path {
        &self.home
    }

    fn job_info(&self) -> Result<JobInfo> {
        Ok(serde_json::from_value(self.read_json(JOB_INFO)?)?)
    }

    fn job_input(&self) -> Result<Map<String, Json>> {
        if !self.home.join(JOB_INPUT).exists() {
            return Ok(Map::new());
        }
        match self.read_json(JOB_INPUT)? {
            Json::Object(map) => Ok(map),
            _ => Err(ExecutorError::JobMeta(format!("{} is not an object", JOB_INPUT))),
        }
    }

    fn write_outputs(&self, outputs: &Map<String, Json>) -> Result<()> {
        let text = serde_json::to_string_pretty(outputs)?;
        fs::write(self.home.join(JOB_OUTPUT), text)?;
        Ok(())
    }

    fn localize(&self, kind: PathKind, uri: &str, dest: &Path) -> Result<PathBuf> {
        let source = local_path(uri)?;
        let name = source
            .file_name()
            .ok_or_else(|| ExecutorError::localization(uri, "no file name"))?;
        let target = dest.join(name);
        fs::create_dir_all(dest)?;
        match kind {
            PathKind::File if source.is_file() => {
                fs::copy(&source, &target).map_err(|e| ExecutorError::localization(uri, e))?;
            }
            PathKind::Directory if source.is_dir() => {
                copy_dir(&source, &target).map_err(|e| ExecutorError::localization(uri, e))?;
            }
            _ => return Err(ExecutorError::localization(uri, "does not exist")),
        }
        tracing::debug!(uri, path = %target.display(), "Localized input");
        Ok(target)
    }

    fn upload(&self, path: &Path) -> Result<String> {
        let name = path
            .file_name()
            .ok_or_else(|| ExecutorError::JobMeta(format!("cannot upload {}", path.display())))?;
        let dir = self
            .home
            .join("uploads")
            .join(uuid::Uuid::new_v4().simple().to_string());
        let target = dir.join(name);
        if path.is_dir() {
            copy_dir(path, &target)?;
        } else {
            fs::create_dir_all(&dir)?;
            fs::copy(path, &target)?;
        }
        Ok(format!("file://{}", target.display()))
    }

    fn launch_child(&self, instance_type: &str, inputs: &Map<String, Json>) -> Result<String> {
        let id = format!("job-{}", uuid::Uuid::new_v4().simple());
        let dir = self.home.join("children");
        fs::create_dir_all(&dir)?;
        let request = json!({
            "jobId": id,
            "instanceType": instance_type,
            "input": inputs,
        });
        fs::write(
            dir.join(format!("{}.json", id)),
            serde_json::to_string_pretty(&request)?,
        )?;
        Ok(id)
    }

    fn find_child(&self, instance_type: &str) -> Result<Option<String>> {
        for id in self.children()? {
            let request = self.read_json(&format!("children/{}.json", id))?;
            if request["instanceType"] == instance_type {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localize_copies_files_and_directories() {
        let home = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        fs::write(source.path().join("a.txt"), "hello").unwrap();
        fs::create_dir_all(source.path().join("dir/nested")).unwrap();
        fs::write(source.path().join("dir/nested/b.txt"), "b").unwrap();

        let meta = LocalJobMeta::new(home.path());
        let dest = home.path().join("inputs/0");
        let uri = format!("file://{}", source.path().join("a.txt").display());
        let path = meta.localize(PathKind::File, &uri, &dest).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "hello");

        let dir = source.path().join("dir");
        let path = meta
            .localize(PathKind::Directory, dir.to_str().unwrap(), &home.path().join("inputs/1"))
            .unwrap();
        assert!(path.join("nested/b.txt").is_file());

        let err = meta
            .localize(PathKind::File, "s3://bucket/x", &dest)
            .unwrap_err();
        assert_eq!(err.error_code(), "LOCALIZATION");
        let err = meta
            .localize(PathKind::File, dir.to_str().unwrap(), &dest)
            .unwrap_err();
        assert_eq!(err.error_code(), "LOCALIZATION");
    }

    #[test]
    fn test_children_and_outputs() {
        let home = tempfile::tempdir().unwrap();
        let meta = LocalJobMeta::new(home.path());
        assert!(meta.outputs().unwrap().is_none());
        assert!(meta.job_input().unwrap().is_empty());

        let mut inputs = Map::new();
        inputs.insert("n".into(), json!(3));
        let id = meta.launch_child("mem2_ssd1_x4", &inputs).unwrap();
        assert_eq!(meta.children().unwrap(), vec![id]);

        meta.write_outputs(&inputs).unwrap();
        assert_eq!(meta.outputs().unwrap(), Some(inputs));
    }

    #[test]
    fn test_find_child_by_instance_type() {
        let home = tempfile::tempdir().unwrap();
        let meta = LocalJobMeta::new(home.path());
        assert_eq!(meta.find_child("large").unwrap(), None);

        let id = meta.launch_child("large", &Map::new()).unwrap();
        assert_eq!(meta.find_child("large").unwrap(), Some(id));
        assert_eq!(meta.find_child("small").unwrap(), None);
    }
}
