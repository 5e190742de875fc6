// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Directory-backed platform.
//!
//! Layout under the root:
//!
//! ```text
//! instance_types.json                 optional catalog
//! projects/<name>/executables/<id>.json
//! projects/<name>/files.json          uri -> file id
//! ```

use chrono::Utc;
use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};
use tessera_ir::InstanceTypeCatalog;

use super::*;

pub struct DirectoryPlatform {
    root: PathBuf,
}

impl DirectoryPlatform {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a project directory if it does not exist yet.
    pub fn create_project(&self, name: &str) -> Result<ProjectInfo> {
        fs::create_dir_all(self.executables_dir(name))?;
        tracing::debug!(project = name, root = %self.root.display(), "Created project");
        Ok(project_info(name))
    }

    fn project_dir(&self, name: &str) -> PathBuf {
        self.root.join("projects").join(name)
    }

    fn executables_dir(&self, name: &str) -> PathBuf {
        self.project_dir(name).join("executables")
    }

    fn files_path(&self, project: &ProjectInfo) -> PathBuf {
        self.project_dir(&project.name).join("files.json")
    }

    fn record_path(&self, project: &ProjectInfo, id: &str) -> PathBuf {
        self.executables_dir(&project.name).join(format!("{}.json", id))
    }

    fn read_records(&self, project: &ProjectInfo) -> Result<Vec<ExecutableRecord>> {
        let dir = self.executables_dir(&project.name);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                let record: ExecutableRecord = serde_json::from_slice(&fs::read(&path)?)?;
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    fn write_record(&self, project: &ProjectInfo, record: &ExecutableRecord) -> Result<()> {
        let path = self.record_path(project, &record.id);
        fs::write(path, serde_json::to_vec_pretty(record)?)?;
        Ok(())
    }

    fn read_files(&self, project: &ProjectInfo) -> Result<IndexMap<String, String>> {
        let path = self.files_path(project);
        if !path.exists() {
            return Ok(IndexMap::new());
        }
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }
}

fn project_info(name: &str) -> ProjectInfo {
    ProjectInfo {
        id: format!("project-{}", name),
        name: name.to_string(),
    }
}

fn new_id(kind: &str) -> String {
    format!("{}-{}", kind, uuid::Uuid::new_v4().simple())
}

impl PlatformApi for DirectoryPlatform {
    fn whoami(&self, session: &Session) -> Result<String> {
        if session.user.is_empty() {
            return Err(PlatformError::Unauthorized("no user in session".into()));
        }
        Ok(session.user.clone())
    }

    fn resolve_project(&self, _session: &Session, project: &str) -> Result<ProjectInfo> {
        let name = project.strip_prefix("project-").unwrap_or(project);
        if self.project_dir(name).is_dir() {
            Ok(project_info(name))
        } else {
            Err(PlatformError::not_found("project", project))
        }
    }

    fn list_executables(
        &self,
        _session: &Session,
        project: &ProjectInfo,
        folder: Option<&str>,
        name: &str,
    ) -> Result<Vec<ExecutableRecord>> {
        Ok(self
            .read_records(project)?
            .into_iter()
            .filter(|r| r.name == name && folder.is_none_or(|f| r.folder == f))
            .collect())
    }

    fn create_executable(
        &self,
        session: &Session,
        project: &ProjectInfo,
        executable: NewExecutable,
    ) -> Result<ExecutableRecord> {
        fs::create_dir_all(self.executables_dir(&project.name))?;
        let record = ExecutableRecord {
            id: new_id(&executable.kind.to_string()),
            name: executable.name,
            folder: executable.folder,
            kind: executable.kind,
            checksum: executable.checksum,
            archived: false,
            created: Utc::now(),
            manifest: executable.manifest,
        };
        self.write_record(project, &record)?;
        tracing::debug!(
            user = %session.user,
            id = %record.id,
            name = %record.name,
            "Stored executable"
        );
        Ok(record)
    }

    fn archive_executable(&self, _session: &Session, project: &ProjectInfo, id: &str) -> Result<()> {
        let path = self.record_path(project, id);
        if !path.exists() {
            return Err(PlatformError::not_found("executable", id));
        }
        let mut record: ExecutableRecord = serde_json::from_slice(&fs::read(&path)?)?;
        record.archived = true;
        self.write_record(project, &record)
    }

    fn remove_executable(&self, _session: &Session, project: &ProjectInfo, id: &str) -> Result<()> {
        let path = self.record_path(project, id);
        if !path.exists() {
            return Err(PlatformError::not_found("executable", id));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    fn instance_types(&self, _session: &Session, _project: &ProjectInfo) -> Result<InstanceTypeCatalog> {
        let path = self.root.join("instance_types.json");
        if path.exists() {
            Ok(serde_json::from_slice(&fs::read(path)?)?)
        } else {
            Ok(default_catalog())
        }
    }

    /// Local paths (plain or `file://`) that exist are registered on first
    /// use; other URIs must already be registered.
    fn resolve_file(&self, _session: &Session, project: &ProjectInfo, uri: &str) -> Result<String> {
        let mut files = self.read_files(project)?;
        if let Some(id) = files.get(uri) {
            return Ok(id.clone());
        }
        let local = uri.strip_prefix("file://").unwrap_or(uri);
        let remote = uri.contains("://") && !uri.starts_with("file://");
        if remote || !Path::new(local).exists() {
            return Err(PlatformError::not_found("file", uri));
        }
        let id = new_id("file");
        files.insert(uri.to_string(), id.clone());
        fs::create_dir_all(self.project_dir(&project.name))?;
        fs::write(self.files_path(project), serde_json::to_vec_pretty(&files)?)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_records_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new("bob");
        let platform = DirectoryPlatform::new(dir.path());
        assert!(platform.resolve_project(&session, "demo").is_err());
        let project = platform.create_project("demo").unwrap();

        let record = platform
            .create_executable(
                &session,
                &project,
                NewExecutable {
                    name: "inc".into(),
                    folder: "/apps".into(),
                    kind: ExecutableKind::Applet,
                    checksum: "c0ffee".into(),
                    manifest: json!({"name": "inc"}),
                },
            )
            .unwrap();
        assert!(record.id.starts_with("applet-"));

        let reopened = DirectoryPlatform::new(dir.path());
        let project = reopened.resolve_project(&session, "project-demo").unwrap();
        let listed = reopened
            .list_executables(&session, &project, None, "inc")
            .unwrap();
        assert_eq!(listed, vec![record.clone()]);

        reopened
            .archive_executable(&session, &project, &record.id)
            .unwrap();
        let listed = reopened
            .list_executables(&session, &project, Some("/apps"), "inc")
            .unwrap();
        assert!(listed[0].archived);
    }

    #[test]
    fn test_local_files_are_registered_once() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("reads.fq");
        fs::write(&data, "@r1\nACGT\n").unwrap();

        let session = Session::new("bob");
        let platform = DirectoryPlatform::new(dir.path().join("platform"));
        let project = platform.create_project("demo").unwrap();

        let uri = format!("file://{}", data.display());
        let first = platform.resolve_file(&session, &project, &uri).unwrap();
        let second = platform.resolve_file(&session, &project, &uri).unwrap();
        assert_eq!(first, second);
        assert!(
            platform
                .resolve_file(&session, &project, "s3://bucket/missing")
                .is_err()
        );
    }
}
