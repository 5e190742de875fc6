// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory platform for testing.
//!
//! Keeps projects, executables and files in a map and hands out sequential
//! ids, so compiling the same bundle twice is easy to observe.

use chrono::Utc;
use indexmap::IndexMap;
use std::sync::Mutex;
use tessera_ir::InstanceTypeCatalog;

use super::*;

#[derive(Debug, Default)]
struct MockState {
    projects: IndexMap<String, ProjectInfo>,
    executables: Vec<ExecutableRecord>,
    files: IndexMap<String, String>,
    next_id: u64,
    created: usize,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:06}", prefix, self.next_id)
    }
}

/// Mock platform for testing.
pub struct MockPlatform {
    state: Mutex<MockState>,
    catalog: InstanceTypeCatalog,
    /// If true, every file URI resolves, registering it on first use.
    pub auto_register_files: bool,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    /// A platform with one project, `project-test`, named `test`.
    pub fn new() -> Self {
        let mut state = MockState::default();
        state.projects.insert(
            "project-test".to_string(),
            ProjectInfo {
                id: "project-test".to_string(),
                name: "test".to_string(),
            },
        );
        Self {
            state: Mutex::new(state),
            catalog: default_catalog(),
            auto_register_files: true,
        }
    }

    pub fn with_catalog(mut self, catalog: InstanceTypeCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Register a file so `resolve_file` finds it.
    pub fn add_file(&self, uri: &str) -> String {
        let Ok(mut state) = self.state.lock() else {
            return String::new();
        };
        if let Some(id) = state.files.get(uri) {
            return id.clone();
        }
        let id = state.next_id("file");
        state.files.insert(uri.to_string(), id.clone());
        id
    }

    /// Number of executables created so far.
    pub fn created_count(&self) -> usize {
        self.state.lock().map(|s| s.created).unwrap_or(0)
    }

    /// Snapshot of every stored executable.
    pub fn executables(&self) -> Vec<ExecutableRecord> {
        self.state
            .lock()
            .map(|s| s.executables.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MockState>> {
        self.state
            .lock()
            .map_err(|_| PlatformError::Remote("mock platform state poisoned".into()))
    }
}

impl PlatformApi for MockPlatform {
    fn whoami(&self, session: &Session) -> Result<String> {
        if session.user.is_empty() {
            return Err(PlatformError::Unauthorized("no user in session".into()));
        }
        Ok(session.user.clone())
    }

    fn resolve_project(&self, _session: &Session, project: &str) -> Result<ProjectInfo> {
        let state = self.lock()?;
        state
            .projects
            .values()
            .find(|p| p.id == project || p.name == project)
            .cloned()
            .ok_or_else(|| PlatformError::not_found("project", project))
    }

    fn list_executables(
        &self,
        _session: &Session,
        _project: &ProjectInfo,
        folder: Option<&str>,
        name: &str,
    ) -> Result<Vec<ExecutableRecord>> {
        let state = self.lock()?;
        Ok(state
            .executables
            .iter()
            .filter(|e| e.name == name && folder.is_none_or(|f| e.folder == f))
            .cloned()
            .collect())
    }

    fn create_executable(
        &self,
        _session: &Session,
        _project: &ProjectInfo,
        executable: NewExecutable,
    ) -> Result<ExecutableRecord> {
        let mut state = self.lock()?;
        let id = state.next_id(&executable.kind.to_string());
        let record = ExecutableRecord {
            id,
            name: executable.name,
            folder: executable.folder,
            kind: executable.kind,
            checksum: executable.checksum,
            archived: false,
            created: Utc::now(),
            manifest: executable.manifest,
        };
        state.executables.push(record.clone());
        state.created += 1;
        Ok(record)
    }

    fn archive_executable(&self, _session: &Session, _project: &ProjectInfo, id: &str) -> Result<()> {
        let mut state = self.lock()?;
        let record = state
            .executables
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| PlatformError::not_found("executable", id))?;
        record.archived = true;
        Ok(())
    }

    fn remove_executable(&self, _session: &Session, _project: &ProjectInfo, id: &str) -> Result<()> {
        let mut state = self.lock()?;
        let before = state.executables.len();
        state.executables.retain(|e| e.id != id);
        if state.executables.len() == before {
            return Err(PlatformError::not_found("executable", id));
        }
        Ok(())
    }

    fn instance_types(&self, _session: &Session, _project: &ProjectInfo) -> Result<InstanceTypeCatalog> {
        Ok(self.catalog.clone())
    }

    fn resolve_file(&self, _session: &Session, _project: &ProjectInfo, uri: &str) -> Result<String> {
        let mut state = self.lock()?;
        if let Some(id) = state.files.get(uri) {
            return Ok(id.clone());
        }
        if !self.auto_register_files {
            return Err(PlatformError::not_found("file", uri));
        }
        let id = state.next_id("file");
        state.files.insert(uri.to_string(), id.clone());
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_executable(name: &str) -> NewExecutable {
        NewExecutable {
            name: name.to_string(),
            folder: "/".to_string(),
            kind: ExecutableKind::Applet,
            checksum: "abc".to_string(),
            manifest: json!({}),
        }
    }

    #[test]
    fn test_sequential_ids_and_listing() {
        let platform = MockPlatform::new();
        let session = Session::new("alice");
        let project = platform.resolve_project(&session, "test").unwrap();

        let first = platform
            .create_executable(&session, &project, new_executable("inc"))
            .unwrap();
        assert_eq!(first.id, "applet-000001");

        let listed = platform
            .list_executables(&session, &project, Some("/"), "inc")
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert!(
            platform
                .list_executables(&session, &project, Some("/other"), "inc")
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_archive_and_remove() {
        let platform = MockPlatform::new();
        let session = Session::new("alice");
        let project = platform.resolve_project(&session, "project-test").unwrap();
        let record = platform
            .create_executable(&session, &project, new_executable("inc"))
            .unwrap();

        platform.archive_executable(&session, &project, &record.id).unwrap();
        assert!(platform.executables()[0].archived);

        platform.remove_executable(&session, &project, &record.id).unwrap();
        assert!(platform.executables().is_empty());
        assert_eq!(
            platform
                .remove_executable(&session, &project, &record.id)
                .unwrap_err()
                .error_code(),
            "PLATFORM_NOT_FOUND"
        );
    }

    #[test]
    fn test_unknown_project_and_file() {
        let mut platform = MockPlatform::new();
        platform.auto_register_files = false;
        let session = Session::new("alice");
        assert!(platform.resolve_project(&session, "nope").is_err());

        let project = platform.resolve_project(&session, "test").unwrap();
        assert!(platform.resolve_file(&session, &project, "s3://x").is_err());
        let id = platform.add_file("s3://x");
        assert_eq!(platform.resolve_file(&session, &project, "s3://x").unwrap(), id);
    }
}
