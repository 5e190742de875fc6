// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Native compilation: materializing a bundle as platform executables.
//!
//! Callables are built in dependency order so that every stage and fragment
//! call can refer to the id of its callee. An executable whose checksum
//! matches an existing one in scope is reused, which makes recompiling an
//! unchanged bundle idempotent.

pub mod exec_tree;
pub mod manifest;
pub mod stubs;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value as Json};
use tessera_ir::{Bundle, Callable};

use crate::error::{CompileError, Result};
use crate::extras::Extras;
use crate::inputs::FileResolver;
use crate::platform::{
    ExecutableKind, ExecutableRecord, NewExecutable, PlatformApi, PlatformError, ProjectInfo,
    Session,
};
use exec_tree::ExecTree;
use manifest::{Manifest, ManifestContext, encode_name};

/// Scatter batch size used when none is configured.
pub const DEFAULT_SCATTER_CHUNK_SIZE: usize = 500;

/// Largest batch the platform accepts.
pub const MAX_SCATTER_CHUNK_SIZE: usize = 1000;

/// What a compile run produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum CompileMode {
    /// Stop after translation and emit the bundle.
    Ir,
    #[default]
    Native,
}

#[derive(Debug, Clone)]
pub struct CompilerOptions {
    pub mode: CompileMode,
    /// Replace existing executables instead of reusing or failing.
    pub force: bool,
    /// Hide existing executables with the same name before building.
    pub archive: bool,
    /// Look for reusable executables anywhere in the project.
    pub project_wide_reuse: bool,
    pub locked: bool,
    pub scatter_chunk_size: usize,
    pub extras: Extras,
    pub runtime_asset: Option<String>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            mode: CompileMode::Native,
            force: false,
            archive: false,
            project_wide_reuse: false,
            locked: false,
            scatter_chunk_size: DEFAULT_SCATTER_CHUNK_SIZE,
            extras: Extras::default(),
            runtime_asset: None,
        }
    }
}

impl CompilerOptions {
    /// Reject contradictory options and clamp the scatter chunk size.
    pub fn validate(mut self) -> Result<Self> {
        if self.locked && self.extras.custom_reorg_attributes.is_some() {
            return Err(CompileError::InvalidOptions(
                "a locked workflow cannot take a custom reorg stage".into(),
            ));
        }
        if self.force && self.archive {
            return Err(CompileError::InvalidOptions(
                "force and archive are mutually exclusive".into(),
            ));
        }
        self.scatter_chunk_size = clamp_chunk_size(self.scatter_chunk_size);
        Ok(self)
    }
}

/// Bound a requested scatter chunk size to `1..=MAX_SCATTER_CHUNK_SIZE`.
pub fn clamp_chunk_size(requested: usize) -> usize {
    if requested == 0 {
        tracing::warn!(requested, clamped = 1, "Scatter chunk size below minimum");
        1
    } else if requested > MAX_SCATTER_CHUNK_SIZE {
        tracing::warn!(
            requested,
            clamped = MAX_SCATTER_CHUNK_SIZE,
            "Scatter chunk size above platform maximum"
        );
        MAX_SCATTER_CHUNK_SIZE
    } else {
        requested
    }
}

/// One built or reused executable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledExecutable {
    pub id: String,
    pub name: String,
    pub kind: ExecutableKind,
    pub checksum: String,
    pub reused: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    /// Id of the primary executable.
    pub primary: Option<String>,
    /// Every executable by callable name, in build order.
    pub executables: IndexMap<String, CompiledExecutable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exec_tree: Option<ExecTree>,
    /// Native input JSON for the primary, when the bundle carries inputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_inputs: Option<Json>,
}

impl CompileResult {
    pub fn ids(&self) -> Vec<&str> {
        self.executables.values().map(|e| e.id.as_str()).collect()
    }
}

pub struct NativeCompiler<'a> {
    platform: &'a dyn PlatformApi,
    session: &'a Session,
    options: CompilerOptions,
    files: FileResolver,
}

impl<'a> NativeCompiler<'a> {
    pub fn new(
        platform: &'a dyn PlatformApi,
        session: &'a Session,
        options: CompilerOptions,
    ) -> Result<Self> {
        Ok(Self {
            platform,
            session,
            options: options.validate()?,
            files: FileResolver::new(),
        })
    }

    /// Use platform file ids for the files referenced by bundle defaults and
    /// inputs.
    pub fn with_files(mut self, files: FileResolver) -> Self {
        self.files = files;
        self
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Build or reuse an executable for every callable of `bundle`.
    pub fn compile(&self, bundle: &Bundle, project: &str, folder: &str) -> Result<CompileResult> {
        bundle.validate()?;
        let project = self.destination(project, folder)?;

        if let Some(Callable::Workflow(primary)) = bundle.primary()
            && primary.locked
            && self.options.extras.custom_reorg_attributes.is_some()
        {
            return Err(CompileError::InvalidOptions(format!(
                "workflow '{}' is locked and cannot take a custom reorg stage",
                primary.name
            )));
        }

        let catalog = self.platform.instance_types(self.session, &project)?;
        let mut compiled: IndexMap<String, CompiledExecutable> = IndexMap::new();
        for name in bundle.dependency_order()? {
            let Some(callable) = bundle.get(name) else {
                continue;
            };
            if let Callable::Task(task) = callable
                && let Some(id) = &task.native
            {
                tracing::info!(callable = %name, id = %id, "Calling native executable");
                compiled.insert(
                    name.to_string(),
                    CompiledExecutable {
                        id: id.clone(),
                        name: name.to_string(),
                        kind: ExecutableKind::Applet,
                        checksum: String::new(),
                        reused: true,
                    },
                );
                continue;
            }
            let manifest = ManifestContext {
                bundle,
                compiled: &compiled,
                catalog: &catalog,
                options: &self.options,
                files: &self.files,
            }
            .build(callable)?;
            let executable = self.materialize(&project, folder, name, &manifest)?;
            compiled.insert(name.to_string(), executable);
        }

        let primary = bundle
            .primary
            .as_ref()
            .and_then(|name| compiled.get(name))
            .map(|e| e.id.clone());
        let exec_tree = exec_tree::build(bundle, &compiled);
        let run_inputs = self.run_inputs(bundle);
        let reused = compiled.values().filter(|e| e.reused).count();
        tracing::info!(
            project = %project.id,
            folder,
            executables = compiled.len(),
            reused,
            primary = primary.as_deref().unwrap_or("-"),
            "Compilation complete"
        );
        Ok(CompileResult {
            primary,
            executables: compiled,
            exec_tree,
            run_inputs,
        })
    }

    fn destination(&self, project: &str, folder: &str) -> Result<ProjectInfo> {
        let user = self.platform.whoami(self.session)?;
        if !folder.starts_with('/') {
            return Err(CompileError::DestinationNotFound(format!(
                "folder '{}' is not absolute",
                folder
            )));
        }
        let info = self
            .platform
            .resolve_project(self.session, project)
            .map_err(|e| match e {
                PlatformError::NotFound { .. } => {
                    CompileError::DestinationNotFound(format!("project '{}'", project))
                }
                other => CompileError::Platform(other),
            })?;
        tracing::debug!(user = %user, project = %info.id, folder, "Resolved destination");
        Ok(info)
    }

    /// Reuse a matching executable, or clear the name and create a new one.
    fn materialize(
        &self,
        project: &ProjectInfo,
        folder: &str,
        name: &str,
        manifest: &Manifest,
    ) -> Result<CompiledExecutable> {
        let kind = manifest.kind();
        let checksum = manifest.checksum()?;
        let scope = if self.options.project_wide_reuse {
            None
        } else {
            Some(folder)
        };
        let existing = self
            .platform
            .list_executables(self.session, project, scope, name)?;

        if !self.options.force
            && let Some(record) = existing
                .iter()
                .find(|r| !r.archived && r.kind == kind && r.checksum == checksum)
        {
            tracing::info!(callable = %name, id = %record.id, "Reusing executable");
            return Ok(compiled(record, true));
        }

        let occupying: Vec<&ExecutableRecord> = existing
            .iter()
            .filter(|r| !r.archived && r.folder == folder)
            .collect();
        for record in occupying {
            if self.options.force {
                tracing::info!(callable = %name, id = %record.id, "Removing existing executable");
                self.platform
                    .remove_executable(self.session, project, &record.id)?;
            } else if self.options.archive {
                tracing::info!(callable = %name, id = %record.id, "Archiving existing executable");
                self.platform
                    .archive_executable(self.session, project, &record.id)?;
            } else {
                return Err(CompileError::NamingConflict {
                    name: name.to_string(),
                    existing: record.id.clone(),
                });
            }
        }

        let record = self.platform.create_executable(
            self.session,
            project,
            NewExecutable {
                name: name.to_string(),
                folder: folder.to_string(),
                kind,
                checksum,
                manifest: manifest.to_json()?,
            },
        )?;
        tracing::info!(callable = %name, id = %record.id, kind = %kind, "Created executable");
        Ok(compiled(&record, false))
    }

    /// Stage-qualified native inputs for the primary executable.
    fn run_inputs(&self, bundle: &Bundle) -> Option<Json> {
        let inputs = bundle.inputs.as_ref()?;
        let primary = bundle.primary()?;
        let mut out = Map::new();
        for (key, value) in inputs {
            let field = match (primary, key.split_once('.')) {
                (Callable::Workflow(workflow), Some((call, input))) => {
                    match workflow.stages.iter().find(|s| s.name == call) {
                        Some(stage) => format!("{}.{}", stage.id, encode_name(input)),
                        None => encode_name(key),
                    }
                }
                _ => encode_name(key),
            };
            out.insert(field, self.files.to_native_json(value));
        }
        Some(Json::Object(out))
    }
}

fn compiled(record: &ExecutableRecord, reused: bool) -> CompiledExecutable {
    CompiledExecutable {
        id: record.id.clone(),
        name: record.name.clone(),
        kind: record.kind,
        checksum: record.checksum.clone(),
        reused,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extras::CustomReorg;

    #[test]
    fn test_chunk_size_is_clamped() {
        assert_eq!(clamp_chunk_size(0), 1);
        assert_eq!(clamp_chunk_size(1), 1);
        assert_eq!(clamp_chunk_size(250), 250);
        assert_eq!(clamp_chunk_size(5_000), MAX_SCATTER_CHUNK_SIZE);
    }

    #[test]
    fn test_locked_and_reorg_are_exclusive() {
        let options = CompilerOptions {
            locked: true,
            extras: Extras {
                custom_reorg_attributes: Some(CustomReorg {
                    app_uri: "applet-reorg".into(),
                    config_file: None,
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = options.validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_OPTIONS");
    }

    #[test]
    fn test_validate_clamps_chunk_size() {
        let options = CompilerOptions {
            scatter_chunk_size: 0,
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(options.scatter_chunk_size, 1);
    }
}
