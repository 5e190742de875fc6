// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The executing job's view of the platform.
//!
//! The executor never talks to the platform directly: everything it reads
//! (inputs, instance type, the compiled task) and everything it writes back
//! (outputs, child jobs, uploaded files) goes through [`JobMeta`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::path::{Path, PathBuf};
use tessera_ir::{InstanceTypeCatalog, PathKind, Task, Type};

use crate::error::Result;

/// Static description of the running job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub job_id: String,
    /// Instance type the job is running on.
    pub instance_type: String,
    /// Instance types the job may relaunch onto.
    pub catalog: InstanceTypeCatalog,
    /// The compiled task this job runs.
    pub task: Task,
    /// Schemas referenced by the task's parameter types.
    #[serde(default)]
    pub type_aliases: IndexMap<String, Type>,
}

/// Job-local platform state.
pub trait JobMeta {
    /// Directory every phase reads and writes under.
    fn home(&self) -> &Path;

    fn job_info(&self) -> Result<JobInfo>;

    /// Inputs exactly as the platform passed them, in native JSON.
    fn job_input(&self) -> Result<Map<String, Json>>;

    /// Publish the job's outputs, replacing any written before.
    fn write_outputs(&self, outputs: &Map<String, Json>) -> Result<()>;

    /// Stage the file or directory at `uri` inside `dest`, returning its
    /// local path.
    fn localize(&self, kind: PathKind, uri: &str, dest: &Path) -> Result<PathBuf>;

    /// Upload a produced file, returning its platform URI.
    fn upload(&self, path: &Path) -> Result<String>;

    /// Start a copy of this job on `instance_type` with `inputs`, returning
    /// the child job id.
    fn launch_child(&self, instance_type: &str, inputs: &Map<String, Json>) -> Result<String>;

    /// A child already launched onto `instance_type`, if any.
    fn find_child(&self, instance_type: &str) -> Result<Option<String>>;
}

/// Native JSON making a job output the eventual output of another job.
pub fn job_link(job: &str, field: &str) -> Json {
    serde_json::json!({ "$jobLink": { "job": job, "field": field } })
}
