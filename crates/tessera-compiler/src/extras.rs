// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compilation extras: a JSON side file that adjusts what gets built.
//!
//! ```json
//! {
//!   "defaultRuntimeAttributes": {"docker": "ubuntu:22.04", "memory": "4 GiB"},
//!   "customReorgAttributes": {"appUri": "applet-reorg", "configFile": "file-conf"},
//!   "ignoreReuse": false,
//!   "delayWorkspaceDestruction": true,
//!   "defaultTaskDxAttributes": {"runSpec": {"timeoutPolicy": {"*": {"hours": 12}}}}
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::path::Path;

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Extras {
    /// Runtime attributes applied to tasks that do not set them.
    #[serde(default)]
    pub default_runtime_attributes: IndexMap<String, Json>,
    /// Applet appended to the primary workflow to reorganize its outputs.
    #[serde(default)]
    pub custom_reorg_attributes: Option<CustomReorg>,
    /// Ask the platform not to reuse previous job results.
    #[serde(default)]
    pub ignore_reuse: bool,
    /// Keep job workspaces after a run so intermediate files can be inspected.
    #[serde(default)]
    pub delay_workspace_destruction: bool,
    #[serde(default)]
    pub default_task_dx_attributes: Option<TaskAttributes>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomReorg {
    pub app_uri: String,
    #[serde(default)]
    pub config_file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAttributes {
    #[serde(default)]
    pub run_spec: Option<RunSpecAttributes>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSpecAttributes {
    #[serde(default)]
    pub timeout_policy: Option<Json>,
}

impl Extras {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Timeout policy carried into task manifests.
    pub fn timeout_policy(&self) -> Option<&Json> {
        self.default_task_dx_attributes
            .as_ref()?
            .run_spec
            .as_ref()?
            .timeout_policy
            .as_ref()
    }
}
