// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Platform API.
//!
//! The native compiler talks to the batch-execution platform only through
//! [`PlatformApi`]. Every call carries an explicit [`Session`]; nothing is
//! read from ambient login state.

pub mod fs;
pub mod mock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tessera_ir::InstanceTypeCatalog;
use thiserror::Error;

pub use fs::DirectoryPlatform;
pub use mock::MockPlatform;

/// Errors from platform operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlatformError {
    /// The named project, folder, executable or file does not exist.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// The session is not authorized for the operation.
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Generic remote failure, surfaced unchanged.
    #[error("Platform error: {0}")]
    Remote(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlatformError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "PLATFORM_NOT_FOUND",
            Self::Unauthorized(_) => "PLATFORM_UNAUTHORIZED",
            Self::Remote(_) => "PLATFORM_REMOTE",
            Self::Io(_) => "PLATFORM_IO",
            Self::Json(_) => "PLATFORM_JSON",
        }
    }
}

/// Result type for platform operations.
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Identity used for every platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: String,
    pub token: Option<String>,
}

impl Session {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: None,
        }
    }
}

/// A resolved destination project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: String,
    pub name: String,
}

/// The two kinds of executable the platform runs.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExecutableKind {
    /// A single job: tasks and fragments.
    Applet,
    /// A graph of stages.
    Workflow,
}

/// An executable stored on the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutableRecord {
    pub id: String,
    pub name: String,
    pub folder: String,
    pub kind: ExecutableKind,
    /// Content checksum recorded at creation.
    pub checksum: String,
    #[serde(default)]
    pub archived: bool,
    pub created: DateTime<Utc>,
    pub manifest: Json,
}

/// What the compiler uploads to create an executable.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExecutable {
    pub name: String,
    pub folder: String,
    pub kind: ExecutableKind,
    pub checksum: String,
    pub manifest: Json,
}

/// Operations the compiler needs from the platform.
pub trait PlatformApi: Send + Sync {
    /// Name of the user the session acts as.
    fn whoami(&self, session: &Session) -> Result<String>;

    /// Look up a project by id or name.
    fn resolve_project(&self, session: &Session, project: &str) -> Result<ProjectInfo>;

    /// Executables called `name`, in `folder` or anywhere in the project when
    /// `folder` is `None`. Archived executables are included.
    fn list_executables(
        &self,
        session: &Session,
        project: &ProjectInfo,
        folder: Option<&str>,
        name: &str,
    ) -> Result<Vec<ExecutableRecord>>;

    fn create_executable(
        &self,
        session: &Session,
        project: &ProjectInfo,
        executable: NewExecutable,
    ) -> Result<ExecutableRecord>;

    /// Hide an executable, keeping it for history.
    fn archive_executable(&self, session: &Session, project: &ProjectInfo, id: &str)
    -> Result<()>;

    fn remove_executable(&self, session: &Session, project: &ProjectInfo, id: &str) -> Result<()>;

    /// Instance types available to the project, with prices.
    fn instance_types(&self, session: &Session, project: &ProjectInfo)
    -> Result<InstanceTypeCatalog>;

    /// Platform file id for a file URI.
    fn resolve_file(&self, session: &Session, project: &ProjectInfo, uri: &str) -> Result<String>;
}

/// Catalog used by platforms that have no explicit one configured.
pub fn default_catalog() -> InstanceTypeCatalog {
    use tessera_ir::InstanceType;
    let shape = |name: &str, memory_mb, disk_gb, cpu, gpu, price| InstanceType {
        name: name.to_string(),
        memory_mb,
        disk_gb,
        cpu,
        gpu,
        price,
    };
    InstanceTypeCatalog::new(vec![
        shape("mem1_ssd1_x2", 3_900, 32, 2, false, 0.03),
        shape("mem1_ssd1_x4", 7_800, 80, 4, false, 0.06),
        shape("mem2_ssd1_x2", 7_600, 50, 2, false, 0.05),
        shape("mem2_ssd1_x4", 15_300, 100, 4, false, 0.10),
        shape("mem3_ssd1_x8", 61_000, 320, 8, false, 0.40),
        shape("mem3_ssd1_gpu_x8", 61_000, 160, 8, true, 1.25),
    ])
}
