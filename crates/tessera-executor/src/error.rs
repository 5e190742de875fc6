// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the task executor.

use tessera_frontend::FrontendError;
use tessera_ir::IrError;
use thiserror::Error;

use crate::executor::Action;

/// Result type using ExecutorError.
pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Errors that fail a job phase.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// Wraps whatever failed inside a phase with the phase that ran.
    #[error("{action} failed: {source}")]
    Phase {
        action: Action,
        #[source]
        source: Box<ExecutorError>,
    },

    /// The command exited non-zero, or a required output is missing.
    #[error("Runtime execution error: {0}")]
    RuntimeExecution(String),

    /// A required input has no value and no default.
    #[error("Missing input '{0}'")]
    MissingInput(String),

    #[error("Expression error: {0}")]
    Expression(#[from] minijinja::Error),

    /// A file or directory input could not be staged.
    #[error("Cannot localize '{uri}': {message}")]
    Localization { uri: String, message: String },

    /// The job context is incomplete or malformed.
    #[error("Job metadata error: {0}")]
    JobMeta(String),

    /// A phase ran before the phase that produces its state.
    #[error("Missing state file {0}; run the preceding phase first")]
    MissingState(String),

    #[error(transparent)]
    Ir(#[from] IrError),

    #[error(transparent)]
    Frontend(#[from] FrontendError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExecutorError {
    pub fn localization(uri: impl Into<String>, message: impl ToString) -> Self {
        Self::Localization {
            uri: uri.into(),
            message: message.to_string(),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Phase { source, .. } => source.error_code(),
            Self::RuntimeExecution(_) => "RUNTIME_EXECUTION",
            Self::MissingInput(_) => "MISSING_INPUT",
            Self::Expression(_) => "EXPRESSION",
            Self::Localization { .. } => "LOCALIZATION",
            Self::JobMeta(_) => "JOB_META",
            Self::MissingState(_) => "MISSING_STATE",
            Self::Ir(e) => e.error_code(),
            Self::Frontend(e) => e.error_code(),
            Self::Io(_) => "IO",
            Self::Json(_) => "JSON",
        }
    }

    /// Phase the error was raised in, if known.
    pub fn action(&self) -> Option<Action> {
        match self {
            Self::Phase { action, .. } => Some(*action),
            _ => None,
        }
    }
}
