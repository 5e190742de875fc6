// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for translation and native compilation.

use tessera_frontend::{FrontendError, SourceLocation};
use tessera_ir::IrError;
use thiserror::Error;

use crate::platform::PlatformError;

/// Result type using CompileError.
pub type Result<T> = std::result::Result<T, CompileError>;

/// Errors that abort a compilation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompileError {
    /// A malformed or unsupported source construct.
    #[error("Translation error{}: {message}", location_suffix(.location))]
    Translation {
        /// Where in the source document the problem is.
        location: Option<SourceLocation>,
        message: String,
    },

    /// A compound block holds more than a single call or nests further
    /// compounds, so it cannot become one fragment.
    #[error("Unsupported block shape in workflow '{workflow}', block {block}: {reason}")]
    UnsupportedBlockShape {
        workflow: String,
        block: usize,
        reason: String,
    },

    /// An input file names a parameter that does not exist.
    #[error("Unknown input name '{0}'")]
    UnknownInputName(String),

    /// The destination project or folder does not exist.
    #[error("Destination not found: {0}")]
    DestinationNotFound(String),

    /// An incompatible executable already holds the name.
    #[error("Executable '{name}' already exists as {existing}; use force or archive")]
    NamingConflict { name: String, existing: String },

    /// Mutually exclusive or out-of-range options.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// A file referenced by an input could not be resolved on the platform.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// An imported library document is not on the import search path.
    #[error("Import '{name}' not found in {searched}")]
    ImportNotFound { name: String, searched: String },

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Ir(#[from] IrError),

    #[error(transparent)]
    Frontend(#[from] FrontendError),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn location_suffix(location: &Option<SourceLocation>) -> String {
    match location {
        Some(loc) => format!(" at {}", loc),
        None => String::new(),
    }
}

impl CompileError {
    pub fn translation(location: Option<SourceLocation>, message: impl Into<String>) -> Self {
        Self::Translation {
            location,
            message: message.into(),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Translation { .. } => "TRANSLATION",
            Self::UnsupportedBlockShape { .. } => "UNSUPPORTED_BLOCK_SHAPE",
            Self::UnknownInputName(_) => "UNKNOWN_INPUT_NAME",
            Self::DestinationNotFound(_) => "DESTINATION_NOT_FOUND",
            Self::NamingConflict { .. } => "NAMING_CONFLICT",
            Self::InvalidOptions(_) => "INVALID_OPTIONS",
            Self::FileNotFound(_) => "FILE_NOT_FOUND",
            Self::ImportNotFound { .. } => "IMPORT_NOT_FOUND",
            Self::Platform(e) => e.error_code(),
            Self::Ir(e) => e.error_code(),
            Self::Frontend(e) => e.error_code(),
            Self::Template(_) => "TEMPLATE",
            Self::Io(_) => "IO",
            Self::Json(_) => "JSON",
        }
    }
}
