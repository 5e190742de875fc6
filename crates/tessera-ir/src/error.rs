// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the IR model.

use thiserror::Error;

/// Result type using IrError.
pub type Result<T> = std::result::Result<T, IrError>;

/// Errors raised while building, checking or converting IR objects.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IrError {
    /// A value does not match its declared type.
    #[error("Type conversion error: expected {expected}, found {found}")]
    TypeConversion {
        /// The declared IR type.
        expected: String,
        /// Description of the offending value.
        found: String,
    },

    /// The type has no representable default value.
    #[error("No default value available for type {0}")]
    NoDefaultAvailable(String),

    /// A stage binding would create a cycle or a forward reference.
    #[error("Graph integrity violation in workflow '{workflow}': {message}")]
    GraphIntegrity {
        /// The workflow being built.
        workflow: String,
        /// What went wrong.
        message: String,
    },

    /// A binding's source type does not fit the slot it is bound to.
    #[error("Binding type mismatch in workflow '{workflow}': {target} expects {expected}, found {found}")]
    BindingType {
        /// The workflow being built.
        workflow: String,
        /// The bound stage input or workflow output.
        target: String,
        /// Declared type of the slot.
        expected: String,
        /// Type of the source.
        found: String,
    },

    /// No instance type satisfies a resource request.
    #[error("No instance type satisfies the request: {0}")]
    InstanceSelection(String),

    /// A resource requirement could not be interpreted.
    #[error("Invalid resource requirement '{key}': {message}")]
    InvalidRequirement {
        /// Requirement key (memory, cpu, disk, gpu, instance_type).
        key: &'static str,
        /// Why the value was rejected.
        message: String,
    },

    /// Two callables share the same name.
    #[error("Duplicate callable '{0}' in bundle")]
    DuplicateCallable(String),

    /// A callable references another callable that is not in the bundle.
    #[error("Unknown callable '{0}'")]
    UnknownCallable(String),

    /// Two schemas share a name but differ in structure.
    #[error("Schema '{0}' is defined more than once with different fields")]
    SchemaConflict(String),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IrError {
    /// Build a type conversion error from a type and a value description.
    pub fn conversion(expected: impl ToString, found: impl ToString) -> Self {
        Self::TypeConversion {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Build a graph integrity error for a workflow.
    pub fn graph(workflow: &str, message: impl Into<String>) -> Self {
        Self::GraphIntegrity {
            workflow: workflow.to_string(),
            message: message.into(),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TypeConversion { .. } => "TYPE_CONVERSION",
            Self::NoDefaultAvailable(_) => "NO_DEFAULT_AVAILABLE",
            Self::GraphIntegrity { .. } => "GRAPH_INTEGRITY",
            Self::BindingType { .. } => "BINDING_TYPE",
            Self::InstanceSelection(_) => "INSTANCE_SELECTION",
            Self::InvalidRequirement { .. } => "INVALID_REQUIREMENT",
            Self::DuplicateCallable(_) => "DUPLICATE_CALLABLE",
            Self::UnknownCallable(_) => "UNKNOWN_CALLABLE",
            Self::SchemaConflict(_) => "SCHEMA_CONFLICT",
            Self::Json(_) => "JSON",
        }
    }
}
