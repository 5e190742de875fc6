// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the front-end adapters.

use tessera_ir::IrError;
use thiserror::Error;

/// Result type using FrontendError.
pub type Result<T> = std::result::Result<T, FrontendError>;

/// Errors raised while reading source documents or mapping source types.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrontendError {
    /// The `language[,version]` tag names nothing we support.
    #[error("Unsupported language '{0}'")]
    UnsupportedLanguage(String),

    /// The document was written for a different language than requested.
    #[error("Document language {found} does not match requested {expected}")]
    LanguageMismatch { expected: String, found: String },

    /// A union of two or more non-null types.
    #[error("Unsupported union type: {0}")]
    UnsupportedUnion(String),

    /// A union with no members.
    #[error("Empty union type")]
    EmptyUnion,

    /// A source type with no IR counterpart.
    #[error("Unsupported type '{0}'")]
    UnsupportedType(String),

    /// A type refers to a struct or schema that was never declared.
    #[error("Unknown struct '{0}'")]
    UnknownStruct(String),

    /// An expression refers to a name that is not in scope.
    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),

    /// The static type of an expression cannot be determined.
    #[error("Cannot infer the type of expression: {0}")]
    UntypedExpression(String),

    #[error(transparent)]
    Ir(#[from] IrError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FrontendError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedLanguage(_) => "UNSUPPORTED_LANGUAGE",
            Self::LanguageMismatch { .. } => "LANGUAGE_MISMATCH",
            Self::UnsupportedUnion(_) => "UNSUPPORTED_UNION",
            Self::EmptyUnion => "EMPTY_UNION",
            Self::UnsupportedType(_) => "UNSUPPORTED_TYPE",
            Self::UnknownStruct(_) => "UNKNOWN_STRUCT",
            Self::UnknownIdentifier(_) => "UNKNOWN_IDENTIFIER",
            Self::UntypedExpression(_) => "UNTYPED_EXPRESSION",
            Self::Ir(e) => e.error_code(),
            Self::Json(_) => "JSON",
        }
    }
}
