// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Front-end languages for tessera.
//!
//! Each supported workflow language implements [`Frontend`]: reading a parsed
//! document, mapping its types and values to and from the IR, and rewriting
//! its command templates into runtime template syntax. The set of languages
//! is closed and selected by a `language[,version]` tag:
//!
//! ```
//! use tessera_frontend::{Dialect, Language};
//!
//! let dialect: Dialect = "wdl,1.1".parse().unwrap();
//! assert_eq!(dialect.language, Language::Wdl);
//! let frontend = dialect.frontend();
//! assert_eq!(frontend.language(), Language::Wdl);
//! ```

pub mod cwl;
pub mod document;
pub mod error;
pub mod expr;
pub mod wdl;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;
use std::str::FromStr;
use tessera_ir::{Type, Value};

pub use document::{
    CallNode, Declaration, Document, Meta, ParameterMeta, SourceLocation, StructDef, TaskDef,
    WorkflowDef, WorkflowNode,
};
pub use error::{FrontendError, Result};
pub use expr::Expr;

/// Supported source languages.
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
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Language {
    Wdl,
    Cwl,
}

static WDL: wdl::WdlFrontend = wdl::WdlFrontend;
static CWL: cwl::CwlFrontend = cwl::CwlFrontend;

impl Language {
    pub fn versions(self) -> &'static [&'static str] {
        match self {
            Language::Wdl => &["draft-2", "1.0", "1.1"],
            Language::Cwl => &["v1.2"],
        }
    }

    pub fn default_version(self) -> &'static str {
        match self {
            Language::Wdl => "1.0",
            Language::Cwl => "v1.2",
        }
    }

    pub fn frontend(self) -> &'static dyn Frontend {
        match self {
            Language::Wdl => &WDL,
            Language::Cwl => &CWL,
        }
    }
}

/// A language plus a version, e.g. `wdl,1.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dialect {
    pub language: Language,
    pub version: String,
}

impl Dialect {
    pub fn new(language: Language, version: &str) -> Result<Self> {
        if !language.versions().contains(&version) {
            return Err(FrontendError::UnsupportedLanguage(format!(
                "{},{}",
                language, version
            )));
        }
        Ok(Self {
            language,
            version: version.to_string(),
        })
    }

    pub fn frontend(&self) -> &'static dyn Frontend {
        self.language.frontend()
    }
}

impl FromStr for Dialect {
    type Err = FrontendError;

    fn from_str(tag: &str) -> Result<Self> {
        let (name, version) = match tag.split_once(',') {
            Some((name, version)) => (name.trim(), Some(version.trim())),
            None => (tag.trim(), None),
        };
        let language = Language::from_str(name)
            .map_err(|_| FrontendError::UnsupportedLanguage(tag.to_string()))?;
        Dialect::new(language, version.unwrap_or(language.default_version()))
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.language, self.version)
    }
}

/// Named schemas visible while mapping source types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeContext {
    schemas: IndexMap<String, Type>,
}

impl TypeContext {
    pub fn get(&self, name: &str) -> Option<&Type> {
        self.schemas.get(name)
    }

    pub fn insert(&mut self, ty: Type) {
        if let Type::Schema { name, .. } = &ty {
            self.schemas.insert(name.clone(), ty);
        }
    }

    pub fn schemas(&self) -> &IndexMap<String, Type> {
        &self.schemas
    }
}

/// The capability every front-end language provides.
pub trait Frontend: Send + Sync {
    fn language(&self) -> Language;

    /// Read a parsed document and check it matches `dialect`.
    fn parse(&self, dialect: &Dialect, source: &str) -> Result<Document> {
        let document: Document = serde_json::from_str(source)?;
        let found = match &document.version {
            Some(version) => format!("{},{}", document.language, version),
            None => document.language.to_string(),
        };
        let version_matches = document
            .version
            .as_ref()
            .is_none_or(|v| *v == dialect.version);
        if document.language != dialect.language || !version_matches {
            return Err(FrontendError::LanguageMismatch {
                expected: dialect.to_string(),
                found,
            });
        }
        tracing::debug!(
            dialect = %dialect,
            tasks = document.tasks.len(),
            has_workflow = document.workflow.is_some(),
            "Parsed document"
        );
        Ok(document)
    }

    /// Build the schema context from the document's struct declarations.
    fn type_context(&self, document: &Document) -> Result<TypeContext> {
        let mut ctx = TypeContext::default();
        for def in &document.structs {
            if !def.symbols.is_empty() {
                ctx.insert(Type::enumeration(&def.name, def.symbols.clone()));
                continue;
            }
            let mut fields = IndexMap::new();
            for (member, source) in &def.members {
                fields.insert(member.clone(), self.to_ir_type(source, &ctx)?);
            }
            ctx.insert(Type::record(&def.name, fields));
        }
        Ok(ctx)
    }

    /// Map a source type to an IR type.
    fn to_ir_type(&self, source: &Json, ctx: &TypeContext) -> Result<Type>;

    /// Spell an IR type in this language.
    fn from_ir_type(&self, ty: &Type) -> Json;

    /// Decode a source value of type `ty`.
    fn to_ir_value(&self, value: &Json, ty: &Type) -> Result<Value>;

    /// Encode an IR value in this language's JSON input format.
    fn from_ir_value(&self, value: &Value) -> Json;

    /// Default for a parameter the caller left unset.
    fn default_ir_value(&self, ty: &Type) -> Result<Value> {
        Ok(ty.default_value()?)
    }

    /// Rewrite a command template into runtime template syntax.
    fn command_template(&self, command: &str) -> String;

    /// Static type of an expression.
    fn type_of(&self, expr: &Expr, scope: &dyn Fn(&str) -> Option<Type>) -> Result<Type> {
        expr.type_of(scope)
    }

    /// Render an expression in runtime expression syntax.
    fn render_expr(&self, expr: &Expr) -> String {
        expr.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dialect_parsing() {
        let dialect: Dialect = "wdl".parse().unwrap();
        assert_eq!(dialect.to_string(), "wdl,1.0");
        let dialect: Dialect = "CWL,v1.2".parse().unwrap();
        assert_eq!(dialect.language, Language::Cwl);

        assert!(matches!(
            "wdl,2.0".parse::<Dialect>().unwrap_err(),
            FrontendError::UnsupportedLanguage(_)
        ));
        assert!(matches!(
            "nextflow".parse::<Dialect>().unwrap_err(),
            FrontendError::UnsupportedLanguage(_)
        ));
    }

    #[test]
    fn test_parse_rejects_language_mismatch() {
        let dialect: Dialect = "wdl,1.1".parse().unwrap();
        let source = json!({"language": "wdl", "version": "1.0"}).to_string();
        let err = dialect.frontend().parse(&dialect, &source).unwrap_err();
        assert_eq!(err.error_code(), "LANGUAGE_MISMATCH");

        let source = json!({"language": "wdl"}).to_string();
        assert!(dialect.frontend().parse(&dialect, &source).is_ok());
    }

    #[test]
    fn test_type_context_resolves_nested_structs() {
        let document: Document = serde_json::from_value(json!({
            "language": "wdl",
            "structs": [
                {"name": "Reads", "members": {"r1": "File", "r2": "File?"}},
                {"name": "Sample", "members": {"id": "String", "reads": "Array[Reads]"}}
            ]
        }))
        .unwrap();
        let ctx = Language::Wdl.frontend().type_context(&document).unwrap();
        let Some(Type::Schema { fields, .. }) = ctx.get("Sample") else {
            panic!("expected schema");
        };
        assert!(matches!(&fields["reads"], Type::Array { item, .. } if item.to_string() == "Reads"));
    }
}
