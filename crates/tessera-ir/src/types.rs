// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! IR types shared by every front-end language.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{IrError, Result};
use crate::value::Value;

/// Name of the synthetic field carried by enum schemas.
pub const ENUM_FIELD: &str = "enum";

/// The closed set of IR types.
///
/// `Optional(Optional(T))` is never constructed through [`Type::optional`];
/// optionality collapses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Type {
    Boolean,
    Int,
    Float,
    String,
    File,
    Directory,
    Optional {
        inner: Box<Type>,
    },
    Array {
        item: Box<Type>,
        #[serde(
            rename = "nonEmpty",
            default,
            skip_serializing_if = "std::ops::Not::not"
        )]
        non_empty: bool,
    },
    /// Open string-keyed map of IR values.
    Hash,
    /// Records, and enums as a schema with a single `enum` field.
    Schema {
        name: String,
        fields: IndexMap<String, Type>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        symbols: Vec<String>,
    },
}

impl Type {
    /// Wrap in `Optional`, collapsing nested optionality.
    pub fn optional(inner: Type) -> Type {
        match inner {
            Type::Optional { .. } => inner,
            other => Type::Optional {
                inner: Box::new(other),
            },
        }
    }

    /// Array of `item`.
    pub fn array(item: Type) -> Type {
        Type::Array {
            item: Box::new(item),
            non_empty: false,
        }
    }

    /// Array of `item` that must hold at least one element.
    pub fn non_empty_array(item: Type) -> Type {
        Type::Array {
            item: Box::new(item),
            non_empty: true,
        }
    }

    /// Record schema with ordered fields.
    pub fn record(name: impl Into<String>, fields: IndexMap<String, Type>) -> Type {
        Type::Schema {
            name: name.into(),
            fields,
            symbols: Vec::new(),
        }
    }

    /// Enum schema: one synthetic string field, plus the symbol set.
    pub fn enumeration(name: impl Into<String>, symbols: Vec<String>) -> Type {
        let mut fields = IndexMap::new();
        fields.insert(ENUM_FIELD.to_string(), Type::String);
        Type::Schema {
            name: name.into(),
            fields,
            symbols,
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Type::Optional { .. })
    }

    /// The type without its outer `Optional` wrapper.
    pub fn unwrap_optional(&self) -> &Type {
        match self {
            Type::Optional { inner } => inner,
            other => other,
        }
    }

    /// Whether a value of type `source` may be bound where `self` is expected.
    ///
    /// `T` fits `T?`, a non-empty array fits a plain one, `Int` fits `Float`,
    /// a `String` fits a `File` or `Directory` and any record fits `Hash`.
    pub fn accepts(&self, source: &Type) -> bool {
        match (self, source) {
            _ if self == source => true,
            (Type::Optional { inner }, Type::Optional { inner: source }) => inner.accepts(source),
            (Type::Optional { inner }, source) => inner.accepts(source),
            (
                Type::Array { item, non_empty },
                Type::Array {
                    item: source_item,
                    non_empty: source_non_empty,
                },
            ) => (!non_empty || *source_non_empty) && item.accepts(source_item),
            (Type::Float, Type::Int) => true,
            (Type::File | Type::Directory, Type::String) => true,
            (Type::Hash, Type::Schema { symbols, .. }) => symbols.is_empty(),
            _ => false,
        }
    }

    /// Whether this is an enum schema.
    pub fn is_enum(&self) -> bool {
        matches!(self, Type::Schema { symbols, .. } if !symbols.is_empty())
    }

    /// Whether values of this type may carry files or directories.
    pub fn contains_files(&self) -> bool {
        match self {
            Type::File | Type::Directory | Type::Hash => true,
            Type::Optional { inner } => inner.contains_files(),
            Type::Array { item, .. } => item.contains_files(),
            Type::Schema { fields, symbols, .. } => {
                symbols.is_empty() && fields.values().any(Type::contains_files)
            }
            Type::Boolean | Type::Int | Type::Float | Type::String => false,
        }
    }

    /// Collect every schema reachable from this type, outermost first.
    pub fn collect_schemas<'a>(&'a self, out: &mut Vec<&'a Type>) {
        match self {
            Type::Optional { inner } => inner.collect_schemas(out),
            Type::Array { item, .. } => item.collect_schemas(out),
            Type::Schema { fields, .. } => {
                out.push(self);
                for field in fields.values() {
                    field.collect_schemas(out);
                }
            }
            _ => {}
        }
    }

    /// Synthesize a default value for this type.
    ///
    /// Total for every variant except a bare `Hash`, whose shape is unconstrained.
    pub fn default_value(&self) -> Result<Value> {
        match self {
            Type::Boolean => Ok(Value::Boolean(false)),
            Type::Int => Ok(Value::Int(0)),
            Type::Float => Ok(Value::Float(0.0)),
            Type::String => Ok(Value::String(String::new())),
            Type::File => Ok(Value::File(String::new())),
            Type::Directory => Ok(Value::Directory(String::new())),
            Type::Optional { .. } => Ok(Value::Null),
            Type::Array { item, non_empty } => {
                if *non_empty {
                    Ok(Value::Array(vec![item.default_value()?]))
                } else {
                    Ok(Value::Array(Vec::new()))
                }
            }
            Type::Hash => Err(IrError::NoDefaultAvailable(self.to_string())),
            Type::Schema {
                fields, symbols, ..
            } => {
                if let Some(first) = symbols.first() {
                    return Ok(Value::String(first.clone()));
                }
                let mut members = IndexMap::new();
                for (name, ty) in fields {
                    members.insert(name.clone(), ty.default_value()?);
                }
                Ok(Value::Hash(members))
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Boolean => write!(f, "Boolean"),
            Type::Int => write!(f, "Int"),
            Type::Float => write!(f, "Float"),
            Type::String => write!(f, "String"),
            Type::File => write!(f, "File"),
            Type::Directory => write!(f, "Directory"),
            Type::Optional { inner } => write!(f, "{}?", inner),
            Type::Array { item, non_empty } => {
                write!(f, "Array[{}]", item)?;
                if *non_empty {
                    write!(f, "+")?;
                }
                Ok(())
            }
            Type::Hash => write!(f, "Hash"),
            Type::Schema { name, .. } => write!(f, "{}", name),
        }
    }
}
