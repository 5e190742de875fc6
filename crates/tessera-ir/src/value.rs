// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! IR values and their platform-native JSON encoding.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json, json};

use crate::error::{IrError, Result};
use crate::types::Type;

/// Key marking a file reference in platform-native JSON.
pub const FILE_KEY: &str = "$file";

/// Key marking a directory reference in platform-native JSON.
pub const DIRECTORY_KEY: &str = "$directory";

/// Distinguishes the two path-like value variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
}

/// A value mirroring [`Type`]. `Null` is only valid where the type is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    File(String),
    Directory(String),
    Array(Vec<Value>),
    Hash(IndexMap<String, Value>),
}

impl Value {
    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::File(_) => "file",
            Value::Directory(_) => "directory",
            Value::Array(_) => "array",
            Value::Hash(_) => "hash",
        }
    }

    /// Verify that this value is well-typed against `ty`.
    pub fn check(&self, ty: &Type) -> Result<()> {
        let mismatch = || Err(IrError::conversion(ty, self.kind_name()));
        match (ty, self) {
            (Type::Optional { .. }, Value::Null) => Ok(()),
            (Type::Optional { inner }, value) => value.check(inner),
            (_, Value::Null) => mismatch(),
            (Type::Boolean, Value::Boolean(_))
            | (Type::Int, Value::Int(_))
            | (Type::Float, Value::Float(_))
            | (Type::String, Value::String(_))
            | (Type::File, Value::File(_))
            | (Type::Directory, Value::Directory(_))
            | (Type::Hash, Value::Hash(_)) => Ok(()),
            (Type::Array { item, non_empty }, Value::Array(items)) => {
                if *non_empty && items.is_empty() {
                    return Err(IrError::conversion(ty, "empty array"));
                }
                items.iter().try_for_each(|v| v.check(item))
            }
            (Type::Schema { symbols, .. }, Value::String(s)) if !symbols.is_empty() => {
                if symbols.contains(s) {
                    Ok(())
                } else {
                    Err(IrError::conversion(ty, format!("symbol '{}'", s)))
                }
            }
            (Type::Schema { fields, symbols, .. }, Value::Hash(members)) if symbols.is_empty() => {
                for key in members.keys() {
                    if !fields.contains_key(key) {
                        return Err(IrError::conversion(ty, format!("unknown field '{}'", key)));
                    }
                }
                for (name, field_ty) in fields {
                    match members.get(name) {
                        Some(v) => v.check(field_ty)?,
                        None if field_ty.is_optional() => {}
                        None => {
                            return Err(IrError::conversion(
                                ty,
                                format!("missing field '{}'", name),
                            ));
                        }
                    }
                }
                Ok(())
            }
            _ => mismatch(),
        }
    }

    /// Encode as platform-native JSON, marking files and directories.
    pub fn to_native_json(&self) -> Json {
        self.encode_with(&|kind, uri| match kind {
            PathKind::File => json!({ FILE_KEY: uri }),
            PathKind::Directory => json!({ DIRECTORY_KEY: uri }),
        })
    }

    /// Encode as JSON, delegating the representation of paths to `paths`.
    pub fn encode_with(&self, paths: &dyn Fn(PathKind, &str) -> Json) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Boolean(b) => Json::Bool(*b),
            Value::Int(i) => json!(i),
            Value::Float(f) => json!(f),
            Value::String(s) => Json::String(s.clone()),
            Value::File(uri) => paths(PathKind::File, uri),
            Value::Directory(uri) => paths(PathKind::Directory, uri),
            Value::Array(items) => Json::Array(items.iter().map(|v| v.encode_with(paths)).collect()),
            Value::Hash(members) => {
                let mut map = Map::new();
                for (k, v) in members {
                    map.insert(k.clone(), v.encode_with(paths));
                }
                Json::Object(map)
            }
        }
    }

    /// Every file and directory reference inside this value.
    pub fn paths(&self) -> Vec<(PathKind, &str)> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<(PathKind, &'a str)>) {
        match self {
            Value::File(uri) => out.push((PathKind::File, uri)),
            Value::Directory(uri) => out.push((PathKind::Directory, uri)),
            Value::Array(items) => items.iter().for_each(|v| v.collect_paths(out)),
            Value::Hash(members) => members.values().for_each(|v| v.collect_paths(out)),
            _ => {}
        }
    }

    /// Rewrite every path in this value, failing on the first error.
    pub fn try_map_paths<E>(
        self,
        f: &mut dyn FnMut(PathKind, String) -> std::result::Result<String, E>,
    ) -> std::result::Result<Value, E> {
        Ok(match self {
            Value::File(uri) => Value::File(f(PathKind::File, uri)?),
            Value::Directory(uri) => Value::Directory(f(PathKind::Directory, uri)?),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|v| v.try_map_paths(f))
                    .collect::<std::result::Result<_, _>>()?,
            ),
            Value::Hash(members) => {
                let mut out = IndexMap::with_capacity(members.len());
                for (k, v) in members {
                    out.insert(k, v.try_map_paths(f)?);
                }
                Value::Hash(out)
            }
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_only_valid_for_optional() {
        assert!(Value::Null.check(&Type::optional(Type::Int)).is_ok());
        let err = Value::Null.check(&Type::Int).unwrap_err();
        assert!(err.to_string().contains("expected Int"));
    }

    #[test]
    fn test_check_non_empty_array() {
        let ty = Type::non_empty_array(Type::Int);
        assert!(Value::Array(vec![]).check(&ty).is_err());
        assert!(Value::Array(vec![Value::Int(1)]).check(&ty).is_ok());
    }

    #[test]
    fn test_check_enum_symbols() {
        let ty = Type::enumeration("Color", vec!["red".into()]);
        assert!(Value::String("red".into()).check(&ty).is_ok());
        assert!(Value::String("green".into()).check(&ty).is_err());
    }

    #[test]
    fn test_check_record_missing_required_field() {
        let ty = Type::record(
            "Sample",
            [
                ("id".to_string(), Type::String),
                ("reads".to_string(), Type::optional(Type::File)),
            ]
            .into_iter()
            .collect(),
        );
        let ok = Value::Hash([("id".to_string(), Value::String("s1".into()))].into_iter().collect());
        assert!(ok.check(&ty).is_ok());

        let missing = Value::Hash(IndexMap::new());
        let err = missing.check(&ty).unwrap_err();
        assert!(err.to_string().contains("missing field 'id'"));
    }

    #[test]
    fn test_native_json_marks_files() {
        let value = Value::Array(vec![
            Value::File("dx://proj:/a.txt".into()),
            Value::Directory("dx://proj:/out".into()),
        ]);
        assert_eq!(
            value.to_native_json(),
            json!([{"$file": "dx://proj:/a.txt"}, {"$directory": "dx://proj:/out"}])
        );
    }

    #[test]
    fn test_try_map_paths_rewrites_nested_files() {
        let value = Value::Hash(
            [(
                "reads".to_string(),
                Value::Array(vec![Value::File("a".into()), Value::File("b".into())]),
            )]
            .into_iter()
            .collect(),
        );
        let mapped: Value = value
            .try_map_paths(&mut |_, uri| Ok::<_, ()>(format!("/work/{}", uri)))
            .unwrap();
        let paths: Vec<&str> = mapped.paths().into_iter().map(|(_, p)| p).collect();
        assert_eq!(paths, vec!["/work/a", "/work/b"]);
    }
}
