// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed decoding of JSON into IR values.
//!
//! Input files, job inputs and defaults arrive as loosely-typed JSON. This
//! module decodes them against a declared [`Type`], applying the same lenient
//! scalar coercions everywhere:
//!
//! | From | To | Example |
//! |------|-----|---------|
//! | String | Int | `"42"` → `42` |
//! | String | Float | `"1.5"` → `1.5` |
//! | String | Boolean | `"true"`, `"1"`, `"yes"` → `true` |
//! | Int | Float | `3` → `3.0` |
//! | Integral Float | Int | `3.0` → `3` |
//! | Number / Bool | String | `42` → `"42"` |
//!
//! How a file or directory is spelled differs per source (plain strings,
//! `{"$file": ...}`, CWL `{"class": "File"}` objects), so path decoding is
//! delegated to a caller-provided function.

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::error::{IrError, Result};
use crate::types::Type;
use crate::value::{DIRECTORY_KEY, FILE_KEY, PathKind, Value};

/// Decode platform-native JSON (as written by [`Value::to_native_json`]).
pub fn from_native_json(json: &Json, ty: &Type) -> Result<Value> {
    decode_with(json, ty, &native_path)
}

/// Recognize a path in platform-native JSON: a bare string or a marked object.
pub fn native_path(kind: PathKind, json: &Json) -> Option<String> {
    let key = match kind {
        PathKind::File => FILE_KEY,
        PathKind::Directory => DIRECTORY_KEY,
    };
    match json {
        Json::String(s) => Some(s.clone()),
        Json::Object(map) => map.get(key).and_then(Json::as_str).map(str::to_string),
        _ => None,
    }
}

/// Decode `json` against `ty`, using `paths` to read file and directory values.
pub fn decode_with(
    json: &Json,
    ty: &Type,
    paths: &dyn Fn(PathKind, &Json) -> Option<String>,
) -> Result<Value> {
    let mismatch = || IrError::conversion(ty, describe(json));

    match ty {
        Type::Optional { inner } => {
            if json.is_null() {
                Ok(Value::Null)
            } else {
                decode_with(json, inner, paths)
            }
        }
        _ if json.is_null() => Err(mismatch()),
        Type::Boolean => match json {
            Json::Bool(b) => Ok(Value::Boolean(*b)),
            Json::String(s) => {
                let lower = s.trim().to_lowercase();
                match lower.as_str() {
                    "true" | "1" | "yes" => Ok(Value::Boolean(true)),
                    "false" | "0" | "no" => Ok(Value::Boolean(false)),
                    _ => Err(mismatch()),
                }
            }
            _ => Err(mismatch()),
        },
        Type::Int => match json {
            Json::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(Value::Int)
                .ok_or_else(mismatch),
            Json::String(s) => s.trim().parse().map(Value::Int).map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        Type::Float => match json {
            Json::Number(n) => n.as_f64().map(Value::Float).ok_or_else(mismatch),
            Json::String(s) => s.trim().parse().map(Value::Float).map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        Type::String => match json {
            Json::String(s) => Ok(Value::String(s.clone())),
            Json::Number(n) => Ok(Value::String(n.to_string())),
            Json::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(mismatch()),
        },
        Type::File => paths(PathKind::File, json)
            .map(Value::File)
            .ok_or_else(mismatch),
        Type::Directory => paths(PathKind::Directory, json)
            .map(Value::Directory)
            .ok_or_else(mismatch),
        Type::Array { item, non_empty } => {
            let Json::Array(items) = json else {
                return Err(mismatch());
            };
            if *non_empty && items.is_empty() {
                return Err(IrError::conversion(ty, "empty array"));
            }
            items
                .iter()
                .map(|v| decode_with(v, item, paths))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
        Type::Hash => match json {
            Json::Object(_) => Ok(decode_untyped(json)),
            _ => Err(mismatch()),
        },
        Type::Schema {
            fields, symbols, ..
        } => {
            if !symbols.is_empty() {
                let value = match json {
                    Json::String(s) => Value::String(s.clone()),
                    _ => return Err(mismatch()),
                };
                value.check(ty)?;
                return Ok(value);
            }
            let Json::Object(members) = json else {
                return Err(mismatch());
            };
            let mut out = IndexMap::new();
            for key in members.keys() {
                if !fields.contains_key(key) {
                    return Err(IrError::conversion(ty, format!("unknown field '{}'", key)));
                }
            }
            for (name, field_ty) in fields {
                match members.get(name) {
                    Some(v) => {
                        out.insert(name.clone(), decode_with(v, field_ty, paths)?);
                    }
                    None if field_ty.is_optional() => {
                        out.insert(name.clone(), Value::Null);
                    }
                    None => {
                        return Err(IrError::conversion(ty, format!("missing field '{}'", name)));
                    }
                }
            }
            Ok(Value::Hash(out))
        }
    }
}

/// Decode JSON without a declared type (contents of a `Hash`).
///
/// Platform-native file markers are preserved as file and directory values.
pub fn decode_untyped(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or_default()),
        },
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::Array(items.iter().map(decode_untyped).collect()),
        Json::Object(map) => {
            if map.len() == 1 {
                if let Some(uri) = map.get(FILE_KEY).and_then(Json::as_str) {
                    return Value::File(uri.to_string());
                }
                if let Some(uri) = map.get(DIRECTORY_KEY).and_then(Json::as_str) {
                    return Value::Directory(uri.to_string());
                }
            }
            Value::Hash(
                map.iter()
                    .map(|(k, v)| (k.clone(), decode_untyped(v)))
                    .collect(),
            )
        }
    }
}

fn describe(json: &Json) -> String {
    let text = json.to_string();
    if text.chars().count() > 60 {
        format!("{}...", text.chars().take(57).collect::<String>())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_coercions() {
        assert_eq!(from_native_json(&json!("42"), &Type::Int).unwrap(), Value::Int(42));
        assert_eq!(from_native_json(&json!(3.0), &Type::Int).unwrap(), Value::Int(3));
        assert_eq!(
            from_native_json(&json!(3), &Type::Float).unwrap(),
            Value::Float(3.0)
        );
        assert_eq!(
            from_native_json(&json!("yes"), &Type::Boolean).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            from_native_json(&json!(7), &Type::String).unwrap(),
            Value::String("7".into())
        );
    }

    #[test]
    fn test_fractional_float_is_not_an_int() {
        let err = from_native_json(&json!(2.5), &Type::Int).unwrap_err();
        assert!(matches!(err, IrError::TypeConversion { .. }));
    }

    #[test]
    fn test_null_requires_optional() {
        assert_eq!(
            from_native_json(&json!(null), &Type::optional(Type::File)).unwrap(),
            Value::Null
        );
        assert!(from_native_json(&json!(null), &Type::File).is_err());
    }

    #[test]
    fn test_native_file_markers() {
        let ty = Type::array(Type::File);
        let value = from_native_json(&json!([{"$file": "a"}, "b"]), &ty).unwrap();
        assert_eq!(
            value,
            Value::Array(vec![Value::File("a".into()), Value::File("b".into())])
        );
    }

    #[test]
    fn test_record_fills_missing_optional_fields() {
        let ty = Type::record(
            "Sample",
            [
                ("id".to_string(), Type::String),
                ("depth".to_string(), Type::optional(Type::Int)),
            ]
            .into_iter()
            .collect(),
        );
        let value = from_native_json(&json!({"id": "s1"}), &ty).unwrap();
        let Value::Hash(members) = value else {
            panic!("expected hash");
        };
        assert_eq!(members["depth"], Value::Null);

        let err = from_native_json(&json!({"id": "s1", "extra": 1}), &ty).unwrap_err();
        assert!(err.to_string().contains("unknown field 'extra'"));
    }

    #[test]
    fn test_untyped_hash_keeps_file_markers() {
        let value = decode_untyped(&json!({"ref": {"$file": "x.fa"}, "n": 2}));
        let Value::Hash(members) = value else {
            panic!("expected hash");
        };
        assert_eq!(members["ref"], Value::File("x.fa".into()));
        assert_eq!(members["n"], Value::Int(2));
    }
}
