// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! CWL front-end.
//!
//! CWL types are JSON: names (`int`, `File`), shorthands (`int?`, `File[]`),
//! unions as lists, and `array`/`record`/`enum` objects. Files are
//! `{"class": "File", "location": ...}` objects.

use indexmap::IndexMap;
use regex::Regex;
use serde_json::{Value as Json, json};
use std::sync::LazyLock;
use tessera_ir::coercion::decode_with;
use tessera_ir::{PathKind, Type, Value};

use crate::error::{FrontendError, Result};
use crate::{Frontend, Language, TypeContext};

static PARAMETER_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\(\s*inputs\.([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*\)")
        .expect("parameter reference regex")
});

pub struct CwlFrontend;

impl Frontend for CwlFrontend {
    fn language(&self) -> Language {
        Language::Cwl
    }

    fn to_ir_type(&self, source: &Json, ctx: &TypeContext) -> Result<Type> {
        match source {
            Json::Array(members) => union(members, ctx),
            Json::String(name) => {
                if let Some(inner) = name.strip_suffix('?') {
                    return union(&[json!("null"), json!(inner)], ctx);
                }
                if let Some(item) = name.strip_suffix("[]") {
                    return Ok(Type::array(self.to_ir_type(&json!(item), ctx)?));
                }
                named(name, ctx)
            }
            Json::Object(map) => match map.get("type").and_then(Json::as_str) {
                Some("array") => {
                    let items = map
                        .get("items")
                        .ok_or_else(|| FrontendError::UnsupportedType(source.to_string()))?;
                    Ok(Type::array(self.to_ir_type(items, ctx)?))
                }
                Some("record") => {
                    let name = schema_name(map, source)?;
                    let mut fields = IndexMap::new();
                    match map.get("fields") {
                        Some(Json::Array(list)) => {
                            for field in list {
                                let field_name = field
                                    .get("name")
                                    .and_then(Json::as_str)
                                    .ok_or_else(|| FrontendError::UnsupportedType(field.to_string()))?;
                                let field_ty = field
                                    .get("type")
                                    .ok_or_else(|| FrontendError::UnsupportedType(field.to_string()))?;
                                fields.insert(local_name(field_name), self.to_ir_type(field_ty, ctx)?);
                            }
                        }
                        Some(Json::Object(members)) => {
                            for (field_name, field_ty) in members {
                                let field_ty = field_ty.get("type").unwrap_or(field_ty);
                                fields.insert(local_name(field_name), self.to_ir_type(field_ty, ctx)?);
                            }
                        }
                        _ => return Err(FrontendError::UnsupportedType(source.to_string())),
                    }
                    Ok(Type::record(name, fields))
                }
                Some("enum") => {
                    let name = schema_name(map, source)?;
                    let symbols = map
                        .get("symbols")
                        .and_then(Json::as_array)
                        .ok_or_else(|| FrontendError::UnsupportedType(source.to_string()))?
                        .iter()
                        .filter_map(Json::as_str)
                        .map(local_name)
                        .collect();
                    Ok(Type::enumeration(name, symbols))
                }
                _ => Err(FrontendError::UnsupportedType(source.to_string())),
            },
            other => Err(FrontendError::UnsupportedType(other.to_string())),
        }
    }

    fn from_ir_type(&self, ty: &Type) -> Json {
        match ty {
            Type::Boolean => json!("boolean"),
            Type::Int => json!("long"),
            Type::Float => json!("double"),
            Type::String => json!("string"),
            Type::File => json!("File"),
            Type::Directory => json!("Directory"),
            Type::Hash => json!("Any"),
            Type::Optional { inner } => json!(["null", self.from_ir_type(inner)]),
            Type::Array { item, .. } => json!({"type": "array", "items": self.from_ir_type(item)}),
            Type::Schema {
                name,
                fields,
                symbols,
            } => {
                if symbols.is_empty() {
                    let fields: Vec<Json> = fields
                        .iter()
                        .map(|(n, t)| json!({"name": n, "type": self.from_ir_type(t)}))
                        .collect();
                    json!({"type": "record", "name": name, "fields": fields})
                } else {
                    json!({"type": "enum", "name": name, "symbols": symbols})
                }
            }
        }
    }

    fn to_ir_value(&self, value: &Json, ty: &Type) -> Result<Value> {
        Ok(decode_with(value, ty, &cwl_path)?)
    }

    fn from_ir_value(&self, value: &Value) -> Json {
        value.encode_with(&|kind, uri| {
            let class = match kind {
                PathKind::File => "File",
                PathKind::Directory => "Directory",
            };
            json!({"class": class, "location": uri})
        })
    }

    fn command_template(&self, command: &str) -> String {
        PARAMETER_REF
            .replace_all(command, "{{ $1 }}")
            .into_owned()
    }
}

fn union(members: &[Json], ctx: &TypeContext) -> Result<Type> {
    if members.is_empty() {
        return Err(FrontendError::EmptyUnion);
    }
    let mut nullable = false;
    let mut types: Vec<Type> = Vec::new();
    for member in members {
        if member.as_str() == Some("null") {
            nullable = true;
            continue;
        }
        let ty = CwlFrontend.to_ir_type(member, ctx)?;
        if !types.contains(&ty) {
            types.push(ty);
        }
    }
    match types.len() {
        0 => Err(FrontendError::UnsupportedType("null".into())),
        1 => {
            let ty = types.remove(0);
            Ok(if nullable { Type::optional(ty) } else { ty })
        }
        _ => Err(FrontendError::UnsupportedUnion(
            Json::Array(members.to_vec()).to_string(),
        )),
    }
}

fn named(name: &str, ctx: &TypeContext) -> Result<Type> {
    match name {
        "boolean" => Ok(Type::Boolean),
        "int" | "long" => Ok(Type::Int),
        "float" | "double" => Ok(Type::Float),
        "string" => Ok(Type::String),
        "File" => Ok(Type::File),
        "Directory" => Ok(Type::Directory),
        "Any" => Ok(Type::Hash),
        "null" => Err(FrontendError::UnsupportedType("null".into())),
        other => {
            let key = local_name(other);
            ctx.get(&key)
                .cloned()
                .ok_or(FrontendError::UnknownStruct(key))
        }
    }
}

fn schema_name(map: &serde_json::Map<String, Json>, source: &Json) -> Result<String> {
    map.get("name")
        .and_then(Json::as_str)
        .map(local_name)
        .ok_or_else(|| FrontendError::UnsupportedType(source.to_string()))
}

/// Strip the `#` and URI prefix CWL puts on schema, field and symbol names.
fn local_name(name: &str) -> String {
    let name = name.rsplit('#').next().unwrap_or(name);
    name.rsplit('/').next().unwrap_or(name).to_string()
}

fn cwl_path(kind: PathKind, json: &Json) -> Option<String> {
    let class = match kind {
        PathKind::File => "File",
        PathKind::Directory => "Directory",
    };
    match json {
        Json::String(s) => Some(s.clone()),
        Json::Object(map) if map.get("class").and_then(Json::as_str) == Some(class) => map
            .get("location")
            .or_else(|| map.get("path"))
            .and_then(Json::as_str)
            .map(str::to_string),
        Json::Object(_) => tessera_ir::coercion::native_path(kind, json),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ir(source: Json) -> Result<Type> {
        CwlFrontend.to_ir_type(&source, &TypeContext::default())
    }

    #[test]
    fn test_null_union_collapses_to_optional() {
        assert_eq!(ir(json!(["null", "int"])).unwrap(), Type::optional(Type::Int));
        assert_eq!(ir(json!("File?")).unwrap(), Type::optional(Type::File));
        assert_eq!(ir(json!(["null", "int", "null"])).unwrap(), Type::optional(Type::Int));
    }

    #[test]
    fn test_multi_type_unions_are_rejected() {
        assert!(matches!(
            ir(json!(["int", "string"])).unwrap_err(),
            FrontendError::UnsupportedUnion(_)
        ));
        assert!(matches!(ir(json!([])).unwrap_err(), FrontendError::EmptyUnion));
    }

    #[test]
    fn test_shorthands_and_objects() {
        assert_eq!(ir(json!("string[]")).unwrap(), Type::array(Type::String));
        assert_eq!(
            ir(json!({"type": "array", "items": "File?"})).unwrap(),
            Type::array(Type::optional(Type::File))
        );
        assert_eq!(ir(json!("Any")).unwrap(), Type::Hash);

        let color = ir(json!({"type": "enum", "name": "#Color", "symbols": ["#Color/red", "#Color/blue"]}))
            .unwrap();
        assert_eq!(
            color,
            Type::enumeration("Color", vec!["red".into(), "blue".into()])
        );
    }

    #[test]
    fn test_record_round_trip() {
        let ty = ir(json!({
            "type": "record",
            "name": "Sample",
            "fields": [
                {"name": "id", "type": "string"},
                {"name": "reads", "type": {"type": "array", "items": "File"}},
                {"name": "depth", "type": ["null", "long"]}
            ]
        }))
        .unwrap();
        let back = ir(CwlFrontend.from_ir_type(&ty)).unwrap();
        assert_eq!(back, ty);
    }

    #[test]
    fn test_file_objects() {
        let value = CwlFrontend
            .to_ir_value(
                &json!({"class": "File", "location": "s3://b/reads.fq"}),
                &Type::File,
            )
            .unwrap();
        assert_eq!(value, Value::File("s3://b/reads.fq".into()));
        assert_eq!(
            CwlFrontend.from_ir_value(&value),
            json!({"class": "File", "location": "s3://b/reads.fq"})
        );
        assert!(
            CwlFrontend
                .to_ir_value(&json!({"class": "Directory", "location": "x"}), &Type::File)
                .is_err()
        );
    }

    #[test]
    fn test_command_parameter_references() {
        assert_eq!(
            CwlFrontend.command_template("cat $(inputs.reads) > $(inputs.sample.id).txt"),
            "cat {{ reads }} > {{ sample.id }}.txt"
        );
    }
}
