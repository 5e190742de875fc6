// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stub tasks for executables that already live on the platform.
//!
//! A stub declares the executable's inputs and outputs in the source
//! language and carries its id. Workflows call it like any other task;
//! the compiler links stages to the id instead of building an applet.

use serde::Deserialize;
use tessera_frontend::{Declaration, Dialect, Document, Meta, TaskDef};
use tessera_ir::Type;

use super::manifest::IoSpec;
use crate::error::{CompileError, Result};
use crate::platform::{ExecutableKind, ExecutableRecord, PlatformApi, PlatformError, ProjectInfo, Session};

/// The part of a manifest a stub is generated from.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Interface {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    input_spec: Vec<IoSpec>,
    #[serde(default)]
    output_spec: Vec<IoSpec>,
}

/// IR type of a platform IO class.
pub fn class_type(class: &str) -> Option<Type> {
    fn primitive(class: &str) -> Option<Type> {
        match class {
            "boolean" => Some(Type::Boolean),
            "int" => Some(Type::Int),
            "float" => Some(Type::Float),
            "string" => Some(Type::String),
            "file" => Some(Type::File),
            "hash" => Some(Type::Hash),
            _ => None,
        }
    }
    match class.strip_prefix("array:") {
        Some(item) => primitive(item).map(Type::array),
        None => primitive(class),
    }
}

/// Build a stub task for one applet record.
pub fn stub_task(record: &ExecutableRecord, dialect: &Dialect) -> Result<TaskDef> {
    if record.kind != ExecutableKind::Applet {
        return Err(CompileError::InvalidOptions(format!(
            "'{}' is a {}; only applets can be called by id",
            record.name, record.kind
        )));
    }
    let interface: Interface = serde_json::from_value(record.manifest.clone())?;
    let frontend = dialect.frontend();
    let declare = |spec: &IoSpec, optional: bool| -> Result<Declaration> {
        let ty = class_type(&spec.class).ok_or_else(|| {
            CompileError::translation(
                None,
                format!(
                    "'{}' field '{}' has unsupported class '{}'",
                    record.name, spec.name, spec.class
                ),
            )
        })?;
        let ty = if optional { Type::optional(ty) } else { ty };
        Ok(Declaration {
            name: spec.name.clone(),
            ty: frontend.from_ir_type(&ty),
            expr: None,
            loc: None,
        })
    };

    let inputs = interface
        .input_spec
        .iter()
        .map(|spec| declare(spec, spec.optional || spec.default.is_some()))
        .collect::<Result<Vec<_>>>()?;
    let outputs = interface
        .output_spec
        .iter()
        .map(|spec| declare(spec, spec.optional))
        .collect::<Result<Vec<_>>>()?;

    Ok(TaskDef {
        name: identifier(&record.name),
        inputs,
        outputs,
        command: String::new(),
        runtime: Default::default(),
        meta: Meta {
            title: interface.title,
            description: interface.summary,
        },
        parameter_meta: Default::default(),
        loc: None,
        native: Some(record.id.clone()),
    })
}

/// Stub every named applet in `folder`, newest record first.
pub fn import_native(
    platform: &dyn PlatformApi,
    session: &Session,
    project: &ProjectInfo,
    folder: &str,
    names: &[String],
    dialect: &Dialect,
) -> Result<Document> {
    let mut tasks = Vec::with_capacity(names.len());
    for name in names {
        let record = platform
            .list_executables(session, project, Some(folder), name)?
            .into_iter()
            .filter(|r| !r.archived)
            .max_by_key(|r| r.created)
            .ok_or_else(|| PlatformError::not_found("executable", format!("{}{}", folder, name)))?;
        tracing::debug!(name = %name, id = %record.id, "Generating stub");
        tasks.push(stub_task(&record, dialect)?);
    }
    Ok(Document {
        language: dialect.language,
        version: Some(dialect.version.clone()),
        source: None,
        structs: Vec::new(),
        tasks,
        workflow: None,
        subworkflows: Vec::new(),
        imports: Vec::new(),
    })
}

fn identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if out.chars().next().is_none_or(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{MockPlatform, NewExecutable};
    use serde_json::{Value as Json, json};

    fn wdl() -> Dialect {
        "wdl,1.0".parse().unwrap()
    }

    fn upload(platform: &MockPlatform, name: &str, kind: ExecutableKind, manifest: Json) -> String {
        let session = Session::new("alice");
        let project = platform.resolve_project(&session, "test").unwrap();
        platform
            .create_executable(
                &session,
                &project,
                NewExecutable {
                    name: name.to_string(),
                    folder: "/tools/".to_string(),
                    kind,
                    checksum: "c0ffee".to_string(),
                    manifest,
                },
            )
            .unwrap()
            .id
    }

    #[test]
    fn test_class_types() {
        assert_eq!(class_type("int"), Some(Type::Int));
        assert_eq!(class_type("array:file"), Some(Type::array(Type::File)));
        assert_eq!(class_type("hash"), Some(Type::Hash));
        assert_eq!(class_type("array:hash"), Some(Type::array(Type::Hash)));
        assert_eq!(class_type("record"), None);
    }

    #[test]
    fn test_stub_from_applet_interface() {
        let platform = MockPlatform::new();
        let id = upload(
            &platform,
            "bwa-mem",
            ExecutableKind::Applet,
            json!({
                "title": "BWA",
                "inputSpec": [
                    {"name": "reads", "class": "array:file"},
                    {"name": "threads", "class": "int", "default": 4},
                    {"name": "tag", "class": "string", "optional": true}
                ],
                "outputSpec": [{"name": "bam", "class": "file"}]
            }),
        );
        let session = Session::new("alice");
        let project = platform.resolve_project(&session, "test").unwrap();
        let doc = import_native(
            &platform,
            &session,
            &project,
            "/tools/",
            &["bwa-mem".to_string()],
            &wdl(),
        )
        .unwrap();

        let task = &doc.tasks[0];
        assert_eq!(task.name, "bwa_mem");
        assert_eq!(task.native.as_deref(), Some(id.as_str()));
        assert_eq!(task.meta.title.as_deref(), Some("BWA"));
        let types: Vec<&Json> = task.inputs.iter().map(|d| &d.ty).collect();
        assert_eq!(types, vec![&json!("Array[File]"), &json!("Int?"), &json!("String?")]);
        assert_eq!(task.outputs[0].ty, json!("File"));
        assert!(task.outputs[0].expr.is_none());
    }

    #[test]
    fn test_workflows_and_missing_names_are_rejected() {
        let platform = MockPlatform::new();
        upload(&platform, "pipeline", ExecutableKind::Workflow, json!({}));
        let session = Session::new("alice");
        let project = platform.resolve_project(&session, "test").unwrap();

        let err = import_native(
            &platform,
            &session,
            &project,
            "/tools/",
            &["pipeline".to_string()],
            &wdl(),
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_OPTIONS");

        let err = import_native(
            &platform,
            &session,
            &project,
            "/tools/",
            &["absent".to_string()],
            &wdl(),
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "PLATFORM_NOT_FOUND");
    }
}
