// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Binding external input files to a bundle.
//!
//! Input files are flat JSON objects keyed by dotted names:
//! `wf.input` for an input of the primary callable and `wf.call.input` for an
//! input of a call in an unlocked primary workflow. Defaults are embedded
//! into the bundle; inputs are frozen into [`Bundle::inputs`]. Every file
//! referenced by either is resolved to a platform file id.

use indexmap::IndexMap;
use serde_json::{Value as Json, json};
use tessera_frontend::Dialect;
use tessera_ir::value::{DIRECTORY_KEY, FILE_KEY};
use tessera_ir::{Bundle, Callable, PathKind, StageInput, Type, Value};

use crate::error::{CompileError, Result};
use crate::platform::{PlatformApi, PlatformError, ProjectInfo, Session};

/// Where input files get resolved.
pub struct Destination<'a> {
    pub platform: &'a dyn PlatformApi,
    pub session: &'a Session,
    pub project: &'a ProjectInfo,
}

/// Maps file URIs found in inputs to platform file ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileResolver {
    ids: IndexMap<String, String>,
}

impl FileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uri: impl Into<String>, id: impl Into<String>) {
        self.ids.insert(uri.into(), id.into());
    }

    pub fn get(&self, uri: &str) -> Option<&str> {
        self.ids.get(uri).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.ids.iter().map(|(u, i)| (u.as_str(), i.as_str()))
    }

    /// Native JSON for `value`, replacing resolved URIs with file ids.
    pub fn to_native_json(&self, value: &Value) -> Json {
        value.encode_with(&|kind, uri| {
            let id = self.get(uri).unwrap_or(uri);
            match kind {
                PathKind::File => json!({ FILE_KEY: id }),
                PathKind::Directory => json!({ DIRECTORY_KEY: id }),
            }
        })
    }
}

/// What an input key refers to.
#[derive(Debug, Clone, PartialEq)]
enum Target {
    /// Index into the primary callable's inputs.
    Input(usize),
    /// An input of a stage of the primary workflow.
    StageInput { stage: usize, input: String },
}

struct Resolved {
    target: Target,
    ty: Type,
    /// Key without the primary's name.
    local: String,
}

/// Apply defaults and inputs files to `bundle`.
///
/// Unknown names fail with `UnknownInputName` in `inputs`, and are dropped
/// with a warning in `defaults`.
pub fn translate_inputs(
    mut bundle: Bundle,
    dialect: &Dialect,
    inputs: &[Json],
    defaults: Option<&Json>,
    destination: &Destination<'_>,
) -> Result<(Bundle, FileResolver)> {
    let frontend = dialect.frontend();
    let mut referenced: Vec<Value> = Vec::new();

    if let Some(defaults) = defaults {
        let mut applied = 0;
        for (key, json) in entries(defaults)? {
            let Some(resolved) = resolve_key(&bundle, key) else {
                tracing::warn!(key = %key, "Dropping default for unknown input");
                continue;
            };
            let value = frontend.to_ir_value(json, &resolved.ty)?;
            referenced.push(value.clone());
            embed_default(&mut bundle, &resolved.target, value)?;
            applied += 1;
        }
        tracing::debug!(applied, "Embedded default values");
    }

    if !inputs.is_empty() {
        let mut frozen: IndexMap<String, Value> = IndexMap::new();
        for file in inputs {
            for (key, json) in entries(file)? {
                let resolved =
                    resolve_key(&bundle, key).ok_or_else(|| CompileError::UnknownInputName(key.clone()))?;
                let value = frontend.to_ir_value(json, &resolved.ty)?;
                referenced.push(value.clone());
                if frozen.insert(resolved.local.clone(), value).is_some() {
                    tracing::warn!(key = %key, "Input set more than once; keeping the last value");
                }
            }
        }
        bundle.inputs = Some(frozen);
    }

    bundle.validate()?;

    let mut resolver = FileResolver::new();
    for value in &referenced {
        for (_, uri) in value.paths() {
            if resolver.get(uri).is_some() {
                continue;
            }
            let id = destination
                .platform
                .resolve_file(destination.session, destination.project, uri)
                .map_err(|e| match e {
                    PlatformError::NotFound { .. } => CompileError::FileNotFound(uri.to_string()),
                    other => CompileError::Platform(other),
                })?;
            resolver.insert(uri, id);
        }
    }
    tracing::info!(files = resolver.len(), "Resolved input files");
    Ok((bundle, resolver))
}

fn entries(file: &Json) -> Result<&serde_json::Map<String, Json>> {
    file.as_object()
        .ok_or_else(|| CompileError::translation(None, "input file must be a JSON object"))
}

fn resolve_key(bundle: &Bundle, key: &str) -> Option<Resolved> {
    let primary = bundle.primary()?;
    let local = key.strip_prefix(primary.name())?.strip_prefix('.')?;

    if let Some(index) = primary.inputs().iter().position(|p| p.name == local) {
        return Some(Resolved {
            target: Target::Input(index),
            ty: primary.inputs()[index].ty.clone(),
            local: local.to_string(),
        });
    }

    let Callable::Workflow(workflow) = primary else {
        return None;
    };
    if workflow.locked {
        return None;
    }
    let (call, input) = local.split_once('.')?;
    let stage = workflow.stages.iter().find(|s| s.name == call)?;
    let parameter = bundle
        .get(&stage.callee)?
        .inputs()
        .iter()
        .find(|p| p.name == input)?;
    Some(Resolved {
        target: Target::StageInput {
            stage: stage.id.0,
            input: input.to_string(),
        },
        ty: parameter.ty.clone(),
        local: local.to_string(),
    })
}

fn embed_default(bundle: &mut Bundle, target: &Target, value: Value) -> Result<()> {
    let Some(name) = bundle.primary.clone() else {
        return Ok(());
    };
    let Some(primary) = bundle.callables.get_mut(&name) else {
        return Ok(());
    };
    match (target, primary) {
        (Target::Input(index), Callable::Task(task)) => set_default(&mut task.inputs[*index], value),
        (Target::Input(index), Callable::Workflow(workflow)) => {
            set_default(&mut workflow.inputs[*index], value)
        }
        (Target::StageInput { stage, input }, Callable::Workflow(workflow)) => {
            workflow.stages[*stage]
                .inputs
                .insert(input.clone(), StageInput::Const { value });
            Ok(())
        }
        _ => Ok(()),
    }
}

fn set_default(parameter: &mut tessera_ir::Parameter, value: Value) -> Result<()> {
    value.check(&parameter.ty)?;
    parameter.default = Some(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MockPlatform;
    use crate::translate::{TranslateOptions, translate};
    use tessera_frontend::Document;

    fn bundle(locked: bool) -> Bundle {
        // A locked workflow must bind every required call input.
        let call_inputs = if locked {
            json!({"reads": {"ident": "reads"}, "min": {"literal": 1}})
        } else {
            json!({"reads": {"ident": "reads"}})
        };
        let doc: Document = serde_json::from_value(json!({
            "language": "wdl",
            "tasks": [{
                "name": "count",
                "inputs": [{"name": "reads", "type": "File"}, {"name": "min", "type": "Int"}],
                "outputs": [{"name": "n", "type": "Int", "expr": {"apply": {"func": "read_int", "args": [{"apply": {"func": "stdout", "args": []}}]}}}],
                "command": "wc -l ~{reads}"
            }],
            "workflow": {
                "name": "wf",
                "inputs": [{"name": "reads", "type": "File"}],
                "body": [{"node": "call", "callee": "count", "inputs": call_inputs}],
                "outputs": [{"name": "n", "type": "Int", "expr": {"ident": "count.n"}}]
            }
        }))
        .unwrap();
        let options = TranslateOptions {
            locked,
            ..Default::default()
        };
        translate(&doc, &"wdl".parse().unwrap(), &options).unwrap()
    }

    fn run(
        bundle: Bundle,
        inputs: &[Json],
        defaults: Option<&Json>,
    ) -> Result<(Bundle, FileResolver)> {
        let platform = MockPlatform::new();
        let session = Session::new("alice");
        let project = platform.resolve_project(&session, "test").unwrap();
        let destination = Destination {
            platform: &platform,
            session: &session,
            project: &project,
        };
        let dialect: Dialect = "wdl".parse().unwrap();
        translate_inputs(bundle, &dialect, inputs, defaults, &destination)
    }

    #[test]
    fn test_inputs_are_frozen_and_files_resolved() {
        let (bundle, files) = run(
            bundle(false),
            &[json!({"wf.reads": "s3://bucket/a.fq", "wf.count.min": 3})],
            None,
        )
        .unwrap();
        let inputs = bundle.inputs.as_ref().unwrap();
        assert_eq!(inputs["reads"], Value::File("s3://bucket/a.fq".into()));
        assert_eq!(inputs["count.min"], Value::Int(3));
        assert_eq!(files.len(), 1);
        assert_eq!(
            files.to_native_json(&inputs["reads"]),
            json!({"$file": files.get("s3://bucket/a.fq").unwrap()})
        );
    }

    #[test]
    fn test_unknown_input_name() {
        let err = run(bundle(false), &[json!({"nonexistent.input": 1})], None).unwrap_err();
        assert!(matches!(err, CompileError::UnknownInputName(ref k) if k == "nonexistent.input"));

        let err = run(bundle(false), &[json!({"wf.count.missing": 1})], None).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_INPUT_NAME");
    }

    #[test]
    fn test_locked_workflow_hides_call_inputs() {
        let err = run(bundle(true), &[json!({"wf.count.min": 3})], None).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_INPUT_NAME");
    }

    #[test]
    fn test_defaults_are_embedded_and_unknown_dropped() {
        let defaults = json!({"wf.reads": "s3://bucket/default.fq", "wf.count.min": 5, "other.x": 1});
        let (bundle, files) = run(bundle(false), &[], Some(&defaults)).unwrap();
        assert!(bundle.inputs.is_none());
        let Some(Callable::Workflow(wf)) = bundle.get("wf") else {
            panic!("expected workflow");
        };
        assert_eq!(
            wf.inputs[0].default,
            Some(Value::File("s3://bucket/default.fq".into()))
        );
        assert_eq!(
            wf.stages[0].inputs["min"],
            StageInput::Const {
                value: Value::Int(5)
            }
        );
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_ill_typed_input_is_rejected() {
        let err = run(bundle(false), &[json!({"wf.count.min": "three"})], None).unwrap_err();
        assert_eq!(err.error_code(), "TYPE_CONVERSION");
    }
}
