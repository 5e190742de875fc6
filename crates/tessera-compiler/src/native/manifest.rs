// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Platform manifests for compiled callables.
//!
//! Tasks and fragments become applets; workflows become platform workflows
//! whose stage inputs use the platform's link syntax:
//!
//! ```json
//! {"$link": {"stage": "stage-0", "outputField": "inc___y"}}
//! {"$link": {"workflowInputField": "reads"}}
//! ```
//!
//! Platform field names may not contain `.`, so dotted IR names are encoded
//! with `___`.

use indexmap::IndexMap;
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use serde_json::{Value as Json, json};
use sha2::{Digest, Sha256};
use tessera_ir::{
    Bundle, Callable, FragmentKind, InstanceTypeCatalog, IrError, Parameter, ParameterAttr,
    StageInput, Task, Type, Workflow, WorkflowFragment, WorkflowLevel,
};

use super::{CompiledExecutable, CompilerOptions};
use crate::error::Result;
use crate::inputs::FileResolver;
use crate::platform::ExecutableKind;

const TASK_SCRIPT: &str = r#"#!/usr/bin/env bash
# {{ name }}: task applet generated by tessera
set -euo pipefail

main() {
    tessera-task --home "$HOME" prolog
    if [ -f "$HOME/meta/relaunched.json" ]; then
        exit 0
    fi
    tessera-task --home "$HOME" instantiate-command
{%- if container %}
    docker run --rm -v "$HOME:$HOME" -w "$HOME/work" {{ container }} bash "$HOME/meta/command.sh"
{%- else %}
    bash "$HOME/meta/command.sh"
{%- endif %}
    tessera-task --home "$HOME" epilog
}
"#;

const FRAGMENT_SCRIPT: &str = r#"#!/usr/bin/env bash
# {{ name }}: {{ kind }} fragment generated by tessera
set -euo pipefail

main() {
    tessera-fragment --home "$HOME" {{ kind }}{% if chunk_size %} --chunk-size {{ chunk_size }}{% endif %}
}
"#;

/// Input or output slot of an executable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoSpec {
    pub name: String,
    pub class: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSpec {
    pub interpreter: String,
    pub code: String,
    pub instance_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_policy: Option<Json>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<String>,
}

/// How a scatter fragment fans out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum ScatterPlan {
    /// Collection length known at compile time; one job per element.
    Static { size: usize },
    /// Unknown length; launch jobs in batches of `chunk_size`.
    #[serde(rename_all = "camelCase")]
    Chunked { chunk_size: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppletDetails {
    /// The compiled callable, read back by the job runner.
    pub callable: Callable,
    /// Executable id of every callee, by callable name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependencies: IndexMap<String, String>,
    /// Requirements depend on inputs and are checked when the job starts.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub instance_check: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scatter: Option<ScatterPlan>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub type_aliases: IndexMap<String, Type>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppletManifest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub input_spec: Vec<IoSpec>,
    pub output_spec: Vec<IoSpec>,
    pub run_spec: RunSpec,
    pub details: AppletDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageManifest {
    pub id: String,
    pub name: String,
    pub executable: String,
    pub input: IndexMap<String, Json>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowOutput {
    #[serde(flatten)]
    pub spec: IoSpec,
    pub output_source: Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowManifest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub input_spec: Vec<IoSpec>,
    pub output_spec: Vec<WorkflowOutput>,
    pub stages: Vec<StageManifest>,
    /// Callers may not override stage inputs.
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ignore_reuse: bool,
    /// Runs keep their job workspaces until the platform's retention expires.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub delay_workspace_destruction: bool,
    pub level: WorkflowLevel,
}

/// What gets uploaded for one callable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "camelCase")]
pub enum Manifest {
    Applet(AppletManifest),
    Workflow(WorkflowManifest),
}

impl Manifest {
    pub fn kind(&self) -> ExecutableKind {
        match self {
            Manifest::Applet(_) => ExecutableKind::Applet,
            Manifest::Workflow(_) => ExecutableKind::Workflow,
        }
    }

    pub fn to_json(&self) -> Result<Json> {
        Ok(serde_json::to_value(self)?)
    }

    /// SHA-256 of the serialized manifest.
    ///
    /// Callee ids are part of the manifest, so a rebuilt dependency changes
    /// the checksum of everything above it.
    pub fn checksum(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Encode an IR name as a platform field name.
pub fn encode_name(name: &str) -> String {
    name.replace('.', "___")
}

pub fn decode_name(name: &str) -> String {
    name.replace("___", ".")
}

/// Platform IO class of a type.
pub fn io_class(ty: &Type) -> String {
    fn primitive(ty: &Type) -> Option<&'static str> {
        match ty {
            Type::Boolean => Some("boolean"),
            Type::Int => Some("int"),
            Type::Float => Some("float"),
            Type::String | Type::Directory => Some("string"),
            Type::File => Some("file"),
            _ => None,
        }
    }
    let ty = ty.unwrap_optional();
    if let Some(class) = primitive(ty) {
        return class.to_string();
    }
    match ty {
        Type::Array { item, .. } => match primitive(item) {
            Some(class) => format!("array:{}", class),
            None => "hash".to_string(),
        },
        _ => "hash".to_string(),
    }
}

pub fn io_spec(parameter: &Parameter, files: &FileResolver) -> IoSpec {
    let mut spec = IoSpec {
        name: encode_name(&parameter.name),
        class: io_class(&parameter.ty),
        optional: !parameter.is_required(),
        default: parameter.default.as_ref().map(|v| files.to_native_json(v)),
        help: None,
        label: None,
        group: None,
        stream: false,
    };
    for attribute in &parameter.attributes {
        match attribute {
            ParameterAttr::Help(text) => spec.help = Some(text.clone()),
            ParameterAttr::Label(text) => spec.label = Some(text.clone()),
            ParameterAttr::Group(text) => spec.group = Some(text.clone()),
            ParameterAttr::Stream => spec.stream = true,
        }
    }
    spec
}

/// Platform reference for a stage binding or workflow output source.
pub fn link(source: &StageInput, files: &FileResolver) -> Json {
    match source {
        StageInput::Const { value } => files.to_native_json(value),
        StageInput::WorkflowInput { name } => {
            json!({"$link": {"workflowInputField": encode_name(name)}})
        }
        StageInput::Link { stage, output } => {
            json!({"$link": {"stage": stage.to_string(), "outputField": encode_name(output)}})
        }
    }
}

/// Everything the manifest builder reads besides the callable itself.
pub struct ManifestContext<'a> {
    pub bundle: &'a Bundle,
    pub compiled: &'a IndexMap<String, CompiledExecutable>,
    pub catalog: &'a InstanceTypeCatalog,
    pub options: &'a CompilerOptions,
    pub files: &'a FileResolver,
}

impl ManifestContext<'_> {
    fn executable_id(&self, callee: &str) -> Result<String> {
        Ok(self
            .compiled
            .get(callee)
            .ok_or_else(|| IrError::UnknownCallable(callee.to_string()))?
            .id
            .clone())
    }

    /// Build the manifest for `callable`.
    pub fn build(&self, callable: &Callable) -> Result<Manifest> {
        match callable {
            Callable::Task(task) => self.task(callable, task),
            Callable::Fragment(fragment) => self.fragment(callable, fragment),
            Callable::Workflow(workflow) => self.workflow(workflow),
        }
    }

    fn specs(&self, parameters: &[Parameter]) -> Vec<IoSpec> {
        parameters.iter().map(|p| io_spec(p, self.files)).collect()
    }

    fn render(&self, source: &str, ctx: minijinja::Value) -> Result<String> {
        let mut env = Environment::new();
        env.add_template("script", source)?;
        Ok(env.get_template("script")?.render(ctx)?)
    }

    fn task(&self, callable: &Callable, task: &Task) -> Result<Manifest> {
        let (instance, instance_check) = match task.requirements.evaluate_static()? {
            Some(request) if !request.is_empty() => (self.catalog.choose(&request)?, false),
            Some(_) => (self.catalog.default_instance()?, false),
            None => (self.catalog.default_instance()?, true),
        };
        tracing::debug!(
            task = %task.name,
            instance_type = %instance.name,
            instance_check,
            "Selected instance type"
        );
        let code = self.render(
            TASK_SCRIPT,
            context! { name => &task.name, container => &task.container },
        )?;
        Ok(Manifest::Applet(AppletManifest {
            name: task.name.clone(),
            title: task.attributes.title.clone(),
            summary: task.attributes.description.clone(),
            input_spec: self.specs(&task.inputs),
            output_spec: self.specs(&task.outputs),
            run_spec: self.run_spec(code, &instance.name),
            details: AppletDetails {
                callable: callable.clone(),
                dependencies: IndexMap::new(),
                instance_check,
                scatter: None,
                type_aliases: self.bundle.type_aliases.clone(),
            },
        }))
    }

    fn fragment(&self, callable: &Callable, fragment: &WorkflowFragment) -> Result<Manifest> {
        let (kind, scatter) = match &fragment.block.kind {
            FragmentKind::Expressions => ("expressions", None),
            FragmentKind::Conditional { .. } => ("conditional", None),
            FragmentKind::Outputs => ("outputs", None),
            FragmentKind::Scatter {
                collection_size: Some(size),
                ..
            } => ("scatter", Some(ScatterPlan::Static { size: *size })),
            FragmentKind::Scatter {
                collection_size: None,
                ..
            } => (
                "scatter",
                Some(ScatterPlan::Chunked {
                    chunk_size: self.options.scatter_chunk_size,
                }),
            ),
        };
        let chunk_size = match &scatter {
            Some(ScatterPlan::Chunked { chunk_size }) => Some(*chunk_size),
            _ => None,
        };

        let mut dependencies = IndexMap::new();
        if let Some(call) = &fragment.block.call {
            dependencies.insert(call.callee.clone(), self.executable_id(&call.callee)?);
        }
        let instance = self.catalog.default_instance()?;
        let code = self.render(
            FRAGMENT_SCRIPT,
            context! { name => &fragment.name, kind, chunk_size },
        )?;
        Ok(Manifest::Applet(AppletManifest {
            name: fragment.name.clone(),
            title: fragment.attributes.title.clone(),
            summary: fragment.attributes.description.clone(),
            input_spec: self.specs(&fragment.inputs),
            output_spec: self.specs(&fragment.outputs),
            run_spec: self.run_spec(code, &instance.name),
            details: AppletDetails {
                callable: callable.clone(),
                dependencies,
                instance_check: false,
                scatter,
                type_aliases: self.bundle.type_aliases.clone(),
            },
        }))
    }

    fn run_spec(&self, code: String, instance_type: &str) -> RunSpec {
        RunSpec {
            interpreter: "bash".to_string(),
            code,
            instance_type: instance_type.to_string(),
            timeout_policy: self.options.extras.timeout_policy().cloned(),
            assets: self.options.runtime_asset.iter().cloned().collect(),
        }
    }

    fn workflow(&self, workflow: &Workflow) -> Result<Manifest> {
        let mut stages = Vec::with_capacity(workflow.stages.len());
        for stage in &workflow.stages {
            let input = stage
                .inputs
                .iter()
                .map(|(name, source)| (encode_name(name), link(source, self.files)))
                .collect();
            stages.push(StageManifest {
                id: stage.id.to_string(),
                name: stage.name.clone(),
                executable: self.executable_id(&stage.callee)?,
                input,
            });
        }

        let is_primary = self.bundle.primary.as_deref() == Some(workflow.name.as_str());
        if is_primary && let Some(reorg) = &self.options.extras.custom_reorg_attributes {
            let mut input = IndexMap::new();
            if let Some(config) = &reorg.config_file {
                input.insert("reorg_conf___".to_string(), json!({"$file": config}));
            }
            stages.push(StageManifest {
                id: "stage-reorg".to_string(),
                name: "reorg".to_string(),
                executable: reorg.app_uri.clone(),
                input,
            });
        }

        let mut output_spec = Vec::with_capacity(workflow.outputs.len());
        for output in &workflow.outputs {
            let source = workflow.output_sources.get(&output.name).ok_or_else(|| {
                IrError::graph(&workflow.name, format!("output '{}' has no source", output.name))
            })?;
            output_spec.push(WorkflowOutput {
                spec: io_spec(output, self.files),
                output_source: link(source, self.files),
            });
        }

        Ok(Manifest::Workflow(WorkflowManifest {
            name: workflow.name.clone(),
            title: workflow.attributes.title.clone(),
            summary: workflow.attributes.description.clone(),
            input_spec: self.specs(&workflow.inputs),
            output_spec,
            stages,
            locked: workflow.locked,
            ignore_reuse: self.options.extras.ignore_reuse,
            delay_workspace_destruction: self.options.extras.delay_workspace_destruction,
            level: workflow.level,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_ir::{StageId, Value};

    #[test]
    fn test_io_classes() {
        assert_eq!(io_class(&Type::Int), "int");
        assert_eq!(io_class(&Type::optional(Type::File)), "file");
        assert_eq!(io_class(&Type::array(Type::String)), "array:string");
        assert_eq!(io_class(&Type::array(Type::array(Type::Int))), "hash");
        assert_eq!(io_class(&Type::Hash), "hash");
        assert_eq!(io_class(&Type::record("S", IndexMap::new())), "hash");
    }

    #[test]
    fn test_dotted_names_are_encoded() {
        assert_eq!(encode_name("inc.y"), "inc___y");
        assert_eq!(decode_name(&encode_name("a.b.c")), "a.b.c");
    }

    #[test]
    fn test_links() {
        let files = FileResolver::new();
        assert_eq!(
            link(
                &StageInput::Link {
                    stage: StageId(2),
                    output: "inc.y".into()
                },
                &files
            ),
            json!({"$link": {"stage": "stage-2", "outputField": "inc___y"}})
        );
        assert_eq!(
            link(&StageInput::WorkflowInput { name: "n".into() }, &files),
            json!({"$link": {"workflowInputField": "n"}})
        );
        assert_eq!(
            link(
                &StageInput::Const {
                    value: Value::Int(3)
                },
                &files
            ),
            json!(3)
        );
    }

    #[test]
    fn test_io_spec_carries_attributes_and_defaults() {
        let mut files = FileResolver::new();
        files.insert("s3://b/ref.fa", "file-000009");
        let parameter = Parameter::new("reference", Type::File)
            .with_default(Value::File("s3://b/ref.fa".into()))
            .unwrap()
            .with_attributes(vec![
                ParameterAttr::Help("FASTA reference".into()),
                ParameterAttr::Stream,
            ]);
        let spec = io_spec(&parameter, &files);
        assert!(spec.optional);
        assert!(spec.stream);
        assert_eq!(spec.help.as_deref(), Some("FASTA reference"));
        assert_eq!(spec.default, Some(json!({"$file": "file-000009"})));
    }
}
