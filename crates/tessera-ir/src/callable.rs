// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Callables: tasks, workflow fragments and workflows.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{IrError, Result};
use crate::instance::ResourceRequest;
use crate::types::Type;
use crate::value::Value;

// ============================================================================
// Parameters
// ============================================================================

/// Presentation hints attached to a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ParameterAttr {
    Help(String),
    Label(String),
    Group(String),
    /// The file may be streamed instead of downloaded.
    Stream,
}

/// A typed input or output slot of a callable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<ParameterAttr>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            attributes: Vec::new(),
        }
    }

    /// Attach a default value, which must be well-typed.
    pub fn with_default(mut self, value: Value) -> Result<Self> {
        value.check(&self.ty)?;
        self.default = Some(value);
        Ok(self)
    }

    pub fn with_attributes(mut self, attributes: Vec<ParameterAttr>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Whether a caller must supply a value.
    pub fn is_required(&self) -> bool {
        self.default.is_none() && !self.ty.is_optional()
    }

    pub fn help(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a {
            ParameterAttr::Help(s) => Some(s.as_str()),
            _ => None,
        })
    }
}

/// Title and description shown for a callable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Attributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// Tasks
// ============================================================================

/// A resource requirement: either known at compile time or an expression
/// evaluated against the job's inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Requirement {
    Const(serde_json::Value),
    Expr(String),
}

/// Compute resources requested by a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<Requirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Requirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Requirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<Requirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<Requirement>,
}

impl Requirements {
    fn entries(&self) -> [(&'static str, Option<&Requirement>); 5] {
        [
            ("instance_type", self.instance_type.as_ref()),
            ("memory", self.memory.as_ref()),
            ("cpu", self.cpu.as_ref()),
            ("disk", self.disk.as_ref()),
            ("gpu", self.gpu.as_ref()),
        ]
    }

    /// True when no requirement depends on job inputs.
    pub fn is_static(&self) -> bool {
        self.entries()
            .iter()
            .all(|(_, r)| !matches!(r, Some(Requirement::Expr(_))))
    }

    /// Resolve into a concrete request, evaluating expressions with `eval`.
    pub fn evaluate<E, F>(&self, mut eval: F) -> std::result::Result<ResourceRequest, E>
    where
        E: From<IrError>,
        F: FnMut(&str) -> std::result::Result<serde_json::Value, E>,
    {
        let mut resolved: IndexMap<&'static str, serde_json::Value> = IndexMap::new();
        for (key, requirement) in self.entries() {
            let value = match requirement {
                None => continue,
                Some(Requirement::Const(v)) => v.clone(),
                Some(Requirement::Expr(expr)) => eval(expr)?,
            };
            if !value.is_null() {
                resolved.insert(key, value);
            }
        }
        Ok(ResourceRequest::from_values(&resolved)?)
    }

    /// Resolve a static requirement set; `None` if any entry is dynamic.
    pub fn evaluate_static(&self) -> Result<Option<ResourceRequest>> {
        if !self.is_static() {
            return Ok(None);
        }
        self.evaluate(|expr: &str| -> Result<serde_json::Value> {
            Err(IrError::InvalidRequirement {
                key: "expression",
                message: format!("'{}' is not static", expr),
            })
        })
        .map(Some)
    }
}

/// A task: a command template plus its typed inputs and outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub name: String,
    /// Source dialect tag, e.g. `wdl,1.0`.
    pub language: String,
    pub inputs: Vec<Parameter>,
    pub outputs: Vec<Parameter>,
    /// Input defaults that are expressions over other inputs.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub input_exprs: IndexMap<String, String>,
    /// Expression producing each output after the command has run.
    pub output_exprs: IndexMap<String, String>,
    /// Command template in runtime template syntax.
    pub command: String,
    #[serde(default)]
    pub requirements: Requirements,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
    /// Id of an existing platform executable this task stands for. Such a
    /// task is called by id and never built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<String>,
}

// ============================================================================
// Fragments
// ============================================================================

/// What a fragment evaluates at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FragmentKind {
    /// A flat run of declarations, optionally ending in one call.
    Expressions,
    /// Iterate `collection`, binding each element to `variable`.
    Scatter {
        variable: String,
        collection: String,
        #[serde(
            rename = "collectionSize",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        collection_size: Option<usize>,
    },
    /// Run the body only when `condition` holds.
    Conditional { condition: String },
    /// Computed workflow outputs.
    Outputs,
}

/// The single call a fragment launches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FragmentCall {
    /// Name the call's outputs are bound under.
    pub name: String,
    pub callee: String,
    pub inputs: IndexMap<String, String>,
}

/// The block a fragment was compiled from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FragmentBlock {
    /// Workflow the block belongs to.
    pub workflow: String,
    /// Position of the block in the workflow's block sequence.
    pub index: usize,
    pub kind: FragmentKind,
    /// Declarations evaluated before the call, in order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub expressions: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<FragmentCall>,
    /// Expression producing each fragment output once the body has run.
    #[serde(default)]
    pub outputs: IndexMap<String, String>,
}

/// A callable synthesized for a block that cannot be inlined as stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowFragment {
    pub name: String,
    pub inputs: Vec<Parameter>,
    pub outputs: Vec<Parameter>,
    pub block: FragmentBlock,
    #[serde(default)]
    pub attributes: Attributes,
}

// ============================================================================
// Workflows and stages
// ============================================================================

/// Arena index of a stage inside its workflow.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct StageId(pub usize);

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage-{}", self.0)
    }
}

/// Where a stage input (or a workflow output) takes its value from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StageInput {
    Const { value: Value },
    WorkflowInput { name: String },
    Link { stage: StageId, output: String },
}

/// One bound reference to a callable inside a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub id: StageId,
    /// Call name within the workflow (alias or callee name).
    pub name: String,
    pub callee: String,
    /// Bound inputs; callee inputs absent here are left to defaults or callers.
    pub inputs: IndexMap<String, StageInput>,
}

/// Whether a workflow is the document's entry point or a synthesized body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum WorkflowLevel {
    Top,
    Sub,
}

/// A workflow: a DAG of stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub name: String,
    pub inputs: Vec<Parameter>,
    pub outputs: Vec<Parameter>,
    /// Source of each output, keyed by output name.
    pub output_sources: IndexMap<String, StageInput>,
    pub stages: Vec<Stage>,
    /// External callers may not override stage bindings.
    #[serde(default)]
    pub locked: bool,
    pub level: WorkflowLevel,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Workflow {
    /// Re-check the stage DAG against the callables it references.
    pub fn verify(&self, lookup: &dyn Fn(&str) -> Option<Signature>) -> Result<()> {
        let mut builder = WorkflowBuilder::new(&self.name, self.level);
        for input in &self.inputs {
            builder.add_input(input.clone());
        }
        for (position, stage) in self.stages.iter().enumerate() {
            if stage.id.0 != position {
                return Err(IrError::graph(
                    &self.name,
                    format!("stage '{}' is stored at position {}", stage.id, position),
                ));
            }
            let signature =
                lookup(&stage.callee).ok_or_else(|| IrError::UnknownCallable(stage.callee.clone()))?;
            builder.add_stage(&stage.name, &signature, stage.inputs.clone())?;
        }
        for output in &self.outputs {
            let source = self.output_sources.get(&output.name).ok_or_else(|| {
                IrError::graph(&self.name, format!("output '{}' has no source", output.name))
            })?;
            builder.add_output(output.clone(), source.clone())?;
        }
        Ok(())
    }
}

/// The interface of a callable, as seen by a stage that calls it.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    pub inputs: Vec<Parameter>,
    pub outputs: Vec<Parameter>,
}

/// Builds a [`Workflow`], rejecting any binding that is not a backward edge.
pub struct WorkflowBuilder {
    name: String,
    level: WorkflowLevel,
    locked: bool,
    attributes: Attributes,
    inputs: Vec<Parameter>,
    stages: Vec<Stage>,
    stage_outputs: Vec<IndexMap<String, Type>>,
    outputs: Vec<Parameter>,
    output_sources: IndexMap<String, StageInput>,
}

impl WorkflowBuilder {
    pub fn new(name: &str, level: WorkflowLevel) -> Self {
        Self {
            name: name.to_string(),
            level,
            locked: false,
            attributes: Attributes::default(),
            inputs: Vec::new(),
            stages: Vec::new(),
            stage_outputs: Vec::new(),
            outputs: Vec::new(),
            output_sources: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn add_input(&mut self, parameter: Parameter) {
        self.inputs.push(parameter);
    }

    /// Id the next stage will receive.
    pub fn next_stage_id(&self) -> StageId {
        StageId(self.stages.len())
    }

    /// Append a stage calling `callee`; every binding must point backwards
    /// and carry a type the callee input accepts.
    pub fn add_stage(
        &mut self,
        name: &str,
        callee: &Signature,
        inputs: IndexMap<String, StageInput>,
    ) -> Result<StageId> {
        let id = self.next_stage_id();
        for (input, source) in &inputs {
            let parameter = callee.inputs.iter().find(|p| &p.name == input).ok_or_else(|| {
                IrError::graph(
                    &self.name,
                    format!("{} binds unknown input '{}' of '{}'", id, input, callee.name),
                )
            })?;
            let target = format!("{}.{}", name, input);
            self.check_source(id, &target, source, &parameter.ty)?;
        }
        self.stages.push(Stage {
            id,
            name: name.to_string(),
            callee: callee.name.clone(),
            inputs,
        });
        self.stage_outputs.push(
            callee
                .outputs
                .iter()
                .map(|p| (p.name.clone(), p.ty.clone()))
                .collect(),
        );
        Ok(id)
    }

    /// Declare a workflow output and where it comes from.
    pub fn add_output(&mut self, parameter: Parameter, source: StageInput) -> Result<()> {
        let position = self.next_stage_id();
        let target = format!("output '{}'", parameter.name);
        self.check_source(position, &target, &source, &parameter.ty)?;
        self.output_sources.insert(parameter.name.clone(), source);
        self.outputs.push(parameter);
        Ok(())
    }

    fn check_source(
        &self,
        position: StageId,
        target: &str,
        source: &StageInput,
        ty: &Type,
    ) -> Result<()> {
        let found = match source {
            StageInput::Const { value } => return value.check(ty),
            StageInput::WorkflowInput { name } => self
                .inputs
                .iter()
                .find(|p| &p.name == name)
                .map(|p| &p.ty)
                .ok_or_else(|| {
                    IrError::graph(
                        &self.name,
                        format!("{} references unknown workflow input '{}'", position, name),
                    )
                })?,
            StageInput::Link { stage, output } => {
                if *stage >= position {
                    return Err(IrError::graph(
                        &self.name,
                        format!("{} binds from {} which does not precede it", position, stage),
                    ));
                }
                self.stage_outputs
                    .get(stage.0)
                    .and_then(|outputs| outputs.get(output))
                    .ok_or_else(|| {
                        IrError::graph(&self.name, format!("{} has no output '{}'", stage, output))
                    })?
            }
        };
        if ty.accepts(found) {
            Ok(())
        } else {
            Err(IrError::BindingType {
                workflow: self.name.clone(),
                target: target.to_string(),
                expected: ty.to_string(),
                found: found.to_string(),
            })
        }
    }

    /// Signature of the workflow being built (inputs and outputs so far).
    pub fn signature(&self) -> Signature {
        Signature {
            name: self.name.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        }
    }

    pub fn build(self) -> Workflow {
        Workflow {
            name: self.name,
            inputs: self.inputs,
            outputs: self.outputs,
            output_sources: self.output_sources,
            stages: self.stages,
            locked: self.locked,
            level: self.level,
            attributes: self.attributes,
        }
    }
}

// ============================================================================
// Callable
// ============================================================================

/// Discriminant of [`Callable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum CallableKind {
    Task,
    Fragment,
    Workflow,
}

/// A named compiled unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "callable", rename_all = "camelCase")]
pub enum Callable {
    Task(Task),
    Fragment(WorkflowFragment),
    Workflow(Workflow),
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Task(t) => &t.name,
            Callable::Fragment(f) => &f.name,
            Callable::Workflow(w) => &w.name,
        }
    }

    pub fn kind(&self) -> CallableKind {
        match self {
            Callable::Task(_) => CallableKind::Task,
            Callable::Fragment(_) => CallableKind::Fragment,
            Callable::Workflow(_) => CallableKind::Workflow,
        }
    }

    pub fn inputs(&self) -> &[Parameter] {
        match self {
            Callable::Task(t) => &t.inputs,
            Callable::Fragment(f) => &f.inputs,
            Callable::Workflow(w) => &w.inputs,
        }
    }

    pub fn outputs(&self) -> &[Parameter] {
        match self {
            Callable::Task(t) => &t.outputs,
            Callable::Fragment(f) => &f.outputs,
            Callable::Workflow(w) => &w.outputs,
        }
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            Callable::Task(t) => &t.attributes,
            Callable::Fragment(f) => &f.attributes,
            Callable::Workflow(w) => &w.attributes,
        }
    }

    pub fn signature(&self) -> Signature {
        Signature {
            name: self.name().to_string(),
            inputs: self.inputs().to_vec(),
            outputs: self.outputs().to_vec(),
        }
    }

    /// Names of the callables this one invokes.
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            Callable::Task(_) => Vec::new(),
            Callable::Fragment(f) => f.block.call.iter().map(|c| c.callee.as_str()).collect(),
            Callable::Workflow(w) => {
                let mut deps: Vec<&str> = Vec::new();
                for stage in &w.stages {
                    if !deps.contains(&stage.callee.as_str()) {
                        deps.push(&stage.callee);
                    }
                }
                deps
            }
        }
    }
}
