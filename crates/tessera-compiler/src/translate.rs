// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Translation of parsed documents into an IR [`Bundle`].
//!
//! Tasks map one to one. Each workflow is run through the block analyzer;
//! flat runs of plain calls are inlined as stages, and everything else
//! becomes a fragment referenced by a single stage. Compound blocks too
//! complex for one fragment are split into a synthesized sub-workflow plus a
//! fragment that calls it.

use indexmap::IndexMap;
use serde_json::Value as Json;
use std::path::PathBuf;
use tessera_frontend::{
    CallNode, Declaration, Dialect, Document, Expr, Frontend, Meta, ParameterMeta, TaskDef,
    TypeContext, WorkflowDef, WorkflowNode,
};
use tessera_ir::{
    Attributes, Bundle, Callable, FragmentBlock, FragmentCall, FragmentKind, Parameter,
    ParameterAttr, Requirement, Requirements, Signature, StageId, StageInput, Task, Type,
    Workflow, WorkflowBuilder, WorkflowFragment, WorkflowLevel,
};

use crate::block::{Block, BlockAnalyzer, BlockKind, Body, NodeId, WorkflowAnalysis, resolve};
use crate::error::{CompileError, Result};
use crate::imports;

/// Options that change the shape of the produced bundle.
#[derive(Debug, Clone, Default)]
pub struct TranslateOptions {
    /// Forbid callers from overriding stage inputs of the primary workflow.
    pub locked: bool,
    /// Runtime attributes applied to tasks that do not set them.
    pub default_runtime: IndexMap<String, Json>,
    /// Directories searched for imported documents.
    pub imports: Vec<PathBuf>,
}

/// Translate a parsed document into a bundle.
pub fn translate(document: &Document, dialect: &Dialect, options: &TranslateOptions) -> Result<Bundle> {
    let merged;
    let document = if document.imports.is_empty() {
        document
    } else {
        merged = imports::resolve(document, dialect, &options.imports)?;
        &merged
    };
    let frontend = dialect.frontend();
    let ctx = frontend.type_context(document)?;
    let mut translator = Translator {
        frontend,
        dialect,
        ctx,
        options,
        bundle: Bundle::new(),
    };
    translator.bundle.type_aliases = translator.ctx.schemas().clone();

    for task in &document.tasks {
        let task = translator.task(task)?;
        translator.bundle.insert(Callable::Task(task))?;
    }
    for def in subworkflow_order(&document.subworkflows)? {
        let workflow = translator.workflow(def, WorkflowLevel::Sub)?;
        translator.bundle.insert(Callable::Workflow(workflow))?;
    }
    let primary = match &document.workflow {
        Some(def) => {
            let workflow = translator.workflow(def, WorkflowLevel::Top)?;
            let name = workflow.name.clone();
            translator.bundle.insert(Callable::Workflow(workflow))?;
            Some(name)
        }
        None if document.tasks.len() == 1 => Some(document.tasks[0].name.clone()),
        None => None,
    };

    let mut bundle = translator.bundle;
    bundle.primary = primary;
    bundle.validate()?;
    tracing::info!(
        dialect = %dialect,
        callables = bundle.callables.len(),
        primary = bundle.primary.as_deref().unwrap_or("-"),
        "Translated document"
    );
    Ok(bundle)
}

/// Expression defaults ordered so that each follows the defaults it reads.
fn deferred_order<'d>(def: &TaskDef, deferred: &IndexMap<&'d str, &'d Expr>) -> Result<Vec<&'d str>> {
    fn visit<'d>(
        name: &'d str,
        deferred: &IndexMap<&'d str, &'d Expr>,
        path: &mut Vec<&'d str>,
        out: &mut Vec<&'d str>,
    ) -> std::result::Result<(), String> {
        if out.contains(&name) {
            return Ok(());
        }
        if path.contains(&name) {
            path.push(name);
            return Err(path.join(" -> "));
        }
        path.push(name);
        if let Some(expr) = deferred.get(name) {
            for reference in expr.references() {
                if let Some((key, _)) = deferred.get_key_value(reference) {
                    visit(*key, deferred, path, out)?;
                }
            }
        }
        path.pop();
        out.push(name);
        Ok(())
    }

    let mut out = Vec::with_capacity(deferred.len());
    for name in deferred.keys().copied() {
        visit(name, deferred, &mut Vec::new(), &mut out).map_err(|cycle| {
            CompileError::translation(
                def.loc,
                format!("input defaults of task '{}' depend on each other: {}", def.name, cycle),
            )
        })?;
    }
    Ok(out)
}

/// Sub-workflows ordered so that each comes after every sub-workflow it calls.
fn subworkflow_order(defs: &[WorkflowDef]) -> Result<Vec<&WorkflowDef>> {
    fn visit<'d>(
        def: &'d WorkflowDef,
        defs: &'d [WorkflowDef],
        path: &mut Vec<&'d str>,
        out: &mut Vec<&'d WorkflowDef>,
    ) -> Result<()> {
        if out.iter().any(|done| done.name == def.name) {
            return Ok(());
        }
        if path.contains(&def.name.as_str()) {
            return Err(CompileError::translation(
                def.loc,
                format!("workflow '{}' calls itself through {}", def.name, path.join(" -> ")),
            ));
        }
        path.push(&def.name);
        for callee in def.callees() {
            if let Some(next) = defs.iter().find(|d| d.name == callee) {
                visit(next, defs, path, out)?;
            }
        }
        path.pop();
        out.push(def);
        Ok(())
    }

    let mut out = Vec::with_capacity(defs.len());
    for def in defs {
        visit(def, defs, &mut Vec::new(), &mut out)?;
    }
    Ok(out)
}

/// Per-workflow bookkeeping while stages are added.
struct WorkflowState {
    name: String,
    /// Every required call input must be bound; set for a locked primary
    /// and the blocks split out of it.
    locked: bool,
    builder: WorkflowBuilder,
    /// Where each visible binding comes from.
    sources: IndexMap<String, StageInput>,
    fragments: usize,
    blocks: usize,
}

impl WorkflowState {
    fn next_fragment_name(&mut self) -> String {
        self.fragments += 1;
        format!("{}_frag_{}", self.name, self.fragments)
    }

    fn next_block_name(&mut self) -> String {
        self.blocks += 1;
        format!("{}_block_{}", self.name, self.blocks)
    }
}

/// What a workflow exposes as outputs.
enum OutputSpec<'d> {
    /// Source output declarations of a document workflow.
    Declared(&'d [Declaration]),
    /// Bindings of a synthesized sub-workflow, passed through by name.
    Bindings(IndexMap<String, Type>),
}

struct Translator<'a> {
    frontend: &'static dyn Frontend,
    dialect: &'a Dialect,
    ctx: TypeContext,
    options: &'a TranslateOptions,
    bundle: Bundle,
}

impl Translator<'_> {
    fn ir_type(&self, decl: &Declaration) -> Result<Type> {
        self.frontend
            .to_ir_type(&decl.ty, &self.ctx)
            .map_err(|e| CompileError::translation(decl.loc, format!("'{}': {}", decl.name, e)))
    }

    fn constant_value(&self, decl: &Declaration, json: &Json, ty: &Type) -> Result<tessera_ir::Value> {
        self.frontend
            .to_ir_value(json, ty)
            .map_err(|e| CompileError::translation(decl.loc, format!("'{}': {}", decl.name, e)))
    }

    fn signature(&self, callee: &str, call: &CallNode) -> Result<Signature> {
        self.bundle
            .get(callee)
            .map(Callable::signature)
            .ok_or_else(|| CompileError::translation(call.loc, format!("unknown callee '{}'", callee)))
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    fn task(&self, def: &TaskDef) -> Result<Task> {
        let mut inputs = Vec::with_capacity(def.inputs.len());
        let mut deferred: IndexMap<&str, &Expr> = IndexMap::new();
        for decl in &def.inputs {
            let ty = self.ir_type(decl)?;
            let attributes = parameter_attributes(def.parameter_meta.get(&decl.name));
            let parameter = match &decl.expr {
                None => Parameter::new(&decl.name, ty),
                Some(expr) => match expr.constant() {
                    Some(json) => {
                        let value = self.constant_value(decl, &json, &ty)?;
                        Parameter::new(&decl.name, ty).with_default(value)?
                    }
                    None => {
                        deferred.insert(&decl.name, expr);
                        Parameter::new(&decl.name, Type::optional(ty))
                    }
                },
            };
            inputs.push(parameter.with_attributes(attributes));
        }
        let input_exprs = deferred_order(def, &deferred)?
            .into_iter()
            .map(|name| (name.to_string(), self.frontend.render_expr(deferred[name])))
            .collect();

        let mut outputs = Vec::with_capacity(def.outputs.len());
        let mut output_exprs = IndexMap::new();
        for decl in &def.outputs {
            outputs.push(Parameter::new(&decl.name, self.ir_type(decl)?));
            match &decl.expr {
                Some(expr) => {
                    output_exprs.insert(decl.name.clone(), self.frontend.render_expr(expr));
                }
                None if def.native.is_some() => {}
                None => {
                    return Err(CompileError::translation(
                        decl.loc,
                        format!("task output '{}' has no expression", decl.name),
                    ));
                }
            }
        }

        let (requirements, container) = self.requirements(def)?;
        tracing::debug!(
            task = %def.name,
            inputs = inputs.len(),
            outputs = outputs.len(),
            static_requirements = requirements.is_static(),
            "Translated task"
        );
        Ok(Task {
            name: def.name.clone(),
            language: self.dialect.to_string(),
            inputs,
            outputs,
            input_exprs,
            output_exprs,
            command: self.frontend.command_template(&def.command),
            requirements,
            container,
            attributes: attributes(&def.meta),
            native: def.native.clone(),
        })
    }

    fn requirements(&self, def: &TaskDef) -> Result<(Requirements, Option<String>)> {
        let mut requirements = Requirements::default();
        let mut container = None;

        let mut entries: Vec<(&str, Requirement)> = def
            .runtime
            .iter()
            .map(|(key, expr)| {
                let requirement = match expr.constant() {
                    Some(json) => Requirement::Const(json),
                    None => Requirement::Expr(self.frontend.render_expr(expr)),
                };
                (key.as_str(), requirement)
            })
            .collect();
        for (key, value) in &self.options.default_runtime {
            if !def.runtime.contains_key(key) {
                entries.push((key.as_str(), Requirement::Const(value.clone())));
            }
        }

        for (key, requirement) in entries {
            let slot = match key {
                "memory" => &mut requirements.memory,
                "cpu" => &mut requirements.cpu,
                "disks" | "disk" => &mut requirements.disk,
                "gpu" => &mut requirements.gpu,
                "instance_type" | "dx_instance_type" => &mut requirements.instance_type,
                "docker" | "container" => {
                    match requirement {
                        Requirement::Const(Json::String(image)) => container = Some(image),
                        _ => {
                            return Err(CompileError::translation(
                                def.loc,
                                format!("task '{}': container image must be a string literal", def.name),
                            ));
                        }
                    }
                    continue;
                }
                other => {
                    tracing::debug!(task = %def.name, key = other, "Ignoring runtime attribute");
                    continue;
                }
            };
            *slot = Some(requirement);
        }
        if let Some(request) = requirements.evaluate_static()? {
            tracing::debug!(task = %def.name, ?request, "Static resource request");
        }
        Ok((requirements, container))
    }

    // ------------------------------------------------------------------
    // Workflows
    // ------------------------------------------------------------------

    fn workflow(&mut self, def: &WorkflowDef, level: WorkflowLevel) -> Result<Workflow> {
        // Leading declarations without an expression are inputs.
        let hoisted = def
            .body
            .iter()
            .take_while(|n| matches!(n, WorkflowNode::Declaration(d) if d.expr.is_none()))
            .count();

        let mut inputs = Vec::new();
        let mut input_types = IndexMap::new();
        let leading = def.body[..hoisted].iter().filter_map(|n| match n {
            WorkflowNode::Declaration(d) => Some(d),
            _ => None,
        });
        for decl in def.inputs.iter().chain(leading) {
            let ty = self.ir_type(decl)?;
            let mut parameter = Parameter::new(&decl.name, ty.clone())
                .with_attributes(parameter_attributes(def.parameter_meta.get(&decl.name)));
            if let Some(expr) = &decl.expr {
                let json = expr.constant().ok_or_else(|| {
                    CompileError::translation(
                        decl.loc,
                        format!(
                            "default of workflow input '{}' must be a constant",
                            decl.name
                        ),
                    )
                })?;
                parameter = parameter.with_default(self.constant_value(decl, &json, &ty)?)?;
            }
            input_types.insert(decl.name.clone(), ty);
            inputs.push(parameter);
        }

        let body = &def.body[hoisted..];
        let lookup = |name: &str| self.bundle.get(name).map(Callable::signature);
        let analysis = BlockAnalyzer::new(self.frontend, &self.ctx, &lookup).analyze(
            &def.name,
            input_types,
            body,
            &def.outputs,
        )?;

        let locked = self.options.locked && level == WorkflowLevel::Top;
        self.build_workflow(
            &def.name,
            level,
            locked,
            attributes(&def.meta),
            inputs,
            &analysis,
            &analysis.body,
            OutputSpec::Declared(&def.outputs),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build_workflow(
        &mut self,
        name: &str,
        level: WorkflowLevel,
        locked: bool,
        attributes: Attributes,
        inputs: Vec<Parameter>,
        analysis: &WorkflowAnalysis<'_>,
        body: &Body,
        outputs: OutputSpec<'_>,
    ) -> Result<Workflow> {
        let mut state = WorkflowState {
            name: name.to_string(),
            locked,
            builder: WorkflowBuilder::new(name, level)
                .locked(locked && level == WorkflowLevel::Top)
                .attributes(attributes),
            sources: IndexMap::new(),
            fragments: 0,
            blocks: 0,
        };
        for parameter in inputs {
            state.sources.insert(
                parameter.name.clone(),
                StageInput::WorkflowInput {
                    name: parameter.name.clone(),
                },
            );
            state.builder.add_input(parameter);
        }

        for block in &body.blocks {
            match block.kind {
                BlockKind::Flat => self.flat_block(&mut state, analysis, body, block)?,
                _ => self.compound_block(&mut state, analysis, body, block)?,
            }
        }

        match outputs {
            OutputSpec::Declared(decls) => self.declared_outputs(&mut state, body, decls)?,
            OutputSpec::Bindings(bindings) => {
                for (binding, ty) in bindings {
                    let source = state.sources.get(&binding).cloned().ok_or_else(|| {
                        CompileError::translation(
                            None,
                            format!("'{}' is not produced inside '{}'", binding, state.name),
                        )
                    })?;
                    state.builder.add_output(Parameter::new(&binding, ty), source)?;
                }
            }
        }

        let workflow = state.builder.build();
        tracing::debug!(
            workflow = %workflow.name,
            stages = workflow.stages.len(),
            "Built workflow"
        );
        Ok(workflow)
    }

    fn flat_block(
        &mut self,
        state: &mut WorkflowState,
        analysis: &WorkflowAnalysis<'_>,
        body: &Body,
        block: &Block,
    ) -> Result<()> {
        let mut pending: Vec<NodeId> = Vec::new();
        for id in &block.nodes {
            match analysis.node(*id).node {
                WorkflowNode::Declaration(_) => pending.push(*id),
                WorkflowNode::Call(call) => {
                    let signature = self.signature(&call.callee, call)?;
                    match self.inline_inputs(state, call, &signature)? {
                        Some(inputs) => self.call_stage(state, call, &signature, inputs)?,
                        None => {
                            pending.push(*id);
                            self.segment(state, analysis, body, block, &pending)?;
                            pending.clear();
                        }
                    }
                }
                WorkflowNode::Scatter { .. } | WorkflowNode::Conditional { .. } => {
                    return Err(CompileError::UnsupportedBlockShape {
                        workflow: state.name.clone(),
                        block: block.index,
                        reason: "compound node inside a flat block".into(),
                    });
                }
            }
        }
        if !pending.is_empty() {
            let (_, outputs) = analysis.boundary(body, &pending);
            if outputs.is_empty() {
                tracing::debug!(
                    workflow = %state.name,
                    block = block.index,
                    "Dropping declarations nobody reads"
                );
            } else {
                self.segment(state, analysis, body, block, &pending)?;
            }
        }
        Ok(())
    }

    /// Stage bindings for a call whose inputs are all constants or direct
    /// references; `None` when some input needs evaluation.
    fn inline_inputs(
        &self,
        state: &WorkflowState,
        call: &CallNode,
        signature: &Signature,
    ) -> Result<Option<IndexMap<String, StageInput>>> {
        let mut bindings = IndexMap::new();
        for (input, expr) in &call.inputs {
            let parameter = signature
                .inputs
                .iter()
                .find(|p| &p.name == input)
                .ok_or_else(|| {
                    CompileError::translation(
                        call.loc,
                        format!("'{}' has no input '{}'", call.callee, input),
                    )
                })?;
            let source = match (expr, expr.constant()) {
                (_, Some(json)) => {
                    let value = self.frontend.to_ir_value(&json, &parameter.ty).map_err(|e| {
                        CompileError::translation(call.loc, format!("{}.{}: {}", call.name(), input, e))
                    })?;
                    StageInput::Const { value }
                }
                (Expr::Ident(name), None) => match state.sources.get(name) {
                    Some(source) => source.clone(),
                    None => return Ok(None),
                },
                _ => return Ok(None),
            };
            bindings.insert(input.clone(), source);
        }
        Ok(Some(bindings))
    }

    fn check_unbound(&self, state: &WorkflowState, call: &CallNode, signature: &Signature) -> Result<()> {
        if !state.locked {
            return Ok(());
        }
        for parameter in &signature.inputs {
            if parameter.is_required() && !call.inputs.contains_key(&parameter.name) {
                return Err(CompileError::translation(
                    call.loc,
                    format!(
                        "required input '{}' of call '{}' is unbound in locked workflow '{}'",
                        parameter.name,
                        call.name(),
                        state.name
                    ),
                ));
            }
        }
        Ok(())
    }

    fn call_stage(
        &mut self,
        state: &mut WorkflowState,
        call: &CallNode,
        signature: &Signature,
        inputs: IndexMap<String, StageInput>,
    ) -> Result<()> {
        self.check_unbound(state, call, signature)?;
        let stage = state.builder.add_stage(call.name(), signature, inputs)?;
        for output in &signature.outputs {
            state.sources.insert(
                format!("{}.{}", call.name(), output.name),
                StageInput::Link {
                    stage,
                    output: output.name.clone(),
                },
            );
        }
        Ok(())
    }

    /// Compile a run of declarations, optionally ending in a call, as one
    /// expression fragment.
    fn segment(
        &mut self,
        state: &mut WorkflowState,
        analysis: &WorkflowAnalysis<'_>,
        body: &Body,
        block: &Block,
        members: &[NodeId],
    ) -> Result<()> {
        let (closure, outputs) = analysis.boundary(body, members);
        let mut expressions = IndexMap::new();
        let mut call = None;
        for id in members {
            match analysis.node(*id).node {
                WorkflowNode::Declaration(decl) => {
                    expressions.insert(decl.name.clone(), self.declaration_expr(decl)?);
                }
                WorkflowNode::Call(node) => call = Some(self.fragment_call(state, node)?),
                _ => {}
            }
        }
        let fragment = FragmentBlock {
            workflow: state.name.clone(),
            index: block.index,
            kind: FragmentKind::Expressions,
            expressions,
            call,
            outputs: identity_outputs(&outputs),
        };
        let name = state.next_fragment_name();
        self.fragment_stage(state, name, closure, outputs, fragment)
    }

    fn compound_block(
        &mut self,
        state: &mut WorkflowState,
        analysis: &WorkflowAnalysis<'_>,
        body: &Body,
        block: &Block,
    ) -> Result<()> {
        let node = analysis.node(block.nodes[0]).node;
        let kind = match node {
            WorkflowNode::Scatter {
                variable,
                collection,
                ..
            } => FragmentKind::Scatter {
                variable: variable.clone(),
                collection: self.frontend.render_expr(collection),
                collection_size: collection.static_array_len(),
            },
            WorkflowNode::Conditional { condition, .. } => FragmentKind::Conditional {
                condition: self.frontend.render_expr(condition),
            },
            _ => return self.flat_block(state, analysis, body, block),
        };

        let fragment = match analysis.simple_body(block) {
            Ok(simple) => {
                let mut expressions = IndexMap::new();
                for decl in simple.declarations {
                    expressions.insert(decl.name.clone(), self.declaration_expr(decl)?);
                }
                let call = match simple.call {
                    Some(node) => Some(self.fragment_call(state, node)?),
                    None => None,
                };
                FragmentBlock {
                    workflow: state.name.clone(),
                    index: block.index,
                    kind,
                    expressions,
                    call,
                    outputs: identity_outputs(&block.outputs),
                }
            }
            Err(CompileError::UnsupportedBlockShape { reason, .. }) => {
                tracing::debug!(
                    workflow = %state.name,
                    block = block.index,
                    reason = %reason,
                    "Splitting block into a sub-workflow"
                );
                self.split_block(state, analysis, block, kind)?
            }
            Err(e) => return Err(e),
        };
        let name = state.next_fragment_name();
        self.fragment_stage(state, name, block.closure.clone(), block.outputs.clone(), fragment)
    }

    /// Compile the nested body of `block` as its own workflow and return a
    /// fragment that iterates (or guards) a call to it.
    fn split_block(
        &mut self,
        state: &mut WorkflowState,
        analysis: &WorkflowAnalysis<'_>,
        block: &Block,
        kind: FragmentKind,
    ) -> Result<FragmentBlock> {
        let inner = block.body.as_ref().ok_or_else(|| CompileError::UnsupportedBlockShape {
            workflow: state.name.clone(),
            block: block.index,
            reason: "block is not compound".into(),
        })?;
        let sub_name = state.next_block_name();

        let mut inputs: Vec<Parameter> = block
            .closure
            .iter()
            .map(|(name, ty)| Parameter::new(name, ty.clone()))
            .collect();
        if let BlockKind::Scatter { variable, item } = &block.kind {
            inputs.push(Parameter::new(variable, item.clone()));
        }
        let call_inputs: IndexMap<String, String> = inputs
            .iter()
            .map(|p| (p.name.clone(), p.name.clone()))
            .collect();
        let inner_outputs: IndexMap<String, Type> = block
            .outputs
            .keys()
            .filter_map(|name| inner.scope.get(name).map(|ty| (name.clone(), ty.clone())))
            .collect();

        let sub = self.build_workflow(
            &sub_name,
            WorkflowLevel::Sub,
            state.locked,
            Attributes::default(),
            inputs,
            analysis,
            inner,
            OutputSpec::Bindings(inner_outputs),
        )?;
        self.bundle.insert(Callable::Workflow(sub))?;

        let outputs = block
            .outputs
            .keys()
            .map(|name| (name.clone(), format!("{}[{}]", sub_name, Json::String(name.clone()))))
            .collect();
        Ok(FragmentBlock {
            workflow: state.name.clone(),
            index: block.index,
            kind,
            expressions: IndexMap::new(),
            call: Some(FragmentCall {
                name: sub_name.clone(),
                callee: sub_name,
                inputs: call_inputs,
            }),
            outputs,
        })
    }

    fn declaration_expr(&self, decl: &Declaration) -> Result<String> {
        decl.expr
            .as_ref()
            .map(|e| self.frontend.render_expr(e))
            .ok_or_else(|| {
                CompileError::translation(decl.loc, format!("'{}' has no value", decl.name))
            })
    }

    fn fragment_call(&self, state: &WorkflowState, call: &CallNode) -> Result<FragmentCall> {
        let signature = self.signature(&call.callee, call)?;
        self.check_unbound(state, call, &signature)?;
        let mut inputs = IndexMap::new();
        for (input, expr) in &call.inputs {
            if !signature.inputs.iter().any(|p| &p.name == input) {
                return Err(CompileError::translation(
                    call.loc,
                    format!("'{}' has no input '{}'", call.callee, input),
                ));
            }
            inputs.insert(input.clone(), self.frontend.render_expr(expr));
        }
        Ok(FragmentCall {
            name: call.name().to_string(),
            callee: call.callee.clone(),
            inputs,
        })
    }

    /// Register a fragment callable and bind it as the next stage.
    fn fragment_stage(
        &mut self,
        state: &mut WorkflowState,
        name: String,
        closure: IndexMap<String, Type>,
        outputs: IndexMap<String, Type>,
        block: FragmentBlock,
    ) -> Result<()> {
        let mut bindings = IndexMap::new();
        for input in closure.keys() {
            let source = state.sources.get(input).cloned().ok_or_else(|| {
                CompileError::translation(
                    None,
                    format!("'{}' is read before it is bound in '{}'", input, state.name),
                )
            })?;
            bindings.insert(input.clone(), source);
        }
        let fragment = WorkflowFragment {
            name: name.clone(),
            inputs: closure
                .into_iter()
                .map(|(n, ty)| Parameter::new(n, ty))
                .collect(),
            outputs: outputs
                .iter()
                .map(|(n, ty)| Parameter::new(n, ty.clone()))
                .collect(),
            block,
            attributes: Attributes::default(),
        };
        let callable = Callable::Fragment(fragment);
        let signature = callable.signature();
        self.bundle.insert(callable)?;
        let stage = state.builder.add_stage(&name, &signature, bindings)?;
        for output in outputs.keys() {
            state.sources.insert(
                output.clone(),
                StageInput::Link {
                    stage,
                    output: output.clone(),
                },
            );
        }
        Ok(())
    }

    fn declared_outputs(
        &mut self,
        state: &mut WorkflowState,
        body: &Body,
        decls: &[Declaration],
    ) -> Result<()> {
        let mut direct: Vec<(Parameter, StageInput)> = Vec::new();
        let mut computed: Vec<(Parameter, &Expr)> = Vec::new();
        for decl in decls {
            let ty = self.ir_type(decl)?;
            let Some(expr) = &decl.expr else {
                return Err(CompileError::translation(
                    decl.loc,
                    format!("workflow output '{}' has no expression", decl.name),
                ));
            };
            let parameter = Parameter::new(&decl.name, ty.clone());
            match (expr, expr.constant()) {
                (_, Some(json)) => {
                    let value = self.constant_value(decl, &json, &ty)?;
                    direct.push((parameter, StageInput::Const { value }));
                }
                (Expr::Ident(name), None) if state.sources.contains_key(name) => {
                    direct.push((parameter, state.sources[name].clone()));
                }
                _ => computed.push((parameter, expr)),
            }
        }

        let mut computed_sources: IndexMap<String, StageInput> = IndexMap::new();
        if !computed.is_empty() {
            let bound = |name: &str| state.sources.contains_key(name);
            let mut closure = IndexMap::new();
            for (parameter, expr) in &computed {
                for raw in expr.references() {
                    let binding = resolve(raw, &bound).ok_or_else(|| {
                        CompileError::translation(
                            None,
                            format!("output '{}' reads unknown '{}'", parameter.name, raw),
                        )
                    })?;
                    let ty = body.scope.get(binding).cloned().ok_or_else(|| {
                        CompileError::translation(None, format!("'{}' has no type", binding))
                    })?;
                    closure.insert(binding.to_string(), ty);
                }
            }
            let outputs: IndexMap<String, Type> = computed
                .iter()
                .map(|(p, _)| (p.name.clone(), p.ty.clone()))
                .collect();
            let fragment = FragmentBlock {
                workflow: state.name.clone(),
                index: body.blocks.len(),
                kind: FragmentKind::Outputs,
                expressions: IndexMap::new(),
                call: None,
                outputs: computed
                    .iter()
                    .map(|(p, e)| (p.name.clone(), self.frontend.render_expr(e)))
                    .collect(),
            };
            let name = format!("{}_outputs", state.name);
            let stage = state.builder.next_stage_id();
            self.fragment_stage(state, name, closure, outputs.clone(), fragment)?;
            for output in outputs.keys() {
                computed_sources.insert(output.clone(), output_link(stage, output));
            }
        }

        for (parameter, source) in direct {
            state.builder.add_output(parameter, source)?;
        }
        for (parameter, _) in computed {
            let source = computed_sources[&parameter.name].clone();
            state.builder.add_output(parameter, source)?;
        }
        Ok(())
    }
}

fn output_link(stage: StageId, output: &str) -> StageInput {
    StageInput::Link {
        stage,
        output: output.to_string(),
    }
}

fn identity_outputs(outputs: &IndexMap<String, Type>) -> IndexMap<String, String> {
    outputs
        .keys()
        .map(|name| (name.clone(), name.clone()))
        .collect()
}

fn attributes(meta: &Meta) -> Attributes {
    Attributes {
        title: meta.title.clone(),
        description: meta.description.clone(),
    }
}

fn parameter_attributes(meta: Option<&ParameterMeta>) -> Vec<ParameterAttr> {
    let Some(meta) = meta else {
        return Vec::new();
    };
    let mut attrs = Vec::new();
    if let Some(help) = &meta.help {
        attrs.push(ParameterAttr::Help(help.clone()));
    }
    if let Some(label) = &meta.label {
        attrs.push(ParameterAttr::Label(label.clone()));
    }
    if let Some(group) = &meta.group {
        attrs.push(ParameterAttr::Group(group.clone()));
    }
    if meta.stream {
        attrs.push(ParameterAttr::Stream);
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_ir::Value;

    fn wdl() -> Dialect {
        "wdl,1.0".parse().unwrap()
    }

    fn document(value: Json) -> Document {
        serde_json::from_value(value).unwrap()
    }

    fn inc_task() -> Json {
        json!({
            "name": "inc",
            "inputs": [{"name": "x", "type": "Int"}],
            "outputs": [{"name": "y", "type": "Int", "expr": {"apply": {"func": "read_int", "args": [{"apply": {"func": "stdout", "args": []}}]}}}],
            "command": "echo $((~{x} + 1))",
            "runtime": {"memory": {"literal": "2 GiB"}, "docker": {"literal": "ubuntu:22.04"}}
        })
    }

    fn workflows(bundle: &Bundle) -> Vec<&Workflow> {
        bundle
            .callables
            .values()
            .filter_map(|c| match c {
                Callable::Workflow(w) => Some(w),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_task_translation() {
        let doc = document(json!({
            "language": "wdl",
            "tasks": [{
                "name": "greet",
                "inputs": [
                    {"name": "who", "type": "String", "expr": {"literal": "world"}},
                    {"name": "n", "type": "Int"},
                    {"name": "label", "type": "String", "expr": {"apply": {"func": "+", "args": [{"ident": "who"}, {"literal": "!"}]}}}
                ],
                "outputs": [{"name": "out", "type": "File", "expr": {"apply": {"func": "stdout", "args": []}}}],
                "command": "echo ~{label} ~{n}",
                "runtime": {"cpu": {"ident": "n"}, "docker": {"literal": "alpine"}},
                "meta": {"title": "Greeter"}
            }]
        }));
        let bundle = translate(&doc, &wdl(), &TranslateOptions::default()).unwrap();
        assert_eq!(bundle.primary.as_deref(), Some("greet"));
        let Some(Callable::Task(task)) = bundle.get("greet") else {
            panic!("expected task");
        };
        assert_eq!(task.inputs[0].default, Some(Value::String("world".into())));
        assert!(task.inputs[1].is_required());
        assert_eq!(task.inputs[2].ty, Type::optional(Type::String));
        assert_eq!(task.input_exprs["label"], "(who ~ \"!\")");
        assert_eq!(task.command, "echo {{ label }} {{ n }}");
        assert_eq!(task.container.as_deref(), Some("alpine"));
        assert_eq!(task.requirements.cpu, Some(Requirement::Expr("n".into())));
        assert!(!task.requirements.is_static());
        assert_eq!(task.attributes.title.as_deref(), Some("Greeter"));
    }

    #[test]
    fn test_input_defaults_follow_their_dependencies() {
        let doc = document(json!({
            "language": "wdl",
            "tasks": [{
                "name": "name_it",
                "inputs": [
                    {"name": "path", "type": "String", "expr": {"apply": {"func": "+", "args": [{"ident": "stem"}, {"literal": ".txt"}]}}},
                    {"name": "stem", "type": "String", "expr": {"apply": {"func": "+", "args": [{"ident": "prefix"}, {"literal": "_out"}]}}},
                    {"name": "prefix", "type": "String"}
                ],
                "command": "touch ~{path}"
            }]
        }));
        let bundle = translate(&doc, &wdl(), &TranslateOptions::default()).unwrap();
        let Some(Callable::Task(task)) = bundle.get("name_it") else {
            panic!("expected task");
        };
        let order: Vec<&str> = task.input_exprs.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["stem", "path"]);

        let cyclic = document(json!({
            "language": "wdl",
            "tasks": [{
                "name": "loop",
                "inputs": [
                    {"name": "a", "type": "String", "expr": {"apply": {"func": "+", "args": [{"ident": "b"}, {"literal": "!"}]}}},
                    {"name": "b", "type": "String", "expr": {"apply": {"func": "+", "args": [{"ident": "a"}, {"literal": "?"}]}}}
                ],
                "command": "true"
            }]
        }));
        let err = translate(&cyclic, &wdl(), &TranslateOptions::default()).unwrap_err();
        assert_eq!(err.error_code(), "TRANSLATION");
        assert!(err.to_string().contains("a -> b -> a"));
    }

    #[test]
    fn test_scatter_over_three_elements() {
        let doc = document(json!({
            "language": "wdl",
            "tasks": [inc_task()],
            "workflow": {
                "name": "wf",
                "body": [{
                    "node": "scatter",
                    "variable": "i",
                    "collection": {"array": [{"literal": 1}, {"literal": 2}, {"literal": 3}]},
                    "body": [{"node": "call", "callee": "inc", "inputs": {"x": {"ident": "i"}}}]
                }],
                "outputs": [{"name": "ys", "type": "Array[Int]", "expr": {"ident": "inc.y"}}]
            }
        }));
        let bundle = translate(&doc, &wdl(), &TranslateOptions::default()).unwrap();

        let compiled: Vec<&Callable> = bundle
            .callables
            .values()
            .filter(|c| !matches!(c, Callable::Task(_)))
            .collect();
        assert_eq!(compiled.len(), 2);

        let Some(Callable::Workflow(wf)) = bundle.get("wf") else {
            panic!("expected workflow");
        };
        assert_eq!(wf.stages.len(), 1);
        assert_eq!(wf.stages[0].callee, "wf_frag_1");
        let Some(Callable::Fragment(fragment)) = bundle.get("wf_frag_1") else {
            panic!("expected fragment");
        };
        assert_eq!(
            fragment.block.kind,
            FragmentKind::Scatter {
                variable: "i".into(),
                collection: "[1, 2, 3]".into(),
                collection_size: Some(3)
            }
        );
        assert_eq!(fragment.outputs[0].ty, Type::array(Type::Int));
        assert_eq!(
            wf.output_sources["ys"],
            StageInput::Link {
                stage: StageId(0),
                output: "inc.y".into()
            }
        );
    }

    #[test]
    fn test_output_type_must_fit_its_source() {
        let doc = document(json!({
            "language": "wdl",
            "tasks": [inc_task()],
            "workflow": {
                "name": "wf",
                "body": [{
                    "node": "scatter",
                    "variable": "i",
                    "collection": {"array": [{"literal": 1}, {"literal": 2}]},
                    "body": [{"node": "call", "callee": "inc", "inputs": {"x": {"ident": "i"}}}]
                }],
                "outputs": [{"name": "ys", "type": "String", "expr": {"ident": "inc.y"}}]
            }
        }));
        let err = translate(&doc, &wdl(), &TranslateOptions::default()).unwrap_err();
        assert_eq!(err.error_code(), "BINDING_TYPE");
        assert!(err.to_string().contains("expects String, found Array[Int]"));
    }

    #[test]
    fn test_call_input_type_must_fit_its_source() {
        let doc = document(json!({
            "language": "wdl",
            "tasks": [inc_task()],
            "workflow": {
                "name": "wf",
                "inputs": [{"name": "label", "type": "String"}],
                "body": [{"node": "call", "callee": "inc", "inputs": {"x": {"ident": "label"}}}]
            }
        }));
        let err = translate(&doc, &wdl(), &TranslateOptions::default()).unwrap_err();
        assert_eq!(err.error_code(), "BINDING_TYPE");
    }

    #[test]
    fn test_plain_calls_are_inlined_as_stages() {
        let doc = document(json!({
            "language": "wdl",
            "tasks": [inc_task()],
            "workflow": {
                "name": "wf",
                "inputs": [{"name": "start", "type": "Int"}],
                "body": [
                    {"node": "call", "callee": "inc", "alias": "a", "inputs": {"x": {"ident": "start"}}},
                    {"node": "call", "callee": "inc", "alias": "b", "inputs": {"x": {"ident": "a.y"}}},
                    {"node": "call", "callee": "inc", "alias": "c", "inputs": {"x": {"literal": 10}}}
                ],
                "outputs": [{"name": "result", "type": "Int", "expr": {"ident": "b.y"}}]
            }
        }));
        let bundle = translate(&doc, &wdl(), &TranslateOptions::default()).unwrap();
        let Some(Callable::Workflow(wf)) = bundle.get("wf") else {
            panic!("expected workflow");
        };
        assert_eq!(wf.stages.len(), 3);
        assert_eq!(
            wf.stages[1].inputs["x"],
            StageInput::Link {
                stage: StageId(0),
                output: "y".into()
            }
        );
        assert_eq!(
            wf.stages[2].inputs["x"],
            StageInput::Const {
                value: Value::Int(10)
            }
        );
        assert_eq!(bundle.callables.len(), 2);
    }

    #[test]
    fn test_computed_inputs_and_outputs_become_fragments() {
        let doc = document(json!({
            "language": "wdl",
            "tasks": [inc_task()],
            "workflow": {
                "name": "wf",
                "body": [
                    {"node": "declaration", "name": "start", "type": "Int"},
                    {"node": "call", "callee": "inc", "inputs": {"x": {"apply": {"func": "*", "args": [{"ident": "start"}, {"literal": 2}]}}}}
                ],
                "outputs": [{"name": "doubled", "type": "Int", "expr": {"apply": {"func": "+", "args": [{"ident": "inc.y"}, {"ident": "start"}]}}}]
            }
        }));
        let bundle = translate(&doc, &wdl(), &TranslateOptions::default()).unwrap();
        let Some(Callable::Workflow(wf)) = bundle.get("wf") else {
            panic!("expected workflow");
        };
        // The leading declaration without a value became an input.
        assert_eq!(wf.inputs[0].name, "start");
        assert_eq!(wf.stages.len(), 2);
        assert_eq!(wf.stages[0].callee, "wf_frag_1");
        assert_eq!(wf.stages[1].callee, "wf_outputs");

        let Some(Callable::Fragment(outputs)) = bundle.get("wf_outputs") else {
            panic!("expected outputs fragment");
        };
        assert_eq!(outputs.block.kind, FragmentKind::Outputs);
        assert_eq!(outputs.block.outputs["doubled"], "(inc.y + start)");
        let names: Vec<&str> = outputs.inputs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["inc.y", "start"]);
    }

    #[test]
    fn test_complex_scatter_is_split_into_sub_workflow() {
        let doc = document(json!({
            "language": "wdl",
            "tasks": [inc_task()],
            "workflow": {
                "name": "wf",
                "inputs": [{"name": "xs", "type": "Array[Int]"}],
                "body": [{
                    "node": "scatter", "variable": "x", "collection": {"ident": "xs"},
                    "body": [
                        {"node": "call", "callee": "inc", "alias": "one", "inputs": {"x": {"ident": "x"}}},
                        {"node": "call", "callee": "inc", "alias": "two", "inputs": {"x": {"ident": "one.y"}}}
                    ]
                }],
                "outputs": [{"name": "ys", "type": "Array[Int]", "expr": {"ident": "two.y"}}]
            }
        }));
        let bundle = translate(&doc, &wdl(), &TranslateOptions::default()).unwrap();
        let Some(Callable::Workflow(sub)) = bundle.get("wf_block_1") else {
            panic!("expected sub-workflow");
        };
        assert_eq!(sub.level, WorkflowLevel::Sub);
        assert_eq!(sub.stages.len(), 2);
        assert_eq!(sub.outputs[0].name, "two.y");
        assert_eq!(sub.outputs[0].ty, Type::Int);

        let Some(Callable::Fragment(fragment)) = bundle.get("wf_frag_1") else {
            panic!("expected fragment");
        };
        let call = fragment.block.call.as_ref().unwrap();
        assert_eq!(call.callee, "wf_block_1");
        assert_eq!(call.inputs["x"], "x");
        assert_eq!(fragment.block.outputs["two.y"], "wf_block_1[\"two.y\"]");
        assert_eq!(fragment.outputs[0].ty, Type::array(Type::Int));
        assert_eq!(bundle.dependency_order().unwrap().last(), Some(&"wf"));
    }

    #[test]
    fn test_stage_graph_is_acyclic() {
        let doc = document(json!({
            "language": "wdl",
            "tasks": [inc_task()],
            "workflow": {
                "name": "wf",
                "inputs": [{"name": "n", "type": "Int"}, {"name": "flag", "type": "Boolean"}],
                "body": [
                    {"node": "call", "callee": "inc", "alias": "a", "inputs": {"x": {"ident": "n"}}},
                    {"node": "conditional", "condition": {"ident": "flag"}, "body": [
                        {"node": "call", "callee": "inc", "alias": "b", "inputs": {"x": {"ident": "a.y"}}}
                    ]},
                    {"node": "declaration", "name": "m", "type": "Int", "expr": {"apply": {"func": "select_first", "args": [{"array": [{"ident": "b.y"}, {"ident": "a.y"}]}]}}},
                    {"node": "call", "callee": "inc", "alias": "c", "inputs": {"x": {"ident": "m"}}}
                ],
                "outputs": [{"name": "out", "type": "Int", "expr": {"ident": "c.y"}}]
            }
        }));
        let bundle = translate(&doc, &wdl(), &TranslateOptions::default()).unwrap();
        for wf in workflows(&bundle) {
            for stage in &wf.stages {
                for source in stage.inputs.values() {
                    if let StageInput::Link { stage: from, .. } = source {
                        assert!(from.0 < stage.id.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_locked_workflow_rejects_unbound_required_input() {
        let doc = document(json!({
            "language": "wdl",
            "tasks": [inc_task()],
            "workflow": {
                "name": "wf",
                "body": [{"node": "call", "callee": "inc", "inputs": {}}]
            }
        }));
        let options = TranslateOptions {
            locked: true,
            ..Default::default()
        };
        let err = translate(&doc, &wdl(), &options).unwrap_err();
        assert_eq!(err.error_code(), "TRANSLATION");
        assert!(err.to_string().contains("unbound in locked workflow"));

        assert!(translate(&doc, &wdl(), &TranslateOptions::default()).is_ok());
    }

    #[test]
    fn test_only_the_primary_is_locked() {
        let doc = document(json!({
            "language": "wdl",
            "tasks": [inc_task()],
            "subworkflows": [{
                "name": "twice",
                "inputs": [{"name": "n", "type": "Int"}],
                "body": [{"node": "call", "callee": "inc", "inputs": {"x": {"ident": "n"}}}],
                "outputs": [{"name": "m", "type": "Int", "expr": {"ident": "inc.y"}}]
            }],
            "workflow": {
                "name": "wf",
                "inputs": [{"name": "xs", "type": "Array[Int]"}],
                "body": [{
                    "node": "scatter", "variable": "x", "collection": {"ident": "xs"},
                    "body": [
                        {"node": "call", "callee": "inc", "alias": "one", "inputs": {"x": {"ident": "x"}}},
                        {"node": "call", "callee": "twice", "alias": "two", "inputs": {"n": {"ident": "one.y"}}}
                    ]
                }],
                "outputs": [{"name": "ys", "type": "Array[Int]", "expr": {"ident": "two.m"}}]
            }
        }));
        let options = TranslateOptions {
            locked: true,
            ..Default::default()
        };
        let bundle = translate(&doc, &wdl(), &options).unwrap();
        let locked: Vec<(&str, bool)> = workflows(&bundle)
            .iter()
            .map(|w| (w.name.as_str(), w.locked))
            .collect();
        assert_eq!(
            locked,
            vec![("twice", false), ("wf_block_1", false), ("wf", true)]
        );
    }

    #[test]
    fn test_subworkflows_translate_after_their_callees() {
        let doc = document(json!({
            "language": "wdl",
            "tasks": [inc_task()],
            "subworkflows": [
                {
                    "name": "outer",
                    "inputs": [{"name": "n", "type": "Int"}],
                    "body": [{"node": "call", "callee": "twice", "inputs": {"n": {"ident": "n"}}}],
                    "outputs": [{"name": "m", "type": "Int", "expr": {"ident": "twice.m"}}]
                },
                {
                    "name": "twice",
                    "inputs": [{"name": "n", "type": "Int"}],
                    "body": [{"node": "call", "callee": "inc", "inputs": {"x": {"ident": "n"}}}],
                    "outputs": [{"name": "m", "type": "Int", "expr": {"ident": "inc.y"}}]
                }
            ],
            "workflow": {
                "name": "wf",
                "body": [{"node": "call", "callee": "outer", "inputs": {"n": {"literal": 1}}}]
            }
        }));
        let bundle = translate(&doc, &wdl(), &TranslateOptions::default()).unwrap();
        let names: Vec<&str> = workflows(&bundle).iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["twice", "outer", "wf"]);
    }

    #[test]
    fn test_recursive_subworkflows_are_rejected() {
        let doc = document(json!({
            "language": "wdl",
            "subworkflows": [
                {"name": "a", "body": [{"node": "call", "callee": "b"}]},
                {"name": "b", "body": [{"node": "call", "callee": "a"}]}
            ]
        }));
        let err = translate(&doc, &wdl(), &TranslateOptions::default()).unwrap_err();
        assert_eq!(err.error_code(), "TRANSLATION");
        assert!(err.to_string().contains("calls itself through a -> b"));
    }

    #[test]
    fn test_native_stub_needs_no_output_expressions() {
        let doc = document(json!({
            "language": "wdl",
            "tasks": [{
                "name": "ext",
                "native": "applet-000123",
                "inputs": [{"name": "x", "type": "Int"}],
                "outputs": [{"name": "y", "type": "Int"}]
            }],
            "workflow": {
                "name": "wf",
                "body": [{"node": "call", "callee": "ext", "inputs": {"x": {"literal": 2}}}],
                "outputs": [{"name": "y", "type": "Int", "expr": {"ident": "ext.y"}}]
            }
        }));
        let bundle = translate(&doc, &wdl(), &TranslateOptions::default()).unwrap();
        let Some(Callable::Task(task)) = bundle.get("ext") else {
            panic!("expected task");
        };
        assert_eq!(task.native.as_deref(), Some("applet-000123"));
        assert!(task.output_exprs.is_empty());

        let plain = document(json!({
            "language": "wdl",
            "tasks": [{"name": "ext", "outputs": [{"name": "y", "type": "Int"}], "command": "true"}]
        }));
        let err = translate(&plain, &wdl(), &TranslateOptions::default()).unwrap_err();
        assert!(err.to_string().contains("task output 'y' has no expression"));
    }

    #[test]
    fn test_imported_tasks_are_callable() {
        let lib = tempfile::TempDir::new().unwrap();
        let library = json!({"language": "wdl", "tasks": [inc_task()]});
        std::fs::write(lib.path().join("lib.json"), library.to_string()).unwrap();
        let doc = document(json!({
            "language": "wdl",
            "imports": ["lib.json"],
            "workflow": {
                "name": "wf",
                "body": [{"node": "call", "callee": "inc", "inputs": {"x": {"literal": 1}}}],
                "outputs": [{"name": "y", "type": "Int", "expr": {"ident": "inc.y"}}]
            }
        }));

        let err = translate(&doc, &wdl(), &TranslateOptions::default()).unwrap_err();
        assert_eq!(err.error_code(), "IMPORT_NOT_FOUND");

        let options = TranslateOptions {
            imports: vec![lib.path().to_path_buf()],
            ..Default::default()
        };
        let bundle = translate(&doc, &wdl(), &options).unwrap();
        assert!(matches!(bundle.get("inc"), Some(Callable::Task(_))));
        assert_eq!(bundle.primary.as_deref(), Some("wf"));
    }

    #[test]
    fn test_default_runtime_fills_missing_keys() {
        let doc = document(json!({"language": "wdl", "tasks": [inc_task()]}));
        let options = TranslateOptions {
            default_runtime: [("cpu".to_string(), json!(4)), ("memory".to_string(), json!("1 GiB"))]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        let bundle = translate(&doc, &wdl(), &options).unwrap();
        let Some(Callable::Task(task)) = bundle.get("inc") else {
            panic!("expected task");
        };
        assert_eq!(task.requirements.cpu, Some(Requirement::Const(json!(4))));
        assert_eq!(
            task.requirements.memory,
            Some(Requirement::Const(json!("2 GiB")))
        );
    }
}
