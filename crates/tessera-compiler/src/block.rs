// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Block analysis.
//!
//! Splits a workflow body into blocks: maximal runs of plain declarations and
//! calls, and singleton conditional or scatter blocks wrapping a recursively
//! analyzed nested body. For every block we compute its closure (names it
//! reads but does not bind) and its outputs (names it binds that something
//! outside reads).
//!
//! All nodes live in one arena indexed by [`NodeId`]; blocks and bodies refer
//! to nodes by id.
//!
//! Names are unique within a workflow. A call binds `alias.output` for each
//! callee output; a reference like `sample.reads` resolves to the longest
//! bound prefix (`sample`).

use indexmap::{IndexMap, IndexSet};
use tessera_frontend::{CallNode, Declaration, Frontend, SourceLocation, TypeContext, WorkflowNode};
use tessera_ir::{Signature, Type};

use crate::error::{CompileError, Result};

/// Arena index of a workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// A node plus what it binds and reads.
#[derive(Debug)]
pub struct NodeInfo<'d> {
    pub id: NodeId,
    pub node: &'d WorkflowNode,
    /// Names bound by the node as seen from its own level.
    pub exports: IndexMap<String, Type>,
    /// Bindings the node reads from outside itself, resolved.
    pub reads: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Flat,
    Scatter { variable: String, item: Type },
    Conditional,
}

/// A contiguous unit of a workflow body.
#[derive(Debug)]
pub struct Block {
    /// Position within the enclosing body.
    pub index: usize,
    pub kind: BlockKind,
    pub nodes: Vec<NodeId>,
    pub closure: IndexMap<String, Type>,
    pub outputs: IndexMap<String, Type>,
    /// Analysis of a compound block's nested body.
    pub body: Option<Body>,
}

impl Block {
    pub fn is_compound(&self) -> bool {
        self.kind != BlockKind::Flat
    }
}

/// One analyzed nesting level.
#[derive(Debug)]
pub struct Body {
    /// Every name visible at this level, with its type at this level.
    pub scope: IndexMap<String, Type>,
    /// Bindings of this level read from outside it.
    pub demand: IndexSet<String>,
    /// Nodes in dependency order.
    pub order: Vec<NodeId>,
    pub blocks: Vec<Block>,
}

/// The body of a compound block that fits in one fragment.
#[derive(Debug)]
pub struct SimpleBody<'d> {
    pub declarations: Vec<&'d Declaration>,
    pub call: Option<&'d CallNode>,
}

/// Result of analyzing one workflow.
#[derive(Debug)]
pub struct WorkflowAnalysis<'d> {
    pub workflow: String,
    pub nodes: Vec<NodeInfo<'d>>,
    pub inputs: IndexMap<String, Type>,
    pub body: Body,
    pub outputs: IndexMap<String, Type>,
}

impl<'d> WorkflowAnalysis<'d> {
    pub fn node(&self, id: NodeId) -> &NodeInfo<'d> {
        &self.nodes[id.0]
    }

    /// Closure and outputs of an arbitrary run of nodes within `body`.
    pub fn boundary(
        &self,
        body: &Body,
        members: &[NodeId],
    ) -> (IndexMap<String, Type>, IndexMap<String, Type>) {
        boundary(&self.nodes, body, members)
    }

    /// The declarations and single call of a compound block.
    ///
    /// Fails with `UnsupportedBlockShape` when the nested body holds more than
    /// one call or another compound node.
    pub fn simple_body(&self, block: &Block) -> Result<SimpleBody<'d>> {
        let unsupported = |reason: &str| CompileError::UnsupportedBlockShape {
            workflow: self.workflow.clone(),
            block: block.index,
            reason: reason.to_string(),
        };
        let body = block
            .body
            .as_ref()
            .ok_or_else(|| unsupported("block is not compound"))?;
        let mut declarations = Vec::new();
        let mut call = None;
        for id in &body.order {
            match self.node(*id).node {
                WorkflowNode::Declaration(decl) => declarations.push(decl),
                WorkflowNode::Call(c) => {
                    if call.replace(c).is_some() {
                        return Err(unsupported("more than one call"));
                    }
                }
                WorkflowNode::Scatter { .. } | WorkflowNode::Conditional { .. } => {
                    return Err(unsupported("nested conditional or scatter"));
                }
            }
        }
        Ok(SimpleBody { declarations, call })
    }
}

fn boundary(
    arena: &[NodeInfo<'_>],
    body: &Body,
    members: &[NodeId],
) -> (IndexMap<String, Type>, IndexMap<String, Type>) {
    let inside: IndexSet<&str> = members
        .iter()
        .flat_map(|id| arena[id.0].exports.keys().map(String::as_str))
        .collect();

    let mut closure = IndexMap::new();
    for id in members {
        for read in &arena[id.0].reads {
            if !inside.contains(read.as_str())
                && let Some(ty) = body.scope.get(read)
            {
                closure.insert(read.clone(), ty.clone());
            }
        }
    }

    let mut wanted: IndexSet<&str> = body.demand.iter().map(String::as_str).collect();
    for id in &body.order {
        if !members.contains(id) {
            wanted.extend(arena[id.0].reads.iter().map(String::as_str));
        }
    }
    let mut outputs = IndexMap::new();
    for id in members {
        for (name, ty) in &arena[id.0].exports {
            if wanted.contains(name.as_str()) {
                outputs.insert(name.clone(), ty.clone());
            }
        }
    }
    (closure, outputs)
}

/// Resolve `name` to the longest dotted prefix accepted by `bound`.
pub fn resolve<'n>(name: &'n str, bound: &dyn Fn(&str) -> bool) -> Option<&'n str> {
    let mut candidate = name;
    loop {
        if bound(candidate) {
            return Some(candidate);
        }
        candidate = candidate.rsplit_once('.')?.0;
    }
}

/// Walks workflow bodies and produces [`WorkflowAnalysis`] values.
pub struct BlockAnalyzer<'a> {
    frontend: &'a dyn Frontend,
    ctx: &'a TypeContext,
    callees: &'a dyn Fn(&str) -> Option<Signature>,
}

impl<'a> BlockAnalyzer<'a> {
    pub fn new(
        frontend: &'a dyn Frontend,
        ctx: &'a TypeContext,
        callees: &'a dyn Fn(&str) -> Option<Signature>,
    ) -> Self {
        Self {
            frontend,
            ctx,
            callees,
        }
    }

    /// Analyze a workflow body given its (already hoisted) inputs.
    pub fn analyze<'d>(
        &self,
        workflow: &str,
        inputs: IndexMap<String, Type>,
        body: &'d [WorkflowNode],
        outputs: &'d [Declaration],
    ) -> Result<WorkflowAnalysis<'d>> {
        let mut top_outputs = IndexMap::new();
        let mut external = Vec::new();
        for decl in outputs {
            let expr = decl.expr.as_ref().ok_or_else(|| {
                CompileError::translation(
                    decl.loc,
                    format!("workflow output '{}' has no expression", decl.name),
                )
            })?;
            top_outputs.insert(decl.name.clone(), self.ir_type(decl)?);
            external.extend(expr.references().into_iter().map(str::to_string));
        }

        let mut arena = Vec::new();
        let body = self.analyze_level(workflow, &mut arena, body, inputs.clone(), &external)?;
        tracing::debug!(
            workflow,
            nodes = arena.len(),
            blocks = body.blocks.len(),
            "Analyzed workflow body"
        );
        Ok(WorkflowAnalysis {
            workflow: workflow.to_string(),
            nodes: arena,
            inputs,
            body,
            outputs: top_outputs,
        })
    }

    fn ir_type(&self, decl: &Declaration) -> Result<Type> {
        self.frontend
            .to_ir_type(&decl.ty, self.ctx)
            .map_err(|e| CompileError::translation(decl.loc, format!("'{}': {}", decl.name, e)))
    }

    fn analyze_level<'d>(
        &self,
        workflow: &str,
        arena: &mut Vec<NodeInfo<'d>>,
        nodes: &'d [WorkflowNode],
        parent_scope: IndexMap<String, Type>,
        external: &[String],
    ) -> Result<Body> {
        let mut scope = parent_scope;
        let mut ids = Vec::with_capacity(nodes.len());
        for node in nodes {
            let exports = self.exports_of(node)?;
            for (name, ty) in &exports {
                if scope.insert(name.clone(), ty.clone()).is_some() {
                    return Err(CompileError::translation(
                        node.loc(),
                        format!("'{}' is bound more than once", name),
                    ));
                }
            }
            let id = NodeId(arena.len());
            arena.push(NodeInfo {
                id,
                node,
                exports,
                reads: Vec::new(),
            });
            ids.push(id);
        }

        let in_scope = |name: &str| scope.contains_key(name);
        for id in &ids {
            let node = arena[id.0].node;
            let mut reads: Vec<String> = Vec::new();
            for raw in self.free_reads(node)? {
                let resolved = resolve(&raw, &in_scope).ok_or_else(|| {
                    CompileError::translation(node.loc(), format!("unknown identifier '{}'", raw))
                })?;
                if !reads.iter().any(|r| r == resolved) {
                    reads.push(resolved.to_string());
                }
            }
            arena[id.0].reads = reads;
        }

        let mut demand = IndexSet::new();
        for raw in external {
            let resolved = resolve(raw, &in_scope).ok_or_else(|| {
                CompileError::translation(None, format!("unknown identifier '{}'", raw))
            })?;
            demand.insert(resolved.to_string());
        }

        let order = topological_order(workflow, arena.as_slice(), &ids)?;

        let mut groups: Vec<Vec<NodeId>> = Vec::new();
        let mut run: Vec<NodeId> = Vec::new();
        for id in &order {
            if arena[id.0].node.is_compound() {
                if !run.is_empty() {
                    groups.push(std::mem::take(&mut run));
                }
                groups.push(vec![*id]);
            } else {
                run.push(*id);
            }
        }
        if !run.is_empty() {
            groups.push(run);
        }

        let mut level = Body {
            scope,
            demand,
            order,
            blocks: Vec::new(),
        };
        for (index, members) in groups.into_iter().enumerate() {
            let (closure, outputs) = boundary(arena.as_slice(), &level, &members);
            let node = arena[members[0].0].node;
            let (kind, body) = match node {
                WorkflowNode::Scatter {
                    variable,
                    collection,
                    body,
                    loc,
                } => {
                    let scope_fn = |name: &str| level.scope.get(name).cloned();
                    let collection_ty = self.frontend.type_of(collection, &scope_fn).map_err(|e| {
                        CompileError::translation(*loc, format!("scatter collection: {}", e))
                    })?;
                    let item = match collection_ty {
                        Type::Array { item, .. } => *item,
                        other => {
                            return Err(CompileError::translation(
                                *loc,
                                format!("cannot scatter over {}", other),
                            ));
                        }
                    };
                    let mut nested = self.nested_scope(&level.scope, &arena[members[0].0].exports);
                    if nested.insert(variable.clone(), item.clone()).is_some() {
                        return Err(CompileError::translation(
                            *loc,
                            format!("'{}' is bound more than once", variable),
                        ));
                    }
                    let wanted: Vec<String> = outputs.keys().cloned().collect();
                    let inner = self.analyze_level(workflow, arena, body, nested, &wanted)?;
                    (
                        BlockKind::Scatter {
                            variable: variable.clone(),
                            item,
                        },
                        Some(inner),
                    )
                }
                WorkflowNode::Conditional { body, .. } => {
                    let nested = self.nested_scope(&level.scope, &arena[members[0].0].exports);
                    let wanted: Vec<String> = outputs.keys().cloned().collect();
                    let inner = self.analyze_level(workflow, arena, body, nested, &wanted)?;
                    (BlockKind::Conditional, Some(inner))
                }
                _ => (BlockKind::Flat, None),
            };
            level.blocks.push(Block {
                index,
                kind,
                nodes: members,
                closure,
                outputs,
                body,
            });
        }
        Ok(level)
    }

    /// Outer scope as seen from inside a compound node: the node's own
    /// wrapped exports are replaced by the unwrapped inner bindings.
    fn nested_scope(
        &self,
        scope: &IndexMap<String, Type>,
        own_exports: &IndexMap<String, Type>,
    ) -> IndexMap<String, Type> {
        scope
            .iter()
            .filter(|(name, _)| !own_exports.contains_key(*name))
            .map(|(name, ty)| (name.clone(), ty.clone()))
            .collect()
    }

    fn exports_of(&self, node: &WorkflowNode) -> Result<IndexMap<String, Type>> {
        let mut exports = IndexMap::new();
        match node {
            WorkflowNode::Declaration(decl) => {
                exports.insert(decl.name.clone(), self.ir_type(decl)?);
            }
            WorkflowNode::Call(call) => {
                let signature = (self.callees)(&call.callee).ok_or_else(|| {
                    CompileError::translation(call.loc, format!("unknown callee '{}'", call.callee))
                })?;
                for output in signature.outputs {
                    exports.insert(format!("{}.{}", call.name(), output.name), output.ty);
                }
            }
            WorkflowNode::Scatter { body, .. } => {
                for inner in body {
                    for (name, ty) in self.exports_of(inner)? {
                        exports.insert(name, Type::array(ty));
                    }
                }
            }
            WorkflowNode::Conditional { body, .. } => {
                for inner in body {
                    for (name, ty) in self.exports_of(inner)? {
                        exports.insert(name, Type::optional(ty));
                    }
                }
            }
        }
        Ok(exports)
    }

    /// Names a node reads that it does not bind itself.
    fn free_reads(&self, node: &WorkflowNode) -> Result<Vec<String>> {
        let mut reads: Vec<String> = Vec::new();
        fn push(name: &str, reads: &mut Vec<String>) {
            if !reads.iter().any(|r| r == name) {
                reads.push(name.to_string());
            }
        }
        match node {
            WorkflowNode::Declaration(decl) => {
                if let Some(expr) = &decl.expr {
                    expr.references().into_iter().for_each(|r| push(r, &mut reads));
                }
            }
            WorkflowNode::Call(call) => {
                for expr in call.inputs.values() {
                    expr.references().into_iter().for_each(|r| push(r, &mut reads));
                }
            }
            WorkflowNode::Scatter {
                variable,
                collection,
                body,
                ..
            } => {
                collection
                    .references()
                    .into_iter()
                    .for_each(|r| push(r, &mut reads));
                for name in self.inner_free_reads(body, Some(variable))? {
                    push(&name, &mut reads);
                }
            }
            WorkflowNode::Conditional {
                condition, body, ..
            } => {
                condition
                    .references()
                    .into_iter()
                    .for_each(|r| push(r, &mut reads));
                for name in self.inner_free_reads(body, None)? {
                    push(&name, &mut reads);
                }
            }
        }
        Ok(reads)
    }

    fn inner_free_reads(
        &self,
        body: &[WorkflowNode],
        variable: Option<&String>,
    ) -> Result<Vec<String>> {
        let mut bound: IndexSet<String> = variable.into_iter().cloned().collect();
        for inner in body {
            bound.extend(self.exports_of(inner)?.into_keys());
        }
        let is_bound = |name: &str| bound.contains(name);
        let mut free = Vec::new();
        for inner in body {
            for name in self.free_reads(inner)? {
                if resolve(&name, &is_bound).is_none() {
                    free.push(name);
                }
            }
        }
        Ok(free)
    }
}

/// Stable topological order: among ready nodes the earliest in the source wins.
fn topological_order(workflow: &str, arena: &[NodeInfo<'_>], ids: &[NodeId]) -> Result<Vec<NodeId>> {
    let owner: IndexMap<&str, NodeId> = ids
        .iter()
        .flat_map(|id| arena[id.0].exports.keys().map(move |k| (k.as_str(), *id)))
        .collect();
    let deps: Vec<Vec<NodeId>> = ids
        .iter()
        .map(|id| {
            arena[id.0]
                .reads
                .iter()
                .filter_map(|r| owner.get(r.as_str()).copied())
                .filter(|dep| dep != id)
                .collect()
        })
        .collect();

    let mut placed = vec![false; ids.len()];
    let mut order = Vec::with_capacity(ids.len());
    while order.len() < ids.len() {
        let ready = (0..ids.len()).find(|&i| !placed[i] && deps[i].iter().all(|d| order.contains(d)));
        let Some(i) = ready else {
            let stuck: Vec<String> = (0..ids.len())
                .filter(|&i| !placed[i])
                .flat_map(|i| arena[ids[i].0].exports.keys().cloned())
                .collect();
            let location: Option<SourceLocation> = ids
                .iter()
                .enumerate()
                .find(|(i, _)| !placed[*i])
                .and_then(|(_, id)| arena[id.0].node.loc());
            return Err(CompileError::translation(
                location,
                format!(
                    "circular dependency in workflow '{}' between {}",
                    workflow,
                    stuck.join(", ")
                ),
            ));
        };
        placed[i] = true;
        order.push(ids[i]);
    }
    Ok(order)
}
