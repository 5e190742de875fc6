// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Parsed source documents.
//!
//! Text parsing happens upstream; the compiler consumes the abstract syntax
//! as JSON. Source types are kept in their language's own spelling (a WDL
//! type string, a CWL type object) and mapped by the matching front-end.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;

use crate::Language;
use crate::expr::Expr;

/// Line and column of a construct in the original source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A whole source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub language: Language,
    #[serde(default)]
    pub version: Option<String>,
    /// Path or URI the document was read from.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub structs: Vec<StructDef>,
    #[serde(default)]
    pub tasks: Vec<TaskDef>,
    #[serde(default)]
    pub workflow: Option<WorkflowDef>,
    /// Workflows imported by the main one.
    #[serde(default)]
    pub subworkflows: Vec<WorkflowDef>,
    /// Library documents to merge in, looked up relative to this document
    /// and then along the import search path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
}

/// A named record (or, when `symbols` is set, enum) declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructDef {
    pub name: String,
    #[serde(default)]
    pub members: IndexMap<String, Json>,
    #[serde(default)]
    pub symbols: Vec<String>,
}

/// `type name [= expr]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declaration {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Json,
    #[serde(default)]
    pub expr: Option<Expr>,
    #[serde(default)]
    pub loc: Option<SourceLocation>,
}

/// Title and description from a `meta` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Per-parameter presentation hints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterMeta {
    #[serde(default)]
    pub help: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDef {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<Declaration>,
    #[serde(default)]
    pub outputs: Vec<Declaration>,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub runtime: IndexMap<String, Expr>,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub parameter_meta: IndexMap<String, ParameterMeta>,
    #[serde(default)]
    pub loc: Option<SourceLocation>,
    /// Id of an existing platform executable; the task is a stub with no
    /// command or output expressions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDef {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<Declaration>,
    #[serde(default)]
    pub body: Vec<WorkflowNode>,
    #[serde(default)]
    pub outputs: Vec<Declaration>,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub parameter_meta: IndexMap<String, ParameterMeta>,
    #[serde(default)]
    pub loc: Option<SourceLocation>,
}

/// `call callee as alias { input: ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallNode {
    pub callee: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub inputs: IndexMap<String, Expr>,
    #[serde(default)]
    pub loc: Option<SourceLocation>,
}

impl CallNode {
    /// Name the call's outputs are bound under.
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.callee)
    }
}

/// A statement of a workflow body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "camelCase")]
pub enum WorkflowNode {
    Declaration(Declaration),
    Call(CallNode),
    Scatter {
        variable: String,
        collection: Expr,
        body: Vec<WorkflowNode>,
        #[serde(default)]
        loc: Option<SourceLocation>,
    },
    Conditional {
        condition: Expr,
        body: Vec<WorkflowNode>,
        #[serde(default)]
        loc: Option<SourceLocation>,
    },
}

impl WorkflowNode {
    pub fn loc(&self) -> Option<SourceLocation> {
        match self {
            WorkflowNode::Declaration(d) => d.loc,
            WorkflowNode::Call(c) => c.loc,
            WorkflowNode::Scatter { loc, .. } | WorkflowNode::Conditional { loc, .. } => *loc,
        }
    }

    pub fn is_compound(&self) -> bool {
        matches!(
            self,
            WorkflowNode::Scatter { .. } | WorkflowNode::Conditional { .. }
        )
    }
}

impl WorkflowDef {
    /// Every callee named in the body, nested blocks included, in source order.
    pub fn callees(&self) -> Vec<&str> {
        fn walk<'a>(nodes: &'a [WorkflowNode], out: &mut Vec<&'a str>) {
            for node in nodes {
                match node {
                    WorkflowNode::Call(call) => {
                        if !out.contains(&call.callee.as_str()) {
                            out.push(&call.callee);
                        }
                    }
                    WorkflowNode::Scatter { body, .. } | WorkflowNode::Conditional { body, .. } => {
                        walk(body, out)
                    }
                    WorkflowNode::Declaration(_) => {}
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.body, &mut out);
        out
    }
}

impl Document {
    pub fn task(&self, name: &str) -> Option<&TaskDef> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn subworkflow(&self, name: &str) -> Option<&WorkflowDef> {
        self.subworkflows.iter().find(|w| w.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_from_json() {
        let doc: Document = serde_json::from_value(json!({
            "language": "wdl",
            "version": "1.0",
            "tasks": [{
                "name": "hello",
                "inputs": [{"name": "who", "type": "String"}],
                "outputs": [{"name": "out", "type": "File", "expr": {"apply": {"func": "stdout", "args": []}}}],
                "command": "echo hello ~{who}"
            }],
            "workflow": {
                "name": "wf",
                "body": [
                    {"node": "call", "callee": "hello", "alias": "greet", "inputs": {"who": {"literal": "world"}}},
                    {"node": "scatter", "variable": "i", "collection": {"ident": "xs"}, "body": []}
                ]
            }
        }))
        .unwrap();

        assert_eq!(doc.language, Language::Wdl);
        assert!(doc.task("hello").is_some());
        let wf = doc.workflow.unwrap();
        let WorkflowNode::Call(call) = &wf.body[0] else {
            panic!("expected call");
        };
        assert_eq!(call.name(), "greet");
        assert!(wf.body[1].is_compound());
    }

    #[test]
    fn test_callees_include_nested_calls() {
        let wf: WorkflowDef = serde_json::from_value(json!({
            "name": "wf",
            "body": [
                {"node": "call", "callee": "a"},
                {"node": "conditional", "condition": {"literal": true}, "body": [
                    {"node": "scatter", "variable": "i", "collection": {"ident": "xs"}, "body": [
                        {"node": "call", "callee": "b"},
                        {"node": "call", "callee": "a", "alias": "again"}
                    ]}
                ]}
            ]
        }))
        .unwrap();
        assert_eq!(wf.callees(), vec!["a", "b"]);
    }
}
