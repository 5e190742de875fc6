// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Execution tree of a compiled workflow: stages, their executables and
//! where each stage input comes from.

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt::Write;
use tessera_ir::{Bundle, Callable, StageInput, Workflow};

use super::CompiledExecutable;

/// Output format of `--exec-tree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum TreeFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecTree {
    pub name: String,
    pub id: String,
    pub kind: String,
    pub stages: Vec<ExecTreeStage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecTreeStage {
    pub id: String,
    pub name: String,
    pub callee: String,
    pub executable: String,
    pub kind: String,
    /// Source of each bound input, as `stage-N.output`, `input name` or `const`.
    pub inputs: IndexMap<String, String>,
    /// Workflow reached through this stage, directly or through a fragment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtree: Option<Box<ExecTree>>,
}

/// Tree rooted at the bundle's primary workflow; `None` for task-only bundles.
pub fn build(bundle: &Bundle, compiled: &IndexMap<String, CompiledExecutable>) -> Option<ExecTree> {
    match bundle.primary()? {
        Callable::Workflow(workflow) => Some(workflow_tree(bundle, compiled, workflow)),
        _ => None,
    }
}

fn executable_id(compiled: &IndexMap<String, CompiledExecutable>, name: &str) -> String {
    compiled
        .get(name)
        .map(|c| c.id.clone())
        .unwrap_or_else(|| "-".to_string())
}

fn workflow_tree(
    bundle: &Bundle,
    compiled: &IndexMap<String, CompiledExecutable>,
    workflow: &Workflow,
) -> ExecTree {
    let stages = workflow
        .stages
        .iter()
        .map(|stage| {
            let callee = bundle.get(&stage.callee);
            let nested = match callee {
                Some(Callable::Workflow(w)) => Some(w),
                Some(Callable::Fragment(f)) => f
                    .block
                    .call
                    .as_ref()
                    .and_then(|call| match bundle.get(&call.callee) {
                        Some(Callable::Workflow(w)) => Some(w),
                        _ => None,
                    }),
                _ => None,
            };
            ExecTreeStage {
                id: stage.id.to_string(),
                name: stage.name.clone(),
                callee: stage.callee.clone(),
                executable: executable_id(compiled, &stage.callee),
                kind: callee
                    .map(|c| c.kind().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                inputs: stage
                    .inputs
                    .iter()
                    .map(|(name, source)| (name.clone(), describe(source)))
                    .collect(),
                subtree: nested.map(|w| Box::new(workflow_tree(bundle, compiled, w))),
            }
        })
        .collect();
    ExecTree {
        name: workflow.name.clone(),
        id: executable_id(compiled, &workflow.name),
        kind: "workflow".to_string(),
        stages,
    }
}

fn describe(source: &StageInput) -> String {
    match source {
        StageInput::Const { .. } => "const".to_string(),
        StageInput::WorkflowInput { name } => format!("input {}", name),
        StageInput::Link { stage, output } => format!("{}.{}", stage, output),
    }
}

impl ExecTree {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Indented, box-drawn rendering for terminals.
    pub fn render_pretty(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, "");
        out
    }

    fn render_into(&self, out: &mut String, indent: &str) {
        let _ = writeln!(out, "Workflow: {} [{}]", self.name, self.id);
        for (position, stage) in self.stages.iter().enumerate() {
            let last = position + 1 == self.stages.len();
            let (branch, cont) = if last { ("└── ", "    ") } else { ("├── ", "│   ") };
            let _ = writeln!(
                out,
                "{}{}{} {} ({} {})",
                indent, branch, stage.id, stage.name, stage.kind, stage.executable
            );
            let child_indent = format!("{}{}", indent, cont);
            for (input, source) in &stage.inputs {
                let _ = writeln!(out, "{}  {} <- {}", child_indent, input, source);
            }
            if let Some(subtree) = &stage.subtree {
                out.push_str(&child_indent);
                subtree.render_into(out, &child_indent);
            }
        }
    }
}
