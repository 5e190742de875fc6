// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The IR bundle: every callable of a program plus its type aliases.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::callable::{Callable, Signature};
use crate::error::{IrError, Result};
use crate::types::Type;
use crate::value::Value;

/// A compiled program in IR form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// Callables in insertion order; names are unique.
    pub callables: IndexMap<String, Callable>,
    /// Name of the entry callable, absent for task-only libraries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    /// Named schemas declared by the source document.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub type_aliases: IndexMap<String, Type>,
    /// Input values bound by translateInputs, keyed by input name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<IndexMap<String, Value>>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callable; names must be unique.
    pub fn insert(&mut self, callable: Callable) -> Result<()> {
        let name = callable.name().to_string();
        if self.callables.contains_key(&name) {
            return Err(IrError::DuplicateCallable(name));
        }
        self.callables.insert(name, callable);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Callable> {
        self.callables.get(name)
    }

    pub fn primary(&self) -> Option<&Callable> {
        self.primary.as_deref().and_then(|name| self.callables.get(name))
    }

    /// Callable names ordered so that every callee precedes its callers.
    pub fn dependency_order(&self) -> Result<Vec<&str>> {
        let mut done: HashSet<&str> = HashSet::new();
        let mut path: Vec<&str> = Vec::new();
        let mut order: Vec<&str> = Vec::new();
        for name in self.callables.keys() {
            self.visit(name, &mut done, &mut path, &mut order)?;
        }
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        done: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
        order: &mut Vec<&'a str>,
    ) -> Result<()> {
        if done.contains(name) {
            return Ok(());
        }
        if let Some(start) = path.iter().position(|n| *n == name) {
            let mut cycle: Vec<&str> = path[start..].to_vec();
            cycle.push(name);
            return Err(IrError::graph(
                path[0],
                format!("circular call chain: {}", cycle.join(" -> ")),
            ));
        }
        let callable = self
            .callables
            .get(name)
            .ok_or_else(|| IrError::UnknownCallable(name.to_string()))?;
        path.push(name);
        for dependency in callable.dependencies() {
            self.visit(dependency, done, path, order)?;
        }
        path.pop();
        done.insert(name);
        order.push(name);
        Ok(())
    }

    /// Check structural invariants of the whole bundle.
    ///
    /// Every reference resolves, call chains are acyclic, each workflow's
    /// stages form a backward-only DAG, defaults are well-typed, and schema
    /// names are unambiguous.
    pub fn validate(&self) -> Result<()> {
        self.dependency_order()?;
        if let Some(primary) = &self.primary
            && !self.callables.contains_key(primary)
        {
            return Err(IrError::UnknownCallable(primary.clone()));
        }

        let lookup = |name: &str| -> Option<Signature> { self.get(name).map(Callable::signature) };
        let mut schemas: IndexMap<String, &Type> = IndexMap::new();
        for ty in self.type_aliases.values() {
            register_schemas(ty, &mut schemas)?;
        }
        for callable in self.callables.values() {
            for parameter in callable.inputs().iter().chain(callable.outputs()) {
                register_schemas(&parameter.ty, &mut schemas)?;
                if let Some(default) = &parameter.default {
                    default.check(&parameter.ty)?;
                }
            }
            if let Callable::Workflow(workflow) = callable {
                workflow.verify(&lookup)?;
            }
        }
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// JSON schema of the serialized bundle.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Bundle)).unwrap_or_default()
    }
}

fn register_schemas<'a>(ty: &'a Type, seen: &mut IndexMap<String, &'a Type>) -> Result<()> {
    let mut found = Vec::new();
    ty.collect_schemas(&mut found);
    for schema in found {
        if let Type::Schema { name, .. } = schema {
            match seen.get(name) {
                Some(existing) if *existing != schema => {
                    return Err(IrError::SchemaConflict(name.clone()));
                }
                Some(_) => {}
                None => {
                    seen.insert(name.clone(), schema);
                }
            }
        }
    }
    Ok(())
}
