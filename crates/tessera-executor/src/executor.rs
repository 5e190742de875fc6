// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task executor state machine.
//!
//! Each action runs in its own process; they share state only through the
//! job's home directory:
//!
//! ```text
//! <home>/meta/localized.json   Prolog: inputs after localization (IR values)
//! <home>/meta/relaunch_pending.json  Prolog / Relaunch: target of a launch in flight
//! <home>/meta/relaunched.json  Prolog / Relaunch: the child job that took over
//! <home>/meta/command.sh       InstantiateCommand: the rendered command
//! <home>/meta/stdout, stderr   written by command.sh
//! <home>/meta/rc               exit code written by command.sh
//! <home>/work/                 working directory of the command
//! <home>/inputs/               localized files
//! ```
//!
//! Once a job has relaunched, every later action is a no-op.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json, json};
use std::fmt;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tessera_frontend::{Dialect, Frontend};
use tessera_ir::coercion::{decode_with, from_native_json, native_path};
use tessera_ir::{InstanceTypeCatalog, Parameter, ResourceRequest, Value};

use crate::error::{ExecutorError, Result};
use crate::eval::Evaluator;
use crate::job_meta::{JobInfo, JobMeta, job_link};

/// Runs `command` and records its streams and exit code.
const COMMAND_SCRIPT: &str = r#"#!/usr/bin/env bash
cd "{{ work_dir }}"
(
{{ command }}
) > "{{ meta_dir }}/stdout" 2> "{{ meta_dir }}/stderr"
echo $? > "{{ meta_dir }}/rc"
exit 0
"#;

/// Phases of the job lifecycle.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    clap::ValueEnum,
    strum::Display,
    strum::EnumString,
)]
pub enum Action {
    /// Localize inputs and check the instance type.
    Prolog,
    /// Write the command script.
    InstantiateCommand,
    /// Collect and publish outputs.
    Epilog,
    /// Report whether the current instance satisfies the requirements.
    CheckInstanceType,
    /// Hand the job over to a child on a suitable instance.
    Relaunch,
}

/// What a successful action did.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done(Action),
    /// The job's outputs are deferred to `child`.
    Relaunched { action: Action, child: String },
    InstanceChecked { satisfied: bool },
}

impl Outcome {
    pub fn action(&self) -> Action {
        match self {
            Outcome::Done(action) | Outcome::Relaunched { action, .. } => *action,
            Outcome::InstanceChecked { .. } => Action::CheckInstanceType,
        }
    }

    pub fn is_relaunch(&self) -> bool {
        matches!(self, Outcome::Relaunched { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "success {}", self.action())
    }
}

/// Persisted record of a relaunch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relaunched {
    pub child: String,
    pub instance_type: String,
}

/// Written before a child is launched, so a retried phase finds the child
/// instead of launching a second one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingRelaunch {
    instance_type: String,
}

/// Directories under the job home.
#[derive(Debug, Clone)]
pub struct Layout {
    pub meta: PathBuf,
    pub work: PathBuf,
    pub inputs: PathBuf,
}

impl Layout {
    pub fn new(home: &Path) -> Self {
        Self {
            meta: home.join("meta"),
            work: home.join("work"),
            inputs: home.join("inputs"),
        }
    }

    pub fn localized(&self) -> PathBuf {
        self.meta.join("localized.json")
    }

    pub fn relaunched(&self) -> PathBuf {
        self.meta.join("relaunched.json")
    }

    pub fn relaunch_pending(&self) -> PathBuf {
        self.meta.join("relaunch_pending.json")
    }

    pub fn command(&self) -> PathBuf {
        self.meta.join("command.sh")
    }

    pub fn rc(&self) -> PathBuf {
        self.meta.join("rc")
    }

    fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.meta)?;
        fs::create_dir_all(&self.work)?;
        fs::create_dir_all(&self.inputs)?;
        Ok(())
    }
}

pub struct TaskExecutor<'a> {
    meta: &'a dyn JobMeta,
    layout: Layout,
}

impl<'a> TaskExecutor<'a> {
    pub fn new(meta: &'a dyn JobMeta) -> Self {
        Self {
            layout: Layout::new(meta.home()),
            meta,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Run one action; failures are tagged with the action.
    pub fn run(&self, action: Action) -> Result<Outcome> {
        tracing::info!(action = %action, home = %self.meta.home().display(), "Starting phase");
        let result = self.layout.create().and_then(|_| match action {
            Action::Prolog => self.prolog(),
            Action::InstantiateCommand => self.instantiate_command(),
            Action::Epilog => self.epilog(),
            Action::CheckInstanceType => self.check_instance_type(),
            Action::Relaunch => self.relaunch_action(),
        });
        match result {
            Ok(outcome) => {
                tracing::info!(action = %action, relaunched = outcome.is_relaunch(), "Phase complete");
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(action = %action, error = %e, "Phase failed");
                Err(ExecutorError::Phase {
                    action,
                    source: Box::new(e),
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    fn prolog(&self) -> Result<Outcome> {
        if let Some(previous) = self.previous_relaunch()? {
            return Ok(Outcome::Relaunched {
                action: Action::Prolog,
                child: previous.child,
            });
        }
        let info = self.meta.job_info()?;
        let frontend = frontend(&info)?;
        let raw = self.meta.job_input()?;

        let localized = self.localize_inputs(&info, frontend, &raw)?;
        write_json(&self.layout.localized(), &localized)?;
        tracing::debug!(inputs = localized.len(), "Wrote localized inputs");

        let evaluator = self.evaluator();
        let ctx = context(frontend, &localized);
        let request = self.request(&info, &evaluator, &ctx)?;
        if satisfied(&info, &request) {
            return Ok(Outcome::Done(Action::Prolog));
        }
        let child = self.relaunch(&info, &request, &raw)?;
        Ok(Outcome::Relaunched {
            action: Action::Prolog,
            child,
        })
    }

    fn instantiate_command(&self) -> Result<Outcome> {
        if let Some(previous) = self.previous_relaunch()? {
            return Ok(Outcome::Relaunched {
                action: Action::InstantiateCommand,
                child: previous.child,
            });
        }
        let info = self.meta.job_info()?;
        let frontend = frontend(&info)?;
        let localized = self.load_localized()?;
        let evaluator = self.evaluator();

        let command = evaluator.render(&info.task.command, &context(frontend, &localized))?;
        let script = evaluator.render(
            COMMAND_SCRIPT,
            &json!({
                "work_dir": self.layout.work.to_string_lossy(),
                "meta_dir": self.layout.meta.to_string_lossy(),
                "command": command.trim_end(),
            }),
        )?;
        fs::write(self.layout.command(), script)?;
        fs::set_permissions(self.layout.command(), fs::Permissions::from_mode(0o755))?;
        tracing::debug!(task = %info.task.name, path = %self.layout.command().display(), "Wrote command script");
        Ok(Outcome::Done(Action::InstantiateCommand))
    }

    fn epilog(&self) -> Result<Outcome> {
        if let Some(previous) = self.previous_relaunch()? {
            return Ok(Outcome::Relaunched {
                action: Action::Epilog,
                child: previous.child,
            });
        }
        let info = self.meta.job_info()?;
        let frontend = frontend(&info)?;
        let localized = self.load_localized()?;

        let rc_path = self.layout.rc();
        let rc_text = fs::read_to_string(&rc_path)
            .map_err(|_| ExecutorError::MissingState(rc_path.display().to_string()))?;
        let rc: i32 = rc_text.trim().parse().map_err(|_| {
            ExecutorError::RuntimeExecution(format!("unreadable exit code '{}'", rc_text.trim()))
        })?;
        if rc != 0 {
            return Err(ExecutorError::RuntimeExecution(format!(
                "command exited with code {}{}",
                rc,
                self.stderr_tail()
            )));
        }

        let evaluator = self.evaluator();
        let mut scope = localized.clone();
        let mut outputs = Map::new();
        for parameter in &info.task.outputs {
            let expr = info.task.output_exprs.get(&parameter.name).ok_or_else(|| {
                ExecutorError::JobMeta(format!("output '{}' has no expression", parameter.name))
            })?;
            let value = self.output_value(&evaluator, frontend, &scope, parameter, expr)?;
            let uploaded = value
                .clone()
                .try_map_paths(&mut |_, path| self.meta.upload(Path::new(&path)))?;
            outputs.insert(parameter.name.clone(), uploaded.to_native_json());
            scope.insert(parameter.name.clone(), value);
        }
        self.meta.write_outputs(&outputs)?;
        tracing::info!(task = %info.task.name, outputs = outputs.len(), "Published outputs");
        Ok(Outcome::Done(Action::Epilog))
    }

    fn check_instance_type(&self) -> Result<Outcome> {
        let info = self.meta.job_info()?;
        let frontend = frontend(&info)?;
        let localized = self.load_localized()?;
        let request = self.request(&info, &self.evaluator(), &context(frontend, &localized))?;
        Ok(Outcome::InstanceChecked {
            satisfied: satisfied(&info, &request),
        })
    }

    fn relaunch_action(&self) -> Result<Outcome> {
        if let Some(previous) = self.previous_relaunch()? {
            return Ok(Outcome::Relaunched {
                action: Action::Relaunch,
                child: previous.child,
            });
        }
        let info = self.meta.job_info()?;
        let frontend = frontend(&info)?;
        let raw = self.meta.job_input()?;
        let localized = match self.load_localized() {
            Ok(localized) => localized,
            Err(ExecutorError::MissingState(_)) => self.localize_inputs(&info, frontend, &raw)?,
            Err(e) => return Err(e),
        };
        let request = self.request(&info, &self.evaluator(), &context(frontend, &localized))?;
        let child = self.relaunch(&info, &request, &raw)?;
        Ok(Outcome::Relaunched {
            action: Action::Relaunch,
            child,
        })
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn evaluator(&self) -> Evaluator {
        Evaluator::new(&self.layout.work, &self.layout.meta)
    }

    fn previous_relaunch(&self) -> Result<Option<Relaunched>> {
        let path = self.layout.relaunched();
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&fs::read_to_string(path)?)?))
    }

    fn load_localized(&self) -> Result<IndexMap<String, Value>> {
        let path = self.layout.localized();
        let text = fs::read_to_string(&path)
            .map_err(|_| ExecutorError::MissingState(path.display().to_string()))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Decode, default and stage every declared input.
    fn localize_inputs(
        &self,
        info: &JobInfo,
        frontend: &dyn Frontend,
        raw: &Map<String, Json>,
    ) -> Result<IndexMap<String, Value>> {
        let mut values: IndexMap<String, Value> = IndexMap::new();
        let mut deferred: Vec<&Parameter> = Vec::new();
        let mut staged = 0usize;

        for parameter in &info.task.inputs {
            let value = match raw.get(&parameter.name) {
                Some(json) => from_native_json(json, &parameter.ty)?,
                None => match &parameter.default {
                    Some(default) => default.clone(),
                    None if info.task.input_exprs.contains_key(&parameter.name) => {
                        deferred.push(parameter);
                        continue;
                    }
                    None if parameter.ty.is_optional() => Value::Null,
                    None => return Err(ExecutorError::MissingInput(parameter.name.clone())),
                },
            };
            let value = self.stage(value, &mut staged)?;
            values.insert(parameter.name.clone(), value);
        }

        // Expression defaults, in the order that puts each after the
        // defaults it reads.
        let evaluator = self.evaluator();
        for (name, expr) in &info.task.input_exprs {
            let Some(parameter) = deferred.iter().find(|p| &p.name == name) else {
                continue;
            };
            let json = evaluator.eval(expr, &context(frontend, &values))?;
            let value = decode_with(&json, &parameter.ty, &native_path)?;
            let value = self.stage(value, &mut staged)?;
            values.insert(parameter.name.clone(), value);
        }
        tracing::info!(inputs = values.len(), staged, "Localized inputs");
        Ok(values)
    }

    /// Copy every file the value names into `inputs/`, leaving files already
    /// staged there in place.
    fn stage(&self, value: Value, staged: &mut usize) -> Result<Value> {
        value.try_map_paths(&mut |kind, uri| {
            if Path::new(&uri).starts_with(&self.layout.inputs) {
                return Ok::<_, ExecutorError>(uri);
            }
            let dest = self.layout.inputs.join(staged.to_string());
            *staged += 1;
            let path = self.meta.localize(kind, &uri, &dest)?;
            Ok(path.to_string_lossy().into_owned())
        })
    }

    fn request(
        &self,
        info: &JobInfo,
        evaluator: &Evaluator,
        ctx: &IndexMap<String, Json>,
    ) -> Result<ResourceRequest> {
        info.task
            .requirements
            .evaluate(|expr: &str| evaluator.eval(expr, ctx))
    }

    /// Launch a child on the cheapest instance satisfying `request` and
    /// point every output at it.
    fn relaunch(
        &self,
        info: &JobInfo,
        request: &ResourceRequest,
        raw: &Map<String, Json>,
    ) -> Result<String> {
        let pending_path = self.layout.relaunch_pending();
        let (target, existing) = if pending_path.exists() {
            let pending: PendingRelaunch =
                serde_json::from_str(&fs::read_to_string(&pending_path)?)?;
            let existing = self.meta.find_child(&pending.instance_type)?;
            (pending.instance_type, existing)
        } else {
            let target = info.catalog.choose(request)?.name.clone();
            write_json(
                &pending_path,
                &PendingRelaunch {
                    instance_type: target.clone(),
                },
            )?;
            (target, None)
        };
        let child = match existing {
            Some(child) => {
                tracing::info!(job = %info.job_id, child = %child, "Resuming interrupted relaunch");
                child
            }
            None => self.meta.launch_child(&target, raw)?,
        };
        tracing::info!(
            job = %info.job_id,
            current = %info.instance_type,
            target = %target,
            child = %child,
            "Relaunching on a suitable instance"
        );

        let outputs: Map<String, Json> = info
            .task
            .outputs
            .iter()
            .map(|p| (p.name.clone(), job_link(&child, &p.name)))
            .collect();
        self.meta.write_outputs(&outputs)?;
        write_json(
            &self.layout.relaunched(),
            &Relaunched {
                child: child.clone(),
                instance_type: target,
            },
        )?;
        fs::remove_file(&pending_path)?;
        Ok(child)
    }

    fn output_value(
        &self,
        evaluator: &Evaluator,
        frontend: &dyn Frontend,
        scope: &IndexMap<String, Value>,
        parameter: &Parameter,
        expr: &str,
    ) -> Result<Value> {
        let optional = parameter.ty.is_optional();
        let json = match evaluator.eval(expr, &context(frontend, scope)) {
            Ok(json) => json,
            Err(e) if optional => {
                tracing::debug!(output = %parameter.name, error = %e, "Optional output left empty");
                return Ok(Value::Null);
            }
            Err(e) => return Err(e),
        };
        let value = decode_with(&json, &parameter.ty, &native_path)?;
        let value = value.try_map_paths(&mut |_, path| {
            Ok::<_, ExecutorError>(self.layout.work.join(path).to_string_lossy().into_owned())
        })?;
        if let Some((_, missing)) = value.paths().into_iter().find(|(_, p)| !Path::new(p).exists()) {
            if optional {
                return Ok(Value::Null);
            }
            return Err(ExecutorError::RuntimeExecution(format!(
                "output '{}' refers to {}, which does not exist",
                parameter.name, missing
            )));
        }
        Ok(value)
    }

    fn stderr_tail(&self) -> String {
        let Ok(text) = fs::read_to_string(self.layout.meta.join("stderr")) else {
            return String::new();
        };
        let lines: Vec<&str> = text.lines().collect();
        let tail = &lines[lines.len().saturating_sub(5)..];
        if tail.is_empty() {
            String::new()
        } else {
            format!(": {}", tail.join(" | "))
        }
    }
}

fn frontend(info: &JobInfo) -> Result<&'static dyn Frontend> {
    let dialect: Dialect = info.task.language.parse()?;
    Ok(dialect.frontend())
}

/// Input values as the task's language sees them.
fn context(frontend: &dyn Frontend, values: &IndexMap<String, Value>) -> IndexMap<String, Json> {
    values
        .iter()
        .map(|(name, value)| (name.clone(), frontend.from_ir_value(value)))
        .collect()
}

/// Whether the job's instance satisfies `request`. An instance type missing
/// from the catalog cannot be checked and is accepted.
fn satisfied(info: &JobInfo, request: &ResourceRequest) -> bool {
    if request.is_empty() {
        return true;
    }
    match info.catalog.get(&info.instance_type) {
        Some(current) => InstanceTypeCatalog::satisfies(current, request),
        None => {
            tracing::warn!(instance_type = %info.instance_type, "Current instance type not in catalog");
            true
        }
    }
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

