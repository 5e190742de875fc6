// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtime expressions and command templates.
//!
//! Task expressions are rendered by the front-ends into minijinja expression
//! syntax and evaluated here against the job's inputs. Relative paths are
//! resolved against the working directory.
//!
//! | Function | Result |
//! |----------|--------|
//! | `glob(pattern)` | sorted matching paths |
//! | `read_string(path)` | contents without the trailing newline |
//! | `read_int`, `read_float`, `read_boolean` | contents parsed |
//! | `read_lines(path)` | list of lines |
//! | `read_json(path)` | parsed JSON |
//! | `stdout()`, `stderr()` | paths of the captured command streams |
//! | `basename(path[, suffix])` | final path component |
//! | `size(path[, unit])` | size in bytes, or in `KB`, `MiB`, ... |
//! | `defined(x)` | `x` is not none |
//! | `select_first(xs)` | first element that is not none |
//! | `length(xs)` | number of elements |

use minijinja::value::Value as JinjaValue;
use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior};
use serde::Serialize;
use serde_json::Value as Json;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub struct Evaluator {
    env: Environment<'static>,
}

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn read(base: &Path, path: &str) -> std::result::Result<String, Error> {
    let full = resolve(base, path);
    fs::read_to_string(&full).map_err(|e| invalid(format!("cannot read {}: {}", full.display(), e)))
}

fn unit_factor(unit: &str) -> std::result::Result<f64, Error> {
    let factor = match unit.trim().to_ascii_uppercase().as_str() {
        "B" => 1.0,
        "K" | "KB" => 1e3,
        "M" | "MB" => 1e6,
        "G" | "GB" => 1e9,
        "T" | "TB" => 1e12,
        "KI" | "KIB" => 1024.0,
        "MI" | "MIB" => 1024.0 * 1024.0,
        "GI" | "GIB" => 1024.0 * 1024.0 * 1024.0,
        "TI" | "TIB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        other => return Err(invalid(format!("unknown size unit '{}'", other))),
    };
    Ok(factor)
}

fn disk_usage(path: &Path) -> std::io::Result<u64> {
    let meta = fs::metadata(path)?;
    if !meta.is_dir() {
        return Ok(meta.len());
    }
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        total += disk_usage(&entry?.path())?;
    }
    Ok(total)
}

impl Evaluator {
    /// Evaluator for a job working in `work_dir` whose command streams are
    /// captured in `meta_dir`.
    pub fn new(work_dir: &Path, meta_dir: &Path) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        let work = work_dir.to_path_buf();
        env.add_function("glob", move |pattern: String| {
            let full = resolve(&work, &pattern);
            let paths = glob::glob(&full.to_string_lossy())
                .map_err(|e| invalid(format!("invalid glob pattern '{}': {}", pattern, e)))?;
            let mut matches: Vec<String> = paths
                .filter_map(|p| p.ok())
                .filter(|p| p.is_file())
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            matches.sort();
            Ok::<_, Error>(matches)
        });

        let work = work_dir.to_path_buf();
        env.add_function("read_string", move |path: String| {
            let text = read(&work, &path)?;
            Ok::<_, Error>(text.strip_suffix('\n').unwrap_or(&text).to_string())
        });

        let work = work_dir.to_path_buf();
        env.add_function("read_int", move |path: String| {
            let text = read(&work, &path)?;
            text.trim()
                .parse::<i64>()
                .map_err(|_| invalid(format!("{} does not hold an integer", path)))
        });

        let work = work_dir.to_path_buf();
        env.add_function("read_float", move |path: String| {
            let text = read(&work, &path)?;
            text.trim()
                .parse::<f64>()
                .map_err(|_| invalid(format!("{} does not hold a number", path)))
        });

        let work = work_dir.to_path_buf();
        env.add_function("read_boolean", move |path: String| {
            let text = read(&work, &path)?;
            match text.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(invalid(format!("{} does not hold a boolean", path))),
            }
        });

        let work = work_dir.to_path_buf();
        env.add_function("read_lines", move |path: String| {
            let text = read(&work, &path)?;
            Ok::<_, Error>(text.lines().map(str::to_string).collect::<Vec<_>>())
        });

        let work = work_dir.to_path_buf();
        env.add_function("read_json", move |path: String| {
            let text = read(&work, &path)?;
            let json: Json = serde_json::from_str(&text)
                .map_err(|e| invalid(format!("{} is not JSON: {}", path, e)))?;
            Ok::<_, Error>(JinjaValue::from_serialize(&json))
        });

        let stdout = meta_dir.join("stdout").to_string_lossy().into_owned();
        env.add_function("stdout", move || stdout.clone());
        let stderr = meta_dir.join("stderr").to_string_lossy().into_owned();
        env.add_function("stderr", move || stderr.clone());

        env.add_function("basename", |path: String, suffix: Option<String>| {
            let name = Path::new(&path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match suffix {
                Some(suffix) => name.strip_suffix(suffix.as_str()).unwrap_or(&name).to_string(),
                None => name,
            }
        });

        let work = work_dir.to_path_buf();
        env.add_function("size", move |path: JinjaValue, unit: Option<String>| {
            let factor = unit.as_deref().map(unit_factor).transpose()?.unwrap_or(1.0);
            if path.is_none() {
                return Ok(0.0);
            }
            let path = path.to_string();
            let full = resolve(&work, &path);
            let bytes = disk_usage(&full)
                .map_err(|e| invalid(format!("cannot stat {}: {}", full.display(), e)))?;
            Ok::<_, Error>(bytes as f64 / factor)
        });

        env.add_function("defined", |value: JinjaValue| {
            !value.is_none() && !value.is_undefined()
        });

        env.add_function("select_first", |values: Vec<JinjaValue>| {
            values
                .into_iter()
                .find(|v| !v.is_none() && !v.is_undefined())
                .ok_or_else(|| invalid("select_first: every element is none"))
        });

        env.add_function("length", |value: JinjaValue| {
            value
                .len()
                .ok_or_else(|| invalid(format!("length of {} is undefined", value.kind())))
        });

        Self { env }
    }

    /// Evaluate `expr` with the names in `ctx` in scope.
    pub fn eval(&self, expr: &str, ctx: &impl Serialize) -> Result<Json> {
        let compiled = self.env.compile_expression(expr)?;
        let value = compiled.eval(JinjaValue::from_serialize(ctx))?;
        Ok(serde_json::to_value(&value)?)
    }

    /// Render a command template.
    pub fn render(&self, template: &str, ctx: &impl Serialize) -> Result<String> {
        Ok(self.env.render_str(template, JinjaValue::from_serialize(ctx))?)
    }
}
