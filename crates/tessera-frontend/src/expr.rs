// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Source expressions.
//!
//! Both front-ends hand over the same small expression AST. Expressions are
//! rendered to the runtime expression language (minijinja syntax) and typed
//! statically so that block closures and scatter items get declared types.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tessera_ir::Type;

use crate::error::{FrontendError, Result};

/// An expression AST node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Expr {
    Literal(Json),
    /// A name, possibly dotted (`call.output`, `record.field`).
    Ident(String),
    Array(Vec<Expr>),
    /// Operator or function application.
    Apply { func: String, args: Vec<Expr> },
}

const BINARY_OPS: &[&str] = &[
    "+", "-", "*", "/", "%", "==", "!=", "<", "<=", ">", ">=", "&&", "||",
];

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn apply(func: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Apply {
            func: func.into(),
            args,
        }
    }

    /// Every identifier the expression reads, in first-use order.
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Ident(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Array(items) => items.iter().for_each(|e| e.collect_references(out)),
            Expr::Apply { args, .. } => args.iter().for_each(|e| e.collect_references(out)),
        }
    }

    /// The literal value, if this is a constant.
    pub fn as_literal(&self) -> Option<&Json> {
        match self {
            Expr::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Fold to a constant when the expression has no free references.
    pub fn constant(&self) -> Option<Json> {
        match self {
            Expr::Literal(v) => Some(v.clone()),
            Expr::Array(items) => items
                .iter()
                .map(Expr::constant)
                .collect::<Option<Vec<_>>>()
                .map(Json::Array),
            _ => None,
        }
    }

    /// Number of elements, when statically known.
    pub fn static_array_len(&self) -> Option<usize> {
        match self {
            Expr::Literal(Json::Array(items)) => Some(items.len()),
            Expr::Array(items) => Some(items.len()),
            Expr::Apply { func, args } if func == "range" && args.len() == 1 => args[0]
                .as_literal()
                .and_then(Json::as_u64)
                .and_then(|n| usize::try_from(n).ok()),
            _ => None,
        }
    }

    /// Render in runtime expression syntax.
    pub fn render(&self) -> String {
        match self {
            Expr::Literal(value) => render_literal(value),
            Expr::Ident(name) => name.clone(),
            Expr::Array(items) => format!(
                "[{}]",
                items.iter().map(Expr::render).collect::<Vec<_>>().join(", ")
            ),
            Expr::Apply { func, args } => render_apply(func, args),
        }
    }

    /// Static type of the expression given the types of names in scope.
    pub fn type_of(&self, scope: &dyn Fn(&str) -> Option<Type>) -> Result<Type> {
        match self {
            Expr::Literal(value) => literal_type(value),
            Expr::Ident(name) => lookup(name, scope),
            Expr::Array(items) => {
                let first = items
                    .first()
                    .ok_or_else(|| FrontendError::UntypedExpression("[]".into()))?;
                Ok(Type::array(first.type_of(scope)?))
            }
            Expr::Apply { func, args } => apply_type(func, args, scope),
        }
    }
}

fn render_literal(value: &Json) -> String {
    match value {
        Json::Null => "none".to_string(),
        Json::Array(items) => format!(
            "[{}]",
            items.iter().map(render_literal).collect::<Vec<_>>().join(", ")
        ),
        Json::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("{}: {}", Json::String(k.clone()), render_literal(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        other => other.to_string(),
    }
}

fn render_apply(func: &str, args: &[Expr]) -> String {
    let rendered: Vec<String> = args.iter().map(Expr::render).collect();
    match (func, rendered.as_slice()) {
        ("+", [a, b]) if is_string_literal(&args[0]) || is_string_literal(&args[1]) => {
            format!("({} ~ {})", a, b)
        }
        ("&&", [a, b]) => format!("({} and {})", a, b),
        ("||", [a, b]) => format!("({} or {})", a, b),
        (op, [a, b]) if BINARY_OPS.contains(&op) => format!("({} {} {})", a, op, b),
        ("!", [a]) => format!("(not {})", a),
        ("-", [a]) => format!("(-{})", a),
        ("if", [c, t, e]) => format!("({} if {} else {})", t, c, e),
        ("[]", [a, i]) => format!("{}[{}]", a, i),
        (name, all) => format!("{}({})", name, all.join(", ")),
    }
}

fn is_string_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Literal(Json::String(_)))
}

fn literal_type(value: &Json) -> Result<Type> {
    match value {
        Json::Bool(_) => Ok(Type::Boolean),
        Json::Number(n) if n.is_i64() || n.is_u64() => Ok(Type::Int),
        Json::Number(_) => Ok(Type::Float),
        Json::String(_) => Ok(Type::String),
        Json::Array(items) => match items.first() {
            Some(first) => Ok(Type::array(literal_type(first)?)),
            None => Err(FrontendError::UntypedExpression("[]".into())),
        },
        Json::Object(_) => Ok(Type::Hash),
        Json::Null => Err(FrontendError::UntypedExpression("null".into())),
    }
}

/// Resolve a possibly dotted name, walking record fields after the first
/// segment that is in scope.
fn lookup(name: &str, scope: &dyn Fn(&str) -> Option<Type>) -> Result<Type> {
    if let Some(ty) = scope(name) {
        return Ok(ty);
    }
    let mut prefix = name;
    while let Some((head, _)) = prefix.rsplit_once('.') {
        if let Some(mut ty) = scope(head) {
            for field in name[head.len() + 1..].split('.') {
                ty = match ty.unwrap_optional() {
                    Type::Schema { fields, .. } => fields
                        .get(field)
                        .cloned()
                        .ok_or_else(|| FrontendError::UnknownIdentifier(name.to_string()))?,
                    Type::Hash => Type::Hash,
                    _ => return Err(FrontendError::UnknownIdentifier(name.to_string())),
                };
            }
            return Ok(ty);
        }
        prefix = head;
    }
    Err(FrontendError::UnknownIdentifier(name.to_string()))
}

fn apply_type(func: &str, args: &[Expr], scope: &dyn Fn(&str) -> Option<Type>) -> Result<Type> {
    let arg = |i: usize| -> Result<Type> {
        args.get(i)
            .ok_or_else(|| FrontendError::UntypedExpression(format!("{}() is missing argument {}", func, i + 1)))?
            .type_of(scope)
    };
    match func {
        "==" | "!=" | "<" | "<=" | ">" | ">=" | "&&" | "||" | "!" | "defined" | "read_boolean" => {
            Ok(Type::Boolean)
        }
        "+" | "-" | "*" | "/" | "%" => {
            let left = arg(0)?;
            if args.len() == 1 {
                return Ok(left);
            }
            let right = arg(1)?;
            match (left.unwrap_optional(), right.unwrap_optional()) {
                (Type::String, _) | (_, Type::String) => Ok(Type::String),
                (Type::File, _) if func == "+" => Ok(Type::String),
                (Type::Float, _) | (_, Type::Float) => Ok(Type::Float),
                _ => Ok(Type::Int),
            }
        }
        "if" => {
            let then = arg(1)?;
            let otherwise = arg(2)?;
            if otherwise.is_optional() {
                Ok(Type::optional(then))
            } else {
                Ok(then)
            }
        }
        "[]" => match arg(0)?.unwrap_optional() {
            Type::Array { item, .. } => Ok((**item).clone()),
            Type::Hash => Ok(Type::Hash),
            other => Err(FrontendError::UntypedExpression(format!(
                "cannot index into {}",
                other
            ))),
        },
        "range" => Ok(Type::array(Type::Int)),
        "length" | "read_int" => Ok(Type::Int),
        "size" | "read_float" => Ok(Type::Float),
        "read_string" | "basename" | "sub" => Ok(Type::String),
        "read_lines" | "prefix" => Ok(Type::array(Type::String)),
        "read_json" => Ok(Type::Hash),
        "stdout" | "stderr" => Ok(Type::File),
        "glob" => Ok(Type::array(Type::File)),
        "select_first" => match arg(0)? {
            Type::Array { item, .. } => Ok(item.unwrap_optional().clone()),
            other => Err(FrontendError::UntypedExpression(format!(
                "select_first over {}",
                other
            ))),
        },
        "select_all" => match arg(0)? {
            Type::Array { item, .. } => Ok(Type::array(item.unwrap_optional().clone())),
            other => Err(FrontendError::UntypedExpression(format!(
                "select_all over {}",
                other
            ))),
        },
        "flatten" => match arg(0)? {
            Type::Array { item, .. } => match *item {
                Type::Array { item, .. } => Ok(Type::array(*item)),
                other => Err(FrontendError::UntypedExpression(format!("flatten over {}", other))),
            },
            other => Err(FrontendError::UntypedExpression(format!("flatten over {}", other))),
        },
        other => Err(FrontendError::UntypedExpression(format!("{}(...)", other))),
    }
}
