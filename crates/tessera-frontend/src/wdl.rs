// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! WDL front-end.
//!
//! Types are WDL type strings (`Array[File]+`, `Map[String,Int]`, `Sample?`),
//! files are plain path or URI strings, and command placeholders use `~{}`
//! or `${}`.

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value as Json;
use std::sync::LazyLock;
use tessera_ir::coercion::{decode_with, native_path};
use tessera_ir::{Type, Value};

use crate::error::{FrontendError, Result};
use crate::{Frontend, Language, TypeContext};

/// Prefix of the schema name synthesized for `Pair[L,R]`.
pub const PAIR_PREFIX: &str = "Pair___";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[~$]\{([^}]*)\}").expect("placeholder regex"));

static OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(sep|true|false|default)\s*=\s*("[^"]*"|'[^']*')\s*"#).expect("option regex")
});

static SEP_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*sep\(\s*("[^"]*"|'[^']*')\s*,\s*(.+?)\s*\)\s*$"#).expect("sep regex")
});

pub struct WdlFrontend;

impl Frontend for WdlFrontend {
    fn language(&self) -> Language {
        Language::Wdl
    }

    fn to_ir_type(&self, source: &Json, ctx: &TypeContext) -> Result<Type> {
        let text = source
            .as_str()
            .ok_or_else(|| FrontendError::UnsupportedType(source.to_string()))?;
        let mut parser = TypeParser {
            src: text,
            pos: 0,
            ctx,
        };
        let ty = parser.parse()?;
        parser.skip_ws();
        if parser.pos != text.len() {
            return Err(FrontendError::UnsupportedType(text.to_string()));
        }
        Ok(ty)
    }

    fn from_ir_type(&self, ty: &Type) -> Json {
        Json::String(spell(ty))
    }

    fn to_ir_value(&self, value: &Json, ty: &Type) -> Result<Value> {
        Ok(decode_with(value, ty, &native_path)?)
    }

    fn from_ir_value(&self, value: &Value) -> Json {
        value.encode_with(&|_, uri| Json::String(uri.to_string()))
    }

    fn command_template(&self, command: &str) -> String {
        let mut out = String::with_capacity(command.len());
        let mut last = 0;
        for captures in PLACEHOLDER.captures_iter(command) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            push_literal(&mut out, &command[last..whole.start()]);
            out.push_str(&placeholder(&captures[1]));
            last = whole.end();
        }
        push_literal(&mut out, &command[last..]);
        out
    }
}

/// Copy literal command text, shielding anything the template engine would
/// interpret.
fn push_literal(out: &mut String, text: &str) {
    if text.contains("{{") || text.contains("{%") || text.contains("{#") {
        out.push_str("{% raw %}");
        out.push_str(text);
        out.push_str("{% endraw %}");
    } else {
        out.push_str(text);
    }
}

fn placeholder(body: &str) -> String {
    if let Some(c) = SEP_CALL.captures(body) {
        return format!("{{{{ {} | join({}) }}}}", c[2].trim(), &c[1]);
    }

    let mut options: IndexMap<String, String> = IndexMap::new();
    let mut rest = body;
    while let Some(c) = OPTION.captures(rest) {
        let Some(whole) = c.get(0) else {
            break;
        };
        options.insert(c[1].to_string(), c[2].to_string());
        rest = &rest[whole.end()..];
    }
    let expr = rest.trim();

    if let Some(sep) = options.get("sep") {
        return format!("{{{{ {} | join({}) }}}}", expr, sep);
    }
    if let (Some(t), Some(f)) = (options.get("true"), options.get("false")) {
        return format!("{{{{ {} if {} else {} }}}}", t, expr, f);
    }
    if let Some(default) = options.get("default") {
        return format!("{{{{ {} if {} is not none else {} }}}}", expr, expr, default);
    }
    format!("{{{{ {} }}}}", expr)
}

fn spell(ty: &Type) -> String {
    match ty {
        Type::Boolean => "Boolean".into(),
        Type::Int => "Int".into(),
        Type::Float => "Float".into(),
        Type::String => "String".into(),
        Type::File => "File".into(),
        Type::Directory => "Directory".into(),
        Type::Optional { inner } => format!("{}?", spell(inner)),
        Type::Array { item, non_empty } => {
            format!("Array[{}]{}", spell(item), if *non_empty { "+" } else { "" })
        }
        Type::Hash => "Object".into(),
        Type::Schema { name, fields, .. } => {
            if name.starts_with(PAIR_PREFIX)
                && let (Some(left), Some(right)) = (fields.get("left"), fields.get("right"))
            {
                return format!("Pair[{},{}]", spell(left), spell(right));
            }
            name.clone()
        }
    }
}

fn pair_type(left: Type, right: Type) -> Type {
    let mangle = |t: &Type| {
        spell(t)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect::<String>()
    };
    let name = format!("{}{}_{}", PAIR_PREFIX, mangle(&left), mangle(&right));
    let mut fields = IndexMap::new();
    fields.insert("left".to_string(), left);
    fields.insert("right".to_string(), right);
    Type::record(name, fields)
}

struct TypeParser<'a> {
    src: &'a str,
    pos: usize,
    ctx: &'a TypeContext,
}

impl TypeParser<'_> {
    fn skip_ws(&mut self) {
        while let Some(c) = self.src[self.pos..].chars().next()
            && c.is_whitespace()
        {
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.src[self.pos..].starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(FrontendError::UnsupportedType(self.src.to_string()))
        }
    }

    fn ident(&mut self) -> Result<&str> {
        self.skip_ws();
        let rest = &self.src[self.pos..];
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(FrontendError::UnsupportedType(self.src.to_string()));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn args(&mut self) -> Result<Vec<Type>> {
        self.expect('[')?;
        let mut args = vec![self.parse()?];
        while self.eat(',') {
            args.push(self.parse()?);
        }
        self.expect(']')?;
        Ok(args)
    }

    fn parse(&mut self) -> Result<Type> {
        let name = self.ident()?.to_string();
        let base = match name.as_str() {
            "Boolean" => Type::Boolean,
            "Int" => Type::Int,
            "Float" => Type::Float,
            "String" => Type::String,
            "File" => Type::File,
            "Directory" => Type::Directory,
            "Object" => Type::Hash,
            "Array" => {
                let mut args = self.args()?;
                if args.len() != 1 {
                    return Err(FrontendError::UnsupportedType(self.src.to_string()));
                }
                let item = args.remove(0);
                if self.eat('+') {
                    Type::non_empty_array(item)
                } else {
                    Type::array(item)
                }
            }
            "Map" => {
                let args = self.args()?;
                match args.as_slice() {
                    [Type::String, _] => Type::Hash,
                    _ => return Err(FrontendError::UnsupportedType(self.src.to_string())),
                }
            }
            "Pair" => {
                let mut args = self.args()?;
                if args.len() != 2 {
                    return Err(FrontendError::UnsupportedType(self.src.to_string()));
                }
                let right = args.remove(1);
                let left = args.remove(0);
                pair_type(left, right)
            }
            other => self
                .ctx
                .get(other)
                .cloned()
                .ok_or_else(|| FrontendError::UnknownStruct(other.to_string()))?,
        };
        let mut ty = base;
        while self.eat('?') {
            ty = Type::optional(ty);
        }
        Ok(ty)
    }
}
