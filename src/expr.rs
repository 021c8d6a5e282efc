//! Expression evaluation over rendered template text.
//!
//! Rendered text goes through three stages: a JSON literal is taken as is,
//! otherwise the text is evaluated as a single rhai expression with the
//! helper bindings in scope, and if that fails too the text itself is the
//! result. Nothing here ever returns an error for bad input.
//!
//! Config authors write JavaScript-style expressions, so before compiling,
//! `'single quoted'` strings become rhai strings, `===`/`!==` become
//! `==`/`!=`, and `c ? a : b` becomes `if (c) { a } else { b }`. Integer
//! division yields a float, and floats without a fraction come back as
//! integers.

use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::EngineError;
use crate::template;
use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST, FLOAT, INT};
use serde_json::{Map, Value};

/// Named values and functions available to expressions.
#[derive(Debug, Clone, Default)]
pub struct Helpers {
    bindings: Map<String, Value>,
    script: Option<String>,
}

impl Helpers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value under a name, e.g. `"currency"` -> `"EUR"`.
    pub fn bind<V: Into<Value>>(mut self, name: &str, value: V) -> Self {
        self.bindings.insert(name.to_string(), value.into());
        self
    }

    /// Bind every field of a JSON object.
    pub fn bind_all(mut self, values: Map<String, Value>) -> Self {
        self.bindings.extend(values);
        self
    }

    /// Helper functions written as rhai `fn` definitions.
    pub fn functions(mut self, script: &str) -> Self {
        self.script = Some(script.to_string());
        self
    }

}

/// Sandboxed evaluator with a fixed set of helpers.
pub struct Evaluator {
    engine: Engine,
    functions: AST,
    bindings: Vec<(String, Dynamic)>,
}

impl Evaluator {
    /// Compile the helpers once for a whole run.
    pub fn new(helpers: &Helpers, config: &EngineConfig) -> Result<Self, EngineError> {
        let engine = sandbox(config);

        let functions = match helpers.script {
            Some(ref script) => engine
                .compile(script)
                .map_err(|e| EngineError::HelperScript(e.to_string()))?,
            None => AST::empty(),
        };

        let bindings = helpers
            .bindings
            .iter()
            .map(|(name, value)| {
                rhai::serde::to_dynamic(value)
                    .map(|v| (name.clone(), v))
                    .map_err(|e| EngineError::HelperBinding {
                        name: name.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            engine,
            functions,
            bindings,
        })
    }

    /// Evaluate rendered text with helpers in scope, falling back to the text.
    pub fn evaluate(&self, text: &str) -> Value {
        self.evaluate_or_literal(text, true)
    }

    /// Evaluate rendered text without any helpers, falling back to the text.
    pub fn evaluate_plain(&self, text: &str) -> Value {
        self.evaluate_or_literal(text, false)
    }

    /// Render then evaluate a templated value. Falsy values pass through.
    pub fn execute(&self, value: &Value, ctx: &Context) -> Value {
        if template::is_falsy(value) {
            return value.clone();
        }
        self.evaluate(&template::render_value(value, ctx))
    }

    /// Like [`execute`](Self::execute) but without helpers.
    pub fn execute_plain(&self, value: &Value, ctx: &Context) -> Value {
        if template::is_falsy(value) {
            return value.clone();
        }
        self.evaluate_plain(&template::render_value(value, ctx))
    }

    fn evaluate_or_literal(&self, text: &str, with_helpers: bool) -> Value {
        if let Ok(literal) = serde_json::from_str::<Value>(text) {
            return integral_floats(literal);
        }
        match self.run(&to_rhai(text), with_helpers) {
            Ok(value) => integral_floats(value),
            Err(reason) => {
                tracing::trace!(text = %text, reason = %reason, "Expression fell back to literal");
                Value::String(text.to_string())
            }
        }
    }

    fn run(&self, text: &str, with_helpers: bool) -> Result<Value, String> {
        let mut scope = Scope::new();
        if with_helpers {
            for (name, value) in &self.bindings {
                scope.push_constant_dynamic(name.as_str(), value.clone());
            }
        }

        let expression = self
            .engine
            .compile_expression_with_scope(&scope, text)
            .map_err(|e| e.to_string())?;
        let ast = if with_helpers {
            self.functions.merge(&expression)
        } else {
            expression
        };

        let result: Dynamic = self
            .engine
            .eval_ast_with_scope(&mut scope, &ast)
            .map_err(|e| e.to_string())?;
        rhai::serde::from_dynamic(&result).map_err(|e| e.to_string())
    }
}

fn sandbox(config: &EngineConfig) -> Engine {
    let mut engine = Engine::new();
    // Registered operators only win over the built-ins without fast operators.
    engine.set_fast_operators(false);
    engine.register_fn("/", divide);
    engine.set_max_operations(config.max_operations);
    engine.set_max_call_levels(32);
    engine.set_max_expr_depths(64, 32);
    engine.set_max_string_size(1 << 20);
    engine.set_max_array_size(10_000);
    engine.set_max_map_size(10_000);
    engine.disable_symbol("eval");
    engine
}

fn divide(a: INT, b: INT) -> Result<FLOAT, Box<EvalAltResult>> {
    if b == 0 {
        return Err("division by zero".into());
    }
    Ok(a as FLOAT / b as FLOAT)
}

/// Collapse floats with no fractional part (`6.0`) into integers.
fn integral_floats(value: Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 => {
                Value::from(f as i64)
            }
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(integral_floats).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k, integral_floats(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Translate JavaScript-style syntax into rhai.
fn to_rhai(text: &str) -> String {
    rewrite_conditionals(&normalize_tokens(text))
}

/// Single-quoted strings become double-quoted, `===` and `!==` lose a `=`.
fn normalize_tokens(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some('\'') => match c {
                '\\' if chars.get(i + 1) == Some(&'\'') => {
                    out.push('\'');
                    i += 1;
                }
                '\\' => {
                    out.push(c);
                    if let Some(&next) = chars.get(i + 1) {
                        out.push(next);
                        i += 1;
                    }
                }
                '"' => out.push_str("\\\""),
                '\'' => {
                    out.push('"');
                    quote = None;
                }
                _ => out.push(c),
            },
            Some(q) => {
                out.push(c);
                if c == '\\' {
                    if let Some(&next) = chars.get(i + 1) {
                        out.push(next);
                        i += 1;
                    }
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' => {
                    out.push('"');
                    quote = Some(c);
                }
                '"' | '`' => {
                    out.push(c);
                    quote = Some(c);
                }
                '=' | '!' if chars.get(i + 1) == Some(&'=') && chars.get(i + 2) == Some(&'=') => {
                    out.push(c);
                    out.push('=');
                    i += 2;
                }
                _ => out.push(c),
            },
        }
        i += 1;
    }
    out
}

/// Nesting depth of each character outside string literals, `None` inside
/// one. A bracket carries the depth of the level it opens or closes.
fn depths(chars: &[char]) -> Vec<Option<usize>> {
    let mut out = Vec::with_capacity(chars.len());
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for &c in chars {
        if let Some(q) = quote {
            out.push(None);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '`' => {
                quote = Some(c);
                out.push(None);
            }
            '(' | '[' | '{' => {
                out.push(Some(depth));
                depth += 1;
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                out.push(Some(depth));
            }
            _ => out.push(Some(depth)),
        }
    }
    out
}

/// Positions of the outermost `?` and its matching `:`.
fn split_conditional(chars: &[char]) -> Option<(usize, usize)> {
    let depths = depths(chars);
    let mut question = None;
    let mut nested = 0usize;

    for (i, &c) in chars.iter().enumerate() {
        if depths[i] != Some(0) {
            continue;
        }
        let prev = i.checked_sub(1).map(|p| chars[p]);
        let next = chars.get(i + 1).copied();
        match c {
            // `??`, `?.` and `?[` are rhai operators
            '?' if prev != Some('?') && !matches!(next, Some('?' | '.' | '[')) => {
                if question.is_none() {
                    question = Some(i);
                } else {
                    nested += 1;
                }
            }
            ':' if question.is_some() && prev != Some(':') && next != Some(':') => {
                if nested == 0 {
                    return question.map(|q| (q, i));
                }
                nested -= 1;
            }
            _ => {}
        }
    }
    None
}

fn rewrite_conditionals(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    match split_conditional(&chars) {
        Some((question, colon)) => {
            let collect = |range: &[char]| range.iter().collect::<String>();
            format!(
                "if ({}) {{ {} }} else {{ {} }}",
                rewrite_groups(collect(&chars[..question]).trim()),
                rewrite_conditionals(collect(&chars[question + 1..colon]).trim()),
                rewrite_conditionals(collect(&chars[colon + 1..]).trim()),
            )
        }
        None => rewrite_groups(text),
    }
}

/// Rewrite conditionals nested inside parentheses and brackets.
fn rewrite_groups(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let depths = depths(&chars);
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if depths[i] == Some(0) && (c == '(' || c == '[') {
            if let Some(close) = (i + 1..chars.len()).find(|&j| depths[j] == Some(0)) {
                let inner: String = chars[i + 1..close].iter().collect();
                out.push(c);
                out.push_str(&rewrite_list(&inner));
                out.push(chars[close]);
                i = close + 1;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Rewrite each comma-separated item of an argument or array list.
fn rewrite_list(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let depths = depths(&chars);
    let mut items = Vec::new();
    let mut start = 0;

    for (i, &c) in chars.iter().enumerate() {
        if c == ',' && depths[i] == Some(0) {
            items.push(chars[start..i].iter().collect::<String>());
            start = i + 1;
        }
    }
    items.push(chars[start..].iter().collect());

    items
        .iter()
        .map(|item| rewrite_conditionals(item))
        .collect::<Vec<_>>()
        .join(",")
}
