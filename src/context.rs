//! Execution context used as the lookup scope for templates.

use serde_json::{Map, Value};

/// Rolling lookup scope for one step.
///
/// Built fresh before every step: caller input, the parsed `qs` snapshot and
/// an `api` field holding every response body collected so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    data: Map<String, Value>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Caller input layered over the query-string snapshot.
    ///
    /// A caller-supplied `qs` wins over the parsed one.
    pub fn input(input: &Map<String, Value>, qs: &Map<String, Value>) -> Self {
        let mut data = Map::new();
        data.insert("qs".to_string(), Value::Object(qs.clone()));
        for (k, v) in input {
            data.insert(k.clone(), v.clone());
        }
        Self { data }
    }

    /// Scope for a step: the input context plus `api` = prior results.
    ///
    /// The engine's `api` always replaces a caller-supplied one.
    pub fn build(input: &Context, api: &Map<String, Value>) -> Self {
        let mut data = input.data.clone();
        data.insert("api".to_string(), Value::Object(api.clone()));
        Self { data }
    }

    /// Scope after a response body arrived: `api[step]` is set and the body's
    /// fields are lifted to the top level.
    pub fn with_response(&self, step: &str, body: &Value) -> Self {
        let mut data = self.data.clone();

        match data.get_mut("api") {
            Some(Value::Object(api)) => {
                api.insert(step.to_string(), body.clone());
            }
            _ => {
                let mut api = Map::new();
                api.insert(step.to_string(), body.clone());
                data.insert("api".to_string(), Value::Object(api));
            }
        }

        match body {
            Value::Object(fields) => {
                for (k, v) in fields {
                    data.insert(k.clone(), v.clone());
                }
            }
            Value::Array(items) => {
                for (i, v) in items.iter().enumerate() {
                    data.insert(i.to_string(), v.clone());
                }
            }
            _ => {}
        }

        Self { data }
    }

    /// Set a top-level field.
    pub fn set(&mut self, name: &str, value: Value) {
        self.data.insert(name.to_string(), value);
    }

    /// Get a top-level field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Resolve a dotted path such as `api.login.items[0].id`.
    ///
    /// Returns `None` as soon as any segment is missing. A stored `null` is
    /// found, not missing.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let segments = split_path(path);
        let (first, rest) = segments.split_first()?;
        let mut current = self.data.get(first.as_str())?;
        for segment in rest {
            current = match current {
                Value::Object(map) => map.get(segment.as_str())?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

}

/// Split a property path on `.` and `[...]`, stripping quotes inside brackets.
fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let mut inner = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    inner.push(c);
                }
                let inner = inner.trim_matches(|c| c == '"' || c == '\'');
                segments.push(inner.to_string());
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Parse a query string (leading `?` optional) into a JSON object.
///
/// `+` decodes to a space, a key without `=` maps to `""`, and repeated keys
/// collect into an array.
pub fn parse_query_string(raw: &str) -> Map<String, Value> {
    let mut parsed = Map::new();
    let raw = raw.strip_prefix('?').unwrap_or(raw);

    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = Value::String(decode_component(value));

        match parsed.get_mut(&key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                parsed.insert(key, value);
            }
        }
    }
    parsed
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}
