//! `{path}` placeholder substitution.
//!
//! The text is split on every `{`. Each fragment's key runs up to its first
//! `}` and is looked up in the [`Context`]. A resolved key is replaced by its
//! value followed by the rest of the fragment. An unresolved fragment keeps
//! its text and gets its `{` back, except the first fragment, which never had
//! one. Quote characters hugging a bracket are then stripped so that JSON
//! values spliced into a quoted slot come out as JSON.

use crate::context::Context;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static QUOTED_BRACKET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[\\"|'](\[)|(\])[\\"|']|[\\"|'](\{)|(\})[\\"|']"#)
        .expect("quoted bracket pattern is valid")
});

/// Whether a value counts as absent for templating purposes.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Strings as-is, everything else as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a value's text with placeholders substituted. Falsy values render
/// as an empty string.
pub fn render_value(value: &Value, ctx: &Context) -> String {
    if is_falsy(value) {
        return String::new();
    }
    render(&stringify(value), ctx)
}

/// Render a template string.
pub fn render(text: &str, ctx: &Context) -> String {
    let mut rendered = String::with_capacity(text.len());
    for (index, fragment) in text.split('{').enumerate() {
        rendered.push_str(&substitute(fragment, index, ctx));
    }

    QUOTED_BRACKET
        .replace_all(&rendered, |caps: &Captures| strip_first_quote(&caps[0]))
        .into_owned()
}

fn substitute(fragment: &str, index: usize, ctx: &Context) -> String {
    let resolved = fragment.find('}').and_then(|end| {
        let (key, rest) = (&fragment[..end], &fragment[end + 1..]);
        ctx.lookup(key).map(|value| format!("{}{}", stringify(value), rest))
    });

    match resolved {
        Some(text) => text,
        None if index == 0 => fragment.to_string(),
        None => format!("{{{}", fragment),
    }
}

fn strip_first_quote(matched: &str) -> String {
    match matched.find(|c: char| matches!(c, '\\' | '"' | '|' | '\'')) {
        Some(pos) => {
            let mut out = String::with_capacity(matched.len());
            out.push_str(&matched[..pos]);
            out.push_str(&matched[pos + 1..]);
            out
        }
        None => matched.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn ctx(value: Value) -> Context {
        match value {
            Value::Object(map) => Context::input(&map, &Map::new()),
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_resolves_nested_path() {
        let ctx = ctx(json!({"a": {"b": "x"}}));
        assert_eq!(render("{a.b}", &ctx), "x");
        assert_eq!(render("id={a.b}&n=1", &ctx), "id=x&n=1");
    }

    #[test]
    fn test_unresolved_placeholders_are_kept() {
        let ctx = ctx(json!({}));
        assert_eq!(render("{missing}", &ctx), "{missing}");
        assert_eq!(render("hello {missing} world", &ctx), "hello {missing} world");
        assert_eq!(render("a{b", &ctx), "a{b");
    }

    #[test]
    fn test_first_fragment_is_never_rebraced() {
        // The key of the first fragment is looked up even without an opening brace.
        let ctx = ctx(json!({"user": "ada"}));
        assert_eq!(render("user}/profile", &ctx), "ada/profile");
        assert_eq!(render("nobody}/profile", &ctx), "nobody}/profile");
    }

    #[test]
    fn test_non_string_values_are_json() {
        let ctx = ctx(json!({"n": 3, "flag": false, "none": null, "list": [1, 2]}));
        assert_eq!(render("{n}-{flag}-{none}", &ctx), "3-false-null");
        assert_eq!(render("{list}", &ctx), "[1,2]");
    }

    #[test]
    fn test_json_literal_assembly_strips_quotes() {
        let ctx = ctx(json!({"user": {"id": 1, "tags": ["a"]}}));
        let template = json!({"payload": "{user}", "tags": "{user.tags}"});

        let rendered = render_value(&template, &ctx);
        let parsed: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(
            parsed,
            json!({"payload": {"id": 1, "tags": ["a"]}, "tags": ["a"]})
        );
    }

    #[test]
    fn test_json_headers_template() {
        let ctx = ctx(json!({"token": "abc"}));
        let template = json!({"Authorization": "Bearer {token}"});
        assert_eq!(
            render_value(&template, &ctx),
            r#"{"Authorization":"Bearer abc"}"#
        );
    }

    #[test]
    fn test_falsy_values_render_empty() {
        let ctx = ctx(json!({}));
        assert_eq!(render_value(&Value::Null, &ctx), "");
        assert_eq!(render_value(&json!(0), &ctx), "");
        assert_eq!(render_value(&json!(""), &ctx), "");
        assert_eq!(render_value(&json!(1), &ctx), "1");
    }
}
