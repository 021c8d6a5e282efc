//! Turn resolved step values into a concrete HTTP request.

use crate::error::RequestError;
use crate::step::Method;
use crate::template::{is_falsy, stringify};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

/// A request ready to hand to a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: IndexMap<String, String>,
    pub body: Option<String>,
    /// Pass-through options from the step config
    pub options: Map<String, Value>,
}

/// Build a request from the evaluated `url`, `headers` and `request` values.
///
/// POST, PUT and PATCH send a present `request` as the body (strings verbatim,
/// anything else as JSON). GET and DELETE append it to the URL as a query
/// string. The final URL is percent-encoded as a whole.
pub fn build(
    method: Method,
    url: &Value,
    headers: &Value,
    request: &Value,
    options: &Map<String, Value>,
) -> Result<HttpRequest, RequestError> {
    let headers = parse_headers(headers)?;
    let mut url = if is_falsy(url) {
        String::new()
    } else {
        stringify(url)
    };
    let mut body = None;

    if !is_falsy(request) {
        if method.carries_body() {
            body = Some(stringify(request));
        } else {
            let query = match request {
                Value::String(raw) => raw.clone(),
                Value::Object(fields) => serialize_query(fields),
                _ => String::new(),
            };
            url = format!("{}?{}", url, query);
        }
    }

    Ok(HttpRequest {
        method,
        url: encode_uri(&url),
        headers,
        body,
        options: options.clone(),
    })
}

fn parse_headers(headers: &Value) -> Result<IndexMap<String, String>, RequestError> {
    match headers {
        Value::Object(fields) => Ok(fields
            .iter()
            .map(|(k, v)| (k.clone(), stringify(v)))
            .collect()),
        Value::String(text) => {
            let parsed: Value =
                serde_json::from_str(text).map_err(|e| RequestError::Headers(e.to_string()))?;
            match parsed {
                Value::String(_) => Err(RequestError::Headers(format!("`{}`", text))),
                other => parse_headers(&other),
            }
        }
        other if is_falsy(other) => Ok(IndexMap::new()),
        other => Err(RequestError::Headers(format!("`{}`", other))),
    }
}

/// `key=value` pairs joined by `&`, both sides percent-encoded.
pub fn serialize_query(fields: &Map<String, Value>) -> String {
    fields
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                urlencoding::encode(k),
                urlencoding::encode(&display_value(v))
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Text form of a value as it appears in a query string.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::Null => String::new(),
                other => display_value(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
        other => other.to_string(),
    }
}

/// Percent-encode a whole URL, leaving URL syntax characters and existing
/// `%XX` escapes intact.
///
/// Unlike JavaScript's `encodeURI`, a `%` that starts a valid escape is not
/// encoded again, so already-encoded query values survive unchanged.
pub fn encode_uri(url: &str) -> String {
    let mut encoded = String::with_capacity(url.len());
    let mut buf = [0u8; 4];

    for (i, c) in url.char_indices() {
        if c == '%' && is_escape(&url[i..]) {
            encoded.push(c);
        } else if c.is_ascii_alphanumeric() || "-_.!~*'();/?:@&=+$,#".contains(c) {
            encoded.push(c);
        } else {
            encoded.push_str(&urlencoding::encode(c.encode_utf8(&mut buf)));
        }
    }
    encoded
}

fn is_escape(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 3 && bytes[1].is_ascii_hexdigit() && bytes[2].is_ascii_hexdigit()
}
