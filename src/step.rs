//! Step definitions.

use indexmap::IndexMap;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// HTTP verbs a step may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Post,
    Get,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub const ALL: [Method; 5] = [
        Method::Post,
        Method::Get,
        Method::Put,
        Method::Patch,
        Method::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Post => "POST",
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Whether the payload travels in the body rather than the query string.
    pub fn carries_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    /// Matching is case-sensitive: `get` is not a supported verb.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Outcome descriptor for one condition key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionEntry {
    /// Template for a redirect target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Value>,

    /// Template for a message shown to the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,

    /// `true` marks a matching response as success
    #[serde(rename = "continue", default, skip_serializing_if = "std::ops::Not::not")]
    pub proceed: bool,
}

impl ConditionEntry {
    pub fn message<V: Into<Value>>(message: V) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn redirect<V: Into<Value>>(target: V) -> Self {
        Self {
            redirect: Some(target.into()),
            ..Self::default()
        }
    }

    /// An entry that classifies its key as success.
    pub fn proceed() -> Self {
        Self {
            proceed: true,
            ..Self::default()
        }
    }

    pub fn and_continue(mut self) -> Self {
        self.proceed = true;
        self
    }
}

/// Condition table of a step.
///
/// Keys are extracted values, HTTP status codes or `default`. The optional
/// `key` field is a template whose rendered value replaces the status code as
/// the match key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionTable {
    pub key: Option<String>,
    pub entries: IndexMap<String, ConditionEntry>,
}

impl ConditionTable {
    pub const DEFAULT: &'static str = "default";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ConditionEntry> {
        self.entries.get(key)
    }

    pub fn for_status(&self, status: u16) -> Option<&ConditionEntry> {
        self.get(&status.to_string())
    }

    pub fn fallback(&self) -> Option<&ConditionEntry> {
        self.get(Self::DEFAULT)
    }

    pub fn insert<K: ToString>(&mut self, key: K, entry: ConditionEntry) {
        self.entries.insert(key.to_string(), entry);
    }
}

impl Serialize for ConditionTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.entries.len() + usize::from(self.key.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(ref key) = self.key {
            map.serialize_entry("key", key)?;
        }
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Map key that accepts strings as well as bare integers (`401:` in YAML).
struct ConditionKey(String);

impl<'de> Deserialize<'de> for ConditionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = ConditionKey;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a status code, extracted value or `default`")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(ConditionKey(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(ConditionKey(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(ConditionKey(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(ConditionKey(v.to_string()))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
                Ok(ConditionKey(v.to_string()))
            }
        }

        deserializer.deserialize_any(KeyVisitor)
    }
}

impl<'de> Deserialize<'de> for ConditionTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = ConditionTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a condition table")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut table = ConditionTable::new();
                while let Some(ConditionKey(key)) = access.next_key()? {
                    if key == "key" {
                        table.key = access.next_value()?;
                    } else {
                        let entry: ConditionEntry = access.next_value()?;
                        table.entries.insert(key, entry);
                    }
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// Declarative description of one HTTP call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepConfig {
    /// URL template
    pub url: String,

    /// One of POST, GET, PUT, PATCH, DELETE. Kept as text so an unsupported
    /// verb reaches the executor instead of failing deserialization.
    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_fetch: Option<Value>,

    pub condition: ConditionTable,

    #[serde(default)]
    pub should_hide_error: bool,

    #[serde(default)]
    pub should_continue_next_api_on_error: bool,

    /// Extra request options passed through to the transport (e.g. `timeout`)
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl StepConfig {
    /// Start a step for any verb.
    pub fn call(method: Method, url: &str) -> StepBuilder {
        StepBuilder::new(method.as_str(), url)
    }

    pub fn get(url: &str) -> StepBuilder {
        Self::call(Method::Get, url)
    }

    pub fn post(url: &str) -> StepBuilder {
        Self::call(Method::Post, url)
    }

    pub fn put(url: &str) -> StepBuilder {
        Self::call(Method::Put, url)
    }

    pub fn patch(url: &str) -> StepBuilder {
        Self::call(Method::Patch, url)
    }

    pub fn delete(url: &str) -> StepBuilder {
        Self::call(Method::Delete, url)
    }

    /// Parsed verb, `None` when unsupported.
    pub fn verb(&self) -> Option<Method> {
        self.method.parse().ok()
    }
}

/// Builder for step configs.
#[derive(Debug, Clone)]
pub struct StepBuilder {
    step: StepConfig,
}

impl StepBuilder {
    /// Create a builder with a raw verb string.
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            step: StepConfig {
                url: url.to_string(),
                method: method.to_string(),
                headers: None,
                request: None,
                before_fetch: None,
                condition: ConditionTable::new(),
                should_hide_error: false,
                should_continue_next_api_on_error: false,
                options: Map::new(),
            },
        }
    }

    /// Add one header. Values may contain `{path}` placeholders.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        let mut headers = match self.step.headers.take() {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        headers.insert(name.to_string(), Value::String(value.to_string()));
        self.step.headers = Some(Value::Object(headers));
        self
    }

    /// Replace the headers template wholesale.
    pub fn headers<V: Into<Value>>(mut self, headers: V) -> Self {
        self.step.headers = Some(headers.into());
        self
    }

    pub fn request<V: Into<Value>>(mut self, request: V) -> Self {
        self.step.request = Some(request.into());
        self
    }

    pub fn before_fetch<V: Into<Value>>(mut self, before_fetch: V) -> Self {
        self.step.before_fetch = Some(before_fetch.into());
        self
    }

    /// Match on a rendered template instead of the status code.
    pub fn condition_key(mut self, key: &str) -> Self {
        self.step.condition.key = Some(key.to_string());
        self
    }

    /// Add a condition entry keyed by status code or extracted value.
    pub fn on<K: ToString>(mut self, key: K, entry: ConditionEntry) -> Self {
        self.step.condition.insert(key, entry);
        self
    }

    pub fn on_default(self, entry: ConditionEntry) -> Self {
        self.on(ConditionTable::DEFAULT, entry)
    }

    pub fn hide_error(mut self) -> Self {
        self.step.should_hide_error = true;
        self
    }

    pub fn continue_on_error(mut self) -> Self {
        self.step.should_continue_next_api_on_error = true;
        self
    }

    /// Add a pass-through request option.
    pub fn option<V: Into<Value>>(mut self, key: &str, value: V) -> Self {
        self.step.options.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> StepConfig {
        self.step
    }
}

impl From<StepBuilder> for StepConfig {
    fn from(builder: StepBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_builder() {
        let step = StepConfig::post("https://api.test/login")
            .header("Content-Type", "application/json")
            .request(json!({"user": "{user}"}))
            .on(401, ConditionEntry::message("Invalid credentials"))
            .continue_on_error()
            .build();

        assert_eq!(step.verb(), Some(Method::Post));
        assert_eq!(
            step.headers,
            Some(json!({"Content-Type": "application/json"}))
        );
        assert!(step.condition.for_status(401).is_some());
        assert!(step.should_continue_next_api_on_error);
        assert!(!step.should_hide_error);
    }

    #[test]
    fn test_method_parsing_is_case_sensitive() {
        assert_eq!("PATCH".parse::<Method>(), Ok(Method::Patch));
        assert!("get".parse::<Method>().is_err());
        assert!("HEAD".parse::<Method>().is_err());
    }

    #[test]
    fn test_deserialize_step_with_options() {
        let step: StepConfig = serde_json::from_value(json!({
            "url": "/ping",
            "method": "GET",
            "timeout": 500,
            "condition": {
                "key": "{code}",
                "E01": {"message": "bad code"},
                "default": {"continue": true}
            },
            "shouldHideError": true
        }))
        .unwrap();

        assert!(step.should_hide_error);
        assert!(!step.should_continue_next_api_on_error);
        assert_eq!(step.options.get("timeout"), Some(&json!(500)));
        assert_eq!(step.condition.key.as_deref(), Some("{code}"));
        assert_eq!(
            step.condition.get("E01"),
            Some(&ConditionEntry::message("bad code"))
        );
        assert!(step.condition.fallback().unwrap().proceed);
    }

    #[test]
    fn test_condition_table_integer_keys_from_yaml() {
        let table: ConditionTable = serde_yaml::from_str(
            r#"
401:
  message: Unauthorized
"404":
  redirect: /missing
"#,
        )
        .unwrap();

        assert_eq!(
            table.for_status(401),
            Some(&ConditionEntry::message("Unauthorized"))
        );
        assert_eq!(
            table.for_status(404),
            Some(&ConditionEntry::redirect("/missing"))
        );
        assert_eq!(table.key, None);
    }

    #[test]
    fn test_condition_table_serializes_key_first() {
        let mut table = ConditionTable::new();
        table.key = Some("{code}".into());
        table.insert("E01", ConditionEntry::proceed());

        let value = serde_json::to_value(&table).unwrap();
        assert_eq!(value, json!({"key": "{code}", "E01": {"continue": true}}));
    }
}
