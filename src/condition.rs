//! Condition resolution and action derivation.
//!
//! A received response is an error when the entry matching its key (the
//! rendered `key` template if the table has one, the status code otherwise)
//! exists and is not marked `continue: true`. No matching entry means success.
//! Error handling then picks an entry by priority, extracted value, status,
//! `default`, and derives at most one action from it.

use crate::context::Context;
use crate::expr::Evaluator;
use crate::step::{ConditionEntry, ConditionTable, StepConfig};
use crate::template::{self, is_falsy, stringify};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Instruction for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Redirect(String),
    Message(String),
}

/// What the network call produced for a step.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Response with a JSON body
    Received { status: u16, body: Value },
    /// Response whose body is not JSON
    Unreadable { status: u16 },
    /// Request could not be built or sent
    Failed,
}

impl Outcome {
    pub fn status(&self) -> Option<u16> {
        match self {
            Outcome::Received { status, .. } | Outcome::Unreadable { status } => Some(*status),
            Outcome::Failed => None,
        }
    }
}

/// Result of the error path for one step.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub continue_next_api: bool,
    pub action: Option<Action>,
}

/// Render the table's `key` template, if any, against the post-response scope.
pub fn match_key(table: &ConditionTable, ctx: &Context) -> Option<String> {
    table.key.as_deref().map(|key| template::render(key, ctx))
}

/// Error test for a received response.
pub fn is_error(table: &ConditionTable, action_val: Option<&str>, status: u16) -> bool {
    let entry = match action_val {
        Some(val) => table.get(val),
        None => table.for_status(status),
    };
    entry.is_some_and(|e| !e.proceed)
}

/// First existing entry among extracted value, status and `default`.
pub fn select_entry<'a>(
    table: &'a ConditionTable,
    action_val: Option<&str>,
    status: Option<u16>,
) -> Option<&'a ConditionEntry> {
    action_val
        .and_then(|val| table.get(val))
        .or_else(|| status.and_then(|s| table.for_status(s)))
        .or_else(|| table.fallback())
}

/// Derive an action from an entry: `redirect` wins over `message`.
///
/// The value is rendered and evaluated without helper bindings.
pub fn derive_action(entry: &ConditionEntry, ctx: &Context, evaluator: &Evaluator) -> Option<Action> {
    if let Some(redirect) = entry.redirect.as_ref().filter(|v| !is_falsy(v)) {
        let target = evaluator.execute_plain(redirect, ctx);
        return Some(Action::Redirect(stringify(&target)));
    }
    if let Some(message) = entry.message.as_ref().filter(|v| !is_falsy(v)) {
        let text = evaluator.execute_plain(message, ctx);
        return Some(Action::Message(stringify(&text)));
    }
    None
}

/// Error path: honour `shouldHideError`, otherwise select an entry and derive
/// its action. Continuation always follows `shouldContinueNextApiOnError`.
pub fn on_error(
    step: &StepConfig,
    action_val: Option<&str>,
    status: Option<u16>,
    ctx: &Context,
    evaluator: &Evaluator,
) -> Decision {
    let continue_next_api = step.should_continue_next_api_on_error;
    if step.should_hide_error {
        return Decision {
            continue_next_api,
            action: None,
        };
    }

    let action = select_entry(&step.condition, action_val, status)
        .and_then(|entry| derive_action(entry, ctx, evaluator));

    Decision {
        continue_next_api,
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::expr::Helpers;
    use serde_json::{json, Map};

    fn evaluator() -> Evaluator {
        Evaluator::new(&Helpers::new(), &EngineConfig::default()).unwrap()
    }

    fn ctx(value: Value) -> Context {
        match value {
            Value::Object(map) => Context::input(&map, &Map::new()),
            _ => panic!("expected an object"),
        }
    }

    fn table() -> ConditionTable {
        let mut table = ConditionTable::new();
        table.insert("E01", ConditionEntry::message("value"));
        table.insert(401, ConditionEntry::message("status"));
        table.insert("default", ConditionEntry::message("default"));
        table
    }

    #[test]
    fn test_is_error_only_for_matching_entries() {
        let mut table = table();
        table.insert(200, ConditionEntry::proceed());
        table.insert(409, ConditionEntry::message("Already exists").and_continue());

        assert!(is_error(&table, None, 401));
        assert!(!is_error(&table, None, 200));
        assert!(!is_error(&table, None, 409));
        assert!(!is_error(&table, None, 500));
        assert!(is_error(&table, Some("E01"), 200));
        assert!(!is_error(&table, Some("E99"), 401));
    }

    #[test]
    fn test_selection_priority() {
        let table = table();
        let pick = |val, status| {
            select_entry(&table, val, status)
                .and_then(|e| e.message.clone())
                .unwrap()
        };

        assert_eq!(pick(Some("E01"), Some(401)), json!("value"));
        assert_eq!(pick(Some("E99"), Some(401)), json!("status"));
        assert_eq!(pick(None, Some(401)), json!("status"));
        assert_eq!(pick(None, Some(500)), json!("default"));
        assert_eq!(pick(None, None), json!("default"));
    }

    #[test]
    fn test_redirect_beats_message() {
        let entry = ConditionEntry {
            redirect: Some(json!("/login?next={qs.next}")),
            message: Some(json!("ignored")),
            proceed: false,
        };
        let ctx = Context::input(&Map::new(), &crate::context::parse_query_string("next=home"));

        assert_eq!(
            derive_action(&entry, &ctx, &evaluator()),
            Some(Action::Redirect("/login?next=home".into()))
        );
    }

    #[test]
    fn test_message_is_templated() {
        let entry = ConditionEntry::message("Hello {user.name}, try again");
        let ctx = ctx(json!({"user": {"name": "Ada"}}));

        assert_eq!(
            derive_action(&entry, &ctx, &evaluator()),
            Some(Action::Message("Hello Ada, try again".into()))
        );
    }

    #[test]
    fn test_entry_without_action() {
        assert_eq!(derive_action(&ConditionEntry::proceed(), &ctx(json!({})), &evaluator()), None);
    }

    #[test]
    fn test_match_key_renders_template() {
        let mut table = table();
        table.key = Some("{code}".into());
        assert_eq!(match_key(&table, &ctx(json!({"code": "E01"}))), Some("E01".into()));
        assert_eq!(match_key(&ConditionTable::new(), &ctx(json!({}))), None);
    }

    #[test]
    fn test_hidden_errors_produce_no_action() {
        let step = crate::StepConfig::get("/x")
            .on(401, ConditionEntry::message("nope"))
            .hide_error()
            .continue_on_error()
            .build();

        let decision = on_error(&step, None, Some(401), &ctx(json!({})), &evaluator());
        assert_eq!(
            decision,
            Decision {
                continue_next_api: true,
                action: None
            }
        );
    }

    #[test]
    fn test_action_serializes_tagged() {
        let json = serde_json::to_value(vec![
            Action::Message("Invalid credentials".into()),
            Action::Redirect("/login".into()),
        ])
        .unwrap();
        assert_eq!(
            json,
            json!([{"message": "Invalid credentials"}, {"redirect": "/login"}])
        );
    }
}
