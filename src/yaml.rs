//! Workflow document loading (YAML, and JSON as a YAML subset).

use crate::Workflow;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse a workflow from a YAML string.
///
/// # Example
///
/// ```rust
/// use apichain::parse_yaml;
///
/// let yaml = r#"
/// name: signin
/// steps:
///   login:
///     url: https://api.example.com/login
///     method: POST
///     request:
///       user: "{user}"
///     condition:
///       401:
///         message: Invalid credentials
///   profile:
///     url: "https://api.example.com/users/{api.login.id}"
///     method: GET
///     condition:
///       default:
///         continue: true
/// "#;
///
/// let workflow = parse_yaml(yaml).unwrap();
/// assert_eq!(workflow.name, "signin");
/// assert_eq!(workflow.steps.names().collect::<Vec<_>>(), vec!["login", "profile"]);
/// ```
pub fn parse_yaml(yaml: &str) -> Result<Workflow> {
    let workflow: Workflow = serde_yaml::from_str(yaml).context("Workflow document is not a valid step map")?;

    validate(&workflow)?;

    Ok(workflow)
}

/// Load and parse a workflow from a YAML or JSON file.
///
/// ```rust,no_run
/// use apichain::yaml::load_file;
///
/// let workflow = load_file("signin.yaml")?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_file(path: impl AsRef<Path>) -> Result<Workflow> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read workflow document {}", path.display()))?;

    parse_yaml(&content)
        .with_context(|| format!("Invalid workflow document {}", path.display()))
}

/// Structural checks serde cannot express.
fn validate(workflow: &Workflow) -> Result<()> {
    if workflow.steps.is_empty() {
        anyhow::bail!("Workflow document defines no steps");
    }

    for (name, step) in workflow.steps.iter() {
        if name.is_empty() {
            anyhow::bail!("Step names cannot be empty");
        }
        if step.url.is_empty() {
            anyhow::bail!("Step `{}` has an empty url", name);
        }
        if step.method.is_empty() {
            anyhow::bail!("Step `{}` has an empty method", name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::ConditionEntry;

    #[test]
    fn test_parse_health_check_document() {
        let yaml = r#"
name: health
description: Ping the service
steps:
  ping:
    url: /ping
    method: GET
    condition:
      default:
        continue: true
"#;

        let workflow = parse_yaml(yaml).unwrap();
        assert_eq!(workflow.name, "health");
        assert_eq!(workflow.description, Some("Ping the service".to_string()));
        assert_eq!(workflow.steps.len(), 1);

        let ping = workflow.steps.get("ping").unwrap();
        assert_eq!(ping.url, "/ping");
        assert_eq!(ping.condition.fallback(), Some(&ConditionEntry::proceed()));
    }

    #[test]
    fn test_parse_full_step() {
        let yaml = r#"
steps:
  order:
    url: "https://shop.test/orders"
    method: POST
    headers:
      Authorization: "Bearer {token}"
    beforeFetch:
      total: "{cart.total}"
    request:
      amount: "{beforeFetch.total}"
    shouldHideError: false
    shouldContinueNextApiOnError: true
    credentials: include
    condition:
      key: "{result}"
      DECLINED:
        redirect: /payment/declined
      409:
        message: Duplicate order
"#;

        let workflow = parse_yaml(yaml).unwrap();
        let order = workflow.steps.get("order").unwrap();

        assert!(order.should_continue_next_api_on_error);
        assert!(order.before_fetch.is_some());
        assert_eq!(order.options.get("credentials"), Some(&serde_json::json!("include")));
        assert_eq!(order.condition.key.as_deref(), Some("{result}"));
        assert_eq!(
            order.condition.get("DECLINED"),
            Some(&ConditionEntry::redirect("/payment/declined"))
        );
        assert!(order.condition.for_status(409).is_some());
    }

    #[test]
    fn test_json_documents_are_accepted() {
        let json = r#"{"steps": {"ping": {"url": "/ping", "method": "GET", "condition": {}}}}"#;
        let workflow = parse_yaml(json).unwrap();
        assert_eq!(workflow.steps.len(), 1);
    }

    #[test]
    fn test_rejects_document_without_steps() {
        let yaml = r#"
name: empty
steps: {}
"#;

        let err = parse_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("defines no steps"));
    }

    #[test]
    fn test_validate_empty_url() {
        let yaml = r#"
steps:
  broken:
    url: ""
    method: GET
    condition: {}
"#;

        let err = parse_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("empty url"));
    }

    #[test]
    fn test_missing_condition_is_a_parse_error() {
        let yaml = r#"
steps:
  ping:
    url: /ping
    method: GET
"#;

        assert!(parse_yaml(yaml).is_err());
    }
}
