//! Workflow documents: a name plus an ordered step map.

use crate::step::{StepBuilder, StepConfig};
use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Ordered sequence of named steps. Order is execution order.
///
/// Deserializes from a map; a repeated name keeps its first position and the
/// last definition.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "IndexMap<String, StepConfig>")]
pub struct StepMap {
    steps: Vec<(String, StepConfig)>,
}

impl StepMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step, or replace the config of an existing name in place.
    pub fn insert(&mut self, name: &str, step: StepConfig) {
        match self.steps.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = step,
            None => self.steps.push((name.to_string(), step)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&StepConfig> {
        self.steps.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StepConfig)> {
        self.steps.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl From<IndexMap<String, StepConfig>> for StepMap {
    fn from(map: IndexMap<String, StepConfig>) -> Self {
        Self {
            steps: map.into_iter().collect(),
        }
    }
}

impl Serialize for StepMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.steps.len()))?;
        for (name, step) in &self.steps {
            map.serialize_entry(name, step)?;
        }
        map.end()
    }
}

/// A named workflow document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Document name, used in logs
    #[serde(default)]
    pub name: String,

    /// Free-form notes for authors
    #[serde(default)]
    pub description: Option<String>,

    /// Steps to execute, in order
    pub steps: StepMap,
}

impl Workflow {
    /// Start building a document.
    pub fn new(name: &str) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
    }

    /// A document with no steps.
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            steps: StepMap::new(),
        }
    }
}

/// Collects steps in the order they are added.
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    workflow: Workflow,
}

impl WorkflowBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            workflow: Workflow::empty(name),
        }
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.workflow.description = Some(desc.to_string());
        self
    }

    /// Add a named step.
    pub fn add<S: Into<StepConfig>>(mut self, name: &str, step: S) -> Self {
        self.workflow.steps.insert(name, step.into());
        self
    }

    /// Finish `step` and add it under `name`.
    pub fn step(self, name: &str, step: StepBuilder) -> Self {
        self.add(name, step.build())
    }

    pub fn build(self) -> Workflow {
        self.workflow
    }
}

impl From<WorkflowBuilder> for Workflow {
    fn from(builder: WorkflowBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::ConditionEntry;

    #[test]
    fn test_builder_keeps_insertion_order() {
        let workflow = Workflow::new("signin")
            .description("Log in then load the profile")
            .step(
                "login",
                StepConfig::post("/login").on(401, ConditionEntry::message("Invalid credentials")),
            )
            .step("profile", StepConfig::get("/profile/{api.login.id}"))
            .build();

        assert_eq!(workflow.name, "signin");
        assert_eq!(workflow.steps.len(), 2);
        assert_eq!(
            workflow.steps.names().collect::<Vec<_>>(),
            vec!["login", "profile"]
        );
    }

    #[test]
    fn test_step_map_preserves_document_order() {
        let steps: StepMap = serde_json::from_str(
            r#"{
                "zeta": {"url": "/z", "method": "GET", "condition": {}},
                "alpha": {"url": "/a", "method": "GET", "condition": {}},
                "mid": {"url": "/m", "method": "GET", "condition": {}}
            }"#,
        )
        .unwrap();

        assert_eq!(steps.names().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut steps = StepMap::new();
        steps.insert("a", StepConfig::get("/a").build());
        steps.insert("b", StepConfig::get("/b").build());
        steps.insert("a", StepConfig::get("/a2").build());

        assert_eq!(steps.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(steps.get("a").unwrap().url, "/a2");
    }
}
