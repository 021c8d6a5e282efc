//! # apichain
//!
//! Sequential, condition-driven orchestration of HTTP API calls.
//!
//! A workflow is an ordered map of named steps. Each step renders its
//! `{path}` templates against the caller's input and the bodies of earlier
//! steps, sends one request, and classifies the response through its
//! condition table. Errors become `redirect`/`message` actions and may stop
//! the remaining steps.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use apichain::{ConditionEntry, EngineConfig, Invocation, Orchestrator, StepConfig, Workflow};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let workflow = Workflow::new("signin")
//!     .step("login", StepConfig::post("/login")
//!         .request(serde_json::json!({"user": "{user}", "password": "{password}"}))
//!         .on(401, ConditionEntry::message("Invalid credentials")))
//!     .step("profile", StepConfig::get("/users/{api.login.id}")
//!         .header("Authorization", "Bearer {api.login.token}"))
//!     .build();
//!
//! let orchestrator = Orchestrator::new(
//!     EngineConfig::default().with_base_url("https://api.example.com"),
//! )?;
//! let input = serde_json::json!({"user": "ada", "password": "secret"});
//! let invocation = Invocation::from(workflow)
//!     .with_input(input.as_object().cloned().unwrap_or_default());
//!
//! let result = orchestrator.run(&invocation).await?;
//! match result.first_action() {
//!     Some(action) => println!("action: {:?}", action),
//!     None => println!("profile: {}", result.api["profile"]),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## YAML Definition
//!
//! ```yaml
//! name: signin
//! steps:
//!   login:
//!     url: /login
//!     method: POST
//!     request:
//!       user: "{user}"
//!     condition:
//!       401:
//!         message: Invalid credentials
//!   profile:
//!     url: "/users/{api.login.id}"
//!     method: GET
//!     condition:
//!       default:
//!         continue: true
//! ```

pub mod condition;
mod config;
pub mod context;
mod error;
mod executor;
mod expr;
pub mod request;
mod step;
pub mod template;
mod transport;
mod workflow;
pub mod yaml;

pub use condition::Action;
pub use config::EngineConfig;
pub use context::Context;
pub use error::{EngineError, RequestError, TransportError};
pub use executor::{
    execute, AggregateResult, ExecutionResult, Invocation, Orchestrator, StepRecord, StepState,
};
pub use expr::{Evaluator, Helpers};
pub use request::HttpRequest;
pub use step::{ConditionEntry, ConditionTable, Method, StepBuilder, StepConfig};
pub use transport::{HttpResponse, ReqwestTransport, Transport};
pub use workflow::{StepMap, Workflow, WorkflowBuilder};
pub use yaml::parse_yaml;

/// Re-export common types
pub use serde_json::Value;
