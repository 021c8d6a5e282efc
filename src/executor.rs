//! Workflow execution engine.

use crate::condition::{self, Action, Outcome};
use crate::config::EngineConfig;
use crate::context::{parse_query_string, Context};
use crate::error::EngineError;
use crate::expr::{Evaluator, Helpers};
use crate::request;
use crate::step::{Method, StepConfig};
use crate::template::stringify;
use crate::transport::{ReqwestTransport, Transport};
use crate::workflow::{StepMap, Workflow};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Instant;

/// Everything one orchestration run needs from its caller.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub steps: StepMap,
    pub input: Map<String, Value>,
    pub helpers: Helpers,
}

impl Invocation {
    pub fn new(steps: StepMap) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    pub fn with_input(mut self, input: Map<String, Value>) -> Self {
        self.input = input;
        self
    }

    pub fn with_helpers(mut self, helpers: Helpers) -> Self {
        self.helpers = helpers;
        self
    }
}

impl From<Workflow> for Invocation {
    fn from(workflow: Workflow) -> Self {
        Self::new(workflow.steps)
    }
}

/// Results threaded from step to step.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    /// Response bodies of successful steps, by step name
    pub api: Map<String, Value>,
    /// Actions derived so far, in execution order
    pub actions: Vec<Action>,
    /// Whether the next step may run
    pub continue_next_api: bool,
}

impl Default for AggregateResult {
    fn default() -> Self {
        Self {
            api: Map::new(),
            actions: Vec::new(),
            continue_next_api: true,
        }
    }
}

/// Lifecycle of a step within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Pending,
    Ran,
    Skipped,
}

/// Record of a single step.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub state: StepState,
    /// HTTP status, if a response arrived
    pub status: Option<u16>,
    pub duration_ms: f64,
}

/// Final output of a run. Serializes as `{ "api": ..., "actions": ... }`.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub api: Map<String, Value>,
    pub actions: Vec<Action>,

    /// Per-step records, in step order
    #[serde(skip)]
    pub steps: Vec<StepRecord>,

    /// Total execution time in milliseconds
    #[serde(skip)]
    pub total_ms: f64,
}

impl ExecutionResult {
    /// The action the presentation layer should act on, if any.
    pub fn first_action(&self) -> Option<&Action> {
        self.actions.first()
    }

    pub fn is_success(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Runs step maps against a transport.
pub struct Orchestrator<T = ReqwestTransport> {
    transport: T,
    config: EngineConfig,
    qs: Map<String, Value>,
}

impl Orchestrator<ReqwestTransport> {
    /// Orchestrator over a `reqwest` client built from `config`.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(transport, config))
    }
}

impl<T: Transport> Orchestrator<T> {
    pub fn with_transport(transport: T, config: EngineConfig) -> Self {
        let qs = parse_query_string(&config.query_string);
        Self {
            transport,
            config,
            qs,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute every step in order until one says not to continue.
    ///
    /// Per-step failures end up as actions or skipped steps. Only structural
    /// problems (unsupported verb, broken helpers) return `Err`.
    pub async fn run(&self, invocation: &Invocation) -> Result<ExecutionResult, EngineError> {
        tracing::info!(steps = invocation.steps.len(), "Starting orchestration");

        let start = Instant::now();
        let evaluator = Evaluator::new(&invocation.helpers, &self.config)?;
        let input = Context::input(&invocation.input, &self.qs);

        let mut aggregate = AggregateResult::default();
        let mut records: Vec<StepRecord> = invocation
            .steps
            .names()
            .map(|name| StepRecord {
                name: name.to_string(),
                state: StepState::Pending,
                status: None,
                duration_ms: 0.0,
            })
            .collect();

        for (record, (name, step)) in records.iter_mut().zip(invocation.steps.iter()) {
            if !aggregate.continue_next_api {
                tracing::debug!(step = %name, "Skipping step");
                record.state = StepState::Skipped;
                continue;
            }

            let step_start = Instant::now();
            let ctx = Context::build(&input, &aggregate.api);
            let status = self
                .run_step(name, step, ctx, &evaluator, &mut aggregate)
                .await?;

            record.state = StepState::Ran;
            record.status = status;
            record.duration_ms = step_start.elapsed().as_secs_f64() * 1000.0;

            tracing::debug!(
                step = %name,
                status = ?status,
                continue_next_api = aggregate.continue_next_api,
                duration_ms = record.duration_ms,
                "Step completed"
            );
        }

        let total_ms = start.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(
            total_ms = total_ms,
            actions = aggregate.actions.len(),
            "Orchestration completed"
        );

        Ok(ExecutionResult {
            api: aggregate.api,
            actions: aggregate.actions,
            steps: records,
            total_ms,
        })
    }

    /// Run a workflow document with caller input and helpers.
    pub async fn run_workflow(
        &self,
        workflow: &Workflow,
        input: Map<String, Value>,
        helpers: Helpers,
    ) -> Result<ExecutionResult, EngineError> {
        tracing::info!(workflow = %workflow.name, "Running workflow");
        let invocation = Invocation::new(workflow.steps.clone())
            .with_input(input)
            .with_helpers(helpers);
        self.run(&invocation).await
    }

    /// Execute one step and fold its outcome into `aggregate`.
    async fn run_step(
        &self,
        name: &str,
        step: &StepConfig,
        ctx: Context,
        evaluator: &Evaluator,
        aggregate: &mut AggregateResult,
    ) -> Result<Option<u16>, EngineError> {
        let ctx = apply_before_fetch(ctx, step, evaluator);

        let method = step.verb().ok_or_else(|| EngineError::UnsupportedMethod {
            step: name.to_string(),
            method: step.method.clone(),
        })?;

        let outcome = self.fetch(name, method, step, &ctx, evaluator).await;
        let status = outcome.status();

        match outcome {
            Outcome::Received { status, body } => {
                let scope = ctx.with_response(name, &body);
                let action_val = condition::match_key(&step.condition, &scope);

                if condition::is_error(&step.condition, action_val.as_deref(), status) {
                    let decision =
                        condition::on_error(step, action_val.as_deref(), Some(status), &scope, evaluator);
                    apply_decision(aggregate, decision);
                } else {
                    aggregate.api.insert(name.to_string(), body);
                    aggregate.continue_next_api = true;
                }
            }
            Outcome::Unreadable { status } => {
                let decision = condition::on_error(step, None, Some(status), &ctx, evaluator);
                apply_decision(aggregate, decision);
            }
            Outcome::Failed => {
                let decision = condition::on_error(step, None, None, &ctx, evaluator);
                apply_decision(aggregate, decision);
            }
        }

        Ok(status)
    }

    async fn fetch(
        &self,
        name: &str,
        method: Method,
        step: &StepConfig,
        ctx: &Context,
        evaluator: &Evaluator,
    ) -> Outcome {
        let url = evaluator.execute(&Value::String(step.url.clone()), ctx);
        let headers = step
            .headers
            .as_ref()
            .map_or(Value::Null, |h| evaluator.execute(h, ctx));
        let payload = step
            .request
            .as_ref()
            .map_or(Value::Null, |r| evaluator.execute(r, ctx));

        let request = match request::build(method, &url, &headers, &payload, &step.options) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(step = %name, error = %e, "Could not build request");
                return Outcome::Failed;
            }
        };

        tracing::debug!(step = %name, method = %method, url = %request.url, "Sending request");

        match self.transport.send(&request).await {
            Ok(response) => match response.json() {
                Ok(body) => Outcome::Received {
                    status: response.status,
                    body,
                },
                Err(e) => {
                    tracing::debug!(step = %name, status = response.status, error = %e, "Response body is not JSON");
                    Outcome::Unreadable {
                        status: response.status,
                    }
                }
            },
            Err(e) => {
                tracing::warn!(step = %name, url = %request.url, error = %e, "Request failed");
                Outcome::Failed
            }
        }
    }
}

/// Merge an object-valued `beforeFetch` into the scope under `beforeFetch`.
fn apply_before_fetch(mut ctx: Context, step: &StepConfig, evaluator: &Evaluator) -> Context {
    if let Some(ref before_fetch) = step.before_fetch {
        let value = evaluator.execute_plain(before_fetch, &ctx);
        if value.is_object() {
            ctx.set("beforeFetch", value);
        } else {
            tracing::trace!(value = %stringify(&value), "beforeFetch did not produce an object");
        }
    }
    ctx
}

fn apply_decision(aggregate: &mut AggregateResult, decision: condition::Decision) {
    aggregate.continue_next_api = decision.continue_next_api;
    aggregate.actions.extend(decision.action);
}

/// Run a step map with a default `reqwest` transport configured from the
/// environment.
///
/// ```rust,no_run
/// use apichain::{execute, Invocation, StepConfig, Workflow, ConditionEntry};
///
/// # async fn demo() -> Result<(), apichain::EngineError> {
/// let workflow = Workflow::new("health")
///     .step("ping", StepConfig::get("https://api.example.com/ping")
///         .on_default(ConditionEntry::proceed()))
///     .build();
///
/// let result = execute(&Invocation::from(workflow)).await?;
/// println!("{}", serde_json::to_string(&result).unwrap());
/// # Ok(())
/// # }
/// ```
pub async fn execute(invocation: &Invocation) -> Result<ExecutionResult, EngineError> {
    Orchestrator::new(EngineConfig::from_env())?.run(invocation).await
}
