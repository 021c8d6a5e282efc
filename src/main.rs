//! Command-line runner: executes a workflow document and prints
//! `{ "api": ..., "actions": ... }` as JSON.

use anyhow::{Context, Result};
use apichain::{yaml, EngineConfig, Helpers, Orchestrator};
use clap::Parser;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "apichain", version, about = "Run a chain of HTTP API steps")]
struct Cli {
    /// Workflow document (YAML or JSON)
    workflow: PathBuf,

    /// JSON object with caller input
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// JSON object of named helper values
    #[arg(short, long)]
    bindings: Option<PathBuf>,

    /// Rhai script with helper functions
    #[arg(long)]
    helpers: Option<PathBuf>,

    /// Query string exposed as `qs` (overrides APICHAIN_QUERY)
    #[arg(short, long)]
    query: Option<String>,

    /// Base URL for relative step URLs (overrides APICHAIN_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn read_object(path: &Path) -> Result<Map<String, Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as JSON", path.display()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("{} must contain a JSON object", path.display()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let workflow = yaml::load_file(&cli.workflow)?;

    let input = match cli.input {
        Some(ref path) => read_object(path)?,
        None => Map::new(),
    };

    let mut helpers = Helpers::new();
    if let Some(ref path) = cli.bindings {
        helpers = helpers.bind_all(read_object(path)?);
    }
    if let Some(ref path) = cli.helpers {
        let script = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        helpers = helpers.functions(&script);
    }

    let mut config = EngineConfig::from_env();
    if let Some(query) = cli.query {
        config = config.with_query_string(&query);
    }
    if let Some(base_url) = cli.base_url {
        config = config.with_base_url(&base_url);
    }

    let orchestrator = Orchestrator::new(config)?;
    let result = orchestrator
        .run_workflow(&workflow, input, helpers)
        .await
        .context("Workflow execution failed")?;

    for record in &result.steps {
        tracing::info!(step = %record.name, state = ?record.state, status = ?record.status, "Step summary");
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
