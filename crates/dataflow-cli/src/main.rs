//! dataflow-run
//!
//! Runs a dataflow project and prints the per-node results as JSON.
//!
//! Usage: `dataflow-run <project.json> [--config FILE] [--timeout-ms N] [--only NODE]... [--pretty]`

mod project;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;

use dataflow_engine::{
    BoaScriptEngine, DataflowEngine, EngineConfig, ExecutionResult, NodeId, Result, RunReport, RunStatus,
};

use crate::project::Project;

#[derive(Parser, Debug)]
#[command(name = "dataflow-run")]
#[command(about = "Run a dataflow project and print the node results as JSON")]
struct Args {
    /// Path to the project JSON
    project: PathBuf,

    /// Engine configuration file; overrides the project's config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Per-invocation timeout in milliseconds
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Run only these nodes and everything downstream of them
    #[arg(long = "only")]
    only: Vec<NodeId>,

    /// Pretty-print the output
    #[arg(long)]
    pretty: bool,

    /// Exit with a failure status when any node fails
    #[arg(long = "fail-on-error")]
    fail_on_error: bool,
}

/// Printed run summary
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Output<'a> {
    run_id: &'a str,
    status: RunStatus,
    results: &'a std::collections::BTreeMap<NodeId, ExecutionResult>,
    validation_errors: Vec<String>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&args)) {
        Ok((report, rendered)) => {
            println!("{}", rendered);
            if args.fail_on_error && report.failed() > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<(RunReport, String)> {
    let project = Project::load(&args.project)?;
    let config = resolve_config(args, project.config.clone())?;

    let scripts = Arc::new(BoaScriptEngine::new(&config));
    let mut engine = DataflowEngine::new(project.registry(), scripts, config);

    let report = if args.only.is_empty() {
        engine.run(&project.graph).await
    } else {
        engine.run_incremental(&project.graph, &args.only).await
    };

    let output = Output {
        run_id: &report.run_id,
        status: report.status,
        results: &report.patch,
        validation_errors: report.validation_errors.iter().map(|e| e.to_string()).collect(),
    };
    let rendered = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    Ok((report, rendered))
}

/// Config file, else project config, else defaults; then CLI overrides
fn resolve_config(args: &Args, project_config: Option<EngineConfig>) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => project_config.unwrap_or_default(),
    };
    if let Some(timeout_ms) = args.timeout_ms {
        config = config.with_invocation_timeout_ms(timeout_ms);
    }
    config.validate()?;
    Ok(config)
}
