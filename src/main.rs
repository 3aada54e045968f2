mod cli;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Value, json};

use cli::{Cli, Command};
use onex_reducer::logging::init_logging;
use onex_reducer::{ReducerConfig, ReducerPatternEngine, WorkflowRequest, WorkflowType};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ReducerConfig::load_from(path)?,
        None => ReducerConfig::load()?,
    };
    let level = if cli.verbose { "debug" } else { config.log_level.as_str() };
    init_logging(level);

    let engine = ReducerPatternEngine::with_defaults(&config)?;

    match cli.command {
        Command::Run {
            workflow_type,
            instance_id,
            payload,
            file,
        } => {
            let payload: Value = match (payload, file) {
                (Some(inline), _) => {
                    serde_json::from_str(&inline).context("--payload is not valid JSON")?
                }
                (None, Some(path)) => {
                    let contents = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    serde_json::from_str(&contents)
                        .with_context(|| format!("{} is not valid JSON", path.display()))?
                }
                (None, None) => Value::Null,
            };
            let request =
                WorkflowRequest::new(workflow_type.into(), instance_id)?.with_payload(payload)?;

            let progress = ui::WorkflowProgress::start(request.workflow_type(), request.instance_id());
            let response = engine.process_workflow(request).await;
            progress.complete(&response);
            ui::print_response(&response);

            if !response.is_success() {
                std::process::exit(1);
            }
        }
        Command::Demo => run_demo(&engine).await?,
        Command::Health => ui::print_health(&engine.health_check()),
    }

    Ok(())
}

/// One request per workflow type plus one that fails validation inside its
/// subreducer, then the aggregated metrics.
async fn run_demo(engine: &ReducerPatternEngine) -> Result<()> {
    let requests = [
        (
            WorkflowType::DocumentRegeneration,
            "handbook-v2",
            json!({
                "document_id": "handbook",
                "title": "Employee Handbook",
                "sections": ["Overview", "Benefits", "Policies"]
            }),
        ),
        (
            WorkflowType::DataAnalysis,
            "latency-sample",
            json!({"data": [12.5, 14.1, 13.8, 12.9, 30.2]}),
        ),
        (
            WorkflowType::ReportGeneration,
            "weekly-status",
            json!({
                "title": "Weekly Status",
                "sections": [
                    {"heading": "Done", "content": "Router metrics shipped."},
                    {"heading": "Next", "content": "Health dashboard."}
                ]
            }),
        ),
        (WorkflowType::DataAnalysis, "empty-sample", json!({"data": []})),
    ];

    for (workflow_type, instance_id, payload) in requests {
        let request = WorkflowRequest::new(workflow_type, instance_id)?.with_payload(payload)?;
        let progress = ui::WorkflowProgress::start(workflow_type, instance_id);
        let response = engine.process_workflow(request).await;
        progress.complete(&response);
    }

    ui::print_metrics(&engine.metrics());
    Ok(())
}
