//! Interface de terminal do motor de reducers: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores.

use std::collections::BTreeMap;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use onex_reducer::{ReducerMetricsSnapshot, WorkflowResponse, WorkflowStatus, WorkflowType};

/// Indicador visual de progresso para um workflow no terminal.
pub struct WorkflowProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl WorkflowProgress {
    /// Inicia o spinner para o workflow informado.
    pub fn start(workflow_type: WorkflowType, instance_id: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("PROCESSING: {workflow_type} {instance_id}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Finaliza o spinner e exibe o status final.
    pub fn complete(&self, response: &WorkflowResponse) {
        self.pb.finish_and_clear();
        match response.status {
            WorkflowStatus::Completed => println!(
                "  {} {} completed in {:.2}ms",
                self.green.apply_to("✓"),
                response.workflow_type,
                response.processing_time_ms
            ),
            WorkflowStatus::Cancelled => println!(
                "  {} {} cancelled",
                self.yellow.apply_to("⊘"),
                response.workflow_type
            ),
            _ => {
                let reason = response
                    .error
                    .as_ref()
                    .map(|e| format!("{}: {}", e.error_type, e.error_message))
                    .unwrap_or_default();
                println!(
                    "  {} {} failed: {reason}",
                    self.red.apply_to("✗"),
                    response.workflow_type
                );
            }
        }
    }
}

/// Imprime a resposta completa em JSON.
pub fn print_response(response: &WorkflowResponse) {
    let style = if response.is_success() {
        Style::new().green()
    } else {
        Style::new().red()
    };
    println!();
    println!("{}", style.apply_to("─── Workflow Response ───"));
    println!("{}", serde_json::to_string_pretty(response).unwrap_or_default());
}

/// Imprime um resumo das métricas agregadas.
pub fn print_metrics(metrics: &ReducerMetricsSnapshot) {
    let header = Style::new().cyan().bold();
    println!();
    println!("{}", header.apply_to("─── Metrics ───"));
    println!(
        "  total: {}  successful: {}  failed: {}  cancelled: {}  active: {}",
        metrics.total_workflows,
        metrics.successful_workflows,
        metrics.failed_workflows,
        metrics.cancelled_workflows,
        metrics.active_workflows
    );
    println!(
        "  success rate: {:.1}%  avg time: {:.2}ms  routed: {}",
        metrics.success_rate * 100.0,
        metrics.average_processing_time_ms,
        metrics.router.total_routed
    );
    for (workflow_type, m) in &metrics.by_type {
        println!(
            "  {workflow_type}: {}/{} ok, avg {:.2}ms",
            m.successful,
            m.total,
            m.average_processing_time_ms
        );
    }
}

/// Imprime o resultado do health check, um tipo por linha.
pub fn print_health(health: &BTreeMap<WorkflowType, bool>) {
    let green = Style::new().green().bold();
    let red = Style::new().red().bold();
    if health.is_empty() {
        println!("  no subreducers registered");
        return;
    }
    for (workflow_type, healthy) in health {
        if *healthy {
            println!("  {} {workflow_type}", green.apply_to("✓"));
        } else {
            println!("  {} {workflow_type}", red.apply_to("✗"));
        }
    }
}
