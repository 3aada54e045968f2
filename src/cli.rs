//! Interface de linha de comando do motor de reducers baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, demo, health)
//! e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use onex_reducer::WorkflowType;

/// ONEX — motor de reducers com roteamento de workflows.
#[derive(Debug, Parser)]
#[command(name = "onex-reducer", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: onex.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (nível de log debug).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Tipo de workflow aceito pela CLI, mapeado para [`WorkflowType`] internamente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WorkflowTypeArg {
    /// Regeneração de documentos.
    DocumentRegeneration,
    /// Estatísticas sobre uma série numérica.
    DataAnalysis,
    /// Geração de relatórios a partir de seções.
    ReportGeneration,
}

impl From<WorkflowTypeArg> for WorkflowType {
    fn from(arg: WorkflowTypeArg) -> Self {
        match arg {
            WorkflowTypeArg::DocumentRegeneration => WorkflowType::DocumentRegeneration,
            WorkflowTypeArg::DataAnalysis => WorkflowType::DataAnalysis,
            WorkflowTypeArg::ReportGeneration => WorkflowType::ReportGeneration,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Processa um único workflow.
    Run {
        /// Tipo do workflow.
        workflow_type: WorkflowTypeArg,

        /// Identificador da instância (letras, dígitos, '-' e '_').
        instance_id: String,

        /// Payload JSON inline.
        #[arg(long, conflicts_with = "file")]
        payload: Option<String>,

        /// Caminho para um arquivo JSON com o payload.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Executa a demonstração embutida com os três tipos de workflow.
    Demo,

    /// Verifica a saúde dos subreducers registrados.
    Health,
}
