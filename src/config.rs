//! Configuração do motor de reducers carregada a partir de `onex.toml`.
//!
//! A struct [`ReducerConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `ONEX_LOG_LEVEL` tem precedência sobre o arquivo.

use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

use crate::error::ReducerError;
use crate::types::WorkflowType;

pub const CONFIG_FILE: &str = "onex.toml";
pub const LOG_LEVEL_ENV: &str = "ONEX_LOG_LEVEL";

/// Configuração de nível superior carregada de `onex.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReducerConfig {
    /// Máximo de retentativas registrado em cada workflow.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Nível de log padrão (error, warn, info, debug, trace).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Tipos de workflow cujos subreducers embutidos são registrados.
    #[serde(default = "default_enabled_workflow_types")]
    pub enabled_workflow_types: Vec<WorkflowType>,

    #[serde(default)]
    pub data_analysis: DataAnalysisConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

/// Parâmetros do subreducer de análise de dados.
#[derive(Debug, Clone, Deserialize)]
pub struct DataAnalysisConfig {
    /// Casas decimais nos resultados estatísticos.
    #[serde(default = "default_precision")]
    pub precision: u32,
}

/// Parâmetros do subreducer de relatórios.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Formato usado quando o payload não especifica um ("markdown", "text" ou "json").
    #[serde(default = "default_report_format")]
    pub default_format: String,
}

// Valor padrão para retentativas máximas: 3.
fn default_max_retries() -> u32 {
    3
}

// Valor padrão para o nível de log: "info".
fn default_log_level() -> String {
    "info".to_string()
}

// Todos os tipos habilitados por padrão.
fn default_enabled_workflow_types() -> Vec<WorkflowType> {
    WorkflowType::ALL.to_vec()
}

fn default_precision() -> u32 {
    4
}

fn default_report_format() -> String {
    "markdown".to_string()
}

impl Default for DataAnalysisConfig {
    fn default() -> Self {
        Self {
            precision: default_precision(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            default_format: default_report_format(),
        }
    }
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            log_level: default_log_level(),
            enabled_workflow_types: default_enabled_workflow_types(),
            data_analysis: DataAnalysisConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl ReducerConfig {
    /// Carrega a configuração de `onex.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração de um caminho explícito.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<ReducerConfig>(&contents)?
        } else {
            Self::default()
        };

        config.apply_log_level_override(std::env::var(LOG_LEVEL_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Aplica o valor de `ONEX_LOG_LEVEL`, que tem precedência sobre o arquivo.
    /// Valores vazios são ignorados; valores inválidos são barrados por [`validate`](Self::validate).
    pub fn apply_log_level_override(&mut self, level: Option<String>) {
        if let Some(level) = level.filter(|l| !l.trim().is_empty()) {
            self.log_level = level;
        }
    }

    /// Rejeita valores que o motor não sabe interpretar.
    pub fn validate(&self) -> std::result::Result<(), ReducerError> {
        const LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
        const FORMATS: &[&str] = &["markdown", "text", "json"];

        if !LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ReducerError::Config(format!(
                "unknown log_level '{}'",
                self.log_level
            )));
        }
        if !FORMATS.contains(&self.report.default_format.as_str()) {
            return Err(ReducerError::Config(format!(
                "unknown report.default_format '{}'",
                self.report.default_format
            )));
        }
        if self.data_analysis.precision > 15 {
            return Err(ReducerError::Config(
                "data_analysis.precision must be at most 15".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_enabled(&self, workflow_type: WorkflowType) -> bool {
        self.enabled_workflow_types.contains(&workflow_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = ReducerConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.enabled_workflow_types.len(), 3);
        assert_eq!(config.data_analysis.precision, 4);
        assert_eq!(config.report.default_format, "markdown");
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            max_retries = 5
            enabled_workflow_types = ["DATA_ANALYSIS"]

            [data_analysis]
            precision = 2
        "#;
        let config: ReducerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_retries, 5);
        assert!(config.is_enabled(WorkflowType::DataAnalysis));
        assert!(!config.is_enabled(WorkflowType::ReportGeneration));
        assert_eq!(config.data_analysis.precision, 2);
        assert_eq!(config.report.default_format, "markdown");
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_retries = 7").unwrap();
        writeln!(file, "[report]").unwrap();
        writeln!(file, "default_format = \"text\"").unwrap();

        let config = ReducerConfig::load_from(file.path()).unwrap();
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.report.default_format, "text");
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReducerConfig::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn validate_rejects_unknown_values() {
        let mut config = ReducerConfig::default();
        config.report.default_format = "pdf".into();
        assert!(matches!(config.validate(), Err(ReducerError::Config(_))));

        let mut config = ReducerConfig::default();
        config.log_level = "loud".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_retries = \"many\"").unwrap();
        assert!(ReducerConfig::load_from(file.path()).is_err());
    }

    #[test]
    fn log_level_override_from_env_value() {
        let mut config = ReducerConfig::default();
        config.apply_log_level_override(Some("debug".into()));
        assert_eq!(config.log_level, "debug");
        assert!(config.validate().is_ok());

        config.apply_log_level_override(None);
        assert_eq!(config.log_level, "debug");

        config.apply_log_level_override(Some("  ".into()));
        assert_eq!(config.log_level, "debug");

        config.apply_log_level_override(Some("chatty".into()));
        assert_eq!(config.log_level, "chatty");
        assert!(matches!(config.validate(), Err(ReducerError::Config(_))));
    }
}
