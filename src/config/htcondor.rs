use super::traits::{ConfigManifest, ConfigSection, FieldManifest};
use crate::error::GridGaError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One year
pub const MAX_TIMEOUT_MINUTES: u64 = 365 * 24 * 60;

/// Cluster dispatch settings, read from `[htcondor]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub execution_type: Option<ExecutionType>,
    /// Host name workers use to reach the result listener.
    pub server: String,
    pub port: u16,
    pub timeout_minutes: u64,
    pub executable: Option<String>,
    /// Argument template; `%GA%` is replaced by the genome's parameters.
    pub arguments: Option<String>,
    pub extract_obj: Option<String>,
    pub param_prefix: String,
    pub value_prefix: String,
    pub required_files: Vec<PathBuf>,
    pub config_template: Option<PathBuf>,
    /// Program the cluster runs for every job.
    pub wrapper: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionType {
    Htcondor,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            execution_type: None,
            server: "localhost".to_string(),
            port: 55566,
            timeout_minutes: 120,
            executable: None,
            arguments: None,
            extract_obj: None,
            param_prefix: "--".to_string(),
            value_prefix: " ".to_string(),
            required_files: Vec::new(),
            config_template: None,
            wrapper: "gridga-job-wrapper".to_string(),
        }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes.saturating_mul(60))
    }

    /// Address written into job descriptions.
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

impl ConfigSection for DispatchConfig {
    fn section_name() -> &'static str {
        "htcondor"
    }

    fn validate(&self) -> Result<(), GridGaError> {
        if self.execution_type.is_none() {
            return Err(GridGaError::Configuration(
                "execution_type must be set (htcondor)".to_string(),
            ));
        }
        if self.executable.as_deref().map_or(true, |s| s.trim().is_empty()) {
            return Err(GridGaError::Configuration(
                "htcondor.executable must be set".to_string(),
            ));
        }
        if self.arguments.as_deref().map_or(true, |s| s.trim().is_empty()) {
            return Err(GridGaError::Configuration(
                "htcondor.arguments must be set".to_string(),
            ));
        }
        if self.timeout_minutes == 0 {
            return Err(GridGaError::Configuration(
                "timeout_minutes must be at least 1".to_string(),
            ));
        }
        if self.timeout_minutes > MAX_TIMEOUT_MINUTES {
            return Err(GridGaError::Configuration(format!(
                "timeout_minutes must be at most {}, got {}",
                MAX_TIMEOUT_MINUTES, self.timeout_minutes
            )));
        }
        Ok(())
    }

    fn to_manifest(&self) -> ConfigManifest {
        let field = |name: &str, field_type: &str, default: serde_json::Value, description: &str| {
            FieldManifest {
                name: name.to_string(),
                field_type: field_type.to_string(),
                default,
                min: None,
                max: None,
                description: description.to_string(),
            }
        };

        ConfigManifest {
            section: Self::section_name().to_string(),
            fields: vec![
                field("execution_type", "string", serde_json::json!("htcondor"), "Required; only htcondor is supported"),
                field("server", "string", serde_json::json!(self.server), "Host workers report results to"),
                field("port", "integer", serde_json::json!(self.port), "Result listener port"),
                field("timeout_minutes", "integer", serde_json::json!(self.timeout_minutes), "How long to wait for a generation"),
                field("executable", "string", serde_json::json!("svm-train"), "Required; program evaluated for each genome"),
                field("arguments", "string", serde_json::json!("%GA% data.txt"), "Required; %GA% expands to the genome parameters"),
                field("extract_obj", "string", serde_json::Value::Null, "Command printing the objective on its first line"),
                field("param_prefix", "string", serde_json::json!(self.param_prefix), "Written before each parameter name"),
                field("value_prefix", "string", serde_json::json!(self.value_prefix), "Written between name and value"),
                field("required_files", "list", serde_json::json!([]), "Files transferred with every job"),
                field("config_template", "path", serde_json::Value::Null, "File with %GA:<id>% tokens rendered per job"),
                field("wrapper", "string", serde_json::json!(self.wrapper), "Program the cluster runs for each job"),
            ],
        }
    }
}
