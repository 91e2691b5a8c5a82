use crate::config::htcondor::DispatchConfig;
use crate::engines::generation::genome::Genome;
use crate::error::{GridGaError, Result};
use crate::types::{GenomeId, JobDescription, JobEnvelope};
use std::path::{Path, PathBuf};

/// Placeholder in the argument template replaced by the genome's parameters
pub const GENOME_ARGUMENTS_TOKEN: &str = "%GA%";

/// Files produced for one genome's job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobFiles {
    pub genome_id: GenomeId,
    /// The job description handed to the wrapper as its only argument.
    pub description: PathBuf,
    /// Everything transferred to the execute node, description first.
    pub input_files: Vec<PathBuf>,
}

/// Turns a genome into the files its job needs.
pub trait JobRenderer {
    fn render(&self, genome: &Genome, dir: &Path) -> Result<JobFiles>;
}

/// Per-job configuration file rendered from a template.
///
/// `%GA:<parameter id>%` becomes that parameter's value and
/// `%GA:genome-id%` the genome id.
#[derive(Debug, Clone)]
pub struct ConfigTemplate {
    file_name: String,
    contents: String,
}

impl ConfigTemplate {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GridGaError::Configuration(format!(
                "Cannot read config template {}: {}",
                path.display(),
                e
            ))
        })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                GridGaError::Configuration(format!("Bad config template path {}", path.display()))
            })?
            .to_string();
        Ok(Self::new(file_name, contents))
    }

    pub fn new(file_name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            contents: contents.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn render(&self, genome: &Genome) -> String {
        let mut rendered = self
            .contents
            .replace("%GA:genome-id%", &genome.id().to_string());
        for parameter in genome.parameters() {
            let token = format!("%GA:{}%", parameter.identifier());
            rendered = rendered.replace(&token, &parameter.display_value());
        }
        if rendered.contains("%GA:") {
            log::warn!(
                "Config for genome {} still contains unknown %GA:...% tokens",
                genome.id()
            );
        }
        rendered
    }
}

/// Builds the command line `executable arguments` with the genome's
/// parameters substituted for `%GA%`.
#[derive(Debug, Clone)]
pub struct CommandLineRenderer {
    executable: String,
    arguments: String,
    extract_obj: Option<String>,
    server: String,
    param_prefix: String,
    value_prefix: String,
    required_files: Vec<PathBuf>,
    template: Option<ConfigTemplate>,
}

impl CommandLineRenderer {
    /// Relative paths in the configuration are resolved against `base_dir`.
    pub fn from_config(config: &DispatchConfig, base_dir: &Path) -> Result<Self> {
        let executable = config
            .executable
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| GridGaError::Configuration("htcondor.executable must be set".to_string()))?;
        let arguments = config
            .arguments
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| GridGaError::Configuration("htcondor.arguments must be set".to_string()))?;
        if !arguments.contains(GENOME_ARGUMENTS_TOKEN) {
            log::warn!(
                "htcondor.arguments has no {} token; every job runs the same command",
                GENOME_ARGUMENTS_TOKEN
            );
        }

        let template = config
            .config_template
            .as_ref()
            .map(|path| ConfigTemplate::load(&base_dir.join(path)))
            .transpose()?;

        let mut required_files = Vec::with_capacity(config.required_files.len());
        for file in &config.required_files {
            let path = base_dir.join(file);
            if !path.exists() {
                return Err(GridGaError::Configuration(format!(
                    "Required file {} does not exist",
                    path.display()
                )));
            }
            required_files.push(path);
        }

        Ok(Self {
            executable,
            arguments,
            extract_obj: config.extract_obj.clone().filter(|s| !s.trim().is_empty()),
            server: config.server_address(),
            param_prefix: config.param_prefix.clone(),
            value_prefix: config.value_prefix.clone(),
            required_files,
            template,
        })
    }

    pub fn command_line(&self, genome: &Genome) -> String {
        let parameters = genome.command_line_arguments(&self.param_prefix, &self.value_prefix);
        let arguments = self.arguments.replace(GENOME_ARGUMENTS_TOKEN, &parameters);
        format!("{} {}", self.executable, arguments).trim().to_string()
    }

    pub fn description(&self, genome: &Genome) -> JobEnvelope {
        JobEnvelope {
            config: JobDescription {
                execute: self.command_line(genome),
                extract_obj_value: self.extract_obj.clone(),
                server: self.server.clone(),
                genome_id: genome.id(),
            },
        }
    }
}

impl JobRenderer for CommandLineRenderer {
    fn render(&self, genome: &Genome, dir: &Path) -> Result<JobFiles> {
        let description = dir.join(format!("{}_job.json", genome.id()));
        std::fs::write(&description, serde_json::to_string_pretty(&self.description(genome))?)?;

        let mut input_files = vec![description.clone()];

        // One subdirectory per genome so the file keeps its name on the worker
        if let Some(template) = &self.template {
            let job_dir = dir.join(genome.id().to_string());
            std::fs::create_dir_all(&job_dir)?;
            let config_file = job_dir.join(template.file_name());
            std::fs::write(&config_file, template.render(genome))?;
            input_files.push(config_file);
        }

        input_files.extend(self.required_files.iter().cloned());

        log::debug!("Rendered job for genome {}", genome.id());
        Ok(JobFiles {
            genome_id: genome.id(),
            description,
            input_files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::htcondor::ExecutionType;
    use crate::engines::generation::parameter::ParameterDescriptor;

    fn genome() -> Genome {
        let mut genome = Genome::from_parameters(
            GenomeId(3001),
            vec![
                ParameterDescriptor::linear("stop-loss", 10, 200, 5).unwrap(),
                ParameterDescriptor::categorical_from_list("time-of-day", "h1,h4,single,none").unwrap(),
                ParameterDescriptor::log2("svc-penalty", 1, 15, 1).unwrap(),
            ],
        );
        genome.set_value("stop-loss", 50);
        genome.set_value("time-of-day", 1);
        genome.set_value("svc-penalty", 10);
        genome
    }

    fn config() -> DispatchConfig {
        DispatchConfig {
            execution_type: Some(ExecutionType::Htcondor),
            server: "head-node".to_string(),
            executable: Some("svm-train".to_string()),
            arguments: Some("%GA% data.txt".to_string()),
            extract_obj: Some("python parse.py".to_string()),
            ..DispatchConfig::default()
        }
    }

    #[test]
    fn test_missing_executable_or_arguments_refused() {
        let dir = tempfile::tempdir().unwrap();
        let no_exe = DispatchConfig {
            executable: None,
            ..config()
        };
        assert!(matches!(
            CommandLineRenderer::from_config(&no_exe, dir.path()),
            Err(GridGaError::Configuration(_))
        ));

        let no_args = DispatchConfig {
            arguments: None,
            ..config()
        };
        assert!(CommandLineRenderer::from_config(&no_args, dir.path()).is_err());
    }

    #[test]
    fn test_command_line_substitution() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CommandLineRenderer::from_config(&config(), dir.path()).unwrap();
        assert_eq!(
            renderer.command_line(&genome()),
            "svm-train --stop-loss 50 --time-of-day h4 --svc-penalty 1024 data.txt"
        );
    }

    #[test]
    fn test_render_writes_description_and_lists_inputs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.txt"), "1 2 3").unwrap();
        std::fs::write(
            dir.path().join("settings.xml"),
            "<id>%GA:genome-id%</id><sl>%GA:stop-loss%</sl><pen>%GA:svc-penalty%</pen>",
        )
        .unwrap();

        let config = DispatchConfig {
            required_files: vec![PathBuf::from("data.txt")],
            config_template: Some(PathBuf::from("settings.xml")),
            ..config()
        };
        let renderer = CommandLineRenderer::from_config(&config, dir.path()).unwrap();

        let out = dir.path().join("generation-1");
        std::fs::create_dir_all(&out).unwrap();
        let files = renderer.render(&genome(), &out).unwrap();

        assert_eq!(files.description, out.join("3001_job.json"));
        assert_eq!(
            files.input_files,
            vec![
                out.join("3001_job.json"),
                out.join("3001").join("settings.xml"),
                dir.path().join("data.txt"),
            ]
        );

        let envelope: JobEnvelope =
            serde_json::from_str(&std::fs::read_to_string(&files.description).unwrap()).unwrap();
        assert_eq!(envelope.config.genome_id, GenomeId(3001));
        assert_eq!(envelope.config.server, "head-node:55566");
        assert_eq!(envelope.config.extract_obj_value.as_deref(), Some("python parse.py"));

        let rendered = std::fs::read_to_string(out.join("3001").join("settings.xml")).unwrap();
        assert_eq!(rendered, "<id>3001</id><sl>50</sl><pen>1024</pen>");
    }

    #[test]
    fn test_missing_required_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = DispatchConfig {
            required_files: vec![PathBuf::from("absent.csv")],
            ..config()
        };
        assert!(matches!(
            CommandLineRenderer::from_config(&config, dir.path()),
            Err(GridGaError::Configuration(_))
        ));
    }
}
