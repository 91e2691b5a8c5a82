use super::{
    evolution::EvolutionConfig,
    htcondor::DispatchConfig,
    parameters::{build_descriptors, ParameterSpec},
    traits::ConfigSection,
};
use crate::engines::generation::parameter::ParameterDescriptor;
use crate::error::GridGaError;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Name of the configuration file inside a run directory
pub const CONFIG_FILE_NAME: &str = "gridga.toml";

/// Prefix of environment overrides, e.g. `GRIDGA_HTCONDOR__PORT=6000`
pub const ENV_PREFIX: &str = "GRIDGA";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub genetic_algo: EvolutionConfig,
    #[serde(default)]
    pub htcondor: DispatchConfig,
    #[serde(default, rename = "parameter")]
    pub parameters: Vec<ParameterSpec>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), GridGaError> {
        self.genetic_algo.validate()?;
        self.htcondor.validate()?;
        build_descriptors(&self.parameters)?;
        Ok(())
    }

    pub fn descriptors(&self) -> Result<Vec<ParameterDescriptor>, GridGaError> {
        build_descriptors(&self.parameters)
    }

    /// Annotated configuration printed by `gridga example-config`.
    pub fn example_toml() -> String {
        let mut out = String::new();
        out.push_str(&EvolutionConfig::default().to_manifest().to_toml());
        out.push_str("# seed = 42\n\n");
        out.push_str(&DispatchConfig::default().to_manifest().to_toml());
        out.push_str(concat!(
            "\n",
            "# One table per searched parameter. type is integer, exp-2 or categorical\n",
            "[[parameter]]\n",
            "id = \"stop-loss\"\n",
            "type = \"integer\"\n",
            "low = 10\n",
            "high = 200\n",
            "step = 5\n",
            "\n",
            "[[parameter]]\n",
            "id = \"svc-penalty\"\n",
            "type = \"exp-2\"\n",
            "low = 1\n",
            "high = 15\n",
            "\n",
            "[[parameter]]\n",
            "id = \"time-of-day\"\n",
            "type = \"categorical\"\n",
            "values = \"h1,h4,single,none\"\n",
        ));
        out
    }
}

pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(AppConfig::default())),
        }
    }

    /// Load the TOML file, apply `GRIDGA_*` environment overrides and validate.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), GridGaError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(GridGaError::Configuration(format!(
                "Failed to read config: {} does not exist",
                path.display()
            )));
        }

        let config: AppConfig = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| GridGaError::Configuration(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        log::info!("Loaded configuration from {}", path.display());
        match self.config.write() {
            Ok(mut guard) => *guard = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
        Ok(())
    }

    pub fn get(&self) -> AppConfig {
        match self.config.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
