pub mod traits;
pub mod evolution;
pub mod htcondor;
pub mod parameters;
pub mod manager;

pub use manager::{AppConfig, ConfigManager, CONFIG_FILE_NAME};
pub use evolution::{CrossoverKind, EvolutionConfig};
pub use htcondor::{DispatchConfig, ExecutionType};
pub use parameters::ParameterSpec;
