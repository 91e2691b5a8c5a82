use crate::engines::generation::parameter::ParameterDescriptor;
use crate::engines::generation::population::RESERVED_STATE_KEYS;
use crate::error::{GridGaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_step() -> i32 {
    1
}

/// One `[[parameter]]` entry of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ParameterSpec {
    #[serde(rename = "integer")]
    Integer {
        id: String,
        low: i32,
        high: i32,
        #[serde(default = "default_step")]
        step: i32,
    },
    #[serde(rename = "exp-2")]
    Exp2 {
        id: String,
        low: i32,
        high: i32,
        #[serde(default = "default_step")]
        step: i32,
    },
    #[serde(rename = "categorical")]
    Categorical { id: String, values: String },
}

impl ParameterSpec {
    pub fn id(&self) -> &str {
        match self {
            ParameterSpec::Integer { id, .. }
            | ParameterSpec::Exp2 { id, .. }
            | ParameterSpec::Categorical { id, .. } => id,
        }
    }

    pub fn to_descriptor(&self) -> Result<ParameterDescriptor> {
        match self {
            ParameterSpec::Integer { id, low, high, step } => {
                ParameterDescriptor::linear(id.as_str(), *low, *high, *step)
            }
            ParameterSpec::Exp2 { id, low, high, step } => {
                ParameterDescriptor::log2(id.as_str(), *low, *high, *step)
            }
            ParameterSpec::Categorical { id, values } => {
                ParameterDescriptor::categorical_from_list(id.as_str(), values)
            }
        }
    }
}

/// Build the descriptor template for every genome.
///
/// Identifiers must be unique and must not clash with the fields of a
/// saved genome; an empty list is refused.
pub fn build_descriptors(specs: &[ParameterSpec]) -> Result<Vec<ParameterDescriptor>> {
    if specs.is_empty() {
        return Err(GridGaError::Configuration(
            "At least one [[parameter]] must be defined".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut descriptors = Vec::with_capacity(specs.len());
    for spec in specs {
        if !seen.insert(spec.id()) {
            return Err(GridGaError::Configuration(format!(
                "Parameter {} is defined more than once",
                spec.id()
            )));
        }
        if RESERVED_STATE_KEYS.contains(&spec.id()) {
            return Err(GridGaError::Configuration(format!(
                "Parameter id {} is reserved; choose another name",
                spec.id()
            )));
        }
        let descriptor = spec
            .to_descriptor()
            .map_err(|e| GridGaError::Configuration(e.to_string()))?;
        log::debug!("Parameter {}", descriptor);
        descriptors.push(descriptor);
    }
    Ok(descriptors)
}
