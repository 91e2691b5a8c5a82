use super::traits::{ConfigManifest, ConfigSection, FieldManifest};
use crate::error::GridGaError;
use serde::{Deserialize, Serialize};

/// Parameters of the genetic search, read from `[genetic_algo]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub population_size: usize,
    /// A child mutates with a 1 in `mutation_probability` chance; 0 disables.
    pub mutation_probability: u32,
    /// Share of the sorted cache eligible for breeding. 0 means 50.
    pub breeder_percent: f64,
    pub min_breeders: usize,
    pub new_random_genomes: usize,
    pub max_generations: u64,
    pub print_best: usize,
    pub crossover: CrossoverKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CrossoverKind {
    #[default]
    Slice,
    Swap,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            mutation_probability: 20,
            breeder_percent: 50.0,
            min_breeders: 50,
            new_random_genomes: 2,
            max_generations: 5,
            print_best: 20,
            crossover: CrossoverKind::Slice,
            seed: None,
        }
    }
}

impl EvolutionConfig {
    pub fn effective_breeder_percent(&self) -> f64 {
        if self.breeder_percent == 0.0 {
            50.0
        } else {
            self.breeder_percent
        }
    }
}

impl ConfigSection for EvolutionConfig {
    fn section_name() -> &'static str {
        "genetic_algo"
    }

    fn validate(&self) -> Result<(), GridGaError> {
        if self.population_size == 0 {
            return Err(GridGaError::Configuration(
                "Population size must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.breeder_percent) {
            return Err(GridGaError::Configuration(format!(
                "Breeder percent must be between 0 and 100, got {}",
                self.breeder_percent
            )));
        }
        if self.max_generations == 0 {
            return Err(GridGaError::Configuration(
                "Max generations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn to_manifest(&self) -> ConfigManifest {
        ConfigManifest {
            section: Self::section_name().to_string(),
            fields: vec![
                FieldManifest {
                    name: "population_size".to_string(),
                    field_type: "integer".to_string(),
                    default: serde_json::json!(self.population_size),
                    min: Some(1.0),
                    max: None,
                    description: "Genomes dispatched per generation".to_string(),
                },
                FieldManifest {
                    name: "mutation_probability".to_string(),
                    field_type: "integer".to_string(),
                    default: serde_json::json!(self.mutation_probability),
                    min: Some(0.0),
                    max: None,
                    description: "1 in N chance that a child mutates, 0 disables".to_string(),
                },
                FieldManifest {
                    name: "breeder_percent".to_string(),
                    field_type: "float".to_string(),
                    default: serde_json::json!(self.breeder_percent),
                    min: Some(0.0),
                    max: Some(100.0),
                    description: "Top share of the cache used as parents, 0 means 50".to_string(),
                },
                FieldManifest {
                    name: "min_breeders".to_string(),
                    field_type: "integer".to_string(),
                    default: serde_json::json!(self.min_breeders),
                    min: Some(0.0),
                    max: None,
                    description: "Lower limit on the breeder pool".to_string(),
                },
                FieldManifest {
                    name: "new_random_genomes".to_string(),
                    field_type: "integer".to_string(),
                    default: serde_json::json!(self.new_random_genomes),
                    min: Some(0.0),
                    max: None,
                    description: "Fresh random genomes injected every generation".to_string(),
                },
                FieldManifest {
                    name: "max_generations".to_string(),
                    field_type: "integer".to_string(),
                    default: serde_json::json!(self.max_generations),
                    min: Some(1.0),
                    max: None,
                    description: "Stop after this generation".to_string(),
                },
                FieldManifest {
                    name: "print_best".to_string(),
                    field_type: "integer".to_string(),
                    default: serde_json::json!(self.print_best),
                    min: Some(0.0),
                    max: None,
                    description: "Best genomes logged after each generation".to_string(),
                },
                FieldManifest {
                    name: "crossover".to_string(),
                    field_type: "string".to_string(),
                    default: serde_json::json!("slice"),
                    min: None,
                    max: None,
                    description: "Crossover operator: slice or swap".to_string(),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EvolutionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.population_size, 20);
        assert_eq!(config.min_breeders, 50);
        assert_eq!(config.crossover, CrossoverKind::Slice);
    }

    #[test]
    fn test_zero_breeder_percent_means_half() {
        let config = EvolutionConfig {
            breeder_percent: 0.0,
            ..EvolutionConfig::default()
        };
        assert_eq!(config.effective_breeder_percent(), 50.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = EvolutionConfig {
            population_size: 0,
            ..EvolutionConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EvolutionConfig {
            breeder_percent: 120.0,
            ..EvolutionConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
