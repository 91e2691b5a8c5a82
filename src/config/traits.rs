use crate::error::GridGaError;
use serde::{Deserialize, Serialize};

/// Trait for configuration sections
pub trait ConfigSection: Serialize + for<'de> Deserialize<'de> + Default + Clone {
    fn section_name() -> &'static str;
    fn validate(&self) -> Result<(), GridGaError>;
    fn to_manifest(&self) -> ConfigManifest;
}

/// Description of a section's keys, used to print the example configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigManifest {
    pub section: String,
    pub fields: Vec<FieldManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldManifest {
    pub name: String,
    pub field_type: String,
    pub default: serde_json::Value,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub description: String,
}

impl ConfigManifest {
    /// Render as an annotated TOML table.
    pub fn to_toml(&self) -> String {
        let mut out = format!("[{}]\n", self.section);
        for field in &self.fields {
            let mut comment = format!("# {} ({}", field.description, field.field_type);
            match (field.min, field.max) {
                (Some(min), Some(max)) => comment.push_str(&format!(", {} to {}", min, max)),
                (Some(min), None) => comment.push_str(&format!(", at least {}", min)),
                (None, Some(max)) => comment.push_str(&format!(", at most {}", max)),
                (None, None) => {}
            }
            comment.push(')');

            out.push_str(&comment);
            out.push('\n');
            if field.default.is_null() {
                out.push_str(&format!("# {} = \n", field.name));
            } else {
                out.push_str(&format!("{} = {}\n", field.name, field.default));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_renders_toml() {
        let manifest = ConfigManifest {
            section: "genetic_algo".to_string(),
            fields: vec![
                FieldManifest {
                    name: "population_size".to_string(),
                    field_type: "integer".to_string(),
                    default: serde_json::json!(20),
                    min: Some(1.0),
                    max: None,
                    description: "Genomes per generation".to_string(),
                },
                FieldManifest {
                    name: "crossover".to_string(),
                    field_type: "string".to_string(),
                    default: serde_json::json!("slice"),
                    min: None,
                    max: None,
                    description: "Operator".to_string(),
                },
            ],
        };

        let text = manifest.to_toml();
        assert!(text.starts_with("[genetic_algo]\n"));
        assert!(text.contains("# Genomes per generation (integer, at least 1)\npopulation_size = 20\n"));
        assert!(text.contains("crossover = \"slice\"\n"));

        let parsed: toml::Value = toml::from_str(&text).unwrap();
        assert_eq!(parsed["genetic_algo"]["population_size"].as_integer(), Some(20));
    }
}
