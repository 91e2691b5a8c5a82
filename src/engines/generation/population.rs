use crate::engines::generation::genome::{Genome, GenomeIdSequence};
use crate::engines::generation::parameter::ParameterDescriptor;
use crate::error::{GridGaError, Result};
use crate::types::GenomeId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The cache of evaluated genomes carried from generation to generation.
///
/// Genomes sit in arrival order until `sort_by_objective_descending` is
/// called. Two complete genomes with the same parameter values are never
/// stored together.
#[derive(Debug, Clone, Default)]
pub struct PopulationStore {
    genomes: Vec<Genome>,
}

/// Outcome of reading persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restored {
    /// Generation to run next.
    pub generation: u64,
    pub restored: bool,
}

impl Restored {
    fn fresh() -> Self {
        Self {
            generation: 1,
            restored: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    state: PersistedState,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PersistedState {
    population_size: usize,
    #[serde(default)]
    generation_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<String>,
    #[serde(default)]
    genome: Vec<PersistedGenome>,
}

/// Keys a saved genome uses besides its parameter values
pub const RESERVED_STATE_KEYS: &[&str] = &["id", "objective", "complete", "compute-host"];

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PersistedGenome {
    id: GenomeId,
    objective: f64,
    #[serde(default)]
    complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compute_host: Option<String>,
    #[serde(flatten)]
    values: BTreeMap<String, i32>,
}

impl PopulationStore {
    pub fn new() -> Self {
        Self {
            genomes: Vec::new(),
        }
    }

    pub fn push(&mut self, genome: Genome) {
        self.genomes.push(genome);
    }

    /// Add an evaluated genome. Incomplete genomes and duplicates of a
    /// cached genome are refused.
    pub fn insert_complete(&mut self, genome: Genome) -> bool {
        if !genome.is_complete() || self.contains(&genome) {
            return false;
        }
        self.genomes.push(genome);
        true
    }

    /// True when a complete cached genome has the same parameter values.
    pub fn contains(&self, genome: &Genome) -> bool {
        self.genomes
            .iter()
            .any(|cached| cached.is_complete() && cached.is_equivalent(genome))
    }

    /// Drop genomes that never received a result, returning them.
    pub fn prune_incomplete(&mut self) -> Vec<Genome> {
        let (complete, incomplete): (Vec<_>, Vec<_>) =
            self.genomes.drain(..).partition(|g| g.is_complete());
        self.genomes = complete;
        incomplete
    }

    /// Stable sort, best first. Complete genomes always precede incomplete
    /// ones whatever their objective.
    pub fn sort_by_objective_descending(&mut self) {
        self.genomes.sort_by(|a, b| {
            b.is_complete().cmp(&a.is_complete()).then_with(|| {
                b.objective()
                    .partial_cmp(&a.objective())
                    .unwrap_or(Ordering::Equal)
            })
        });
    }

    pub fn get(&self, index: usize) -> Option<&Genome> {
        self.genomes.get(index)
    }

    pub fn best(&self) -> Option<&Genome> {
        self.genomes.first()
    }

    /// First `n` genomes in current order.
    pub fn top(&self, n: usize) -> &[Genome] {
        &self.genomes[..n.min(self.genomes.len())]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Genome> {
        self.genomes.iter()
    }

    pub fn len(&self) -> usize {
        self.genomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genomes.is_empty()
    }

    /// Write the cache and generation number, replacing any previous file
    /// only once the new one is fully written.
    pub fn save(&self, path: &Path, generation: u64) -> Result<()> {
        let document = StateDocument {
            state: PersistedState {
                population_size: self.genomes.len(),
                generation_number: generation,
                saved_at: Some(chrono::Utc::now().to_rfc3339()),
                genome: self
                    .genomes
                    .iter()
                    .map(|g| PersistedGenome {
                        id: g.id(),
                        objective: if g.is_complete() { g.objective() } else { 0.0 },
                        complete: g.is_complete(),
                        compute_host: g.compute_host().map(str::to_string),
                        values: g
                            .parameters()
                            .iter()
                            .map(|p| (p.identifier().to_string(), p.internal_value()))
                            .collect(),
                    })
                    .collect(),
            },
        };

        let contents = serde_json::to_string_pretty(&document)?;
        let staging = staging_path(path);
        std::fs::write(&staging, contents)?;
        std::fs::rename(&staging, path).map_err(|e| {
            GridGaError::State(format!(
                "Failed to move {} into place: {}",
                staging.display(),
                e
            ))
        })?;

        log::debug!(
            "Saved {} genomes for generation {} to {}",
            self.genomes.len(),
            generation,
            path.display()
        );
        Ok(())
    }

    /// Replace the cache with persisted state.
    ///
    /// A missing or unreadable file, or one without a generation number, is
    /// not fatal: the cache is left empty and generation 1 is returned.
    pub fn restore(
        &mut self,
        path: &Path,
        template: &[ParameterDescriptor],
        ids: &mut GenomeIdSequence,
    ) -> Restored {
        if !path.exists() {
            log::info!("No previous state found at {}", path.display());
            return Restored::fresh();
        }

        let document = match read_state(path) {
            Ok(document) => document,
            Err(e) => {
                log::warn!(
                    "Genome cache {} is unreadable ({}). Restarting from the beginning",
                    path.display(),
                    e
                );
                return Restored::fresh();
            }
        };

        if document.state.generation_number == 0 {
            log::warn!("Genome cache looks invalid. No generation number. Restarting from the beginning");
            return Restored::fresh();
        }

        self.genomes.clear();
        for persisted in document.state.genome {
            let mut parameters = template.to_vec();
            for parameter in parameters.iter_mut() {
                match persisted.values.get(parameter.identifier()) {
                    Some(&value) => parameter.set_internal_value(value),
                    None => {
                        log::warn!(
                            "Genome[{}] has no value for {}; using its lower bound",
                            persisted.id,
                            parameter.identifier()
                        );
                        parameter.set_internal_value(i32::MIN);
                    }
                }
            }

            ids.observe(persisted.id);
            self.genomes.push(Genome::restored(
                persisted.id,
                parameters,
                persisted.objective,
                persisted.complete,
                persisted.compute_host,
            ));
        }

        // Don't overwrite the results of the saved generation
        let generation = document.state.generation_number + 1;
        log::info!(
            "Restored state. Generation number {}. Loaded {} genomes from cache.",
            generation,
            self.genomes.len()
        );

        Restored {
            generation,
            restored: true,
        }
    }
}

fn read_state(path: &Path) -> Result<StateDocument> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
