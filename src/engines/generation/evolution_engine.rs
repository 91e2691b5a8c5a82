use crate::config::evolution::EvolutionConfig;
use crate::engines::dispatch::collector::{CollectionReport, Dispatcher};
use crate::engines::generation::{
    genome::{Genome, GenomeIdSequence},
    operators::{breeder_pool_size, crossover_for, pick_breeder_pair, Crossover},
    parameter::ParameterDescriptor,
    population::{PopulationStore, Restored},
};
use crate::error::{GridGaError, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::path::{Path, PathBuf};

/// Rejections tolerated while building the first population
const INITIAL_REJECTION_LIMIT: usize = 10_000;
/// Rejections tolerated per step of later generations
const BREEDING_REJECTION_LIMIT: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Initializing,
    Breeding,
    Dispatching,
    AwaitingResults,
    Merging,
    Terminated,
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnginePhase::Initializing => "initializing",
            EnginePhase::Breeding => "breeding",
            EnginePhase::Dispatching => "dispatching",
            EnginePhase::AwaitingResults => "awaiting results",
            EnginePhase::Merging => "merging",
            EnginePhase::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

pub trait ProgressCallback {
    fn on_generation_start(&mut self, generation: u64, batch_size: usize);
    fn on_generation_complete(&mut self, generation: u64, report: &CollectionReport, best: Option<&Genome>);
    fn on_terminated(&mut self, last_generation: u64, cache_size: usize);
}

pub struct EvolutionEngine {
    config: EvolutionConfig,
    descriptors: Vec<ParameterDescriptor>,
    cache: PopulationStore,
    ids: GenomeIdSequence,
    crossover: Box<dyn Crossover>,
    rng: StdRng,
    generation: u64,
    phase: EnginePhase,
    state_path: Option<PathBuf>,
    fresh_in_batch: usize,
}

impl EvolutionEngine {
    pub fn new(config: EvolutionConfig, descriptors: Vec<ParameterDescriptor>) -> Result<Self> {
        if descriptors.is_empty() {
            return Err(GridGaError::Configuration(
                "The engine needs at least one parameter".to_string(),
            ));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let crossover = crossover_for(config.crossover);

        Ok(Self {
            config,
            descriptors,
            cache: PopulationStore::new(),
            ids: GenomeIdSequence::new(),
            crossover,
            rng,
            generation: 1,
            phase: EnginePhase::Initializing,
            state_path: None,
            fresh_in_batch: 0,
        })
    }

    /// Persist the cache to `path` after every generation.
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    /// Swap the crossover operator chosen by configuration.
    pub fn with_crossover(mut self, crossover: Box<dyn Crossover>) -> Self {
        self.crossover = crossover;
        self
    }

    /// Load the state file if one is configured. The next generation
    /// continues after the saved one.
    pub fn restore_state(&mut self) -> Restored {
        let Some(path) = self.state_path.clone() else {
            return Restored {
                generation: self.generation,
                restored: false,
            };
        };

        let restored = self.cache.restore(&path, &self.descriptors, &mut self.ids);
        self.generation = restored.generation;
        restored
    }

    pub fn cache(&self) -> &PopulationStore {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut PopulationStore {
        &mut self.cache
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn state_path(&self) -> Option<&Path> {
        self.state_path.as_deref()
    }

    /// Random genomes at the front of the last batch; the rest were bred.
    pub fn fresh_in_batch(&self) -> usize {
        self.fresh_in_batch
    }

    pub fn is_finished(&self) -> bool {
        self.generation > self.config.max_generations
    }

    fn set_phase(&mut self, phase: EnginePhase) {
        if self.phase != phase {
            log::debug!("Generation {}: {} -> {}", self.generation, self.phase, phase);
            self.phase = phase;
        }
    }

    /// Build the candidate batch for the current generation.
    ///
    /// An empty batch means there is nothing left to evaluate.
    pub fn next_generation(&mut self) -> Vec<Genome> {
        if self.is_finished() {
            return Vec::new();
        }

        self.ids.reset_for_generation(self.generation);

        for dropped in self.cache.prune_incomplete() {
            log::warn!("Dropping genome that never completed: {}", dropped);
        }

        if self.cache.is_empty() {
            self.set_phase(EnginePhase::Initializing);
            self.initial_population()
        } else {
            self.set_phase(EnginePhase::Breeding);
            self.bred_population()
        }
    }

    fn is_duplicate(&self, candidate: &Genome, batch: &[Genome]) -> bool {
        self.cache.contains(candidate) || batch.iter().any(|g| g.is_equivalent(candidate))
    }

    fn initial_population(&mut self) -> Vec<Genome> {
        let target = self.config.population_size;
        let mut batch = Vec::with_capacity(target);
        let mut rejections = 0;

        while batch.len() < target && rejections < INITIAL_REJECTION_LIMIT {
            let candidate = Genome::random(&self.descriptors, &mut self.ids, &mut self.rng);
            if self.is_duplicate(&candidate, &batch) {
                rejections += 1;
                continue;
            }
            batch.push(candidate);
        }

        if batch.len() < target {
            log::warn!(
                "Only {} of {} initial genomes could be generated; the search space may be too small",
                batch.len(),
                target
            );
        }
        log::info!("Generation {}: {} random genomes", self.generation, batch.len());
        self.fresh_in_batch = batch.len();
        batch
    }

    fn bred_population(&mut self) -> Vec<Genome> {
        let target = self.config.population_size;
        self.cache.sort_by_objective_descending();

        let mut batch = Vec::with_capacity(target);

        // Fresh blood
        let fresh_target = self.config.new_random_genomes.min(target);
        let mut rejections = 0;
        while batch.len() < fresh_target && rejections < BREEDING_REJECTION_LIMIT {
            let candidate = Genome::random(&self.descriptors, &mut self.ids, &mut self.rng);
            if self.is_duplicate(&candidate, &batch) {
                rejections += 1;
                continue;
            }
            batch.push(candidate);
        }
        let fresh = batch.len();
        self.fresh_in_batch = fresh;

        let pool = breeder_pool_size(
            self.cache.len(),
            self.config.effective_breeder_percent(),
            self.config.min_breeders,
        );
        if pool < 2 {
            log::warn!(
                "Only {} genomes in the cache; skipping breeding this generation",
                self.cache.len()
            );
        } else {
            log::debug!("Breeding from the top {} of {} cached genomes", pool, self.cache.len());
            self.breed_into(&mut batch, pool, target);
        }

        if batch.len() < target {
            log::warn!(
                "Generation {}: only {} of {} genomes could be generated",
                self.generation,
                batch.len(),
                target
            );
        }
        log::info!(
            "Generation {}: {} random and {} bred genomes",
            self.generation,
            fresh,
            batch.len() - fresh
        );
        batch
    }

    fn breed_into(&mut self, batch: &mut Vec<Genome>, pool: usize, target: usize) {
        let mut rejections = 0;

        while batch.len() < target && rejections < BREEDING_REJECTION_LIMIT {
            let Some((first, second)) = pick_breeder_pair(pool, &mut self.rng) else {
                rejections += 1;
                continue;
            };
            let (Some(parent1), Some(parent2)) = (self.cache.get(first), self.cache.get(second)) else {
                rejections += 1;
                continue;
            };

            let (mut child1, mut child2) =
                self.crossover
                    .cross(parent1, parent2, &mut self.ids, &mut self.rng);
            child1.mutate(self.config.mutation_probability, &mut self.rng);
            child2.mutate(self.config.mutation_probability, &mut self.rng);

            if self.is_duplicate(&child1, batch) {
                rejections += 1;
            } else {
                batch.push(child1);
            }

            if batch.len() < target {
                if self.is_duplicate(&child2, batch) {
                    rejections += 1;
                } else {
                    batch.push(child2);
                }
            }
        }
    }

    /// Evolve until the generation limit is passed or no new genomes can be
    /// produced.
    pub fn run<D: Dispatcher, C: ProgressCallback>(
        &mut self,
        dispatcher: &mut D,
        callback: &mut C,
    ) -> Result<()> {
        while !self.is_finished() {
            let batch = self.next_generation();
            if batch.is_empty() {
                log::warn!("Generation {} produced no genomes; stopping", self.generation);
                break;
            }
            let generation = self.generation;
            callback.on_generation_start(generation, batch.len());

            self.set_phase(EnginePhase::Dispatching);
            let in_flight = dispatcher.submit(batch, generation)?;

            self.set_phase(EnginePhase::AwaitingResults);
            let report = dispatcher.await_results(in_flight, &mut self.cache)?;

            self.set_phase(EnginePhase::Merging);
            self.merge_report(&report)?;
            callback.on_generation_complete(generation, &report, self.cache.best());

            self.generation += 1;
        }

        self.set_phase(EnginePhase::Terminated);
        let last = self.generation.saturating_sub(1);
        log::info!(
            "Finished after generation {} with {} evaluated genomes",
            last,
            self.cache.len()
        );
        callback.on_terminated(last, self.cache.len());
        Ok(())
    }

    fn merge_report(&mut self, report: &CollectionReport) -> Result<()> {
        report.log_summary();
        self.cache.sort_by_objective_descending();

        let best = self.config.print_best.min(self.cache.len());
        if best > 0 {
            log::info!("Best {} genomes after generation {}:", best, self.generation);
            for genome in self.cache.top(best) {
                log::info!("  {}", genome);
            }
        }

        if let Some(path) = &self.state_path {
            self.cache.save(path, self.generation)?;
        }
        Ok(())
    }
}
