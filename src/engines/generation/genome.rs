//! Genome representation for the distributed parameter search
//!
//! A genome is one complete assignment of values to every configured
//! parameter descriptor, plus the evaluation state reported back by the
//! cluster:
//! - `complete` flips exactly once, when a matching result arrives
//! - `objective` is only meaningful once complete
//! - `compute_host` records which worker produced the result
//!
//! Genomes are compared for duplicates on their internal parameter values
//! only; ids, objectives and hosts are ignored.
//!
//! # Example
//!
//! ```
//! use gridga::engines::generation::{Genome, GenomeIdSequence, ParameterDescriptor};
//! use rand::SeedableRng;
//!
//! let template = vec![ParameterDescriptor::linear("stop-loss", 10, 200, 5).unwrap()];
//! let mut ids = GenomeIdSequence::new();
//! let mut rng = rand::rngs::StdRng::seed_from_u64(1);
//! let genome = Genome::random(&template, &mut ids, &mut rng);
//! assert!(!genome.is_complete());
//! ```
use crate::engines::generation::parameter::ParameterDescriptor;
use crate::types::GenomeId;
use rand::Rng;
use std::fmt;

/// Width of the id range handed to each generation.
pub const GENOME_ID_BAND: u64 = 1000;

/// Hands out genome ids.
///
/// Each generation starts at `generation * GENOME_ID_BAND + 1` unless ids
/// from earlier in the run already went past that point; the sequence never
/// moves backwards.
#[derive(Debug, Clone)]
pub struct GenomeIdSequence {
    next: u64,
}

impl GenomeIdSequence {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> GenomeId {
        let id = GenomeId(self.next);
        self.next += 1;
        id
    }

    pub fn reset_for_generation(&mut self, generation: u64) {
        self.next = self.next.max(generation * GENOME_ID_BAND + 1);
    }

    /// Make sure an id loaded from elsewhere is never handed out again.
    pub fn observe(&mut self, id: GenomeId) {
        if id.0 >= self.next {
            self.next = id.0 + 1;
        }
    }

    pub fn peek(&self) -> GenomeId {
        GenomeId(self.next)
    }
}

impl Default for GenomeIdSequence {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct Genome {
    id: GenomeId,
    parameters: Vec<ParameterDescriptor>,
    complete: bool,
    objective: f64,
    compute_host: Option<String>,
}

impl Genome {
    pub fn from_parameters(id: GenomeId, parameters: Vec<ParameterDescriptor>) -> Self {
        Self {
            id,
            parameters,
            complete: false,
            objective: 0.0,
            compute_host: None,
        }
    }

    /// Rebuild a genome read back from persisted state.
    pub fn restored(
        id: GenomeId,
        parameters: Vec<ParameterDescriptor>,
        objective: f64,
        complete: bool,
        compute_host: Option<String>,
    ) -> Self {
        Self {
            id,
            parameters,
            complete,
            objective,
            compute_host,
        }
    }

    /// Fresh genome with every parameter set to a random legal value.
    pub fn random<R: Rng + ?Sized>(
        template: &[ParameterDescriptor],
        ids: &mut GenomeIdSequence,
        rng: &mut R,
    ) -> Self {
        let mut parameters = template.to_vec();
        for parameter in parameters.iter_mut() {
            parameter.random_value(rng);
        }
        Self::from_parameters(ids.next_id(), parameters)
    }

    pub fn id(&self) -> GenomeId {
        self.id
    }

    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    pub fn value_of(&self, identifier: &str) -> Option<i32> {
        self.parameters
            .iter()
            .find(|p| p.identifier() == identifier)
            .map(|p| p.internal_value())
    }

    /// Returns false when no parameter has this identifier.
    pub fn set_value(&mut self, identifier: &str, value: i32) -> bool {
        match self.parameters.iter_mut().find(|p| p.identifier() == identifier) {
            Some(parameter) => {
                parameter.set_internal_value(value);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_value_at(&mut self, index: usize, value: i32) {
        if let Some(parameter) = self.parameters.get_mut(index) {
            parameter.set_internal_value(value);
        }
    }

    pub fn values(&self) -> Vec<i32> {
        self.parameters.iter().map(|p| p.internal_value()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// `f64::MIN` until a result arrives, so incomplete genomes sort last.
    pub fn objective(&self) -> f64 {
        if self.complete {
            self.objective
        } else {
            f64::MIN
        }
    }

    pub fn compute_host(&self) -> Option<&str> {
        self.compute_host.as_deref()
    }

    pub fn mark_complete(&mut self, objective: f64, compute_host: Option<String>) {
        self.objective = objective;
        self.compute_host = compute_host;
        self.complete = true;
    }

    /// Mutate with a 1 in `probability_denominator` chance.
    ///
    /// A single parameter, picked uniformly, is either moved one step in a
    /// random direction or given a new random value. A denominator of zero
    /// disables mutation.
    pub fn mutate<R: Rng + ?Sized>(&mut self, probability_denominator: u32, rng: &mut R) -> bool {
        if probability_denominator == 0 || self.parameters.is_empty() {
            return false;
        }
        if rng.gen_range(0..probability_denominator) != 0 {
            return false;
        }

        let index = rng.gen_range(0..self.parameters.len());
        let parameter = &mut self.parameters[index];

        if rng.gen_bool(0.5) {
            if rng.gen_bool(0.5) {
                log::debug!("Genome[{}] mutating {} decrease", self.id, parameter.identifier());
                parameter.decrease();
            } else {
                log::debug!("Genome[{}] mutating {} increase", self.id, parameter.identifier());
                parameter.increase();
            }
        } else {
            let value = parameter.random_value(rng);
            log::debug!(
                "Genome[{}] mutating {} to new random value {}",
                self.id,
                parameter.identifier(),
                value
            );
        }

        true
    }

    /// True when every parameter holds the same internal value.
    pub fn is_equivalent(&self, other: &Genome) -> bool {
        self.parameters.len() == other.parameters.len()
            && self
                .parameters
                .iter()
                .zip(&other.parameters)
                .all(|(a, b)| {
                    a.identifier() == b.identifier() && a.internal_value() == b.internal_value()
                })
    }

    pub fn to_text(&self) -> String {
        let objective = if self.complete {
            self.objective.to_string()
        } else {
            "incomplete".to_string()
        };

        let mut text = format!(
            "{}: Obj={} Compute host={}",
            self.id,
            objective,
            self.compute_host.as_deref().unwrap_or("undefined")
        );
        for parameter in &self.parameters {
            text.push(' ');
            text.push_str(parameter.identifier());
            text.push('=');
            text.push_str(&parameter.display_value());
        }
        text
    }

    /// Parameters rendered as `prefix + id + value_prefix + value` tokens.
    pub fn command_line_arguments(&self, param_prefix: &str, value_prefix: &str) -> String {
        self.parameters
            .iter()
            .map(|p| format!("{}{}{}{}", param_prefix, p.identifier(), value_prefix, p.display_value()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}
