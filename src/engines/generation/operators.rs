use crate::config::evolution::CrossoverKind;
use crate::engines::generation::genome::{Genome, GenomeIdSequence};
use rand::{Rng, RngCore};

/// Recombination of two parents into two children.
pub trait Crossover: Send {
    fn name(&self) -> &'static str;

    /// Children get fresh ids and start incomplete.
    fn cross(
        &self,
        parent1: &Genome,
        parent2: &Genome,
        ids: &mut GenomeIdSequence,
        rng: &mut dyn RngCore,
    ) -> (Genome, Genome);
}

/// Single cut point: positions `0..=point` come from the matching parent,
/// the rest from the other one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SliceCrossover;

impl Crossover for SliceCrossover {
    fn name(&self) -> &'static str {
        "slice"
    }

    fn cross(
        &self,
        parent1: &Genome,
        parent2: &Genome,
        ids: &mut GenomeIdSequence,
        rng: &mut dyn RngCore,
    ) -> (Genome, Genome) {
        let (mut child1, mut child2) = blank_children(parent1, parent2, ids);
        let len = parent1.parameters().len().min(parent2.parameters().len());
        if len < 2 {
            return (child1, child2);
        }

        let point = rng.gen_range(0..len - 1);
        log::debug!("Crossing {} and {} at index {}", parent1.id(), parent2.id(), point);

        let values1 = parent1.values();
        let values2 = parent2.values();
        for i in (point + 1)..len {
            child1.set_value_at(i, values2[i]);
            child2.set_value_at(i, values1[i]);
        }

        (child1, child2)
    }
}

/// Every parameter swaps except the one at a random index.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapCrossover;

impl Crossover for SwapCrossover {
    fn name(&self) -> &'static str {
        "swap"
    }

    fn cross(
        &self,
        parent1: &Genome,
        parent2: &Genome,
        ids: &mut GenomeIdSequence,
        rng: &mut dyn RngCore,
    ) -> (Genome, Genome) {
        let (mut child1, mut child2) = blank_children(parent1, parent2, ids);
        let len = parent1.parameters().len().min(parent2.parameters().len());
        if len < 2 {
            return (child1, child2);
        }

        let kept = rng.gen_range(0..len);
        log::debug!("Swapping {} and {} except index {}", parent1.id(), parent2.id(), kept);

        let values1 = parent1.values();
        let values2 = parent2.values();
        for i in (0..len).filter(|&i| i != kept) {
            child1.set_value_at(i, values2[i]);
            child2.set_value_at(i, values1[i]);
        }

        (child1, child2)
    }
}

/// Copies of the parents' parameters under new ids.
fn blank_children(parent1: &Genome, parent2: &Genome, ids: &mut GenomeIdSequence) -> (Genome, Genome) {
    (
        Genome::from_parameters(ids.next_id(), parent1.parameters().to_vec()),
        Genome::from_parameters(ids.next_id(), parent2.parameters().to_vec()),
    )
}

pub fn crossover_for(kind: CrossoverKind) -> Box<dyn Crossover> {
    match kind {
        CrossoverKind::Slice => Box::new(SliceCrossover),
        CrossoverKind::Swap => Box::new(SwapCrossover),
    }
}

/// Size of the top slice of the sorted cache that parents are drawn from.
///
/// `max(percent of cache, min_breeders)`, capped at one less than the cache.
/// A cache of exactly two uses both genomes so a distinct pair exists.
pub fn breeder_pool_size(cache_len: usize, breeder_percent: f64, min_breeders: usize) -> usize {
    if cache_len < 2 {
        return 0;
    }
    let by_percent = (breeder_percent / 100.0 * cache_len as f64).floor() as usize;
    by_percent.max(min_breeders).min(cache_len - 1).max(2)
}

/// Pick two parent indices uniformly from `0..pool_size`.
///
/// Returns `None` when both draws land on the same individual; the caller
/// counts that as a rejection.
pub fn pick_breeder_pair<R: Rng + ?Sized>(pool_size: usize, rng: &mut R) -> Option<(usize, usize)> {
    if pool_size == 0 {
        return None;
    }
    let first = rng.gen_range(0..pool_size);
    let second = rng.gen_range(0..pool_size);
    if first == second {
        None
    } else {
        Some((first, second))
    }
}
