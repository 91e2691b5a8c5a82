use gridga::config::evolution::EvolutionConfig;
use gridga::engines::dispatch::collector::{CollectionReport, Dispatcher, InFlightBatch};
use gridga::engines::generation::{
    ChannelProgressCallback, EnginePhase, EvolutionEngine, Genome, ParameterDescriptor,
    PopulationStore, ProgressMessage,
};
use gridga::error::Result;
use gridga::types::{ResultEnvelope, ResultRecord};
use std::sync::mpsc;

/// Scores genomes locally: best at stop-loss 120, h4, svc-penalty 2^10.
struct LocalDispatcher {
    /// Genomes whose results never arrive, by position in the batch
    lose_every: Option<usize>,
}

fn score(genome: &Genome) -> f64 {
    let stop_loss = genome.value_of("stop-loss").unwrap_or(0) as f64;
    let time_of_day = genome.value_of("time-of-day").unwrap_or(0) as f64;
    let penalty = genome.value_of("svc-penalty").unwrap_or(0) as f64;
    -((stop_loss - 120.0).powi(2) + 100.0 * (time_of_day - 1.0).powi(2) + (penalty - 10.0).powi(2))
}

impl Dispatcher for LocalDispatcher {
    fn submit(&mut self, batch: Vec<Genome>, generation: u64) -> Result<InFlightBatch> {
        Ok(InFlightBatch::new(generation, batch))
    }

    fn await_results(
        &mut self,
        mut in_flight: InFlightBatch,
        cache: &mut PopulationStore,
    ) -> Result<CollectionReport> {
        let payloads: Vec<Vec<u8>> = in_flight
            .pending_genomes()
            .enumerate()
            .filter(|(i, _)| self.lose_every.map_or(true, |n| i % n != 0))
            .map(|(_, g)| {
                serde_json::to_vec(&ResultEnvelope {
                    results: ResultRecord::success(g.id(), score(g), "local"),
                })
                .unwrap()
            })
            .collect();

        for payload in payloads {
            in_flight.merge_payload(&payload, cache);
        }
        let timed_out = !in_flight.is_settled();
        Ok(in_flight.finish(timed_out))
    }
}

fn descriptors() -> Vec<ParameterDescriptor> {
    vec![
        ParameterDescriptor::linear("stop-loss", 10, 200, 5).unwrap(),
        ParameterDescriptor::categorical_from_list("time-of-day", "h1,h4,single,none").unwrap(),
        ParameterDescriptor::log2("svc-penalty", 1, 15, 1).unwrap(),
    ]
}

fn config(max_generations: u64, seed: u64) -> EvolutionConfig {
    EvolutionConfig {
        population_size: 12,
        mutation_probability: 5,
        breeder_percent: 50.0,
        min_breeders: 4,
        new_random_genomes: 2,
        max_generations,
        print_best: 3,
        seed: Some(seed),
        ..EvolutionConfig::default()
    }
}

#[test]
fn test_search_improves_and_reports_progress() {
    let (tx, rx) = mpsc::channel();
    let mut engine = EvolutionEngine::new(config(6, 42), descriptors()).unwrap();
    let mut dispatcher = LocalDispatcher { lose_every: None };

    engine
        .run(&mut dispatcher, &mut ChannelProgressCallback::new(tx))
        .unwrap();

    let messages: Vec<ProgressMessage> = rx.try_iter().collect();
    let starts = messages
        .iter()
        .filter(|m| matches!(m, ProgressMessage::GenerationStart { .. }))
        .count();
    assert_eq!(starts, 6);
    assert!(matches!(
        messages.last(),
        Some(ProgressMessage::Terminated { last_generation: 6, .. })
    ));

    // The best objective never gets worse from one generation to the next
    let bests: Vec<f64> = messages
        .iter()
        .filter_map(|m| match m {
            ProgressMessage::GenerationComplete { best_objective, .. } => *best_objective,
            _ => None,
        })
        .collect();
    assert_eq!(bests.len(), 6);
    assert!(bests.windows(2).all(|w| w[1] >= w[0]), "{:?}", bests);

    assert_eq!(engine.phase(), EnginePhase::Terminated);
    let cache = engine.cache();
    assert!(cache.len() > 12);
    for (i, a) in cache.iter().enumerate() {
        assert!(a.is_complete());
        for b in cache.iter().skip(i + 1) {
            assert!(!a.is_equivalent(b));
        }
    }
}

#[test]
fn test_resume_from_state_file() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("genetic-algo-cache.json");

    let mut first = EvolutionEngine::new(config(2, 7), descriptors())
        .unwrap()
        .with_state_file(&state);
    assert!(!first.restore_state().restored);
    first
        .run(&mut LocalDispatcher { lose_every: None }, &mut ChannelProgressCallback::new(mpsc::channel().0))
        .unwrap();
    assert!(state.exists());
    let cached_after_first = first.cache().len();

    let mut second = EvolutionEngine::new(config(4, 8), descriptors())
        .unwrap()
        .with_state_file(&state);
    let restored = second.restore_state();
    assert!(restored.restored);
    assert_eq!(restored.generation, 3);
    assert_eq!(second.cache().len(), cached_after_first);

    let best_before = second.cache().best().unwrap().objective();
    let (tx, rx) = mpsc::channel();
    second
        .run(&mut LocalDispatcher { lose_every: None }, &mut ChannelProgressCallback::new(tx))
        .unwrap();

    let generations: Vec<u64> = rx
        .try_iter()
        .filter_map(|m| match m {
            ProgressMessage::GenerationStart { generation, .. } => Some(generation),
            _ => None,
        })
        .collect();
    assert_eq!(generations, vec![3, 4]);
    assert!(second.cache().best().unwrap().objective() >= best_before);

    // New ids never collide with restored ones
    let mut ids: Vec<_> = second.cache().iter().map(|g| g.id()).collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);
}

#[test]
fn test_lost_results_are_dropped_not_cached() {
    let mut engine = EvolutionEngine::new(config(3, 99), descriptors()).unwrap();
    let (tx, rx) = mpsc::channel();
    engine
        .run(&mut LocalDispatcher { lose_every: Some(3) }, &mut ChannelProgressCallback::new(tx))
        .unwrap();

    let mut dispatched = 0;
    let mut merged = 0;
    for message in rx.try_iter() {
        if let ProgressMessage::GenerationComplete { merged: m, dispatched: d, .. } = message {
            assert!(m < d);
            dispatched += d;
            merged += m;
        }
    }
    assert_eq!(engine.cache().len(), merged);
    assert!(merged < dispatched);
    assert!(engine.cache().iter().all(|g| g.is_complete()));
}
