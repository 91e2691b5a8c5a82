use crate::config::htcondor::DispatchConfig;
use crate::engines::dispatch::job::{CommandLineRenderer, JobRenderer};
use crate::engines::dispatch::listener::{MessageSource, ResultListener};
use crate::engines::dispatch::scheduler::{HtCondor, Scheduler};
use crate::engines::generation::genome::Genome;
use crate::engines::generation::population::PopulationStore;
use crate::error::{GridGaError, Result};
use crate::types::{ClusterId, GenomeId, MergeOutcome, ResultEnvelope, ResultRecord};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Evaluates one generation's batch somewhere and merges the results.
pub trait Dispatcher {
    fn submit(&mut self, batch: Vec<Genome>, generation: u64) -> Result<InFlightBatch>;

    fn await_results(
        &mut self,
        in_flight: InFlightBatch,
        cache: &mut PopulationStore,
    ) -> Result<CollectionReport>;

    fn execute_generation(
        &mut self,
        batch: Vec<Genome>,
        cache: &mut PopulationStore,
        generation: u64,
    ) -> Result<CollectionReport> {
        let in_flight = self.submit(batch, generation)?;
        self.await_results(in_flight, cache)
    }
}

/// Genomes dispatched for one generation that have not reported back.
#[derive(Debug)]
pub struct InFlightBatch {
    generation: u64,
    order: Vec<GenomeId>,
    pending: HashMap<GenomeId, Genome>,
    merged_ids: HashSet<GenomeId>,
    cluster: Option<ClusterId>,
    unknown: usize,
    duplicates: usize,
    malformed: usize,
}

impl InFlightBatch {
    pub fn new(generation: u64, batch: Vec<Genome>) -> Self {
        let mut order = Vec::with_capacity(batch.len());
        let mut pending = HashMap::with_capacity(batch.len());
        for genome in batch {
            if genome.is_complete() {
                log::warn!("Genome {} is already complete; not dispatching it", genome.id());
                continue;
            }
            order.push(genome.id());
            pending.insert(genome.id(), genome);
        }

        Self {
            generation,
            order,
            pending,
            merged_ids: HashSet::new(),
            cluster: None,
            unknown: 0,
            duplicates: 0,
            malformed: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn dispatched(&self) -> usize {
        self.order.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn get(&self, id: GenomeId) -> Option<&Genome> {
        self.pending.get(&id)
    }

    /// Still-pending genomes in dispatch order.
    pub fn pending_genomes(&self) -> impl Iterator<Item = &Genome> {
        self.order.iter().filter_map(|id| self.pending.get(id))
    }

    pub fn pending_ids(&self) -> Vec<GenomeId> {
        self.pending_genomes().map(|g| g.id()).collect()
    }

    pub fn cluster(&self) -> Option<ClusterId> {
        self.cluster
    }

    pub fn set_cluster(&mut self, cluster: Option<ClusterId>) {
        self.cluster = cluster;
    }

    /// Parse a raw result message and merge it.
    pub fn merge_payload(&mut self, payload: &[u8], cache: &mut PopulationStore) -> MergeOutcome {
        let envelope: ResultEnvelope = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!(
                    "Dropping malformed result ({}): {}",
                    e,
                    String::from_utf8_lossy(payload)
                );
                self.malformed += 1;
                return MergeOutcome::Malformed;
            }
        };

        if !envelope.results.objective.is_finite() {
            log::warn!(
                "Dropping result for genome {} with objective {}",
                envelope.results.id,
                envelope.results.objective
            );
            self.malformed += 1;
            return MergeOutcome::Malformed;
        }

        self.merge_record(envelope.results, cache)
    }

    /// Complete the matching genome and move it into the cache.
    pub fn merge_record(&mut self, record: ResultRecord, cache: &mut PopulationStore) -> MergeOutcome {
        let id = record.id;
        let Some(mut genome) = self.pending.remove(&id) else {
            if self.merged_ids.contains(&id) {
                log::warn!("Result for genome {} already received; ignoring repeat", id);
                self.duplicates += 1;
                return MergeOutcome::AlreadyComplete(id);
            }
            log::warn!("Genome {} not found in generation {}", id, self.generation);
            self.unknown += 1;
            return MergeOutcome::UnknownId(id);
        };

        if let Some(error) = &record.error {
            log::warn!(
                "Genome {} failed on {}: {}",
                id,
                record.compute_host.as_deref().unwrap_or("unknown host"),
                error
            );
        }

        genome.mark_complete(record.objective, record.compute_host);
        log::info!("Received {}", genome);
        if !cache.insert_complete(genome) {
            log::warn!("Genome {} duplicates a cached genome; not caching it", id);
        }
        cache.sort_by_objective_descending();
        self.merged_ids.insert(id);
        MergeOutcome::Merged(id)
    }

    /// Close the batch; whatever is still pending is reported unfinished.
    pub fn finish(mut self, timed_out: bool) -> CollectionReport {
        let unfinished = self
            .order
            .iter()
            .filter_map(|id| self.pending.remove(id))
            .collect();

        CollectionReport {
            generation: self.generation,
            dispatched: self.order.len(),
            merged: self.merged_ids.len(),
            unknown: self.unknown,
            duplicates: self.duplicates,
            malformed: self.malformed,
            timed_out,
            unfinished,
        }
    }
}

/// What came back for one generation.
#[derive(Debug, Clone)]
pub struct CollectionReport {
    pub generation: u64,
    pub dispatched: usize,
    pub merged: usize,
    pub unknown: usize,
    pub duplicates: usize,
    pub malformed: usize,
    pub timed_out: bool,
    /// Dispatched genomes without a result; dropped from the run.
    pub unfinished: Vec<Genome>,
}

impl CollectionReport {
    pub fn log_summary(&self) {
        log::info!(
            "Generation {}: {} of {} results received",
            self.generation,
            self.merged,
            self.dispatched
        );
        if self.timed_out {
            log::info!("Generation {} timed out", self.generation);
        }
        if self.unknown + self.duplicates + self.malformed > 0 {
            log::info!(
                "Ignored {} unknown, {} repeated and {} malformed messages",
                self.unknown,
                self.duplicates,
                self.malformed
            );
        }
        for genome in &self.unfinished {
            log::warn!("Genome {} returned no result; dropping it", genome);
        }
    }
}

/// Stand-in deadline when the configured timeout does not fit an `Instant`
const LONGEST_WAIT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Block on `source` until every pending genome has merged or `timeout`
/// has elapsed. Returns true on timeout.
pub fn collect<S: MessageSource + ?Sized>(
    source: &mut S,
    in_flight: &mut InFlightBatch,
    cache: &mut PopulationStore,
    timeout: Duration,
) -> Result<bool> {
    let start = Instant::now();
    let deadline = start
        .checked_add(timeout)
        .or_else(|| start.checked_add(LONGEST_WAIT))
        .unwrap_or(start);

    while !in_flight.is_settled() {
        let now = Instant::now();
        if now >= deadline {
            return Ok(true);
        }
        log::debug!(
            "Waiting for {} results, {}s left",
            in_flight.pending_count(),
            (deadline - now).as_secs()
        );

        match source.receive(deadline)? {
            Some(payload) => {
                if let MergeOutcome::Merged(id) = in_flight.merge_payload(&payload, cache) {
                    log::debug!(
                        "Genome {} merged, {} still pending",
                        id,
                        in_flight.pending_count()
                    );
                }
            }
            None => return Ok(true),
        }
    }

    Ok(false)
}

/// Runs every generation as a cluster batch and waits for workers to report
/// over the result channel.
pub struct BatchDispatcher<R: JobRenderer, S: Scheduler> {
    renderer: R,
    scheduler: S,
    files_dir: PathBuf,
    bind_address: String,
    timeout: Duration,
    listener: Option<ResultListener>,
}

impl BatchDispatcher<CommandLineRenderer, HtCondor> {
    pub fn from_config(config: &DispatchConfig, files_dir: &Path) -> Result<Self> {
        let renderer = CommandLineRenderer::from_config(config, files_dir)?;
        let scheduler = HtCondor::new(files_dir, config.wrapper.clone());
        Ok(Self::new(
            renderer,
            scheduler,
            files_dir,
            format!("0.0.0.0:{}", config.port),
            config.timeout(),
        ))
    }
}

impl<R: JobRenderer, S: Scheduler> BatchDispatcher<R, S> {
    pub fn new(
        renderer: R,
        scheduler: S,
        files_dir: impl Into<PathBuf>,
        bind_address: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            renderer,
            scheduler,
            files_dir: files_dir.into(),
            bind_address: bind_address.into(),
            timeout,
            listener: None,
        }
    }

    /// Address the listener is bound to, once bound.
    pub fn listener_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener.as_ref().map(|l| l.local_addr())
    }

    /// Bind the result listener now rather than on first submission.
    pub fn bind(&mut self) -> Result<std::net::SocketAddr> {
        if self.listener.is_none() {
            self.listener = Some(ResultListener::bind(&self.bind_address)?);
        }
        self.listener_addr()
            .ok_or_else(|| GridGaError::Protocol("Result listener is not bound".to_string()))
    }

    pub fn generation_dir(&self, generation: u64) -> PathBuf {
        self.files_dir.join(format!("generation-{}", generation))
    }

    fn prepare_generation_dir(&self, generation: u64) -> Result<PathBuf> {
        let dir = self.generation_dir(generation);
        if dir.exists() {
            log::debug!("Emptying {}", dir.display());
            std::fs::remove_dir_all(&dir)?;
        }
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

impl<R: JobRenderer, S: Scheduler> Dispatcher for BatchDispatcher<R, S> {
    fn submit(&mut self, batch: Vec<Genome>, generation: u64) -> Result<InFlightBatch> {
        if generation == 0 {
            return Err(GridGaError::State(
                "Generation numbers start at 1".to_string(),
            ));
        }

        let dir = self.prepare_generation_dir(generation)?;
        let mut in_flight = InFlightBatch::new(generation, batch);

        let mut jobs = Vec::with_capacity(in_flight.dispatched());
        for genome in in_flight.pending_genomes() {
            jobs.push(self.renderer.render(genome, &dir)?);
        }

        // Listen before anything runs so no early result is lost
        self.bind()?;

        match self.scheduler.submit(generation, &jobs, &dir) {
            Ok(cluster) => in_flight.set_cluster(cluster),
            Err(e) => log::error!(
                "Submitting generation {} failed: {}. Waiting for results anyway",
                generation,
                e
            ),
        }
        Ok(in_flight)
    }

    fn await_results(
        &mut self,
        mut in_flight: InFlightBatch,
        cache: &mut PopulationStore,
    ) -> Result<CollectionReport> {
        let listener = self
            .listener
            .as_mut()
            .ok_or_else(|| GridGaError::State("Results awaited before submission".to_string()))?;

        let timed_out = collect(listener, &mut in_flight, cache, self.timeout)?;
        if let Some(cluster) = in_flight.cluster() {
            self.scheduler.remove(cluster);
        }
        Ok(in_flight.finish(timed_out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::parameter::ParameterDescriptor;
    use std::collections::VecDeque;

    fn batch(ids: &[u64]) -> Vec<Genome> {
        ids.iter()
            .map(|&id| {
                let mut genome = Genome::from_parameters(
                    GenomeId(id),
                    vec![ParameterDescriptor::linear("x", 0, 100_000, 1).unwrap()],
                );
                genome.set_value("x", id as i32);
                genome
            })
            .collect()
    }

    /// Hands out canned payloads, then reports the deadline.
    struct Scripted(VecDeque<Vec<u8>>);

    impl MessageSource for Scripted {
        fn receive(&mut self, _deadline: Instant) -> Result<Option<Vec<u8>>> {
            Ok(self.0.pop_front())
        }
    }

    fn result(id: u64, objective: f64) -> Vec<u8> {
        serde_json::to_vec(&ResultEnvelope {
            results: ResultRecord::success(GenomeId(id), objective, "node1"),
        })
        .unwrap()
    }

    #[test]
    fn test_merge_outcomes_are_distinguished() {
        let mut in_flight = InFlightBatch::new(1, batch(&[1001, 1002]));
        let mut cache = PopulationStore::new();

        assert_eq!(in_flight.merge_payload(&result(1001, 2.0), &mut cache), MergeOutcome::Merged(GenomeId(1001)));
        assert_eq!(
            in_flight.merge_payload(&result(1001, 2.0), &mut cache),
            MergeOutcome::AlreadyComplete(GenomeId(1001))
        );
        assert_eq!(
            in_flight.merge_payload(&result(9999, 2.0), &mut cache),
            MergeOutcome::UnknownId(GenomeId(9999))
        );
        assert_eq!(in_flight.merge_payload(b"<results/>", &mut cache), MergeOutcome::Malformed);

        assert_eq!(cache.len(), 1);
        let report = in_flight.finish(true);
        assert_eq!((report.merged, report.duplicates, report.unknown, report.malformed), (1, 1, 1, 1));
        assert_eq!(report.unfinished.len(), 1);
        assert_eq!(report.unfinished[0].id(), GenomeId(1002));
    }

    #[test]
    fn test_failed_job_result_completes_with_reported_objective() {
        let mut in_flight = InFlightBatch::new(1, batch(&[1001]));
        let mut cache = PopulationStore::new();
        let payload = serde_json::to_vec(&ResultEnvelope {
            results: ResultRecord::failure(GenomeId(1001), "no obj.out", None),
        })
        .unwrap();

        assert_eq!(in_flight.merge_payload(&payload, &mut cache), MergeOutcome::Merged(GenomeId(1001)));
        let genome = cache.get(0).unwrap();
        assert!(genome.is_complete());
        assert_eq!(genome.objective(), -1.0);
    }

    #[test]
    fn test_collect_stops_when_all_merged() {
        let mut in_flight = InFlightBatch::new(2, batch(&[2001, 2002]));
        let mut cache = PopulationStore::new();
        let mut source = Scripted(VecDeque::from(vec![
            result(2002, 1.0),
            b"garbage".to_vec(),
            result(2001, 3.0),
            result(2001, 3.0),
        ]));

        let timed_out = collect(&mut source, &mut in_flight, &mut cache, Duration::from_secs(5)).unwrap();
        assert!(!timed_out);
        // The trailing repeat is never read
        assert_eq!(source.0.len(), 1);
        assert_eq!(cache.best().map(|g| g.id()), Some(GenomeId(2001)));
    }

    #[test]
    fn test_collect_reports_timeout() {
        let mut in_flight = InFlightBatch::new(1, batch(&[1001, 1002, 1003]));
        let mut cache = PopulationStore::new();
        let mut source = Scripted(VecDeque::from(vec![result(1003, 1.0)]));

        let timed_out = collect(&mut source, &mut in_flight, &mut cache, Duration::from_secs(5)).unwrap();
        assert!(timed_out);
        let report = in_flight.finish(timed_out);
        assert_eq!(report.merged, 1);
        let unfinished: Vec<GenomeId> = report.unfinished.iter().map(|g| g.id()).collect();
        assert_eq!(unfinished, vec![GenomeId(1001), GenomeId(1002)]);
    }

    #[test]
    fn test_collect_accepts_unbounded_timeout() {
        let mut in_flight = InFlightBatch::new(1, batch(&[1001]));
        let mut cache = PopulationStore::new();
        let mut source = Scripted(VecDeque::from(vec![result(1001, 1.0)]));

        let timed_out = collect(&mut source, &mut in_flight, &mut cache, Duration::MAX).unwrap();
        assert!(!timed_out);
        assert_eq!(cache.len(), 1);
    }

    struct Captured;

    static CAPTURED: std::sync::Mutex<Vec<(log::Level, String)>> = std::sync::Mutex::new(Vec::new());

    impl log::Log for Captured {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            CAPTURED
                .lock()
                .unwrap()
                .push((record.level(), record.args().to_string()));
        }

        fn flush(&self) {}
    }

    #[test]
    fn test_unfinished_genomes_are_logged_as_warnings() {
        static LOGGER: Captured = Captured;
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Trace);

        let report = InFlightBatch::new(7, batch(&[7042])).finish(true);
        report.log_summary();

        let captured = CAPTURED.lock().unwrap();
        let dropped: Vec<_> = captured
            .iter()
            .filter(|(_, message)| message.starts_with("Genome 7042: ") && message.contains("returned no result"))
            .collect();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].0, log::Level::Warn);
    }

    #[test]
    fn test_complete_genomes_are_not_dispatched() {
        let mut genomes = batch(&[1, 2]);
        genomes[0].mark_complete(1.0, None);
        let in_flight = InFlightBatch::new(1, genomes);
        assert_eq!(in_flight.dispatched(), 1);
        assert_eq!(in_flight.pending_ids(), vec![GenomeId(2)]);
    }
}
