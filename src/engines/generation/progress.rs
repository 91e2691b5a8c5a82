use super::evolution_engine::ProgressCallback;
use super::genome::Genome;
use crate::engines::dispatch::collector::CollectionReport;

pub struct ConsoleProgressCallback;

impl ProgressCallback for ConsoleProgressCallback {
    fn on_generation_start(&mut self, generation: u64, batch_size: usize) {
        println!("Generation {} starting: {} genomes dispatched", generation, batch_size);
    }

    fn on_generation_complete(&mut self, generation: u64, report: &CollectionReport, best: Option<&Genome>) {
        println!(
            "Generation {} complete. {}/{} results received{}",
            generation,
            report.merged,
            report.dispatched,
            if report.timed_out { " before timeout" } else { "" }
        );
        if let Some(best) = best {
            println!("  Best so far: {}", best);
        }
    }

    fn on_terminated(&mut self, last_generation: u64, cache_size: usize) {
        println!(
            "Search finished after generation {} with {} evaluated genomes",
            last_generation, cache_size
        );
    }
}

/// Forwards progress to another thread
pub struct ChannelProgressCallback {
    sender: std::sync::mpsc::Sender<ProgressMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    GenerationStart { generation: u64, batch_size: usize },
    GenerationComplete { generation: u64, merged: usize, dispatched: usize, best_objective: Option<f64> },
    Terminated { last_generation: u64, cache_size: usize },
}

impl ChannelProgressCallback {
    pub fn new(sender: std::sync::mpsc::Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for ChannelProgressCallback {
    fn on_generation_start(&mut self, generation: u64, batch_size: usize) {
        let _ = self.sender.send(ProgressMessage::GenerationStart { generation, batch_size });
    }

    fn on_generation_complete(&mut self, generation: u64, report: &CollectionReport, best: Option<&Genome>) {
        let _ = self.sender.send(ProgressMessage::GenerationComplete {
            generation,
            merged: report.merged,
            dispatched: report.dispatched,
            best_objective: best.filter(|g| g.is_complete()).map(|g| g.objective()),
        });
    }

    fn on_terminated(&mut self, last_generation: u64, cache_size: usize) {
        let _ = self.sender.send(ProgressMessage::Terminated {
            last_generation,
            cache_size,
        });
    }
}
