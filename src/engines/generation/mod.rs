pub mod parameter;
pub mod genome;
pub mod operators;
pub mod population;
pub mod evolution_engine;
pub mod progress;

pub use parameter::{ParameterDescriptor, ParameterKind};
pub use genome::{Genome, GenomeIdSequence};
pub use operators::{Crossover, SliceCrossover, SwapCrossover};
pub use population::{PopulationStore, Restored};
pub use evolution_engine::{EnginePhase, EvolutionEngine, ProgressCallback};
pub use progress::{ChannelProgressCallback, ConsoleProgressCallback, ProgressMessage};
