pub mod job;
pub mod scheduler;
pub mod listener;
pub mod collector;
pub mod worker;

pub use job::{CommandLineRenderer, ConfigTemplate, JobFiles, JobRenderer};
pub use scheduler::{HtCondor, Scheduler};
pub use listener::{MessageSource, ResultListener, ResultSender};
pub use collector::{collect, BatchDispatcher, CollectionReport, Dispatcher, InFlightBatch};
