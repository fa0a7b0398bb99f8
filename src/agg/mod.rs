mod scheduler;

pub use scheduler::{Aggregator, CycleOutcome};
