pub mod breeding;
pub mod engine;
pub mod error;
pub mod evolution;
pub mod fitness;
pub mod gene;
pub mod individual;
pub mod rng;
pub mod scheduler;
pub mod selection;

// Re-export commonly used types for convenience
pub use engine::{
    EngineFactory, EngineStatus, Environment, Portfolio, SimulationEngine, Trade, TrialSpec,
};
pub use error::{OptimizerError, OptionExt, Result, ResultExt};
pub use evolution::{GenerationConfig, LogLevel, OptimizationResult, Optimizer, OptimizerState};
pub use fitness::FitnessRecord;
pub use gene::{Gene, GeneValue, Genome};
pub use individual::Individual;
pub use scheduler::StopHandle;
